//! Customer row models supplied by the row source.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Subscription tiers recognized in the customers table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Basic,
    Pro,
    Enterprise,
}

impl PlanTier {
    /// Parse a database `plan_type` value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "free" => Some(Self::Free),
            "basic" => Some(Self::Basic),
            "pro" => Some(Self::Pro),
            "enterprise" => Some(Self::Enterprise),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Basic => "basic",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }
}

/// One qualifying customer: profile fields plus the most recent
/// pricing/settings page view. Immutable once read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: i64,
    /// Cross-system key. Empty when the source row carried no address.
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub plan_type: PlanTier,
    pub candidate: Option<String>,
    pub page: Option<String>,
    pub device: Option<String>,
    pub browser: Option<String>,
    pub location: Option<String>,
    pub event_time: Option<NaiveDateTime>,
}

impl UserRecord {
    /// Event time rendered the way it is sent to the API and the CSV export.
    pub fn event_time_string(&self) -> String {
        self.event_time
            .map(|t| t.to_string())
            .unwrap_or_default()
    }
}

/// Supplies the ordered batch of rows to sync.
///
/// Implementations own the underlying connection; the engine only consumes
/// the output shape. The full result set is materialized, no pagination.
#[async_trait]
pub trait RowSource {
    async fn fetch_users(&self) -> Result<Vec<UserRecord>>;
}
