//! Repository for the customers database.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use log::info;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};

use promosync_core::errors::{DatabaseError, Result};
use promosync_core::users::{PlanTier, RowSource, UserRecord};

/// Pro plan customers with a pricing/settings page view in the last 7 days,
/// latest view per customer, newest first.
const PRO_USERS_RECENT_ENGAGEMENT: &str = r#"
WITH ranked_views AS (
    SELECT
        c.id,
        c.email,
        c.first_name,
        c.last_name,
        c.plan_type,
        c.candidate,
        pv.page,
        pv.device,
        pv.browser,
        pv.location,
        pv.event_time,
        ROW_NUMBER() OVER (PARTITION BY c.id ORDER BY pv.event_time DESC) AS view_rank
    FROM customers c
    INNER JOIN page_views pv ON c.id = pv.user_id
    WHERE c.plan_type = 'pro'
        AND pv.page IN ('pricing', 'settings')
        AND pv.event_time >= DATE_SUB(CURDATE(), INTERVAL 7 DAY)
)
SELECT
    id,
    email,
    first_name,
    last_name,
    plan_type,
    candidate,
    page,
    device,
    browser,
    location,
    event_time
FROM ranked_views
WHERE view_rank = 1
ORDER BY event_time DESC
"#;

/// Connection settings for the customers database.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    plan_type: String,
    candidate: Option<String>,
    page: Option<String>,
    device: Option<String>,
    browser: Option<String>,
    location: Option<String>,
    event_time: Option<NaiveDateTime>,
}

fn map_row(row: UserRow) -> Result<UserRecord> {
    let plan_type = PlanTier::parse(&row.plan_type).ok_or_else(|| {
        DatabaseError::InvalidRow(format!(
            "customer {} has unknown plan_type '{}'",
            row.id, row.plan_type
        ))
    })?;

    Ok(UserRecord {
        id: row.id,
        email: row.email.unwrap_or_default(),
        first_name: row.first_name,
        last_name: row.last_name,
        plan_type,
        candidate: row.candidate,
        page: row.page,
        device: row.device,
        browser: row.browser,
        location: row.location,
        event_time: row.event_time,
    })
}

/// Row source backed by a MySQL connection pool.
///
/// The pool is held for the whole run and released on drop; the batch is
/// small enough that a single connection suffices.
#[derive(Debug)]
pub struct MySqlRowSource {
    pool: MySqlPool,
}

impl MySqlRowSource {
    /// Connect to the database.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.user)
            .password(&settings.password)
            .database(&settings.database);

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        info!("Connected to database: {}", settings.database);
        Ok(Self { pool })
    }

    /// Close the pool explicitly at the end of a run.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection closed");
    }
}

#[async_trait]
impl RowSource for MySqlRowSource {
    async fn fetch_users(&self) -> Result<Vec<UserRecord>> {
        let rows = sqlx::query_as::<_, UserRow>(PRO_USERS_RECENT_ENGAGEMENT)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        info!("Query executed successfully, returned {} rows", rows.len());
        rows.into_iter().map(map_row).collect()
    }
}
