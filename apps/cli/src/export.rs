//! Timestamped CSV and JSON result artifacts.

use anyhow::Context;
use std::fs::File;
use std::path::{Path, PathBuf};

use promosync_core::outcome::SyncReport;
use promosync_core::users::UserRecord;

/// Column order mirrors the source query verbatim.
const CSV_COLUMNS: [&str; 11] = [
    "id",
    "email",
    "first_name",
    "last_name",
    "plan_type",
    "candidate",
    "page",
    "device",
    "browser",
    "location",
    "event_time",
];

/// Write the query results to `pro_users_<stamp>.csv` under `dir`.
pub fn write_users_csv(dir: &Path, stamp: &str, users: &[UserRecord]) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory {}", dir.display()))?;
    let path = dir.join(format!("pro_users_{stamp}.csv"));
    let file = File::create(&path)
        .with_context(|| format!("failed to create CSV file {}", path.display()))?;
    write_users_csv_to(file, users)?;
    Ok(path)
}

fn write_users_csv_to<W: std::io::Write>(writer: W, users: &[UserRecord]) -> anyhow::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CSV_COLUMNS)?;
    for user in users {
        csv.write_record([
            user.id.to_string(),
            user.email.clone(),
            user.first_name.clone().unwrap_or_default(),
            user.last_name.clone().unwrap_or_default(),
            user.plan_type.as_str().to_string(),
            user.candidate.clone().unwrap_or_default(),
            user.page.clone().unwrap_or_default(),
            user.device.clone().unwrap_or_default(),
            user.browser.clone().unwrap_or_default(),
            user.location.clone().unwrap_or_default(),
            user.event_time_string(),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

/// Write the detailed run report to `sync_results_<stamp>.json` under `dir`.
pub fn write_results_json(dir: &Path, stamp: &str, report: &SyncReport) -> anyhow::Result<PathBuf> {
    let path = dir.join(format!("sync_results_{stamp}.json"));
    let file = File::create(&path)
        .with_context(|| format!("failed to create results file {}", path.display()))?;
    serde_json::to_writer_pretty(file, report).context("failed to serialize results")?;
    Ok(path)
}
