//! The batch sync flow: fetch rows, export them, push each record through
//! the API client, aggregate and persist the outcomes.

use anyhow::Context;
use chrono::Local;
use tracing::{info, warn};

use promosync_client::IterableClient;
use promosync_core::outcome::SyncReport;
use promosync_core::users::RowSource;
use promosync_storage_mysql::MySqlRowSource;

use crate::config::Cli;
use crate::export;

pub async fn run(cli: &Cli) -> anyhow::Result<()> {
    info!("Starting promosync run");

    // Fail fast on inconsistent auth settings before touching anything.
    let auth = cli.authenticator()?;

    let db = MySqlRowSource::connect(&cli.database_settings())
        .await
        .context("failed to connect to database")?;

    let users = db
        .fetch_users()
        .await
        .context("failed to fetch user records")?;
    if users.is_empty() {
        warn!("No pro users with recent pricing/settings page views found");
        db.close().await;
        return Ok(());
    }
    info!("Found {} pro user(s) with recent engagement", users.len());

    let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let csv_path = export::write_users_csv(&cli.output_dir, &stamp, &users)?;
    info!("Exported query results to {}", csv_path.display());

    let client = IterableClient::new(&cli.api_base_url, auth, cli.retry_policy());

    // One record at a time; each record's retries and backoff sleeps finish
    // before the next record starts.
    let mut report = SyncReport::new();
    let total = users.len();
    for (index, user) in users.iter().enumerate() {
        info!("Processing record {}/{}", index + 1, total);
        report.push(client.process_user(user).await);
    }

    db.close().await;

    let results_path = export::write_results_json(&cli.output_dir, &stamp, &report)?;

    info!("Total users processed: {}", report.total_users);
    info!("Successful (both API calls): {}", report.successful);
    info!("Partial failures (one call failed): {}", report.partial_failures);
    info!("Total failures (both calls failed): {}", report.total_failures);
    info!("Detailed results saved to {}", results_path.display());

    Ok(())
}
