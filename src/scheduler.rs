use crate::db::Database;
use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

/// Daily retention sweep, off the busy top of the hour.
const RETENTION_CRON: &str = "0 17 3 * * *";

/// Start the scheduler that removes aged terminal jobs once a day.
pub async fn start_retention_scheduler(db: Database, retention_days: i64) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    info!(
        "Scheduling retention sweep (cron: {}, {} days)",
        RETENTION_CRON, retention_days
    );

    let job = Job::new_async(RETENTION_CRON, move |_uuid, _l| {
        let db = db.clone();

        Box::pin(async move {
            info!("Retention sweep triggered");
            match tokio::task::spawn_blocking(move || db.retention_sweep(retention_days)).await {
                Ok(Ok(removed)) => info!("Retention sweep removed {} jobs", removed),
                Ok(Err(e)) => error!("Retention sweep failed: {}", e),
                Err(e) => error!("Retention sweep task failed: {}", e),
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;
    info!("✓ Scheduler started");

    Ok(scheduler)
}
