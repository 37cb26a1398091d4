use anyhow::Context;
use scheduledb_db::MongoAdmin;
use scheduledb_kernel::settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().with_context(|| "failed to load scheduledb settings")?;
    scheduledb_telemetry::init(&settings.telemetry)?;

    tracing::info!(
        env = ?settings.environment,
        target_database = %settings.bootstrap.target_database,
        "scheduledb-init bootstrap starting"
    );

    let admin = MongoAdmin::connect(&settings.database).await?;
    let report = scheduledb_init::run(&settings.bootstrap, &admin).await?;

    tracing::info!(
        applied = report.applied(),
        skipped = report.skipped(),
        "scheduledb-init bootstrap complete"
    );
    Ok(())
}
