use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

use stridesync::{
    scheduler_loop, step_feed, BackgroundRunner, Database, ReconciliationEngine, RemoteStepLedger,
    RunnerConfig, SchedulerConfig, SensorStepSource, SettingsStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("StrideSync sync daemon starting up...");

    let data_dir = std::env::var("STRIDESYNC_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".stridesync"));
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let settings_store = SettingsStore::new(data_dir.join("settings.json"))?;
    let settings = settings_store.sync();
    if settings.user_id.is_empty() {
        bail!(
            "user_id is not set; edit {} and restart",
            data_dir.join("settings.json").display()
        );
    }

    let db = Database::new(data_dir.join("stridesync.sqlite3"))?;
    info!(
        "syncing steps for user '{}', journal at {}",
        settings.user_id,
        db.path().display()
    );
    let ledger = RemoteStepLedger::new(&settings.api_base_url);
    let (feed, sensor) = step_feed();

    // The platform pedometer bridge writes step counter events to our
    // stdin, one string-encoded cumulative count per line.
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            feed.push_event(&line);
        }
        info!("step event input closed");
    });

    let engine = Arc::new(Mutex::new(ReconciliationEngine::new(
        ledger,
        SensorStepSource::new(sensor),
        settings.sensor_timeout(),
    )));
    let config = SchedulerConfig::from_settings(&settings);

    let mut runner = BackgroundRunner::new(RunnerConfig::default());
    {
        let db = db.clone();
        runner.start(move |token| {
            scheduler_loop(config.clone(), engine.clone(), db.clone(), token)
        })?;
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested");
    runner.stop().await?;

    Ok(())
}
