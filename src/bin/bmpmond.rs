use std::path::PathBuf;

use anyhow::{Context, Result};
use bmpmon::config::BmpmonConfig;
use bmpmon::db::batch::BatchWriter;
use bmpmon::db::migrations::MigrationRunner;
use bmpmon::db::Database;
use bmpmon::listener::BmpListener;
use bmpmon::stats::StatsCollector;
use clap::Parser;
use tokio::sync::watch;

#[derive(Debug, Parser)]
#[command(name = "bmpmond", about = "BMP route collector daemon")]
struct Args {
    /// Optional TOML config file; environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the NNN_name.sql migration files.
    #[arg(long, default_value = "migrations")]
    migrations_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let cfg = BmpmonConfig::load(args.config.as_deref())?;
    init_tracing(&cfg.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_host = %cfg.listener.host,
        listen_port = cfg.listener.port,
        log_level = %cfg.log_level,
        "bmpmon_starting"
    );

    // Startup failures past this point are fatal: bind errors, migration
    // refusal and pool init failure all exit non-zero.
    let db = Database::connect(&cfg.database).await?;

    MigrationRunner::new(db.clone(), &args.migrations_dir)
        .apply_all()
        .await
        .context("schema migration failed")?;

    let batch_writer = BatchWriter::new(db.clone(), &cfg.batch);
    batch_writer.start().await;

    let stats = StatsCollector::new(cfg.stats.interval());
    stats.start().await;

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    spawn_signal_handler(shutdown_tx)?;

    let listener = BmpListener::new(
        cfg.listener.clone(),
        db.clone(),
        batch_writer.clone(),
        stats.clone(),
    );
    let result = listener.run(shutdown_rx).await;

    // Shutdown order matters: sessions are already done, so stop the batch
    // writer (which flushes the tail batch), then the stats rollup, then
    // close the pool.
    batch_writer.stop().await;
    stats.stop().await;
    db.close().await;

    tracing::info!("bmpmon_stopped");
    result
}

fn init_tracing(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_new(level.to_lowercase())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .json()
        .init();
}

fn spawn_signal_handler(shutdown_tx: watch::Sender<()>) -> Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("failed installing SIGTERM handler")?;

    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(signal = "SIGINT", "signal_received");
            }
            _ = sigterm.recv() => {
                tracing::info!(signal = "SIGTERM", "signal_received");
            }
        }
        let _ = shutdown_tx.send(());
    });

    Ok(())
}
