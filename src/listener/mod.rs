//! TCP accept loop for BMP sessions.

pub mod session;

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::config::ListenerConfig;
use crate::db::batch::BatchWriter;
use crate::db::Database;
use crate::listener::session::Session;
use crate::stats::StatsCollector;

/// How long shutdown waits for cancelled sessions to finish.
const SESSION_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct BmpListener {
    cfg: ListenerConfig,
    db: Database,
    batch_writer: BatchWriter,
    stats: StatsCollector,
}

impl BmpListener {
    pub fn new(
        cfg: ListenerConfig,
        db: Database,
        batch_writer: BatchWriter,
        stats: StatsCollector,
    ) -> Self {
        Self {
            cfg,
            db,
            batch_writer,
            stats,
        }
    }

    /// Accept connections and run one session per connection until the
    /// shutdown channel fires. On shutdown: stop accepting, cancel active
    /// sessions, and wait for them with a bounded timeout.
    pub async fn run(&self, mut shutdown: watch::Receiver<()>) -> Result<()> {
        let listener = TcpListener::bind((self.cfg.host.as_str(), self.cfg.port))
            .await
            .with_context(|| {
                format!("failed binding BMP listener {}:{}", self.cfg.host, self.cfg.port)
            })?;

        tracing::info!(
            host = %self.cfg.host,
            port = self.cfg.port,
            "bmp_listener_started"
        );

        let mut sessions: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => {
                            let session = Session::new(
                                peer_addr,
                                self.db.clone(),
                                self.batch_writer.clone(),
                                self.stats.clone(),
                            );
                            sessions.spawn(session.run(stream));
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "accept_failed");
                        }
                    }
                }
                // Reap finished sessions so the set does not grow unbounded.
                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
                _ = shutdown.changed() => {
                    break;
                }
            }
        }

        tracing::info!(active_sessions = sessions.len(), "bmp_listener_stopping");
        drop(listener);

        sessions.abort_all();
        let drained = tokio::time::timeout(SESSION_SHUTDOWN_TIMEOUT, async {
            while sessions.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!("session_shutdown_timed_out");
        }

        tracing::info!("bmp_listener_stopped");
        Ok(())
    }
}
