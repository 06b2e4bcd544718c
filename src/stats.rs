//! In-memory per-peer counters with a periodic rollup log.
//!
//! Sessions bump counters on every message; a background task wakes once
//! per interval, emits one `route_stats` record per peer that saw activity
//! in the window, and resets that peer's counters. Silent peers are left
//! alone. Peers disappear from the map when their session closes.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::models::RouteFamily;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerStats {
    pub routes_received: u64,
    pub routes_processed: u64,
    pub ipv4_routes: u64,
    pub ipv6_routes: u64,
    pub evpn_routes: u64,
    pub errors: u64,
    pub last_update: DateTime<Utc>,
}

impl PeerStats {
    fn new() -> Self {
        Self {
            routes_received: 0,
            routes_processed: 0,
            ipv4_routes: 0,
            ipv6_routes: 0,
            evpn_routes: 0,
            errors: 0,
            last_update: Utc::now(),
        }
    }

    fn has_activity(&self) -> bool {
        self.routes_received > 0 || self.routes_processed > 0 || self.errors > 0
    }

    fn reset(&mut self) {
        *self = PeerStats::new();
    }
}

struct StatsInner {
    interval: Duration,
    peers: Mutex<HashMap<IpAddr, PeerStats>>,
    running: AtomicBool,
    rollup_task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct StatsCollector {
    inner: Arc<StatsInner>,
}

impl StatsCollector {
    pub fn new(interval: Duration) -> Self {
        Self {
            inner: Arc::new(StatsInner {
                interval,
                peers: Mutex::new(HashMap::new()),
                running: AtomicBool::new(false),
                rollup_task: Mutex::new(None),
            }),
        }
    }

    pub fn increment_received(&self, peer_ip: IpAddr) {
        let mut peers = self.inner.peers.lock().expect("stats lock poisoned");
        let stats = peers.entry(peer_ip).or_insert_with(PeerStats::new);
        stats.routes_received += 1;
        stats.last_update = Utc::now();
    }

    pub fn increment_processed(&self, peer_ip: IpAddr, family: RouteFamily) {
        let mut peers = self.inner.peers.lock().expect("stats lock poisoned");
        let stats = peers.entry(peer_ip).or_insert_with(PeerStats::new);
        stats.routes_processed += 1;
        match family {
            RouteFamily::Ipv4Unicast => stats.ipv4_routes += 1,
            RouteFamily::Ipv6Unicast => stats.ipv6_routes += 1,
            RouteFamily::Evpn => stats.evpn_routes += 1,
            RouteFamily::Unknown => {}
        }
        stats.last_update = Utc::now();
    }

    pub fn increment_error(&self, peer_ip: IpAddr) {
        let mut peers = self.inner.peers.lock().expect("stats lock poisoned");
        let stats = peers.entry(peer_ip).or_insert_with(PeerStats::new);
        stats.errors += 1;
        stats.last_update = Utc::now();
    }

    /// Drop a peer's counters when its session closes.
    pub fn remove_peer(&self, peer_ip: IpAddr) {
        self.inner
            .peers
            .lock()
            .expect("stats lock poisoned")
            .remove(&peer_ip);
    }

    pub fn peer_stats(&self, peer_ip: IpAddr) -> Option<PeerStats> {
        self.inner
            .peers
            .lock()
            .expect("stats lock poisoned")
            .get(&peer_ip)
            .cloned()
    }

    pub async fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let collector = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(collector.inner.interval);
            // The first tick of a tokio interval fires immediately; consume
            // it so the first report covers a full window.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !collector.inner.running.load(Ordering::SeqCst) {
                    break;
                }
                collector.report_and_reset();
            }
        });

        *self.inner.rollup_task.lock().expect("stats lock poisoned") = Some(task);
        tracing::info!(
            interval_seconds = self.inner.interval.as_secs(),
            "statistics_collector_started"
        );
    }

    pub async fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);

        let task = self
            .inner
            .rollup_task
            .lock()
            .expect("stats lock poisoned")
            .take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }

        tracing::info!("statistics_collector_stopped");
    }

    /// Emit one `route_stats` record per active peer, then reset the peers
    /// that were reported. Exposed for tests.
    pub fn report_and_reset(&self) {
        let interval_secs = self.inner.interval.as_secs().max(1);
        let mut peers = self.inner.peers.lock().expect("stats lock poisoned");

        for (peer_ip, stats) in peers.iter_mut() {
            if !stats.has_activity() {
                continue;
            }

            let throughput_per_sec = stats.routes_processed / interval_secs;
            tracing::info!(
                peer = %peer_ip,
                received = stats.routes_received,
                processed = stats.routes_processed,
                ipv4 = stats.ipv4_routes,
                ipv6 = stats.ipv6_routes,
                evpn = stats.evpn_routes,
                errors = stats.errors,
                throughput_per_sec,
                "route_stats"
            );

            stats.reset();
        }
    }
}
