pub mod batch;
pub mod copy;
pub mod migrations;

use std::net::IpAddr;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use mac_address::MacAddress;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::Row;

use crate::config::DatabaseConfig;
use crate::models::{BmpPeer, PeerEvent, RouteFamily};

/// Connection pool facade: owns pool lifecycle, installs the per-connection
/// operational timeout, and exposes the small typed helpers around the peer
/// and event tables.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect and size the pool, verifying the server is reachable.
    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self> {
        tracing::info!(
            host = %cfg.host,
            port = cfg.port,
            database = %cfg.name,
            min_size = cfg.pool_min_size,
            max_size = cfg.pool_max_size,
            "database_pool_connecting"
        );

        let options = PgConnectOptions::new()
            .host(&cfg.host)
            .port(cfg.port)
            .username(&cfg.user)
            .password(&cfg.password)
            .database(&cfg.name);

        let statement_timeout_ms = cfg.command_timeout_secs.saturating_mul(1000);

        let pool = PgPoolOptions::new()
            .min_connections(cfg.pool_min_size)
            .max_connections(cfg.pool_max_size)
            .acquire_timeout(cfg.connect_timeout())
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    // Operational timeout for every statement on this
                    // connection; a stuck store surfaces as a query error
                    // instead of a hung flush.
                    sqlx::query(&format!("SET statement_timeout = {statement_timeout_ms}"))
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(options)
            .await
            .context("failed creating database pool")?;

        let version: String = sqlx::query_scalar("SELECT version()")
            .fetch_one(&pool)
            .await
            .context("failed verifying database connectivity")?;
        tracing::info!(postgres_version = %version, "database_pool_connected");

        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        tracing::info!("database_pool_closing");
        self.pool.close().await;
        tracing::info!("database_pool_closed");
    }

    /// Insert or refresh a BMP peer row.
    pub async fn upsert_bmp_peer(&self, peer: &BmpPeer) -> Result<()> {
        sqlx::query(
            "INSERT INTO bmp_peers (peer_ip, router_id, first_seen, last_seen, is_active)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (peer_ip) DO UPDATE SET
                 router_id = EXCLUDED.router_id,
                 last_seen = EXCLUDED.last_seen,
                 is_active = EXCLUDED.is_active",
        )
        .bind(peer.peer_ip)
        .bind(peer.router_id)
        .bind(peer.first_seen)
        .bind(peer.last_seen)
        .bind(peer.is_active)
        .execute(&self.pool)
        .await
        .context("failed upserting bmp peer")?;
        Ok(())
    }

    /// Refresh `last_seen` for a BMP source, creating the row on the first
    /// message ever observed from it.
    pub async fn touch_bmp_peer(&self, peer_ip: IpAddr, seen: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "INSERT INTO bmp_peers (peer_ip, first_seen, last_seen, is_active)
             VALUES ($1, $2, $2, TRUE)
             ON CONFLICT (peer_ip) DO UPDATE SET last_seen = EXCLUDED.last_seen",
        )
        .bind(peer_ip)
        .bind(seen)
        .execute(&self.pool)
        .await
        .context("failed refreshing bmp peer last_seen")?;
        Ok(())
    }

    pub async fn mark_peer_inactive(&self, peer_ip: IpAddr, seen: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE bmp_peers SET is_active = FALSE, last_seen = $2 WHERE peer_ip = $1")
            .bind(peer_ip)
            .bind(seen)
            .execute(&self.pool)
            .await
            .context("failed marking bmp peer inactive")?;
        Ok(())
    }

    pub async fn get_bmp_peer(&self, peer_ip: IpAddr) -> Result<Option<BmpPeer>> {
        let row = sqlx::query(
            "SELECT peer_ip, router_id, first_seen, last_seen, is_active
             FROM bmp_peers WHERE peer_ip = $1",
        )
        .bind(peer_ip)
        .fetch_optional(&self.pool)
        .await
        .context("failed fetching bmp peer")?;

        Ok(row.map(|row| BmpPeer {
            peer_ip: row.get("peer_ip"),
            router_id: row.get("router_id"),
            first_seen: row.get("first_seen"),
            last_seen: row.get("last_seen"),
            is_active: row.get("is_active"),
        }))
    }

    pub async fn insert_peer_event(&self, event: &PeerEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO peer_events (time, peer_ip, event_type, reason_code)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(event.time)
        .bind(event.peer_ip)
        .bind(event.event_type.as_str())
        .bind(event.reason_code.map(|r| r as i32))
        .execute(&self.pool)
        .await
        .context("failed inserting peer event")?;
        Ok(())
    }

    pub async fn route_update_count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM route_updates")
            .fetch_one(&self.pool)
            .await
            .context("failed counting route updates")
    }

    pub async fn route_update_count_by_peer(&self, peer_ip: IpAddr) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM route_updates WHERE bmp_peer_ip = $1")
            .bind(peer_ip)
            .fetch_one(&self.pool)
            .await
            .context("failed counting route updates by peer")
    }

    pub async fn route_update_count_by_family(&self, family: RouteFamily) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM route_updates WHERE family = $1")
            .bind(family.as_str())
            .fetch_one(&self.pool)
            .await
            .context("failed counting route updates by family")
    }

    /// Fetch the compacted state counters for one IP-family route key.
    pub async fn route_state_counters(
        &self,
        bmp_peer_ip: IpAddr,
        bgp_peer_ip: IpAddr,
        family: RouteFamily,
        prefix: ipnet::IpNet,
    ) -> Result<Option<RouteStateCounters>> {
        let row = sqlx::query(
            "SELECT learn_count, withdraw_count, is_withdrawn, first_seen, last_seen
             FROM route_state
             WHERE bmp_peer_ip = $1 AND bgp_peer_ip = $2 AND family = $3 AND prefix = $4",
        )
        .bind(bmp_peer_ip)
        .bind(bgp_peer_ip)
        .bind(family.as_str())
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await
        .context("failed fetching route state")?;

        Ok(row.map(|row| RouteStateCounters {
            learn_count: row.get("learn_count"),
            withdraw_count: row.get("withdraw_count"),
            is_withdrawn: row.get("is_withdrawn"),
            first_seen: row.get("first_seen"),
            last_seen: row.get("last_seen"),
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteStateCounters {
    pub learn_count: i64,
    pub withdraw_count: i64,
    pub is_withdrawn: bool,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Encode a colon- or dash-separated MAC string into the store's native
/// 6-byte MACADDR value.
pub fn encode_macaddr(value: &str) -> Result<MacAddress> {
    let parts: Vec<&str> = value.split([':', '-']).collect();
    if parts.len() != 6 {
        return Err(anyhow!("invalid MAC address {value:?}: expected 6 octets"));
    }

    let mut bytes = [0u8; 6];
    for (i, part) in parts.iter().enumerate() {
        bytes[i] = u8::from_str_radix(part, 16)
            .map_err(|_| anyhow!("invalid MAC address {value:?}: bad octet {part:?}"))?;
    }

    Ok(MacAddress::new(bytes))
}

/// Decode a 6-byte MACADDR into the lowercase colon-separated string form
/// used throughout the decoders.
pub fn decode_macaddr(value: &MacAddress) -> String {
    value
        .bytes()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_codec_round_trips() {
        let mac = encode_macaddr("aa:bb:cc:dd:ee:ff").unwrap();
        assert_eq!(mac.bytes(), [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert_eq!(decode_macaddr(&mac), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn mac_codec_accepts_dash_separators() {
        let mac = encode_macaddr("08-00-2b-01-02-03").unwrap();
        assert_eq!(decode_macaddr(&mac), "08:00:2b:01:02:03");
    }

    #[test]
    fn mac_codec_rejects_malformed_input() {
        assert!(encode_macaddr("aa:bb:cc").is_err());
        assert!(encode_macaddr("aa:bb:cc:dd:ee:zz").is_err());
        assert!(encode_macaddr("").is_err());
    }
}
