//! bmpmon - a BMP (RFC 7854) route collector.
//!
//! Accepts BMP sessions from routers over TCP, decodes the embedded BGP
//! messages (RFC 4271, RFC 4760, RFC 7432 EVPN Type 2), tracks per-peer
//! session state, and persists a time-ordered stream of route updates plus
//! a compacted current-state view into PostgreSQL.

pub mod config;
pub mod db;
pub mod listener;
pub mod models;
pub mod protocol;
pub mod stats;

pub use crate::config::BmpmonConfig;
pub use crate::db::batch::BatchWriter;
pub use crate::db::migrations::MigrationRunner;
pub use crate::db::Database;
pub use crate::listener::BmpListener;
pub use crate::stats::StatsCollector;
