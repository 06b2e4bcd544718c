//! Per-connection BMP session handling: framed reads, message dispatch,
//! peer lifecycle bookkeeping and error isolation.

use std::net::{IpAddr, SocketAddr};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::db::batch::BatchWriter;
use crate::db::Database;
use crate::models::{BmpPeer, PeerEvent, PeerEventType, RouteFamily, RouteUpdate};
use crate::protocol::bgp::BgpParseError;
use crate::protocol::bgp_parser::parse_bgp_update;
use crate::protocol::bmp::{
    BmpMessageType, BmpParseError, BmpRouteMonitoringMessage, BMP_HEADER_SIZE,
};
use crate::protocol::bmp_parser::{
    parse_bmp_header, parse_initiation_message, parse_peer_down_message, parse_peer_up_message,
    parse_route_monitoring_message, parse_statistics_report_message, parse_termination_message,
};
use crate::stats::StatsCollector;

/// Bounded hex dump size for error and debug logs.
const HEX_DUMP_LIMIT: usize = 256;

/// Why the per-message processing failed. Each variant maps to one stable
/// log event; none of them end the session.
#[derive(Debug, Error)]
enum MessageError {
    #[error(transparent)]
    Bmp(#[from] BmpParseError),
    #[error(transparent)]
    Bgp(#[from] BgpParseError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn hex_dump(data: &[u8]) -> String {
    hex::encode(&data[..data.len().min(HEX_DUMP_LIMIT)])
}

/// Decode a route-monitoring message's BGP UPDATE and build one record per
/// announcement and per withdrawal.
pub fn route_updates_from_monitoring(
    msg: &BmpRouteMonitoringMessage,
    bmp_peer_ip: IpAddr,
    time: DateTime<Utc>,
) -> Result<(RouteFamily, Vec<RouteUpdate>), BgpParseError> {
    let update = parse_bgp_update(&msg.bgp_update)?;
    let family = RouteFamily::from_afi(update.afi);

    let mut records =
        Vec::with_capacity(update.prefixes.len() + update.withdrawn_prefixes.len());
    for entry in &update.prefixes {
        records.push(RouteUpdate::announcement(
            time,
            bmp_peer_ip,
            &msg.per_peer_header,
            &update,
            entry,
        ));
    }
    for entry in &update.withdrawn_prefixes {
        records.push(RouteUpdate::withdrawal(
            time,
            bmp_peer_ip,
            &msg.per_peer_header,
            &update,
            entry,
        ));
    }

    Ok((family, records))
}

/// One handler per accepted TCP connection. Runs until the peer closes the
/// connection, a framing error occurs, or the task is cancelled.
pub(crate) struct Session {
    peer_ip: IpAddr,
    db: Database,
    batch_writer: BatchWriter,
    stats: StatsCollector,
}

impl Session {
    pub(crate) fn new(
        peer_addr: SocketAddr,
        db: Database,
        batch_writer: BatchWriter,
        stats: StatsCollector,
    ) -> Self {
        Self {
            peer_ip: peer_addr.ip(),
            db,
            batch_writer,
            stats,
        }
    }

    pub(crate) async fn run(self, mut stream: TcpStream) {
        let peer_ip = self.peer_ip;
        let started = Instant::now();
        tracing::info!(peer = %peer_ip, "peer_connected");

        loop {
            // Framed read: exactly the common header, then exactly the body.
            let mut header_buf = [0u8; BMP_HEADER_SIZE];
            if let Err(err) = stream.read_exact(&mut header_buf).await {
                self.log_disconnect(&err, started);
                break;
            }

            // An unparseable common header is a framing error: the stream
            // can no longer be resynchronised, so the session closes.
            let header = match parse_bmp_header(&header_buf) {
                Ok(header) => header,
                Err(err) => {
                    tracing::error!(
                        peer = %peer_ip,
                        error = %err,
                        data_hex = %hex_dump(&header_buf),
                        "bmp_parse_error"
                    );
                    self.stats.increment_error(peer_ip);
                    tracing::info!(
                        peer = %peer_ip,
                        reason = "unparseable_header",
                        duration_seconds = started.elapsed().as_secs(),
                        "peer_disconnected"
                    );
                    break;
                }
            };

            let mut message = vec![0u8; header.length as usize];
            message[..BMP_HEADER_SIZE].copy_from_slice(&header_buf);
            if header.length as usize > BMP_HEADER_SIZE {
                if let Err(err) = stream.read_exact(&mut message[BMP_HEADER_SIZE..]).await {
                    self.log_disconnect(&err, started);
                    break;
                }
            }

            tracing::debug!(
                peer = %peer_ip,
                version = header.version,
                length = header.length,
                msg_type = header.msg_type.as_str(),
                data_hex = %hex_dump(&message),
                total_size = message.len(),
                "bmp_message_received"
            );

            // Refresh the peer row and the received counter before
            // dispatching, whatever the message turns out to be.
            if let Err(err) = self.db.touch_bmp_peer(peer_ip, Utc::now()).await {
                tracing::error!(peer = %peer_ip, error = %err, "message_processing_error");
            }
            self.stats.increment_received(peer_ip);

            // Parse errors inside a well-framed message are isolated: log,
            // count, and continue with the next frame.
            if let Err(err) = self.process_message(header.msg_type, &message).await {
                self.stats.increment_error(peer_ip);
                match err {
                    MessageError::Bmp(err) => tracing::error!(
                        peer = %peer_ip,
                        error = %err,
                        data_hex = %hex_dump(&message),
                        "bmp_parse_error"
                    ),
                    MessageError::Bgp(err) => tracing::error!(
                        peer = %peer_ip,
                        error = %err,
                        "bgp_parse_error"
                    ),
                    MessageError::Other(err) => tracing::error!(
                        peer = %peer_ip,
                        error = %err,
                        "message_processing_error"
                    ),
                }
            }
        }

        self.stats.remove_peer(peer_ip);
        tracing::info!(
            peer = %peer_ip,
            duration_seconds = started.elapsed().as_secs(),
            "peer_connection_closed"
        );
    }

    fn log_disconnect(&self, err: &std::io::Error, started: Instant) {
        let reason = match err.kind() {
            std::io::ErrorKind::UnexpectedEof => "incomplete_read",
            std::io::ErrorKind::ConnectionReset => "connection_reset",
            _ => "io_error",
        };
        tracing::info!(
            peer = %self.peer_ip,
            reason,
            duration_seconds = started.elapsed().as_secs(),
            "peer_disconnected"
        );
    }

    async fn process_message(
        &self,
        msg_type: BmpMessageType,
        data: &[u8],
    ) -> Result<(), MessageError> {
        match msg_type {
            BmpMessageType::RouteMonitoring => self.handle_route_monitoring(data).await,
            BmpMessageType::PeerUpNotification => self.handle_peer_up(data).await,
            BmpMessageType::PeerDownNotification => self.handle_peer_down(data).await,
            BmpMessageType::Initiation => {
                let msg = parse_initiation_message(data)?;
                tracing::debug!(
                    peer = %self.peer_ip,
                    msg_type = "initiation",
                    tlv_count = msg.information_tlvs.len(),
                    "bmp_message_ignored"
                );
                Ok(())
            }
            BmpMessageType::Termination => {
                let msg = parse_termination_message(data)?;
                tracing::debug!(
                    peer = %self.peer_ip,
                    msg_type = "termination",
                    tlv_count = msg.information_tlvs.len(),
                    "bmp_message_ignored"
                );
                Ok(())
            }
            BmpMessageType::StatisticsReport => {
                let msg = parse_statistics_report_message(data)?;
                tracing::debug!(
                    peer = %self.peer_ip,
                    msg_type = "statistics_report",
                    stats_count = msg.stats_tlvs.len(),
                    "bmp_message_ignored"
                );
                Ok(())
            }
        }
    }

    async fn handle_route_monitoring(&self, data: &[u8]) -> Result<(), MessageError> {
        let msg = parse_route_monitoring_message(data)?;
        let (family, records) = route_updates_from_monitoring(&msg, self.peer_ip, Utc::now())?;

        tracing::debug!(
            peer = %self.peer_ip,
            bgp_peer = %msg.per_peer_header.peer_address,
            family = %family,
            records = records.len(),
            "bgp_update_parsed"
        );

        for record in records {
            self.batch_writer.add(record).await?;
            self.stats.increment_processed(self.peer_ip, family);
        }

        Ok(())
    }

    async fn handle_peer_up(&self, data: &[u8]) -> Result<(), MessageError> {
        let msg = parse_peer_up_message(data)?;
        let now = Utc::now();

        let peer = BmpPeer {
            peer_ip: self.peer_ip,
            router_id: None,
            first_seen: now,
            last_seen: now,
            is_active: true,
        };
        self.db.upsert_bmp_peer(&peer).await?;

        self.db
            .insert_peer_event(&PeerEvent {
                time: now,
                peer_ip: self.peer_ip,
                event_type: PeerEventType::PeerUp,
                reason_code: None,
            })
            .await?;

        tracing::info!(
            peer = %self.peer_ip,
            bgp_peer = %msg.per_peer_header.peer_address,
            bgp_peer_asn = msg.per_peer_header.peer_asn,
            local_port = msg.local_port,
            remote_port = msg.remote_port,
            "bmp_peer_up"
        );

        Ok(())
    }

    async fn handle_peer_down(&self, data: &[u8]) -> Result<(), MessageError> {
        let msg = parse_peer_down_message(data)?;
        let now = Utc::now();

        self.db.mark_peer_inactive(self.peer_ip, now).await?;

        let reason: u8 = msg.reason.into();
        self.db
            .insert_peer_event(&PeerEvent {
                time: now,
                peer_ip: self.peer_ip,
                event_type: PeerEventType::PeerDown,
                reason_code: Some(reason),
            })
            .await?;

        tracing::info!(
            peer = %self.peer_ip,
            bgp_peer = %msg.per_peer_header.peer_address,
            reason,
            "bmp_peer_down"
        );

        Ok(())
    }
}
