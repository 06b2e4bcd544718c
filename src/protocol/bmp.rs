//! BMP protocol definitions per RFC 7854.

use std::net::{IpAddr, Ipv4Addr};

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

use crate::protocol::binary::OutOfBounds;

/// Common header size in bytes.
pub const BMP_HEADER_SIZE: usize = 6;
/// Per-peer header size in bytes.
pub const BMP_PER_PEER_HEADER_SIZE: usize = 42;
/// The only supported protocol version.
pub const BMP_VERSION: u8 = 3;

/// BMP message types per RFC 7854 Section 4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum BmpMessageType {
    RouteMonitoring = 0,
    StatisticsReport = 1,
    PeerDownNotification = 2,
    PeerUpNotification = 3,
    Initiation = 4,
    Termination = 5,
}

impl BmpMessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BmpMessageType::RouteMonitoring => "route_monitoring",
            BmpMessageType::StatisticsReport => "statistics_report",
            BmpMessageType::PeerDownNotification => "peer_down",
            BmpMessageType::PeerUpNotification => "peer_up",
            BmpMessageType::Initiation => "initiation",
            BmpMessageType::Termination => "termination",
        }
    }
}

/// BMP peer types per RFC 7854 Section 4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum BmpPeerType {
    GlobalInstance = 0,
    RdInstance = 1,
    LocalInstance = 2,
    LocRibInstance = 3,
}

bitflags! {
    /// Per-peer header flags per RFC 7854 Section 4.2.
    ///
    /// ```text
    ///  0 1 2 3 4 5 6 7
    /// +-+-+-+-+-+-+-+-+
    /// |V|L|A| Reserved|
    /// +-+-+-+-+-+-+-+-+
    /// ```
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BmpPeerFlags: u8 {
        /// V flag: the peer address is IPv6.
        const IPV6 = 0b1000_0000;
        /// L flag: post-policy Adj-RIB-In.
        const POST_POLICY = 0b0100_0000;
        /// A flag: the peer speaks legacy 2-byte AS_PATH encoding.
        const AS_PATH_2BYTE = 0b0010_0000;
    }
}

impl BmpPeerFlags {
    pub const fn is_ipv6(&self) -> bool {
        self.contains(BmpPeerFlags::IPV6)
    }

    pub const fn is_post_policy(&self) -> bool {
        self.contains(BmpPeerFlags::POST_POLICY)
    }
}

/// Peer down reason codes per RFC 7854 Section 4.9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum BmpPeerDownReason {
    /// Local system closed the session, NOTIFICATION follows.
    LocalNotification = 1,
    /// Local system closed the session without a NOTIFICATION.
    LocalNoNotification = 2,
    /// Remote system closed the session, NOTIFICATION follows.
    RemoteNotification = 3,
    /// Remote system closed the session without a NOTIFICATION.
    RemoteNoNotification = 4,
    /// Monitoring for this peer has been de-configured.
    PeerDeConfigured = 5,
}

/// BMP common header (6 bytes on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BmpHeader {
    pub version: u8,
    /// Total message length in bytes, header included.
    pub length: u32,
    pub msg_type: BmpMessageType,
}

/// BMP per-peer header (42 bytes on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BmpPerPeerHeader {
    pub peer_type: BmpPeerType,
    pub peer_flags: BmpPeerFlags,
    pub peer_distinguisher: [u8; 8],
    pub peer_address: IpAddr,
    pub peer_asn: u32,
    pub peer_bgp_id: Ipv4Addr,
    pub timestamp_sec: u32,
    pub timestamp_usec: u32,
}

/// Information TLV carried by initiation, termination and peer-up messages.
///
/// Unknown types are retained as-is rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BmpInfoTlv {
    pub info_type: u16,
    pub info_value: Vec<u8>,
}

/// Statistics TLV value, decoded by length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BmpStatValue {
    /// 4-byte counter.
    Counter32(u32),
    /// 8-byte gauge/counter.
    Counter64(u64),
    /// Any other length, retained opaquely as big-endian bytes.
    Raw(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BmpStatTlv {
    pub stat_type: u16,
    pub stat_value: BmpStatValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BmpInitiationMessage {
    pub header: BmpHeader,
    pub information_tlvs: Vec<BmpInfoTlv>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BmpTerminationMessage {
    pub header: BmpHeader,
    pub information_tlvs: Vec<BmpInfoTlv>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BmpRouteMonitoringMessage {
    pub header: BmpHeader,
    pub per_peer_header: BmpPerPeerHeader,
    /// The raw BGP UPDATE PDU, handed to the BGP decoder unchanged.
    pub bgp_update: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BmpStatisticsReportMessage {
    pub header: BmpHeader,
    pub per_peer_header: BmpPerPeerHeader,
    pub stats_tlvs: Vec<BmpStatTlv>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BmpPeerDownMessage {
    pub header: BmpHeader,
    pub per_peer_header: BmpPerPeerHeader,
    pub reason: BmpPeerDownReason,
    /// Reason-dependent payload, e.g. an embedded BGP NOTIFICATION for
    /// reasons 1 and 3. Retained opaquely.
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BmpPeerUpMessage {
    pub header: BmpHeader,
    pub per_peer_header: BmpPerPeerHeader,
    pub local_address: IpAddr,
    pub local_port: u16,
    pub remote_port: u16,
    /// The OPEN PDU sent by the monitored router, retained opaquely.
    pub sent_open_message: Vec<u8>,
    /// The OPEN PDU received from the monitored peer, retained opaquely.
    pub received_open_message: Vec<u8>,
    pub information_tlvs: Vec<BmpInfoTlv>,
}

/// A fully decoded BMP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BmpMessage {
    Initiation(BmpInitiationMessage),
    Termination(BmpTerminationMessage),
    RouteMonitoring(BmpRouteMonitoringMessage),
    StatisticsReport(BmpStatisticsReportMessage),
    PeerDown(BmpPeerDownMessage),
    PeerUp(BmpPeerUpMessage),
}

impl BmpMessage {
    pub fn header(&self) -> &BmpHeader {
        match self {
            BmpMessage::Initiation(m) => &m.header,
            BmpMessage::Termination(m) => &m.header,
            BmpMessage::RouteMonitoring(m) => &m.header,
            BmpMessage::StatisticsReport(m) => &m.header,
            BmpMessage::PeerDown(m) => &m.header,
            BmpMessage::PeerUp(m) => &m.header,
        }
    }
}

/// Failure decoding a BMP message.
#[derive(Debug, Error)]
pub enum BmpParseError {
    #[error("message too short: expected {expected} bytes, got {got}")]
    Incomplete { expected: usize, got: usize },
    #[error("invalid BMP version: expected {BMP_VERSION}, got {0}")]
    InvalidVersion(u8),
    #[error("invalid message length {0}: below the {BMP_HEADER_SIZE}-byte header minimum")]
    InvalidLength(u32),
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),
    #[error("invalid peer type {0}")]
    InvalidPeerType(u8),
    #[error("invalid peer down reason {0}")]
    InvalidPeerDownReason(u8),
    #[error("{context}: {source}")]
    Truncated {
        context: &'static str,
        source: OutOfBounds,
    },
    #[error("{context} at offset {offset} overruns the message")]
    Overrun {
        context: &'static str,
        offset: usize,
    },
}

impl BmpParseError {
    pub(crate) fn truncated(context: &'static str) -> impl FnOnce(OutOfBounds) -> BmpParseError {
        move |source| BmpParseError::Truncated { context, source }
    }
}
