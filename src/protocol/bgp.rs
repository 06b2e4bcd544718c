//! BGP protocol definitions per RFC 4271, RFC 4760 and RFC 7432.

use std::net::IpAddr;

use ipnet::IpNet;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

use crate::protocol::binary::OutOfBounds;

/// BGP message header size (16-byte marker + length + type).
pub const BGP_HEADER_SIZE: usize = 19;
/// The marker field is all ones.
pub const BGP_MARKER: [u8; 16] = [0xff; 16];

/// Path attribute flag bits.
pub const ATTR_FLAG_OPTIONAL: u8 = 0x80;
pub const ATTR_FLAG_TRANSITIVE: u8 = 0x40;
pub const ATTR_FLAG_PARTIAL: u8 = 0x20;
pub const ATTR_FLAG_EXTENDED_LENGTH: u8 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum BgpMessageType {
    Open = 1,
    Update = 2,
    Notification = 3,
    KeepAlive = 4,
}

/// Path attribute type codes. Kept as plain constants because unknown codes
/// must be carried through the attribute walk, not rejected.
pub mod attr_type {
    pub const ORIGIN: u8 = 1;
    pub const AS_PATH: u8 = 2;
    pub const NEXT_HOP: u8 = 3;
    pub const MULTI_EXIT_DISC: u8 = 4;
    pub const LOCAL_PREF: u8 = 5;
    pub const ATOMIC_AGGREGATE: u8 = 6;
    pub const AGGREGATOR: u8 = 7;
    pub const COMMUNITIES: u8 = 8;
    pub const MP_REACH_NLRI: u8 = 14;
    pub const MP_UNREACH_NLRI: u8 = 15;
    pub const EXTENDED_COMMUNITIES: u8 = 16;
    pub const AS4_PATH: u8 = 17;
    pub const AS4_AGGREGATOR: u8 = 18;
}

/// AS_PATH segment types.
pub const AS_PATH_SEGMENT_SET: u8 = 1;
pub const AS_PATH_SEGMENT_SEQUENCE: u8 = 2;

/// Address Family Identifiers of interest (RFC 4760).
pub const AFI_IPV4: u16 = 1;
pub const AFI_IPV6: u16 = 2;
pub const AFI_L2VPN: u16 = 25;

/// Subsequent Address Family Identifiers of interest.
pub const SAFI_UNICAST: u8 = 1;
pub const SAFI_EVPN: u8 = 70;

/// EVPN route types per RFC 7432 Section 7.
pub const EVPN_ROUTE_TYPE_MAC_IP_ADVERTISEMENT: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum BgpOrigin {
    Igp = 0,
    Egp = 1,
    Incomplete = 2,
}

/// An EVPN route extracted from L2VPN/EVPN NLRI.
///
/// Only Type 2 (MAC/IP Advertisement) carries decoded fields; other route
/// types are accepted structurally with just the type recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvpnRoute {
    pub route_type: u8,
    pub rd: Option<String>,
    pub esi: Option<String>,
    pub mac_address: Option<String>,
    pub ip_address: Option<IpAddr>,
}

impl EvpnRoute {
    pub(crate) fn opaque(route_type: u8) -> Self {
        EvpnRoute {
            route_type,
            rd: None,
            esi: None,
            mac_address: None,
            ip_address: None,
        }
    }
}

/// One NLRI entry: either an IP prefix or an EVPN route descriptor.
///
/// The decoder returns this sum as-is; projecting an entry onto the flat
/// `(prefix, evpn_*)` record columns happens in the route model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NlriEntry {
    Prefix(IpNet),
    Evpn(EvpnRoute),
}

/// A parsed BGP UPDATE with extracted route information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedBgpUpdate {
    pub afi: Option<u16>,
    pub safi: Option<u8>,
    pub prefixes: Vec<NlriEntry>,
    pub withdrawn_prefixes: Vec<NlriEntry>,
    /// True iff prefixes were withdrawn and nothing was announced.
    pub is_withdrawal: bool,

    pub origin: Option<BgpOrigin>,
    pub as_path: Option<Vec<u32>>,
    pub next_hop: Option<IpAddr>,
    pub med: Option<u32>,
    pub local_pref: Option<u32>,
    pub communities: Option<Vec<String>>,
    pub extended_communities: Option<Vec<String>>,

    pub evpn_route_type: Option<u8>,
    pub evpn_rd: Option<String>,
    pub evpn_esi: Option<String>,
    pub mac_address: Option<String>,
}

/// Failure decoding a BGP PDU.
#[derive(Debug, Error)]
pub enum BgpParseError {
    #[error("message too short: need {needed} bytes, got {got}")]
    Incomplete { needed: usize, got: usize },
    #[error("invalid BGP marker")]
    InvalidMarker,
    #[error("invalid BGP message type {0}")]
    InvalidMessageType(u8),
    #[error("expected UPDATE message, got type {0}")]
    NotAnUpdate(u8),
    #[error("{context} exceeds message bounds")]
    Overrun { context: &'static str },
    #[error("invalid IPv4 prefix length {0}")]
    InvalidIpv4PrefixLength(u8),
    #[error("invalid IPv6 prefix length {0}")]
    InvalidIpv6PrefixLength(u8),
    #[error("invalid {what} length (must be a multiple of {multiple})")]
    InvalidAttributeLength { what: &'static str, multiple: usize },
    #[error("EVPN NLRI truncated: need {needed} bytes")]
    EvpnTruncated { needed: usize },
    #[error("{context}: {source}")]
    Truncated {
        context: &'static str,
        source: OutOfBounds,
    },
}

impl BgpParseError {
    pub(crate) fn truncated(context: &'static str) -> impl FnOnce(OutOfBounds) -> BgpParseError {
        move |source| BgpParseError::Truncated { context, source }
    }
}
