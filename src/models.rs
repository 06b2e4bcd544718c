//! In-memory records shared by the session pipeline and the persistence
//! layer: route updates, BMP peer rows and peer events.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::protocol::bgp::{EvpnRoute, NlriEntry, AFI_IPV4, AFI_IPV6, AFI_L2VPN};
use crate::protocol::bmp::BmpPerPeerHeader;

/// Route family stored with every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteFamily {
    Ipv4Unicast,
    Ipv6Unicast,
    Evpn,
    Unknown,
}

impl RouteFamily {
    /// Derive the family from the AFI carried by the UPDATE. Anything
    /// outside the three supported families is recorded as unknown.
    pub fn from_afi(afi: Option<u16>) -> Self {
        match afi {
            Some(AFI_IPV4) => RouteFamily::Ipv4Unicast,
            Some(AFI_IPV6) => RouteFamily::Ipv6Unicast,
            Some(AFI_L2VPN) => RouteFamily::Evpn,
            _ => RouteFamily::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteFamily::Ipv4Unicast => "ipv4_unicast",
            RouteFamily::Ipv6Unicast => "ipv6_unicast",
            RouteFamily::Evpn => "evpn",
            RouteFamily::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RouteFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One route advertisement or withdrawal, as handed to the batch writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteUpdate {
    pub time: DateTime<Utc>,
    pub bmp_peer_ip: IpAddr,
    pub bmp_peer_asn: Option<u32>,
    pub bgp_peer_ip: IpAddr,
    pub bgp_peer_asn: Option<u32>,

    pub family: RouteFamily,
    /// Nullable: EVPN MAC-only routes carry no prefix.
    pub prefix: Option<IpNet>,
    pub next_hop: Option<IpAddr>,
    pub as_path: Option<Vec<u32>>,
    pub communities: Option<Vec<String>>,
    pub extended_communities: Option<Vec<String>>,
    pub med: Option<u32>,
    pub local_pref: Option<u32>,
    pub is_withdrawn: bool,

    pub evpn_route_type: Option<u8>,
    pub evpn_rd: Option<String>,
    pub evpn_esi: Option<String>,
    pub mac_address: Option<String>,
}

/// Project one NLRI entry onto the record's nullable `prefix` column.
///
/// IP entries keep their prefix. EVPN entries become a host prefix when the
/// route carries an IP (/32 or /128), and null for MAC-only routes.
pub fn prefix_for_entry(entry: &NlriEntry) -> Option<IpNet> {
    match entry {
        NlriEntry::Prefix(net) => Some(*net),
        NlriEntry::Evpn(EvpnRoute { ip_address, .. }) => ip_address.map(IpNet::from),
    }
}

impl RouteUpdate {
    /// Build the announcement record for one NLRI entry of a parsed UPDATE.
    pub fn announcement(
        time: DateTime<Utc>,
        bmp_peer_ip: IpAddr,
        per_peer: &BmpPerPeerHeader,
        update: &crate::protocol::bgp::ParsedBgpUpdate,
        entry: &NlriEntry,
    ) -> Self {
        let family = RouteFamily::from_afi(update.afi);
        RouteUpdate {
            time,
            bmp_peer_ip,
            bmp_peer_asn: None,
            bgp_peer_ip: per_peer.peer_address,
            bgp_peer_asn: Some(per_peer.peer_asn),
            family,
            prefix: prefix_for_entry(entry),
            next_hop: update.next_hop,
            as_path: update.as_path.clone(),
            communities: update.communities.clone(),
            extended_communities: update.extended_communities.clone(),
            med: update.med,
            local_pref: update.local_pref,
            is_withdrawn: false,
            evpn_route_type: update.evpn_route_type,
            evpn_rd: update.evpn_rd.clone(),
            evpn_esi: update.evpn_esi.clone(),
            mac_address: update.mac_address.clone(),
        }
    }

    /// Build the withdrawal record for one NLRI entry of a parsed UPDATE.
    /// Withdrawals carry the route identity but no attributes.
    pub fn withdrawal(
        time: DateTime<Utc>,
        bmp_peer_ip: IpAddr,
        per_peer: &BmpPerPeerHeader,
        update: &crate::protocol::bgp::ParsedBgpUpdate,
        entry: &NlriEntry,
    ) -> Self {
        let family = RouteFamily::from_afi(update.afi);
        // EVPN withdrawals still need the key fields of the withdrawn route.
        let (evpn_route_type, evpn_rd, evpn_esi, mac_address) = match entry {
            NlriEntry::Evpn(route) => (
                Some(route.route_type),
                route.rd.clone(),
                route.esi.clone(),
                route.mac_address.clone(),
            ),
            NlriEntry::Prefix(_) => (None, None, None, None),
        };

        RouteUpdate {
            time,
            bmp_peer_ip,
            bmp_peer_asn: None,
            bgp_peer_ip: per_peer.peer_address,
            bgp_peer_asn: Some(per_peer.peer_asn),
            family,
            prefix: prefix_for_entry(entry),
            next_hop: None,
            as_path: None,
            communities: None,
            extended_communities: None,
            med: None,
            local_pref: None,
            is_withdrawn: true,
            evpn_route_type,
            evpn_rd,
            evpn_esi,
            mac_address,
        }
    }
}

/// One observed BMP peer (the router sending us BMP).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BmpPeer {
    pub peer_ip: IpAddr,
    pub router_id: Option<IpAddr>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerEventType {
    PeerUp,
    PeerDown,
}

impl PeerEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerEventType::PeerUp => "peer_up",
            PeerEventType::PeerDown => "peer_down",
        }
    }
}

/// Append-only peer up/down event row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEvent {
    pub time: DateTime<Utc>,
    pub peer_ip: IpAddr,
    pub event_type: PeerEventType,
    /// Reason code for peer-down events.
    pub reason_code: Option<u8>,
}
