//! BGP UPDATE decoding per RFC 4271, with the RFC 4760 multiprotocol
//! extensions and RFC 7432 EVPN Type 2 NLRI.
//!
//! Only UPDATE PDUs are decoded in depth; OPEN and NOTIFICATION bodies are
//! carried opaquely by the BMP layer.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::{IpNet, Ipv4Net, Ipv6Net};

use crate::protocol::binary::{read_bytes, read_u16, read_u32, read_u8};
use crate::protocol::bgp::{
    attr_type, BgpMessageType, BgpOrigin, BgpParseError, EvpnRoute, NlriEntry, ParsedBgpUpdate,
    AFI_IPV4, AFI_IPV6, AFI_L2VPN, ATTR_FLAG_EXTENDED_LENGTH, BGP_HEADER_SIZE, BGP_MARKER,
    EVPN_ROUTE_TYPE_MAC_IP_ADVERTISEMENT, SAFI_EVPN, SAFI_UNICAST,
};

#[derive(Debug, Clone, Copy)]
struct BgpHeader {
    length: u16,
    msg_type: BgpMessageType,
}

/// One path attribute as framed on the wire. The value borrows from the
/// enclosing UPDATE; attributes only live for the duration of the walk.
#[derive(Debug)]
struct PathAttribute<'a> {
    type_code: u8,
    value: &'a [u8],
}

fn parse_bgp_header(data: &[u8]) -> Result<BgpHeader, BgpParseError> {
    if data.len() < BGP_HEADER_SIZE {
        return Err(BgpParseError::Incomplete {
            needed: BGP_HEADER_SIZE,
            got: data.len(),
        });
    }

    if data[..16] != BGP_MARKER {
        return Err(BgpParseError::InvalidMarker);
    }

    let length = read_u16(data, 16).map_err(BgpParseError::truncated("BGP header"))?;
    let raw_type = read_u8(data, 18).map_err(BgpParseError::truncated("BGP header"))?;
    let msg_type = BgpMessageType::try_from(raw_type)
        .map_err(|_| BgpParseError::InvalidMessageType(raw_type))?;

    Ok(BgpHeader { length, msg_type })
}

/// Parse an IPv4 prefix in NLRI encoding (1-byte length, then
/// `ceil(length/8)` prefix bytes zero-padded to 4). Returns the prefix and
/// the number of bytes consumed.
pub fn parse_ipv4_prefix(data: &[u8], offset: usize) -> Result<(Ipv4Net, usize), BgpParseError> {
    let prefix_len = read_u8(data, offset).map_err(BgpParseError::truncated("IPv4 prefix"))?;
    if prefix_len > 32 {
        return Err(BgpParseError::InvalidIpv4PrefixLength(prefix_len));
    }

    let prefix_bytes = (prefix_len as usize + 7) / 8;
    let raw = read_bytes(data, offset + 1, prefix_bytes)
        .map_err(BgpParseError::truncated("IPv4 prefix"))?;

    let mut octets = [0u8; 4];
    octets[..prefix_bytes].copy_from_slice(raw);

    let net = Ipv4Net::new(Ipv4Addr::from(octets), prefix_len)
        .map_err(|_| BgpParseError::InvalidIpv4PrefixLength(prefix_len))?;
    Ok((net, 1 + prefix_bytes))
}

/// Parse an IPv6 prefix in NLRI encoding (length ≤ 128, zero-padded to 16
/// bytes). Returns the prefix and the number of bytes consumed.
pub fn parse_ipv6_prefix(data: &[u8], offset: usize) -> Result<(Ipv6Net, usize), BgpParseError> {
    let prefix_len = read_u8(data, offset).map_err(BgpParseError::truncated("IPv6 prefix"))?;
    if prefix_len > 128 {
        return Err(BgpParseError::InvalidIpv6PrefixLength(prefix_len));
    }

    let prefix_bytes = (prefix_len as usize + 7) / 8;
    let raw = read_bytes(data, offset + 1, prefix_bytes)
        .map_err(BgpParseError::truncated("IPv6 prefix"))?;

    let mut octets = [0u8; 16];
    octets[..prefix_bytes].copy_from_slice(raw);

    let net = Ipv6Net::new(Ipv6Addr::from(octets), prefix_len)
        .map_err(|_| BgpParseError::InvalidIpv6PrefixLength(prefix_len))?;
    Ok((net, 1 + prefix_bytes))
}

/// Parse an AS_PATH attribute value into a flat, ordered ASN list. Both
/// AS_SEQUENCE and AS_SET segments contribute their members in order.
///
/// The ASN width is not signalled redundantly in every UPDATE, so it is
/// inferred per segment: divide the bytes remaining after the segment header
/// by the member count and pick 4 bytes when the division yields 4, 2 when
/// it yields 2, and otherwise default to the modern 4-byte width when the
/// remaining data would fit it. BMP does not always surface the OPEN
/// capability negotiation, so the wire may carry either width.
pub fn parse_as_path(value: &[u8]) -> Result<Vec<u32>, BgpParseError> {
    let mut as_path = Vec::new();
    let mut offset = 0;

    while offset < value.len() {
        if offset + 2 > value.len() {
            return Err(BgpParseError::Overrun {
                context: "AS_PATH segment header",
            });
        }

        let _segment_type = read_u8(value, offset).map_err(BgpParseError::truncated("AS_PATH"))?;
        let segment_count =
            read_u8(value, offset + 1).map_err(BgpParseError::truncated("AS_PATH"))? as usize;
        offset += 2;

        let remaining = value.len() - offset;
        let as_size = if segment_count > 0 {
            match remaining / segment_count {
                4 => 4,
                2 => 2,
                _ => {
                    if remaining >= segment_count * 4 {
                        4
                    } else {
                        2
                    }
                }
            }
        } else {
            4
        };

        if offset + segment_count * as_size > value.len() {
            return Err(BgpParseError::Overrun {
                context: "AS_PATH segment data",
            });
        }

        for _ in 0..segment_count {
            let asn = if as_size == 4 {
                read_u32(value, offset).map_err(BgpParseError::truncated("AS_PATH"))?
            } else {
                read_u16(value, offset).map_err(BgpParseError::truncated("AS_PATH"))? as u32
            };
            as_path.push(asn);
            offset += as_size;
        }
    }

    Ok(as_path)
}

/// Parse a COMMUNITIES attribute into `"asn:value"` strings.
pub fn parse_communities(value: &[u8]) -> Result<Vec<String>, BgpParseError> {
    if value.len() % 4 != 0 {
        return Err(BgpParseError::InvalidAttributeLength {
            what: "COMMUNITIES",
            multiple: 4,
        });
    }

    let mut communities = Vec::with_capacity(value.len() / 4);
    let mut offset = 0;
    while offset < value.len() {
        let asn = read_u16(value, offset).map_err(BgpParseError::truncated("COMMUNITIES"))?;
        let comm = read_u16(value, offset + 2).map_err(BgpParseError::truncated("COMMUNITIES"))?;
        communities.push(format!("{asn}:{comm}"));
        offset += 4;
    }

    Ok(communities)
}

/// Parse an EXTENDED_COMMUNITIES attribute (RFC 4360) into labelled strings.
///
/// The (type, subtype) dispatch is order-sensitive: OSPF Domain ID
/// (0x03/0x0c) and IPv4 Route Origin (0x03/0x00) must match before the
/// generic 0x03 opaque rule, and unrecognised communities fall through to
/// `"Unknown-XX:hex"` instead of being dropped.
pub fn parse_extended_communities(value: &[u8]) -> Result<Vec<String>, BgpParseError> {
    if value.len() % 8 != 0 {
        return Err(BgpParseError::InvalidAttributeLength {
            what: "EXTENDED_COMMUNITIES",
            multiple: 8,
        });
    }

    let truncated = || BgpParseError::truncated("EXTENDED_COMMUNITIES");

    let mut communities = Vec::with_capacity(value.len() / 8);
    let mut offset = 0;

    while offset < value.len() {
        let ext_type = read_u8(value, offset).map_err(truncated())?;
        let ext_subtype = read_u8(value, offset + 1).map_err(truncated())?;

        let rendered = match (ext_type, ext_subtype) {
            // OSPF Domain ID; the domain is the last 4 of the 6 value bytes.
            (0x03, 0x0c) => {
                let raw = read_bytes(value, offset + 4, 4).map_err(truncated())?;
                let domain: [u8; 4] = raw.try_into().unwrap();
                format!("OSPF-Domain:{}", Ipv4Addr::from(domain))
            }
            // Two-octet AS specific route target / route origin.
            (0x00, 0x02) => {
                let asn = read_u16(value, offset + 2).map_err(truncated())?;
                let assigned = read_u32(value, offset + 4).map_err(truncated())?;
                format!("RT:{asn}:{assigned}")
            }
            (0x02, 0x00) => {
                let asn = read_u16(value, offset + 2).map_err(truncated())?;
                let assigned = read_u32(value, offset + 4).map_err(truncated())?;
                format!("RO:{asn}:{assigned}")
            }
            // IPv4 address specific route target / route origin.
            (0x01, 0x02) => {
                let raw = read_bytes(value, offset + 2, 4).map_err(truncated())?;
                let ip: [u8; 4] = raw.try_into().unwrap();
                let assigned = read_u16(value, offset + 6).map_err(truncated())?;
                format!("RT:{}:{assigned}", Ipv4Addr::from(ip))
            }
            (0x03, 0x00) => {
                let raw = read_bytes(value, offset + 2, 4).map_err(truncated())?;
                let ip: [u8; 4] = raw.try_into().unwrap();
                let assigned = read_u16(value, offset + 6).map_err(truncated())?;
                format!("RO:{}:{assigned}", Ipv4Addr::from(ip))
            }
            // Four-octet AS specific route target / route origin.
            (0x02, 0x02) => {
                let asn = read_u32(value, offset + 2).map_err(truncated())?;
                let assigned = read_u16(value, offset + 6).map_err(truncated())?;
                format!("RT:{asn}:{assigned}")
            }
            (0x0a, 0x02) => {
                let asn = read_u32(value, offset + 2).map_err(truncated())?;
                let assigned = read_u16(value, offset + 6).map_err(truncated())?;
                format!("RO:{asn}:{assigned}")
            }
            // Opaque extended community; subtypes above already matched.
            (0x03, _) => {
                let raw = read_bytes(value, offset + 2, 6).map_err(truncated())?;
                format!("Opaque:{}", hex::encode(raw))
            }
            // EVPN extended communities (RFC 7432 Section 7.7 ff.).
            (0x06, 0x00) => {
                // MAC Mobility: flags (1 byte), then the sequence number.
                let seq = read_u32(value, offset + 3).map_err(truncated())?;
                format!("EVPN-MAC-Mobility:{seq}")
            }
            (0x06, 0x01) => {
                // ESI Label: flags (1), reserved (2), 20-bit label (3).
                let raw = read_bytes(value, offset + 5, 3).map_err(truncated())?;
                let label =
                    ((raw[0] as u32) << 12) | ((raw[1] as u32) << 4) | ((raw[2] as u32) >> 4);
                format!("EVPN-ESI-Label:{label}")
            }
            (0x06, 0x02) => {
                // ES-Import route target carries a MAC address.
                let raw = read_bytes(value, offset + 2, 6).map_err(truncated())?;
                format!("EVPN-ES-Import:{}", format_mac(raw))
            }
            (0x06, sub) => {
                let raw = read_bytes(value, offset + 2, 6).map_err(truncated())?;
                format!("EVPN-{sub:02x}:{}", hex::encode(raw))
            }
            // Flow-spec redirect.
            (0x08, _) => {
                let asn = read_u16(value, offset + 2).map_err(truncated())?;
                let assigned = read_u32(value, offset + 4).map_err(truncated())?;
                format!("Redirect:{asn}:{assigned}")
            }
            _ => {
                let raw = read_bytes(value, offset, 8).map_err(truncated())?;
                format!("Unknown-{ext_type:02x}:{}", hex::encode(raw))
            }
        };

        communities.push(rendered);
        offset += 8;
    }

    Ok(communities)
}

fn format_mac(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Parse an 8-byte Route Distinguisher (RFC 4364) into its string form.
pub fn parse_route_distinguisher(value: &[u8], offset: usize) -> Result<String, BgpParseError> {
    let truncated = || BgpParseError::truncated("route distinguisher");

    let rd_type = read_u16(value, offset).map_err(truncated())?;
    match rd_type {
        0 => {
            // Type 0: 2-byte administrator, 4-byte assigned number.
            let admin = read_u16(value, offset + 2).map_err(truncated())?;
            let assigned = read_u32(value, offset + 4).map_err(truncated())?;
            Ok(format!("{admin}:{assigned}"))
        }
        1 => {
            // Type 1: 4-byte IPv4 administrator, 2-byte assigned number.
            let raw = read_bytes(value, offset + 2, 4).map_err(truncated())?;
            let ip: [u8; 4] = raw.try_into().unwrap();
            let assigned = read_u16(value, offset + 6).map_err(truncated())?;
            Ok(format!("{}:{assigned}", Ipv4Addr::from(ip)))
        }
        2 => {
            // Type 2: 4-byte administrator, 2-byte assigned number.
            let admin = read_u32(value, offset + 2).map_err(truncated())?;
            let assigned = read_u16(value, offset + 6).map_err(truncated())?;
            Ok(format!("{admin}:{assigned}"))
        }
        _ => {
            let raw = read_bytes(value, offset, 8).map_err(truncated())?;
            Ok(hex::encode(raw))
        }
    }
}

/// Parse a 10-byte Ethernet Segment Identifier (RFC 7432) as
/// colon-separated hex.
pub fn parse_ethernet_segment_id(value: &[u8], offset: usize) -> Result<String, BgpParseError> {
    let raw = read_bytes(value, offset, 10)
        .map_err(BgpParseError::truncated("ethernet segment identifier"))?;
    Ok(format_mac(raw))
}

/// Parse one EVPN NLRI entry (RFC 7432 Section 7) starting at `offset`.
///
/// Only Type 2 (MAC/IP Advertisement) is decoded in detail; other route
/// types are consumed structurally with just the type recorded. Returns the
/// route (None when fewer than 2 bytes remain) and the bytes consumed.
pub fn parse_evpn_nlri(
    value: &[u8],
    offset: usize,
) -> Result<(Option<EvpnRoute>, usize), BgpParseError> {
    if value.len() < offset + 2 {
        return Ok((None, 0));
    }

    let route_type = read_u8(value, offset).map_err(BgpParseError::truncated("EVPN NLRI"))?;
    let length = read_u8(value, offset + 1).map_err(BgpParseError::truncated("EVPN NLRI"))? as usize;

    if value.len() < offset + 2 + length {
        return Err(BgpParseError::EvpnTruncated { needed: length });
    }

    if route_type != EVPN_ROUTE_TYPE_MAC_IP_ADVERTISEMENT {
        return Ok((Some(EvpnRoute::opaque(route_type)), 2 + length));
    }

    // Type 2 minimum: RD (8) + ESI (10) + ethernet tag (4) + MAC length (1)
    // + MAC (6) + IP length (1) + label (3).
    if length < 33 {
        return Err(BgpParseError::EvpnTruncated { needed: 33 });
    }

    let mut pos = offset + 2;

    let rd = parse_route_distinguisher(value, pos)?;
    pos += 8;

    let esi = parse_ethernet_segment_id(value, pos)?;
    pos += 10;

    // Ethernet tag ID, unused here.
    pos += 4;

    let mac_len = read_u8(value, pos).map_err(BgpParseError::truncated("EVPN MAC length"))?;
    pos += 1;

    let mut mac_address = None;
    if mac_len == 48 && value.len() >= pos + 6 {
        let raw = read_bytes(value, pos, 6).map_err(BgpParseError::truncated("EVPN MAC"))?;
        mac_address = Some(format_mac(raw));
        pos += 6;
    }

    let ip_len = read_u8(value, pos).map_err(BgpParseError::truncated("EVPN IP length"))?;
    pos += 1;

    let ip_address = match ip_len {
        32 if value.len() >= pos + 4 => {
            let raw = read_bytes(value, pos, 4).map_err(BgpParseError::truncated("EVPN IP"))?;
            let octets: [u8; 4] = raw.try_into().unwrap();
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        128 if value.len() >= pos + 16 => {
            let raw = read_bytes(value, pos, 16).map_err(BgpParseError::truncated("EVPN IP"))?;
            let octets: [u8; 16] = raw.try_into().unwrap();
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    };

    // Trailing MPLS labels are covered by `length` but not decoded.

    Ok((
        Some(EvpnRoute {
            route_type,
            rd: Some(rd),
            esi: Some(esi),
            mac_address,
            ip_address,
        }),
        2 + length,
    ))
}

fn parse_family_nlri(
    value: &[u8],
    mut offset: usize,
    afi: u16,
    safi: u8,
) -> Result<Vec<NlriEntry>, BgpParseError> {
    let mut entries = Vec::new();

    match (afi, safi) {
        (AFI_IPV4, SAFI_UNICAST) => {
            while offset < value.len() {
                let (net, consumed) = parse_ipv4_prefix(value, offset)?;
                entries.push(NlriEntry::Prefix(IpNet::V4(net)));
                offset += consumed;
            }
        }
        (AFI_IPV6, SAFI_UNICAST) => {
            while offset < value.len() {
                let (net, consumed) = parse_ipv6_prefix(value, offset)?;
                entries.push(NlriEntry::Prefix(IpNet::V6(net)));
                offset += consumed;
            }
        }
        (AFI_L2VPN, SAFI_EVPN) => {
            while offset < value.len() {
                let (route, consumed) = parse_evpn_nlri(value, offset)?;
                if let Some(route) = route {
                    entries.push(NlriEntry::Evpn(route));
                }
                if consumed == 0 {
                    break;
                }
                offset += consumed;
            }
        }
        // Unhandled families are recorded by AFI/SAFI only.
        _ => {}
    }

    Ok(entries)
}

/// Parse an MP_REACH_NLRI attribute (RFC 4760).
pub fn parse_mp_reach_nlri(
    value: &[u8],
) -> Result<(u16, u8, Option<IpAddr>, Vec<NlriEntry>), BgpParseError> {
    if value.len() < 5 {
        return Err(BgpParseError::Incomplete {
            needed: 5,
            got: value.len(),
        });
    }

    let truncated = || BgpParseError::truncated("MP_REACH_NLRI");

    let afi = read_u16(value, 0).map_err(truncated())?;
    let safi = read_u8(value, 2).map_err(truncated())?;
    let next_hop_len = read_u8(value, 3).map_err(truncated())? as usize;

    if value.len() < 4 + next_hop_len + 1 {
        return Err(BgpParseError::Overrun {
            context: "MP_REACH_NLRI next hop",
        });
    }

    let next_hop_data = read_bytes(value, 4, next_hop_len).map_err(truncated())?;
    let next_hop = match afi {
        AFI_IPV4 if next_hop_len >= 4 => {
            let octets: [u8; 4] = next_hop_data[..4].try_into().unwrap();
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        AFI_IPV6 if next_hop_len >= 16 => {
            let octets: [u8; 16] = next_hop_data[..16].try_into().unwrap();
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        // L2VPN next hops may be either width.
        AFI_L2VPN if next_hop_len == 4 => {
            let octets: [u8; 4] = next_hop_data[..4].try_into().unwrap();
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        AFI_L2VPN if next_hop_len == 16 => {
            let octets: [u8; 16] = next_hop_data[..16].try_into().unwrap();
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    };

    // One reserved byte sits between the next hop and the NLRI.
    let nlri_offset = 4 + next_hop_len + 1;
    let prefixes = parse_family_nlri(value, nlri_offset, afi, safi)?;

    Ok((afi, safi, next_hop, prefixes))
}

/// Parse an MP_UNREACH_NLRI attribute (RFC 4760).
pub fn parse_mp_unreach_nlri(value: &[u8]) -> Result<(u16, u8, Vec<NlriEntry>), BgpParseError> {
    if value.len() < 3 {
        return Err(BgpParseError::Incomplete {
            needed: 3,
            got: value.len(),
        });
    }

    let afi = read_u16(value, 0).map_err(BgpParseError::truncated("MP_UNREACH_NLRI"))?;
    let safi = read_u8(value, 2).map_err(BgpParseError::truncated("MP_UNREACH_NLRI"))?;
    let withdrawn = parse_family_nlri(value, 3, afi, safi)?;

    Ok((afi, safi, withdrawn))
}

/// Walk the path attribute block. Individual attributes whose framed length
/// would overrun the block terminate the walk; everything parsed up to that
/// point is kept.
fn parse_path_attributes<'a>(data: &'a [u8], start: usize, end: usize) -> Vec<PathAttribute<'a>> {
    let mut attributes = Vec::new();
    let mut offset = start;

    while offset < end {
        if offset + 3 > end {
            break;
        }

        let flags = data[offset];
        let type_code = data[offset + 1];

        let (length, value_offset) = if flags & ATTR_FLAG_EXTENDED_LENGTH != 0 {
            if offset + 4 > end {
                break;
            }
            let len = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
            (len, offset + 4)
        } else {
            (data[offset + 2] as usize, offset + 3)
        };

        if value_offset + length > end {
            break;
        }

        attributes.push(PathAttribute {
            type_code,
            value: &data[value_offset..value_offset + length],
        });

        offset = value_offset + length;
    }

    attributes
}

/// Parse a complete BGP UPDATE PDU and extract the route information.
pub fn parse_bgp_update(data: &[u8]) -> Result<ParsedBgpUpdate, BgpParseError> {
    let header = parse_bgp_header(data)?;

    if header.msg_type != BgpMessageType::Update {
        return Err(BgpParseError::NotAnUpdate(header.msg_type.into()));
    }

    let msg_end = header.length as usize;
    if data.len() < msg_end {
        return Err(BgpParseError::Incomplete {
            needed: msg_end,
            got: data.len(),
        });
    }

    let mut offset = BGP_HEADER_SIZE;

    // Withdrawn routes section (IPv4 NLRI).
    if offset + 2 > msg_end {
        return Err(BgpParseError::Overrun {
            context: "withdrawn routes length",
        });
    }
    let withdrawn_len = read_u16(data, offset).map_err(BgpParseError::truncated("UPDATE"))? as usize;
    offset += 2;
    if offset + withdrawn_len > msg_end {
        return Err(BgpParseError::Overrun {
            context: "withdrawn routes",
        });
    }
    let withdrawn_section = &data[offset..offset + withdrawn_len];
    offset += withdrawn_len;

    // Path attributes section.
    if offset + 2 > msg_end {
        return Err(BgpParseError::Overrun {
            context: "path attribute length",
        });
    }
    let attrs_len = read_u16(data, offset).map_err(BgpParseError::truncated("UPDATE"))? as usize;
    offset += 2;
    let attrs_end = offset + attrs_len;
    if attrs_end > msg_end {
        return Err(BgpParseError::Overrun {
            context: "path attributes",
        });
    }
    let attributes = parse_path_attributes(data, offset, attrs_end);
    offset = attrs_end;

    let mut update = ParsedBgpUpdate::default();

    // Standard withdrawn routes are always IPv4 unicast.
    let mut pos = 0;
    while pos < withdrawn_section.len() {
        let (net, consumed) = parse_ipv4_prefix(withdrawn_section, pos)?;
        update.withdrawn_prefixes.push(NlriEntry::Prefix(IpNet::V4(net)));
        pos += consumed;
    }

    for attr in &attributes {
        // A malformed attribute is skipped; it never aborts the UPDATE.
        if let Err(err) = apply_path_attribute(&mut update, attr) {
            tracing::trace!(type_code = attr.type_code, error = %err, "skipping malformed path attribute");
        }
    }

    // Trailing NLRI carries IPv4 unicast announcements.
    if offset < msg_end {
        update.afi = Some(AFI_IPV4);
        update.safi = Some(SAFI_UNICAST);
        let nlri = &data[offset..msg_end];
        let mut pos = 0;
        while pos < nlri.len() {
            let (net, consumed) = parse_ipv4_prefix(nlri, pos)?;
            update.prefixes.push(NlriEntry::Prefix(IpNet::V4(net)));
            pos += consumed;
        }
    }

    // EVPN attributes come from the first EVPN route the UPDATE carries.
    let first_evpn = update
        .prefixes
        .iter()
        .chain(update.withdrawn_prefixes.iter())
        .find_map(|entry| match entry {
            NlriEntry::Evpn(route) => Some(route.clone()),
            NlriEntry::Prefix(_) => None,
        });
    if let Some(route) = first_evpn {
        update.evpn_route_type = Some(route.route_type);
        update.evpn_rd = route.rd;
        update.evpn_esi = route.esi;
        update.mac_address = route.mac_address;
    }

    // A withdrawal is a PDU that withdraws prefixes and announces nothing.
    update.is_withdrawal = !update.withdrawn_prefixes.is_empty() && update.prefixes.is_empty();

    Ok(update)
}

fn apply_path_attribute(
    update: &mut ParsedBgpUpdate,
    attr: &PathAttribute<'_>,
) -> Result<(), BgpParseError> {
    match attr.type_code {
        attr_type::ORIGIN => {
            let raw = read_u8(attr.value, 0).map_err(BgpParseError::truncated("ORIGIN"))?;
            update.origin = BgpOrigin::try_from(raw).ok();
        }
        attr_type::AS_PATH => {
            update.as_path = Some(parse_as_path(attr.value)?);
        }
        attr_type::NEXT_HOP => {
            let raw = read_bytes(attr.value, 0, 4).map_err(BgpParseError::truncated("NEXT_HOP"))?;
            let octets: [u8; 4] = raw.try_into().unwrap();
            update.next_hop = Some(IpAddr::V4(Ipv4Addr::from(octets)));
        }
        attr_type::MULTI_EXIT_DISC => {
            update.med =
                Some(read_u32(attr.value, 0).map_err(BgpParseError::truncated("MULTI_EXIT_DISC"))?);
        }
        attr_type::LOCAL_PREF => {
            update.local_pref =
                Some(read_u32(attr.value, 0).map_err(BgpParseError::truncated("LOCAL_PREF"))?);
        }
        attr_type::COMMUNITIES => {
            update.communities = Some(parse_communities(attr.value)?);
        }
        attr_type::EXTENDED_COMMUNITIES => {
            update.extended_communities = Some(parse_extended_communities(attr.value)?);
        }
        attr_type::MP_REACH_NLRI => {
            let (afi, safi, next_hop, prefixes) = parse_mp_reach_nlri(attr.value)?;
            update.afi = Some(afi);
            update.safi = Some(safi);
            if next_hop.is_some() {
                update.next_hop = next_hop;
            }
            update.prefixes.extend(prefixes);
        }
        attr_type::MP_UNREACH_NLRI => {
            let (afi, safi, withdrawn) = parse_mp_unreach_nlri(attr.value)?;
            update.afi = Some(afi);
            update.safi = Some(safi);
            update.withdrawn_prefixes.extend(withdrawn);
        }
        // Unhandled attribute types pass through untouched.
        _ => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attribute(type_code: u8, value: &[u8]) -> Vec<u8> {
        let mut buf = vec![0x40, type_code, value.len() as u8];
        buf.extend_from_slice(value);
        buf
    }

    fn extended_attribute(type_code: u8, value: &[u8]) -> Vec<u8> {
        let mut buf = vec![0x40 | ATTR_FLAG_EXTENDED_LENGTH, type_code];
        buf.extend_from_slice(&(value.len() as u16).to_be_bytes());
        buf.extend_from_slice(value);
        buf
    }

    fn update_pdu(withdrawn: &[u8], attrs: &[u8], nlri: &[u8]) -> Vec<u8> {
        let total = BGP_HEADER_SIZE + 2 + withdrawn.len() + 2 + attrs.len() + nlri.len();
        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&BGP_MARKER);
        buf.extend_from_slice(&(total as u16).to_be_bytes());
        buf.push(2); // UPDATE
        buf.extend_from_slice(&(withdrawn.len() as u16).to_be_bytes());
        buf.extend_from_slice(withdrawn);
        buf.extend_from_slice(&(attrs.len() as u16).to_be_bytes());
        buf.extend_from_slice(attrs);
        buf.extend_from_slice(nlri);
        buf
    }

    /// EVPN Type 2 route body: type-0 RD 65300:100, a ten-byte ESI,
    /// MAC aa:bb:cc:dd:ee:ff and optionally an IPv4 address.
    fn evpn_type2_nlri(with_ip: bool) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&0u16.to_be_bytes()); // RD type 0
        body.extend_from_slice(&65300u16.to_be_bytes());
        body.extend_from_slice(&100u32.to_be_bytes());
        body.extend_from_slice(&[
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99,
        ]); // ESI
        body.extend_from_slice(&[0, 0, 0, 0]); // ethernet tag
        body.push(48); // MAC length in bits
        body.extend_from_slice(&[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        if with_ip {
            body.push(32);
            body.extend_from_slice(&[192, 168, 1, 10]);
        } else {
            body.push(0);
        }
        body.extend_from_slice(&[0, 0, 0]); // MPLS label

        let mut nlri = vec![2, body.len() as u8];
        nlri.extend_from_slice(&body);
        nlri
    }

    #[test]
    fn parses_ipv4_slash_24() {
        let (net, consumed) = parse_ipv4_prefix(&[0x18, 0xc0, 0xa8, 0x01], 0).unwrap();
        assert_eq!(net.to_string(), "192.168.1.0/24");
        assert_eq!(consumed, 4);
    }

    #[test]
    fn parses_ipv4_default_route() {
        let (net, consumed) = parse_ipv4_prefix(&[0x00], 0).unwrap();
        assert_eq!(net.to_string(), "0.0.0.0/0");
        assert_eq!(consumed, 1);
    }

    #[test]
    fn parses_ipv4_host_route() {
        let (net, consumed) = parse_ipv4_prefix(&[32, 10, 1, 2, 3], 0).unwrap();
        assert_eq!(net.to_string(), "10.1.2.3/32");
        assert_eq!(consumed, 5);
    }

    #[test]
    fn rejects_ipv4_prefix_over_32() {
        assert!(matches!(
            parse_ipv4_prefix(&[33, 0, 0, 0, 0], 0),
            Err(BgpParseError::InvalidIpv4PrefixLength(33))
        ));
    }

    #[test]
    fn parses_ipv6_prefix() {
        let (net, consumed) =
            parse_ipv6_prefix(&[0x20, 0x20, 0x01, 0x0d, 0xb8], 0).unwrap();
        assert_eq!(net.to_string(), "2001:db8::/32");
        assert_eq!(consumed, 5);
    }

    #[test]
    fn rejects_ipv6_prefix_over_128() {
        assert!(matches!(
            parse_ipv6_prefix(&[129], 0),
            Err(BgpParseError::InvalidIpv6PrefixLength(129))
        ));
    }

    #[test]
    fn parses_four_byte_as_path() {
        let value = [
            0x02, 0x03, 0x00, 0x00, 0x0d, 0x1c, 0x00, 0x00, 0x3b, 0x41, 0x00, 0x00, 0x8e, 0x8c,
        ];
        assert_eq!(parse_as_path(&value).unwrap(), vec![3356, 15169, 36492]);
    }

    #[test]
    fn parses_two_byte_legacy_as_path() {
        let value = [0x02, 0x03, 0x00, 0x64, 0x00, 0xc8, 0x01, 0x2c];
        assert_eq!(parse_as_path(&value).unwrap(), vec![100, 200, 300]);
    }

    #[test]
    fn as_path_round_trips_both_widths() {
        let asns = [3356u32, 15169, 36492, 4200000000];
        let mut encoded = vec![AS_PATH_SEGMENT_SEQUENCE_BYTE, asns.len() as u8];
        for asn in asns {
            encoded.extend_from_slice(&asn.to_be_bytes());
        }
        assert_eq!(parse_as_path(&encoded).unwrap(), asns);

        let small = [100u16, 200, 300];
        let mut encoded = vec![AS_PATH_SEGMENT_SEQUENCE_BYTE, small.len() as u8];
        for asn in small {
            encoded.extend_from_slice(&asn.to_be_bytes());
        }
        assert_eq!(parse_as_path(&encoded).unwrap(), vec![100, 200, 300]);
    }

    const AS_PATH_SEGMENT_SEQUENCE_BYTE: u8 = 2;

    #[test]
    fn as_set_members_contribute_to_path() {
        // AS_SEQUENCE [100] then AS_SET {200, 300}, 2-byte width.
        let value = [0x02, 0x01, 0x00, 0x64, 0x01, 0x02, 0x00, 0xc8, 0x01, 0x2c];
        assert_eq!(parse_as_path(&value).unwrap(), vec![100, 200, 300]);
    }

    #[test]
    fn empty_as_path_is_empty() {
        assert_eq!(parse_as_path(&[]).unwrap(), Vec::<u32>::new());
    }

    #[test]
    fn parses_communities() {
        let value = [0xfd, 0xe8, 0x00, 0x64, 0xfd, 0xe8, 0x00, 0xc8];
        assert_eq!(
            parse_communities(&value).unwrap(),
            vec!["65000:100", "65000:200"]
        );
    }

    #[test]
    fn rejects_ragged_communities() {
        assert!(parse_communities(&[0, 1, 2]).is_err());
    }

    #[test]
    fn parses_rt_two_octet_as_extended_community() {
        let value = [0x00, 0x02, 0x00, 0x2a, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(parse_extended_communities(&value).unwrap(), vec!["RT:42:1"]);
    }

    #[test]
    fn ospf_domain_id_matches_before_generic_opaque() {
        let value = [0x03, 0x0c, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0a];
        assert_eq!(
            parse_extended_communities(&value).unwrap(),
            vec!["OSPF-Domain:0.0.0.10"]
        );
    }

    #[test]
    fn generic_opaque_still_matches_other_subtypes() {
        let value = [0x03, 0x05, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        assert_eq!(
            parse_extended_communities(&value).unwrap(),
            vec!["Opaque:010203040506"]
        );
    }

    #[test]
    fn parses_ipv4_route_target_and_origin() {
        let mut value = vec![0x01, 0x02, 10, 0, 0, 1, 0x00, 0x07];
        value.extend_from_slice(&[0x03, 0x00, 10, 0, 0, 2, 0x00, 0x08]);
        assert_eq!(
            parse_extended_communities(&value).unwrap(),
            vec!["RT:10.0.0.1:7", "RO:10.0.0.2:8"]
        );
    }

    #[test]
    fn parses_four_octet_as_route_target() {
        let mut value = Vec::new();
        value.extend_from_slice(&[0x02, 0x02]);
        value.extend_from_slice(&200000u32.to_be_bytes());
        value.extend_from_slice(&9u16.to_be_bytes());
        assert_eq!(
            parse_extended_communities(&value).unwrap(),
            vec!["RT:200000:9"]
        );
    }

    #[test]
    fn parses_evpn_extended_community_subtypes() {
        let mut value = Vec::new();
        // MAC mobility, sequence 7.
        value.extend_from_slice(&[0x06, 0x00, 0x00]);
        value.extend_from_slice(&7u32.to_be_bytes());
        value.push(0x00);
        // ES-Import with a MAC.
        value.extend_from_slice(&[0x06, 0x02, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);

        assert_eq!(
            parse_extended_communities(&value).unwrap(),
            vec!["EVPN-MAC-Mobility:7", "EVPN-ES-Import:aa:bb:cc:dd:ee:ff"]
        );
    }

    #[test]
    fn unknown_extended_community_is_surfaced_not_dropped() {
        let value = [0x99, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        assert_eq!(
            parse_extended_communities(&value).unwrap(),
            vec!["Unknown-99:9901020304050607"]
        );
    }

    #[test]
    fn parses_route_distinguisher_types() {
        // Type 0: 2-byte admin / 4-byte assigned.
        let mut rd = Vec::new();
        rd.extend_from_slice(&0u16.to_be_bytes());
        rd.extend_from_slice(&65300u16.to_be_bytes());
        rd.extend_from_slice(&100u32.to_be_bytes());
        assert_eq!(parse_route_distinguisher(&rd, 0).unwrap(), "65300:100");

        // Type 1: IPv4 admin / 2-byte assigned.
        let mut rd = Vec::new();
        rd.extend_from_slice(&1u16.to_be_bytes());
        rd.extend_from_slice(&[192, 0, 2, 1]);
        rd.extend_from_slice(&7u16.to_be_bytes());
        assert_eq!(parse_route_distinguisher(&rd, 0).unwrap(), "192.0.2.1:7");

        // Type 2: 4-byte admin / 2-byte assigned.
        let mut rd = Vec::new();
        rd.extend_from_slice(&2u16.to_be_bytes());
        rd.extend_from_slice(&200000u32.to_be_bytes());
        rd.extend_from_slice(&9u16.to_be_bytes());
        assert_eq!(parse_route_distinguisher(&rd, 0).unwrap(), "200000:9");

        // Unknown type renders as raw hex.
        let rd = [0x00, 0x09, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        assert_eq!(
            parse_route_distinguisher(&rd, 0).unwrap(),
            "0009010203040506"
        );
    }

    #[test]
    fn parses_evpn_type2_with_ip() {
        let nlri = evpn_type2_nlri(true);
        let (route, consumed) = parse_evpn_nlri(&nlri, 0).unwrap();
        let route = route.unwrap();
        assert_eq!(consumed, nlri.len());
        assert_eq!(route.route_type, 2);
        assert_eq!(route.rd.as_deref(), Some("65300:100"));
        assert_eq!(
            route.esi.as_deref(),
            Some("00:11:22:33:44:55:66:77:88:99")
        );
        assert_eq!(route.mac_address.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(
            route.ip_address,
            Some("192.168.1.10".parse::<IpAddr>().unwrap())
        );
    }

    #[test]
    fn parses_evpn_type2_mac_only() {
        let nlri = evpn_type2_nlri(false);
        let (route, _) = parse_evpn_nlri(&nlri, 0).unwrap();
        let route = route.unwrap();
        assert_eq!(route.mac_address.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(route.ip_address, None);
    }

    #[test]
    fn other_evpn_route_types_consumed_structurally() {
        // Type 3 (inclusive multicast), body skipped.
        let nlri = [3u8, 4, 0xde, 0xad, 0xbe, 0xef];
        let (route, consumed) = parse_evpn_nlri(&nlri, 0).unwrap();
        assert_eq!(consumed, 6);
        let route = route.unwrap();
        assert_eq!(route.route_type, 3);
        assert_eq!(route.rd, None);
    }

    #[test]
    fn rejects_truncated_evpn_body() {
        let nlri = [2u8, 40, 0x00, 0x00];
        assert!(matches!(
            parse_evpn_nlri(&nlri, 0),
            Err(BgpParseError::EvpnTruncated { .. })
        ));
    }

    #[test]
    fn parses_mp_reach_ipv6_unicast() {
        let mut value = Vec::new();
        value.extend_from_slice(&AFI_IPV6.to_be_bytes());
        value.push(SAFI_UNICAST);
        value.push(16); // next hop length
        let nh: Ipv6Addr = "2001:db8::1".parse().unwrap();
        value.extend_from_slice(&nh.octets());
        value.push(0); // reserved
        value.extend_from_slice(&[0x20, 0x20, 0x01, 0x0d, 0xb8]); // 2001:db8::/32

        let (afi, safi, next_hop, prefixes) = parse_mp_reach_nlri(&value).unwrap();
        assert_eq!(afi, AFI_IPV6);
        assert_eq!(safi, SAFI_UNICAST);
        assert_eq!(next_hop, Some(IpAddr::V6(nh)));
        assert_eq!(
            prefixes,
            vec![NlriEntry::Prefix("2001:db8::/32".parse().unwrap())]
        );
    }

    #[test]
    fn mp_reach_l2vpn_accepts_both_next_hop_widths() {
        for (nh_len, nh_bytes, expected) in [
            (4usize, vec![192, 0, 2, 254], "192.0.2.254".parse::<IpAddr>().unwrap()),
            (
                16,
                "2001:db8::fe".parse::<Ipv6Addr>().unwrap().octets().to_vec(),
                "2001:db8::fe".parse::<IpAddr>().unwrap(),
            ),
        ] {
            let mut value = Vec::new();
            value.extend_from_slice(&AFI_L2VPN.to_be_bytes());
            value.push(SAFI_EVPN);
            value.push(nh_len as u8);
            value.extend_from_slice(&nh_bytes);
            value.push(0);
            value.extend_from_slice(&evpn_type2_nlri(true));

            let (afi, safi, next_hop, prefixes) = parse_mp_reach_nlri(&value).unwrap();
            assert_eq!(afi, AFI_L2VPN);
            assert_eq!(safi, SAFI_EVPN);
            assert_eq!(next_hop, Some(expected));
            assert_eq!(prefixes.len(), 1);
        }
    }

    #[test]
    fn parses_mp_unreach_withdrawals() {
        let mut value = Vec::new();
        value.extend_from_slice(&AFI_IPV4.to_be_bytes());
        value.push(SAFI_UNICAST);
        value.extend_from_slice(&[0x18, 0x0a, 0x00, 0x00]); // 10.0.0.0/24

        let (afi, safi, withdrawn) = parse_mp_unreach_nlri(&value).unwrap();
        assert_eq!(afi, AFI_IPV4);
        assert_eq!(safi, SAFI_UNICAST);
        assert_eq!(
            withdrawn,
            vec![NlriEntry::Prefix("10.0.0.0/24".parse().unwrap())]
        );
    }

    #[test]
    fn parses_plain_ipv4_announcement() {
        let mut attrs = Vec::new();
        attrs.extend_from_slice(&attribute(attr_type::ORIGIN, &[0]));
        attrs.extend_from_slice(&attribute(
            attr_type::AS_PATH,
            &[0x02, 0x02, 0x00, 0x00, 0x0d, 0x1c, 0x00, 0x00, 0x3b, 0x41],
        ));
        attrs.extend_from_slice(&attribute(attr_type::NEXT_HOP, &[10, 0, 0, 1]));
        attrs.extend_from_slice(&attribute(attr_type::MULTI_EXIT_DISC, &50u32.to_be_bytes()));
        attrs.extend_from_slice(&attribute(attr_type::LOCAL_PREF, &200u32.to_be_bytes()));

        let pdu = update_pdu(&[], &attrs, &[0x18, 0xc0, 0xa8, 0x01]);
        let update = parse_bgp_update(&pdu).unwrap();

        assert_eq!(update.afi, Some(AFI_IPV4));
        assert_eq!(update.safi, Some(SAFI_UNICAST));
        assert_eq!(update.origin, Some(BgpOrigin::Igp));
        assert_eq!(update.as_path, Some(vec![3356, 15169]));
        assert_eq!(update.next_hop, Some("10.0.0.1".parse().unwrap()));
        assert_eq!(update.med, Some(50));
        assert_eq!(update.local_pref, Some(200));
        assert_eq!(
            update.prefixes,
            vec![NlriEntry::Prefix("192.168.1.0/24".parse().unwrap())]
        );
        assert!(!update.is_withdrawal);
    }

    #[test]
    fn parses_plain_ipv4_withdrawal() {
        let pdu = update_pdu(&[0x18, 0xc0, 0xa8, 0x01], &[], &[]);
        let update = parse_bgp_update(&pdu).unwrap();

        assert!(update.is_withdrawal);
        assert!(update.prefixes.is_empty());
        assert_eq!(
            update.withdrawn_prefixes,
            vec![NlriEntry::Prefix("192.168.1.0/24".parse().unwrap())]
        );
    }

    #[test]
    fn update_with_both_kinds_is_not_a_pure_withdrawal() {
        let pdu = update_pdu(
            &[0x18, 0x0a, 0x00, 0x00],
            &attribute(attr_type::NEXT_HOP, &[10, 0, 0, 1]),
            &[0x18, 0xc0, 0xa8, 0x01],
        );
        let update = parse_bgp_update(&pdu).unwrap();

        assert_eq!(update.prefixes.len(), 1);
        assert_eq!(update.withdrawn_prefixes.len(), 1);
        assert!(!update.is_withdrawal);
    }

    #[test]
    fn evpn_update_extracts_quartet() {
        let mut mp_reach = Vec::new();
        mp_reach.extend_from_slice(&AFI_L2VPN.to_be_bytes());
        mp_reach.push(SAFI_EVPN);
        mp_reach.push(4);
        mp_reach.extend_from_slice(&[192, 0, 2, 254]);
        mp_reach.push(0);
        mp_reach.extend_from_slice(&evpn_type2_nlri(true));

        let attrs = extended_attribute(attr_type::MP_REACH_NLRI, &mp_reach);
        let pdu = update_pdu(&[], &attrs, &[]);
        let update = parse_bgp_update(&pdu).unwrap();

        assert_eq!(update.afi, Some(AFI_L2VPN));
        assert_eq!(update.safi, Some(SAFI_EVPN));
        assert_eq!(update.evpn_route_type, Some(2));
        assert_eq!(update.evpn_rd.as_deref(), Some("65300:100"));
        assert_eq!(
            update.evpn_esi.as_deref(),
            Some("00:11:22:33:44:55:66:77:88:99")
        );
        assert_eq!(update.mac_address.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(update.next_hop, Some("192.0.2.254".parse().unwrap()));
        assert_eq!(update.prefixes.len(), 1);
        assert!(!update.is_withdrawal);
    }

    #[test]
    fn mp_unreach_only_update_is_a_withdrawal() {
        let mut mp_unreach = Vec::new();
        mp_unreach.extend_from_slice(&AFI_IPV6.to_be_bytes());
        mp_unreach.push(SAFI_UNICAST);
        mp_unreach.extend_from_slice(&[0x20, 0x20, 0x01, 0x0d, 0xb8]);

        let attrs = attribute(attr_type::MP_UNREACH_NLRI, &mp_unreach);
        let pdu = update_pdu(&[], &attrs, &[]);
        let update = parse_bgp_update(&pdu).unwrap();

        assert!(update.is_withdrawal);
        assert_eq!(update.withdrawn_prefixes.len(), 1);
        assert_eq!(update.afi, Some(AFI_IPV6));
    }

    #[test]
    fn malformed_attribute_is_skipped_not_fatal() {
        // COMMUNITIES with a ragged length sits between two good attributes.
        let mut attrs = Vec::new();
        attrs.extend_from_slice(&attribute(attr_type::ORIGIN, &[0]));
        attrs.extend_from_slice(&attribute(attr_type::COMMUNITIES, &[1, 2, 3]));
        attrs.extend_from_slice(&attribute(attr_type::NEXT_HOP, &[10, 0, 0, 1]));

        let pdu = update_pdu(&[], &attrs, &[0x08, 0x0a]);
        let update = parse_bgp_update(&pdu).unwrap();

        assert_eq!(update.origin, Some(BgpOrigin::Igp));
        assert_eq!(update.communities, None);
        assert_eq!(update.next_hop, Some("10.0.0.1".parse().unwrap()));
        assert_eq!(update.prefixes.len(), 1);
    }

    #[test]
    fn attribute_overrun_terminates_the_walk() {
        // Claims 200 value bytes inside a 10-byte block; the walk stops and
        // the UPDATE still parses with the preceding attribute applied.
        let mut attrs = Vec::new();
        attrs.extend_from_slice(&attribute(attr_type::ORIGIN, &[1]));
        attrs.extend_from_slice(&[0x40, attr_type::LOCAL_PREF, 200, 0, 0]);

        let pdu = update_pdu(&[], &attrs, &[]);
        let update = parse_bgp_update(&pdu).unwrap();
        assert_eq!(update.origin, Some(BgpOrigin::Egp));
        assert_eq!(update.local_pref, None);
    }

    #[test]
    fn rejects_non_update_pdu() {
        let mut pdu = Vec::new();
        pdu.extend_from_slice(&BGP_MARKER);
        pdu.extend_from_slice(&19u16.to_be_bytes());
        pdu.push(4); // KEEPALIVE
        assert!(matches!(
            parse_bgp_update(&pdu),
            Err(BgpParseError::NotAnUpdate(4))
        ));
    }

    #[test]
    fn rejects_bad_marker() {
        let mut pdu = vec![0u8; 23];
        pdu[16] = 0;
        pdu[17] = 23;
        pdu[18] = 2;
        assert!(matches!(
            parse_bgp_update(&pdu),
            Err(BgpParseError::InvalidMarker)
        ));
    }

    #[test]
    fn rejects_withdrawn_section_overrun() {
        // Withdrawn length claims 50 bytes the message does not have.
        let mut pdu = Vec::new();
        pdu.extend_from_slice(&BGP_MARKER);
        pdu.extend_from_slice(&23u16.to_be_bytes());
        pdu.push(2);
        pdu.extend_from_slice(&50u16.to_be_bytes());
        pdu.extend_from_slice(&[0, 0]);
        assert!(matches!(
            parse_bgp_update(&pdu),
            Err(BgpParseError::Overrun { .. })
        ));
    }
}
