//! BMP wire decoding per RFC 7854.
//!
//! Every parser takes a complete message byte slice and either consumes the
//! advertised length or fails with a [`BmpParseError`]. Unknown but
//! well-framed content (information TLV types, statistics types) is retained
//! opaquely rather than rejected.

use crate::protocol::binary::{
    read_bytes, read_ip_address, read_ipv4_address, read_u16, read_u32, read_u8,
};
use crate::protocol::bmp::{
    BmpHeader, BmpInfoTlv, BmpInitiationMessage, BmpMessage, BmpMessageType, BmpParseError,
    BmpPeerDownMessage, BmpPeerDownReason, BmpPeerFlags, BmpPeerType, BmpPeerUpMessage,
    BmpPerPeerHeader, BmpRouteMonitoringMessage, BmpStatTlv, BmpStatValue,
    BmpStatisticsReportMessage, BmpTerminationMessage, BMP_HEADER_SIZE, BMP_PER_PEER_HEADER_SIZE,
    BMP_VERSION,
};

/// BGP message header size; OPEN PDUs inside peer-up bodies are
/// self-delimited by the length field at offset 16 of this header.
const BGP_HEADER_SIZE: usize = 19;

/// Parse the 6-byte BMP common header.
pub fn parse_bmp_header(data: &[u8]) -> Result<BmpHeader, BmpParseError> {
    if data.len() < BMP_HEADER_SIZE {
        return Err(BmpParseError::Incomplete {
            expected: BMP_HEADER_SIZE,
            got: data.len(),
        });
    }

    let version = read_u8(data, 0).map_err(BmpParseError::truncated("common header"))?;
    if version != BMP_VERSION {
        return Err(BmpParseError::InvalidVersion(version));
    }

    let length = read_u32(data, 1).map_err(BmpParseError::truncated("common header"))?;
    if (length as usize) < BMP_HEADER_SIZE {
        return Err(BmpParseError::InvalidLength(length));
    }

    let raw_type = read_u8(data, 5).map_err(BmpParseError::truncated("common header"))?;
    let msg_type =
        BmpMessageType::try_from(raw_type).map_err(|_| BmpParseError::UnknownMessageType(raw_type))?;

    Ok(BmpHeader {
        version,
        length,
        msg_type,
    })
}

/// Parse the 42-byte per-peer header starting at `offset`.
pub fn parse_per_peer_header(data: &[u8], offset: usize) -> Result<BmpPerPeerHeader, BmpParseError> {
    if data.len() < offset + BMP_PER_PEER_HEADER_SIZE {
        return Err(BmpParseError::Incomplete {
            expected: offset + BMP_PER_PEER_HEADER_SIZE,
            got: data.len(),
        });
    }

    let raw_peer_type =
        read_u8(data, offset).map_err(BmpParseError::truncated("per-peer header"))?;
    let peer_type = BmpPeerType::try_from(raw_peer_type)
        .map_err(|_| BmpParseError::InvalidPeerType(raw_peer_type))?;

    let peer_flags = BmpPeerFlags::from_bits_retain(
        read_u8(data, offset + 1).map_err(BmpParseError::truncated("per-peer header"))?,
    );

    let mut peer_distinguisher = [0u8; 8];
    peer_distinguisher.copy_from_slice(
        read_bytes(data, offset + 2, 8).map_err(BmpParseError::truncated("per-peer header"))?,
    );

    let peer_address = read_ip_address(data, offset + 10, peer_flags.is_ipv6())
        .map_err(BmpParseError::truncated("per-peer header"))?;
    let peer_asn =
        read_u32(data, offset + 26).map_err(BmpParseError::truncated("per-peer header"))?;
    let peer_bgp_id =
        read_ipv4_address(data, offset + 30).map_err(BmpParseError::truncated("per-peer header"))?;
    let timestamp_sec =
        read_u32(data, offset + 34).map_err(BmpParseError::truncated("per-peer header"))?;
    let timestamp_usec =
        read_u32(data, offset + 38).map_err(BmpParseError::truncated("per-peer header"))?;

    Ok(BmpPerPeerHeader {
        peer_type,
        peer_flags,
        peer_distinguisher,
        peer_address,
        peer_asn,
        peer_bgp_id,
        timestamp_sec,
        timestamp_usec,
    })
}

/// Parse information TLVs from `offset` up to `end` (exclusive).
fn parse_information_tlvs(
    data: &[u8],
    offset: usize,
    end: usize,
) -> Result<Vec<BmpInfoTlv>, BmpParseError> {
    let mut tlvs = Vec::new();
    let mut pos = offset;

    while pos < end {
        if pos + 4 > end {
            return Err(BmpParseError::Overrun {
                context: "information TLV header",
                offset: pos,
            });
        }

        let info_type = read_u16(data, pos).map_err(BmpParseError::truncated("information TLV"))?;
        let info_length =
            read_u16(data, pos + 2).map_err(BmpParseError::truncated("information TLV"))? as usize;

        if pos + 4 + info_length > end {
            return Err(BmpParseError::Overrun {
                context: "information TLV value",
                offset: pos,
            });
        }

        let info_value = read_bytes(data, pos + 4, info_length)
            .map_err(BmpParseError::truncated("information TLV"))?
            .to_vec();

        tlvs.push(BmpInfoTlv {
            info_type,
            info_value,
        });
        pos += 4 + info_length;
    }

    Ok(tlvs)
}

pub fn parse_initiation_message(data: &[u8]) -> Result<BmpInitiationMessage, BmpParseError> {
    let header = parse_bmp_header(data)?;
    let tlvs = parse_information_tlvs(data, BMP_HEADER_SIZE, header.length as usize)?;
    Ok(BmpInitiationMessage {
        header,
        information_tlvs: tlvs,
    })
}

pub fn parse_termination_message(data: &[u8]) -> Result<BmpTerminationMessage, BmpParseError> {
    let header = parse_bmp_header(data)?;
    let tlvs = parse_information_tlvs(data, BMP_HEADER_SIZE, header.length as usize)?;
    Ok(BmpTerminationMessage {
        header,
        information_tlvs: tlvs,
    })
}

pub fn parse_route_monitoring_message(
    data: &[u8],
) -> Result<BmpRouteMonitoringMessage, BmpParseError> {
    let header = parse_bmp_header(data)?;
    let per_peer_header = parse_per_peer_header(data, BMP_HEADER_SIZE)?;

    // Everything after the per-peer header is the raw BGP UPDATE PDU.
    let update_offset = BMP_HEADER_SIZE + BMP_PER_PEER_HEADER_SIZE;
    let update_len = (header.length as usize)
        .checked_sub(update_offset)
        .ok_or(BmpParseError::Overrun {
            context: "route monitoring body",
            offset: update_offset,
        })?;
    let bgp_update = read_bytes(data, update_offset, update_len)
        .map_err(BmpParseError::truncated("route monitoring body"))?
        .to_vec();

    Ok(BmpRouteMonitoringMessage {
        header,
        per_peer_header,
        bgp_update,
    })
}

pub fn parse_statistics_report_message(
    data: &[u8],
) -> Result<BmpStatisticsReportMessage, BmpParseError> {
    let header = parse_bmp_header(data)?;
    let per_peer_header = parse_per_peer_header(data, BMP_HEADER_SIZE)?;

    let stats_offset = BMP_HEADER_SIZE + BMP_PER_PEER_HEADER_SIZE;
    let stats_count =
        read_u32(data, stats_offset).map_err(BmpParseError::truncated("statistics count"))?;

    let end = header.length as usize;
    let mut pos = stats_offset + 4;
    // Capacity comes from the message length, not the unvalidated count.
    let mut stats_tlvs = Vec::with_capacity((stats_count as usize).min(end / 4));

    for _ in 0..stats_count {
        if pos + 4 > end {
            return Err(BmpParseError::Overrun {
                context: "statistics TLV header",
                offset: pos,
            });
        }

        let stat_type = read_u16(data, pos).map_err(BmpParseError::truncated("statistics TLV"))?;
        let stat_length =
            read_u16(data, pos + 2).map_err(BmpParseError::truncated("statistics TLV"))? as usize;

        if pos + 4 + stat_length > end {
            return Err(BmpParseError::Overrun {
                context: "statistics TLV value",
                offset: pos,
            });
        }

        let stat_value = match stat_length {
            4 => BmpStatValue::Counter32(
                read_u32(data, pos + 4).map_err(BmpParseError::truncated("statistics TLV"))?,
            ),
            8 => {
                let high =
                    read_u32(data, pos + 4).map_err(BmpParseError::truncated("statistics TLV"))?;
                let low =
                    read_u32(data, pos + 8).map_err(BmpParseError::truncated("statistics TLV"))?;
                BmpStatValue::Counter64(((high as u64) << 32) | low as u64)
            }
            _ => BmpStatValue::Raw(
                read_bytes(data, pos + 4, stat_length)
                    .map_err(BmpParseError::truncated("statistics TLV"))?
                    .to_vec(),
            ),
        };

        stats_tlvs.push(BmpStatTlv {
            stat_type,
            stat_value,
        });
        pos += 4 + stat_length;
    }

    Ok(BmpStatisticsReportMessage {
        header,
        per_peer_header,
        stats_tlvs,
    })
}

pub fn parse_peer_down_message(data: &[u8]) -> Result<BmpPeerDownMessage, BmpParseError> {
    let header = parse_bmp_header(data)?;
    let per_peer_header = parse_per_peer_header(data, BMP_HEADER_SIZE)?;

    let reason_offset = BMP_HEADER_SIZE + BMP_PER_PEER_HEADER_SIZE;
    let raw_reason =
        read_u8(data, reason_offset).map_err(BmpParseError::truncated("peer down reason"))?;
    let reason = BmpPeerDownReason::try_from(raw_reason)
        .map_err(|_| BmpParseError::InvalidPeerDownReason(raw_reason))?;

    // Reason-dependent payload runs to the end of the message.
    let data_offset = reason_offset + 1;
    let data_len = (header.length as usize)
        .checked_sub(data_offset)
        .ok_or(BmpParseError::Overrun {
            context: "peer down body",
            offset: data_offset,
        })?;
    let additional = read_bytes(data, data_offset, data_len)
        .map_err(BmpParseError::truncated("peer down body"))?
        .to_vec();

    Ok(BmpPeerDownMessage {
        header,
        per_peer_header,
        reason,
        data: additional,
    })
}

pub fn parse_peer_up_message(data: &[u8]) -> Result<BmpPeerUpMessage, BmpParseError> {
    let header = parse_bmp_header(data)?;
    let per_peer_header = parse_per_peer_header(data, BMP_HEADER_SIZE)?;

    let body_offset = BMP_HEADER_SIZE + BMP_PER_PEER_HEADER_SIZE;
    let local_address =
        read_ip_address(data, body_offset, per_peer_header.peer_flags.is_ipv6())
            .map_err(BmpParseError::truncated("peer up local address"))?;
    let local_port =
        read_u16(data, body_offset + 16).map_err(BmpParseError::truncated("peer up ports"))?;
    let remote_port =
        read_u16(data, body_offset + 18).map_err(BmpParseError::truncated("peer up ports"))?;

    // Two BGP OPEN PDUs follow, each self-delimited by its header length.
    let sent_offset = body_offset + 20;
    let sent_open_message = read_open_pdu(data, sent_offset, header.length as usize, "sent OPEN")?;

    let recv_offset = sent_offset + sent_open_message.len();
    let received_open_message =
        read_open_pdu(data, recv_offset, header.length as usize, "received OPEN")?;

    let tlv_offset = recv_offset + received_open_message.len();
    let information_tlvs = parse_information_tlvs(data, tlv_offset, header.length as usize)?;

    Ok(BmpPeerUpMessage {
        header,
        per_peer_header,
        local_address,
        local_port,
        remote_port,
        sent_open_message,
        received_open_message,
        information_tlvs,
    })
}

fn read_open_pdu(
    data: &[u8],
    offset: usize,
    end: usize,
    context: &'static str,
) -> Result<Vec<u8>, BmpParseError> {
    if offset + BGP_HEADER_SIZE > end {
        return Err(BmpParseError::Overrun { context, offset });
    }

    let pdu_len = read_u16(data, offset + 16).map_err(BmpParseError::truncated("OPEN header"))?
        as usize;
    if pdu_len < BGP_HEADER_SIZE || offset + pdu_len > end {
        return Err(BmpParseError::Overrun { context, offset });
    }

    Ok(read_bytes(data, offset, pdu_len)
        .map_err(BmpParseError::truncated("OPEN body"))?
        .to_vec())
}

/// Parse a complete BMP message, dispatching on the header type.
pub fn parse_bmp_message(data: &[u8]) -> Result<BmpMessage, BmpParseError> {
    let header = parse_bmp_header(data)?;

    if data.len() < header.length as usize {
        return Err(BmpParseError::Incomplete {
            expected: header.length as usize,
            got: data.len(),
        });
    }

    match header.msg_type {
        BmpMessageType::Initiation => parse_initiation_message(data).map(BmpMessage::Initiation),
        BmpMessageType::Termination => parse_termination_message(data).map(BmpMessage::Termination),
        BmpMessageType::RouteMonitoring => {
            parse_route_monitoring_message(data).map(BmpMessage::RouteMonitoring)
        }
        BmpMessageType::StatisticsReport => {
            parse_statistics_report_message(data).map(BmpMessage::StatisticsReport)
        }
        BmpMessageType::PeerDownNotification => {
            parse_peer_down_message(data).map(BmpMessage::PeerDown)
        }
        BmpMessageType::PeerUpNotification => parse_peer_up_message(data).map(BmpMessage::PeerUp),
    }
}
