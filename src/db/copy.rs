//! Text-format `COPY FROM STDIN` encoding for route update rows.
//!
//! One encoded line per record, tab-separated fields, `\N` for NULL, with
//! the escaping rules of the PostgreSQL COPY text format. Array columns are
//! rendered as array literals first and then escaped like any other field,
//! so the same path carries IP and EVPN records alike.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::models::RouteUpdate;

/// Bulk-copy statement with the fixed column order the encoder produces.
pub(crate) const COPY_ROUTE_UPDATES: &str = "COPY route_updates (\
    time, bmp_peer_ip, bmp_peer_asn, bgp_peer_ip, bgp_peer_asn, \
    family, prefix, next_hop, as_path, communities, extended_communities, \
    med, local_pref, is_withdrawn, \
    evpn_route_type, evpn_rd, evpn_esi, mac_address\
) FROM STDIN";

const NULL: &str = "\\N";

/// Encode a whole batch into one COPY payload.
pub(crate) fn encode_rows(routes: &[RouteUpdate]) -> Vec<u8> {
    let mut buf = String::with_capacity(routes.len() * 160);
    for route in routes {
        encode_row(route, &mut buf);
    }
    buf.into_bytes()
}

fn encode_row(route: &RouteUpdate, buf: &mut String) {
    push_timestamp(buf, &route.time);
    push_separator(buf);
    push_escaped(buf, &route.bmp_peer_ip.to_string());
    push_separator(buf);
    push_opt_i64(buf, route.bmp_peer_asn.map(i64::from));
    push_separator(buf);
    push_escaped(buf, &route.bgp_peer_ip.to_string());
    push_separator(buf);
    push_opt_i64(buf, route.bgp_peer_asn.map(i64::from));
    push_separator(buf);
    push_escaped(buf, route.family.as_str());
    push_separator(buf);
    push_opt_text(buf, route.prefix.map(|p| p.to_string()).as_deref());
    push_separator(buf);
    push_opt_text(buf, route.next_hop.map(|h| h.to_string()).as_deref());
    push_separator(buf);
    match &route.as_path {
        Some(path) => push_escaped(buf, &int_array_literal(path)),
        None => buf.push_str(NULL),
    }
    push_separator(buf);
    match &route.communities {
        Some(communities) => push_escaped(buf, &text_array_literal(communities)),
        None => buf.push_str(NULL),
    }
    push_separator(buf);
    match &route.extended_communities {
        Some(communities) => push_escaped(buf, &text_array_literal(communities)),
        None => buf.push_str(NULL),
    }
    push_separator(buf);
    push_opt_i64(buf, route.med.map(i64::from));
    push_separator(buf);
    push_opt_i64(buf, route.local_pref.map(i64::from));
    push_separator(buf);
    buf.push_str(if route.is_withdrawn { "t" } else { "f" });
    push_separator(buf);
    push_opt_i64(buf, route.evpn_route_type.map(i64::from));
    push_separator(buf);
    push_opt_text(buf, route.evpn_rd.as_deref());
    push_separator(buf);
    push_opt_text(buf, route.evpn_esi.as_deref());
    push_separator(buf);
    push_opt_text(buf, route.mac_address.as_deref());
    buf.push('\n');
}

fn push_separator(buf: &mut String) {
    buf.push('\t');
}

fn push_timestamp(buf: &mut String, time: &DateTime<Utc>) {
    let _ = write!(buf, "{}", time.format("%Y-%m-%d %H:%M:%S%.6f+00"));
}

fn push_opt_i64(buf: &mut String, value: Option<i64>) {
    match value {
        Some(value) => {
            let _ = write!(buf, "{value}");
        }
        None => buf.push_str(NULL),
    }
}

fn push_opt_text(buf: &mut String, value: Option<&str>) {
    match value {
        Some(value) => push_escaped(buf, value),
        None => buf.push_str(NULL),
    }
}

/// COPY text-format field escaping: backslash, tab, newline and carriage
/// return must not appear raw inside a field.
fn push_escaped(buf: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '\\' => buf.push_str("\\\\"),
            '\t' => buf.push_str("\\t"),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            _ => buf.push(ch),
        }
    }
}

fn int_array_literal(values: &[u32]) -> String {
    let mut literal = String::with_capacity(values.len() * 8 + 2);
    literal.push('{');
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            literal.push(',');
        }
        let _ = write!(literal, "{value}");
    }
    literal.push('}');
    literal
}

fn text_array_literal(values: &[String]) -> String {
    let mut literal = String::with_capacity(values.len() * 16 + 2);
    literal.push('{');
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            literal.push(',');
        }
        literal.push('"');
        for ch in value.chars() {
            match ch {
                '"' => literal.push_str("\\\""),
                '\\' => literal.push_str("\\\\"),
                _ => literal.push(ch),
            }
        }
        literal.push('"');
    }
    literal.push('}');
    literal
}
