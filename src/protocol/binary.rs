//! Bounded big-endian field readers shared by the BMP and BGP decoders.
//!
//! Every reader takes `(buffer, offset)` and fails with [`OutOfBounds`] when
//! `offset + width` exceeds the buffer. None of them keep state.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("need {needed} byte(s) at offset {offset}, got {available}")]
pub struct OutOfBounds {
    pub offset: usize,
    pub needed: usize,
    pub available: usize,
}

fn check(data: &[u8], offset: usize, needed: usize) -> Result<(), OutOfBounds> {
    if data.len() < offset.saturating_add(needed) {
        return Err(OutOfBounds {
            offset,
            needed,
            available: data.len().saturating_sub(offset.min(data.len())),
        });
    }
    Ok(())
}

pub fn read_u8(data: &[u8], offset: usize) -> Result<u8, OutOfBounds> {
    check(data, offset, 1)?;
    Ok(data[offset])
}

pub fn read_u16(data: &[u8], offset: usize) -> Result<u16, OutOfBounds> {
    check(data, offset, 2)?;
    Ok(u16::from_be_bytes([data[offset], data[offset + 1]]))
}

pub fn read_u32(data: &[u8], offset: usize) -> Result<u32, OutOfBounds> {
    check(data, offset, 4)?;
    Ok(u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ]))
}

pub fn read_bytes(data: &[u8], offset: usize, length: usize) -> Result<&[u8], OutOfBounds> {
    check(data, offset, length)?;
    Ok(&data[offset..offset + length])
}

pub fn read_ipv4_address(data: &[u8], offset: usize) -> Result<Ipv4Addr, OutOfBounds> {
    check(data, offset, 4)?;
    let octets: [u8; 4] = data[offset..offset + 4].try_into().unwrap();
    Ok(Ipv4Addr::from(octets))
}

pub fn read_ipv6_address(data: &[u8], offset: usize) -> Result<Ipv6Addr, OutOfBounds> {
    check(data, offset, 16)?;
    let octets: [u8; 16] = data[offset..offset + 16].try_into().unwrap();
    Ok(Ipv6Addr::from(octets))
}

/// Read an IP address from a 16-byte field.
///
/// BMP carries all addresses in 16-byte fields; IPv4 addresses occupy the
/// last 4 bytes with the first 12 zeroed. The field decodes as IPv6 when the
/// caller's selector says so or when any of the leading 12 bytes is set.
pub fn read_ip_address(data: &[u8], offset: usize, is_ipv6: bool) -> Result<IpAddr, OutOfBounds> {
    check(data, offset, 16)?;
    let field = &data[offset..offset + 16];

    if is_ipv6 || field[..12].iter().any(|&b| b != 0) {
        let octets: [u8; 16] = field.try_into().unwrap();
        Ok(IpAddr::V6(Ipv6Addr::from(octets)))
    } else {
        let octets: [u8; 4] = field[12..16].try_into().unwrap();
        Ok(IpAddr::V4(Ipv4Addr::from(octets)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_unsigned_fields() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05];
        assert_eq!(read_u8(&data, 0).unwrap(), 1);
        assert_eq!(read_u8(&data, 4).unwrap(), 5);
        assert_eq!(read_u16(&data, 0).unwrap(), 0x0102);
        assert_eq!(read_u16(&data, 3).unwrap(), 0x0405);
        assert_eq!(read_u32(&data, 1).unwrap(), 0x0203_0405);
    }

    #[test]
    fn rejects_reads_past_end() {
        let data = [0x01, 0x02];
        assert!(read_u8(&data, 2).is_err());
        assert!(read_u16(&data, 1).is_err());
        assert!(read_u32(&data, 0).is_err());
        assert!(read_bytes(&data, 1, 2).is_err());

        let err = read_u32(&data, 0).unwrap_err();
        assert_eq!(err.offset, 0);
        assert_eq!(err.needed, 4);
        assert_eq!(err.available, 2);
    }

    #[test]
    fn reads_byte_slices() {
        let data = [0xde, 0xad, 0xbe, 0xef];
        assert_eq!(read_bytes(&data, 1, 2).unwrap(), &[0xad, 0xbe]);
        assert_eq!(read_bytes(&data, 4, 0).unwrap(), &[] as &[u8]);
    }

    #[test]
    fn reads_ipv4_and_ipv6() {
        let v4 = [192, 0, 2, 1];
        assert_eq!(
            read_ipv4_address(&v4, 0).unwrap(),
            Ipv4Addr::new(192, 0, 2, 1)
        );

        let mut v6 = [0u8; 16];
        v6[0] = 0x20;
        v6[1] = 0x01;
        v6[2] = 0x0d;
        v6[3] = 0xb8;
        v6[15] = 0x01;
        assert_eq!(
            read_ipv6_address(&v6, 0).unwrap(),
            "2001:db8::1".parse::<Ipv6Addr>().unwrap()
        );
    }

    #[test]
    fn ip_field_detects_mapped_ipv4() {
        let mut field = [0u8; 16];
        field[12..16].copy_from_slice(&[192, 168, 1, 1]);
        assert_eq!(
            read_ip_address(&field, 0, false).unwrap(),
            "192.168.1.1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn ip_field_honours_ipv6_selector() {
        // All-zero prefix but the peer flags say IPv6: decode as IPv6.
        let mut field = [0u8; 16];
        field[12..16].copy_from_slice(&[0, 0, 0, 1]);
        assert_eq!(
            read_ip_address(&field, 0, true).unwrap(),
            "::1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn ip_field_detects_ipv6_from_leading_bytes() {
        let mut field = [0u8; 16];
        field[0] = 0x20;
        field[1] = 0x01;
        field[2] = 0x0d;
        field[3] = 0xb8;
        field[15] = 0x02;
        assert_eq!(
            read_ip_address(&field, 0, false).unwrap(),
            "2001:db8::2".parse::<IpAddr>().unwrap()
        );
    }
}
