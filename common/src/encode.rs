//
// DHCP-RS
//   Copyright (C) 2024-2025, Toshiaki Takada
//
// Encode:
//  Utility functions to put/get fixed size values into/from a buffer.
//  All multi-octet values are in network byte order on the wire.
//

use std::mem::size_of;
use std::net::Ipv4Addr;

use crate::DhcpError;

fn check_len(len: usize, need: usize, what: &str) -> Result<(), DhcpError> {
    if len < need {
        Err(DhcpError::InsufficientBufferSize(format!("for {} {} < {}", what, len, need)))
    } else {
        Ok(())
    }
}

/// Copy a slice into the head of the buffer.
pub fn encode_data(buf: &mut [u8], data: &[u8]) -> Result<usize, DhcpError> {
    check_len(buf.len(), data.len(), "data")?;
    buf[..data.len()].copy_from_slice(data);
    Ok(data.len())
}

/// Encode u8 value into buffer.
pub fn encode_u8(buf: &mut [u8], v: u8) -> Result<usize, DhcpError> {
    encode_data(buf, &[v])
}

/// Encode u16 value into buffer.
pub fn encode_u16(buf: &mut [u8], v: u16) -> Result<usize, DhcpError> {
    encode_data(buf, &v.to_be_bytes())
}

/// Encode u32 value into buffer.
pub fn encode_u32(buf: &mut [u8], v: u32) -> Result<usize, DhcpError> {
    encode_data(buf, &v.to_be_bytes())
}

/// Encode IPv4 address into buffer.
pub fn encode_ipv4(buf: &mut [u8], v: Ipv4Addr) -> Result<usize, DhcpError> {
    encode_data(buf, &v.octets())
}

/// Encode a list of IPv4 addresses into buffer.
pub fn encode_ipv4_vec(buf: &mut [u8], v: &[Ipv4Addr]) -> Result<usize, DhcpError> {
    let mut len = 0;
    for addr in v {
        len += encode_ipv4(&mut buf[len..], *addr)?;
    }
    Ok(len)
}

/// Return u8 value.
pub fn decode_u8(data: &[u8]) -> Result<u8, DhcpError> {
    check_len(data.len(), size_of::<u8>(), "u8")?;
    Ok(data[0])
}

/// Return u16 value in host byte order.
pub fn decode_u16(data: &[u8]) -> Result<u16, DhcpError> {
    check_len(data.len(), size_of::<u16>(), "u16")?;
    Ok(u16::from_be_bytes([data[0], data[1]]))
}

/// Return u32 value in host byte order.
pub fn decode_u32(data: &[u8]) -> Result<u32, DhcpError> {
    check_len(data.len(), size_of::<u32>(), "u32")?;
    Ok(u32::from_be_bytes([data[0], data[1], data[2], data[3]]))
}

/// Return Ipv4Addr.
pub fn decode_ipv4(data: &[u8]) -> Result<Ipv4Addr, DhcpError> {
    check_len(data.len(), size_of::<Ipv4Addr>(), "Ipv4Addr")?;
    Ok(Ipv4Addr::new(data[0], data[1], data[2], data[3]))
}

/// Fill a fixed size array from the head of data.
pub fn decode_array<const N: usize>(data: &[u8]) -> Result<[u8; N], DhcpError> {
    check_len(data.len(), N, "array")?;
    let mut a = [0u8; N];
    a.copy_from_slice(&data[..N]);
    Ok(a)
}
