//
// DHCP-RS
//   Copyright (C) 2024-2025, Toshiaki Takada
//

use std::fmt;
use std::net::Ipv4Addr;

use crate::*;
use crate::encode::*;

/// DHCP Option header length.
const DHCP_OPTION_HLEN: usize = 2;

/// DHCP option.
#[derive(Debug, Clone, PartialEq)]
pub enum DhcpOption {
    /// 1. Subnet Mask.
    SubnetMask(Ipv4Addr),

    /// 3. Router Option.
    Router(Vec<Ipv4Addr>),

    /// 6. Domain Name Server Option.
    DomainServer(Vec<Ipv4Addr>),

    /// 12. Host Name Option.
    HostName(String),

    /// 15. Domain Name.
    DomainName(String),

    /// 50. Requested IP Address.
    AddressRequest(Ipv4Addr),

    /// 51. IP Address Lease Time.
    AddressTime(u32),

    /// 53. DHCP Message Type.
    DHCPMsgType(DhcpMessageType),

    /// 54. Server Identifier.
    DHCPServerId(Ipv4Addr),

    /// 55. Parameter Request List.
    ParameterList(Vec<u8>),

    /// 56. Message.
    Message(String),

    /// 58. Renewal (T1) Time Value.
    RenewalTime(u32),

    /// 59. Rebinding (T2) Time Value.
    RebindingTime(u32),

    /// 60. Vendor class identifier.
    VendorClassId(String),

    /// 61. Client-identifier.
    ClientId(Vec<u8>),

    /// Any option without a typed representation, kept as raw bytes.
    Unknown((u8, Vec<u8>)),
}

impl fmt::Display for DhcpOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl DhcpOption {
    /// Return option code on the wire.
    pub fn code(&self) -> u8 {
        let code = match self {
            DhcpOption::SubnetMask(_) => DhcpOptionCode::SubnetMask,
            DhcpOption::Router(_) => DhcpOptionCode::Router,
            DhcpOption::DomainServer(_) => DhcpOptionCode::DomainServer,
            DhcpOption::HostName(_) => DhcpOptionCode::HostName,
            DhcpOption::DomainName(_) => DhcpOptionCode::DomainName,
            DhcpOption::AddressRequest(_) => DhcpOptionCode::AddressRequest,
            DhcpOption::AddressTime(_) => DhcpOptionCode::AddressTime,
            DhcpOption::DHCPMsgType(_) => DhcpOptionCode::DHCPMsgType,
            DhcpOption::DHCPServerId(_) => DhcpOptionCode::DHCPServerId,
            DhcpOption::ParameterList(_) => DhcpOptionCode::ParameterList,
            DhcpOption::Message(_) => DhcpOptionCode::Message,
            DhcpOption::RenewalTime(_) => DhcpOptionCode::RenewalTime,
            DhcpOption::RebindingTime(_) => DhcpOptionCode::RebindingTime,
            DhcpOption::VendorClassId(_) => DhcpOptionCode::VendorClassId,
            DhcpOption::ClientId(_) => DhcpOptionCode::ClientId,
            DhcpOption::Unknown((code, _)) => return *code,
        };
        code as u8
    }

    /// Decode option body for a given code.
    fn decode_body(code: u8, body: &[u8]) -> Result<DhcpOption, DhcpError> {
        let code = match DhcpOptionCode::try_from(code) {
            Ok(code) => code,
            Err(_) => return Ok(DhcpOption::Unknown((code, body.to_vec()))),
        };

        let opt = match code {
            DhcpOptionCode::SubnetMask => DhcpOption::SubnetMask(body_ipv4(body)?),
            DhcpOptionCode::Router => DhcpOption::Router(body_ipv4_vec(body)?),
            DhcpOptionCode::DomainServer => DhcpOption::DomainServer(body_ipv4_vec(body)?),
            DhcpOptionCode::HostName => DhcpOption::HostName(body_string(body)?),
            DhcpOptionCode::DomainName => DhcpOption::DomainName(body_string(body)?),
            DhcpOptionCode::AddressRequest => DhcpOption::AddressRequest(body_ipv4(body)?),
            DhcpOptionCode::AddressTime => DhcpOption::AddressTime(body_u32(body)?),
            DhcpOptionCode::DHCPMsgType => {
                if body.len() != 1 {
                    return Err(DhcpError::InvalidOptionLength)
                }
                DhcpOption::DHCPMsgType(DhcpMessageType::try_from(body[0])?)
            }
            DhcpOptionCode::DHCPServerId => DhcpOption::DHCPServerId(body_ipv4(body)?),
            DhcpOptionCode::ParameterList => DhcpOption::ParameterList(body.to_vec()),
            DhcpOptionCode::Message => DhcpOption::Message(body_string(body)?),
            DhcpOptionCode::RenewalTime => DhcpOption::RenewalTime(body_u32(body)?),
            DhcpOptionCode::RebindingTime => DhcpOption::RebindingTime(body_u32(body)?),
            DhcpOptionCode::VendorClassId => DhcpOption::VendorClassId(body_string(body)?),
            DhcpOptionCode::ClientId => {
                // Type octet plus at least one octet of identifier.
                if body.len() < 2 {
                    return Err(DhcpError::InvalidOptionLength)
                }
                DhcpOption::ClientId(body.to_vec())
            }
            DhcpOptionCode::Pad | DhcpOptionCode::End => {
                return Err(DhcpError::DecodeError(format!("{:?} has no body", code)))
            }
        };

        Ok(opt)
    }

    /// Encode option including code and length octets.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, DhcpError> {
        let code = self.code();
        match self {
            DhcpOption::SubnetMask(v) |
            DhcpOption::AddressRequest(v) |
            DhcpOption::DHCPServerId(v) => {
                encode_option(buf, code, |b| encode_ipv4(b, *v))
            }
            DhcpOption::Router(v) |
            DhcpOption::DomainServer(v) => {
                encode_option(buf, code, |b| encode_ipv4_vec(b, v))
            }
            DhcpOption::HostName(v) |
            DhcpOption::DomainName(v) |
            DhcpOption::Message(v) |
            DhcpOption::VendorClassId(v) => {
                encode_option(buf, code, |b| encode_data(b, v.as_bytes()))
            }
            DhcpOption::AddressTime(v) |
            DhcpOption::RenewalTime(v) |
            DhcpOption::RebindingTime(v) => {
                encode_option(buf, code, |b| encode_u32(b, *v))
            }
            DhcpOption::DHCPMsgType(v) => {
                encode_option(buf, code, |b| encode_u8(b, *v as u8))
            }
            DhcpOption::ParameterList(v) |
            DhcpOption::ClientId(v) |
            DhcpOption::Unknown((_, v)) => {
                encode_option(buf, code, |b| encode_data(b, v))
            }
        }
    }
}

// Utility to decode an IPv4 address option body.
fn body_ipv4(body: &[u8]) -> Result<Ipv4Addr, DhcpError> {
    if body.len() != 4 {
        Err(DhcpError::InvalidOptionLength)
    } else {
        decode_ipv4(body)
    }
}

// Utility to decode a non-empty list of IPv4 addresses.
fn body_ipv4_vec(body: &[u8]) -> Result<Vec<Ipv4Addr>, DhcpError> {
    if body.is_empty() || body.len() % 4 != 0 {
        Err(DhcpError::InvalidOptionLength)
    } else {
        body.chunks(4).map(decode_ipv4).collect()
    }
}

// Utility to decode u32 option body.
fn body_u32(body: &[u8]) -> Result<u32, DhcpError> {
    if body.len() != 4 {
        Err(DhcpError::InvalidOptionLength)
    } else {
        decode_u32(body)
    }
}

// Utility to decode a string option body.
fn body_string(body: &[u8]) -> Result<String, DhcpError> {
    match std::str::from_utf8(body) {
        Ok(s) => Ok(s.to_string()),
        Err(err) => Err(DhcpError::DecodeError(format!("option string {}", err))),
    }
}

/// Encode an option header and let the closure fill in the body.
pub fn encode_option<F: Fn(&mut [u8]) -> Result<usize, DhcpError>>(buf: &mut [u8], code: u8, f: F) -> Result<usize, DhcpError> {
    if buf.len() < DHCP_OPTION_HLEN {
        return Err(DhcpError::InsufficientBufferSize(format!("for option {} header", code)))
    }

    let len = f(&mut buf[DHCP_OPTION_HLEN..])?;
    if len > u8::MAX as usize {
        return Err(DhcpError::EncodeError(format!("option {} too long ({})", code, len)))
    }

    encode_u8(&mut buf[0..], code)?;
    encode_u8(&mut buf[1..], len as u8)?;

    Ok(DHCP_OPTION_HLEN + len)
}

/// Parse DHCP options area up to End marker.
pub fn options_from(buf: &[u8]) -> Result<Vec<DhcpOption>, DhcpError> {
    let mut opt_vec = Vec::new();
    let mut b = buf;

    while !b.is_empty() {
        let code = b[0];
        if code == DhcpOptionCode::Pad as u8 {
            b = &b[1..];
            continue;
        }
        if code == DhcpOptionCode::End as u8 {
            break;
        }
        if b.len() < DHCP_OPTION_HLEN {
            return Err(DhcpError::InsufficientBufferSize(format!("for option {} header", code)))
        }

        let len = b[1] as usize;
        if b.len() < DHCP_OPTION_HLEN + len {
            return Err(DhcpError::InvalidOptionLength)
        }

        opt_vec.push(DhcpOption::decode_body(code, &b[DHCP_OPTION_HLEN..DHCP_OPTION_HLEN + len])?);
        b = &b[DHCP_OPTION_HLEN + len..];
    }

    Ok(opt_vec)
}

/// Encode a list of options, End marker not included.
pub fn options_to(options: &[DhcpOption], buf: &mut [u8]) -> Result<usize, DhcpError> {
    let mut len = 0;
    for opt in options {
        len += opt.encode(&mut buf[len..])?;
    }
    Ok(len)
}

///
/// Unit tests.
///
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn test_option_subnet_mask() {
        let buf: [u8; 6] = [1, 4, 255, 255, 255, 0];
        match options_from(&buf) {
            Ok(vec) => {
                assert_eq!(vec.len(), 1);
                assert_eq!(vec[0].to_string(), "SubnetMask(255.255.255.0)");
            }
            Err(err) => assert!(false, "Error: {:?}", err),
        }

        let buf: [u8; 5] = [1, 3, 255, 255, 255];
        assert_eq!(options_from(&buf), Err(DhcpError::InvalidOptionLength));
    }

    #[test]
    pub fn test_option_router() {
        let buf: [u8; 10] = [3, 8, 192, 168, 1, 1, 192, 168, 1, 2];
        match options_from(&buf) {
            Ok(vec) => {
                assert_eq!(vec.len(), 1);
                assert_eq!(vec[0].to_string(), "Router([192.168.1.1, 192.168.1.2])");
            }
            Err(err) => assert!(false, "Error: {:?}", err),
        }

        let buf: [u8; 2] = [3, 0];
        assert_eq!(options_from(&buf), Err(DhcpError::InvalidOptionLength));
    }

    #[test]
    pub fn test_option_host_name() {
        let buf: [u8; 13] = [12, 11, b'e', b'x', b'a', b'm', b'p', b'l', b'e', b'.', b'o', b'r', b'g'];
        match options_from(&buf) {
            Ok(vec) => assert_eq!(vec, vec![DhcpOption::HostName("example.org".to_string())]),
            Err(err) => assert!(false, "Error: {:?}", err),
        }
    }

    #[test]
    pub fn test_option_message_type() {
        let buf: [u8; 3] = [53, 1, 3];
        assert_eq!(options_from(&buf), Ok(vec![DhcpOption::DHCPMsgType(DhcpMessageType::DHCPREQUEST)]));

        let buf: [u8; 3] = [53, 1, 42];
        assert_eq!(options_from(&buf), Err(DhcpError::InvalidDhcpMessageType));

        let buf: [u8; 4] = [53, 2, 3, 3];
        assert_eq!(options_from(&buf), Err(DhcpError::InvalidOptionLength));
    }

    #[test]
    pub fn test_option_pad_end_unknown() {
        // Pad, Relay Agent Information (unknown here), End, trailing garbage.
        let buf: [u8; 9] = [0, 0, 82, 3, 1, 1, b'x', 255, 77];
        match options_from(&buf) {
            Ok(vec) => {
                assert_eq!(vec.len(), 1);
                assert_eq!(vec[0], DhcpOption::Unknown((82, vec![1, 1, b'x'])));
                assert_eq!(vec[0].code(), 82);
            }
            Err(err) => assert!(false, "Error: {:?}", err),
        }
    }

    #[test]
    pub fn test_option_truncated() {
        let buf: [u8; 4] = [51, 4, 0, 0];
        assert_eq!(options_from(&buf), Err(DhcpError::InvalidOptionLength));

        let buf: [u8; 1] = [51];
        match options_from(&buf) {
            Err(DhcpError::InsufficientBufferSize(_)) => {}
            res => assert!(false, "Unexpected {:?}", res),
        }
    }

    #[test]
    pub fn test_options_to() {
        let options = vec![
            DhcpOption::DHCPMsgType(DhcpMessageType::DHCPOFFER),
            DhcpOption::DHCPServerId(Ipv4Addr::new(10, 0, 0, 1)),
            DhcpOption::AddressTime(3600),
            DhcpOption::DomainServer(vec![Ipv4Addr::new(8, 8, 8, 8)]),
        ];
        let mut buf = [0u8; 64];
        match options_to(&options, &mut buf) {
            Ok(len) => {
                assert_eq!(len, 3 + 6 + 6 + 6);
                assert_eq!(&buf[..3], &[53, 1, 2]);
                assert_eq!(&buf[3..9], &[54, 4, 10, 0, 0, 1]);
                assert_eq!(&buf[9..15], &[51, 4, 0, 0, 0x0e, 0x10]);
                assert_eq!(options_from(&buf[..len]), Ok(options));
            }
            Err(err) => assert!(false, "Error: {:?}", err),
        }
    }

    #[test]
    pub fn test_encode_option_too_long() {
        let mut buf = [0u8; 512];
        let opt = DhcpOption::Message("x".repeat(300));
        match opt.encode(&mut buf) {
            Err(DhcpError::EncodeError(_)) => {}
            res => assert!(false, "Unexpected {:?}", res),
        }
    }
}
