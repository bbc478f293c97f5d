//
// DHCP-RS
//   Copyright (C) 2024-2025, Toshiaki Takada
//

pub mod encode;
pub mod options;
pub mod message;

use std::fmt;
use std::convert::TryFrom;

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum DhcpError {
    #[error("Invalid BOOTP Message Type")]
    InvalidBootpMessageType,
    #[error("Invalid DHCP Message Type")]
    InvalidDhcpMessageType,
    #[error("Unknown Option")]
    UnknownOption,
    #[error("Invalid Option Length")]
    InvalidOptionLength,
    #[error("Insufficient buffer size {0}")]
    InsufficientBufferSize(String),
    #[error("Invalid Value {0}")]
    InvalidValue(String),
    #[error("Encode error {0}")]
    EncodeError(String),
    #[error("Decode error {0}")]
    DecodeError(String),
}

/// BOOTP Message type.
#[derive(PartialEq, Copy, Clone)]
pub enum BootpMessageType {
    BOOTREQUEST = 1,
    BOOTREPLY = 2,
}

impl fmt::Debug for BootpMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            BootpMessageType::BOOTREQUEST => write!(f, "BOOTREQUEST"),
            BootpMessageType::BOOTREPLY => write!(f, "BOOTREPLY"),
        }
    }
}

impl TryFrom<u8> for BootpMessageType {
    type Error = DhcpError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(BootpMessageType::BOOTREQUEST),
            2 => Ok(BootpMessageType::BOOTREPLY),
            _ => Err(DhcpError::InvalidBootpMessageType),
        }
    }
}

/// DHCP Message Type, RFC2132 section 9.6.
#[derive(PartialEq, Copy, Clone)]
pub enum DhcpMessageType {
    DHCPDISCOVER = 1,
    DHCPOFFER = 2,
    DHCPREQUEST = 3,
    DHCPDECLINE = 4,
    DHCPACK = 5,
    DHCPNAK = 6,
    DHCPRELEASE = 7,
    DHCPINFORM = 8,
}

impl DhcpMessageType {
    /// Return BOOTP op code a message of this type is carried in.
    pub fn bootp_type(&self) -> BootpMessageType {
        match self {
            DhcpMessageType::DHCPOFFER |
            DhcpMessageType::DHCPACK |
            DhcpMessageType::DHCPNAK => BootpMessageType::BOOTREPLY,
            _ => BootpMessageType::BOOTREQUEST,
        }
    }
}

impl fmt::Debug for DhcpMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match &self {
            DhcpMessageType::DHCPDISCOVER => "DHCPDISCOVER",
            DhcpMessageType::DHCPOFFER => "DHCPOFFER",
            DhcpMessageType::DHCPREQUEST => "DHCPREQUEST",
            DhcpMessageType::DHCPDECLINE => "DHCPDECLINE",
            DhcpMessageType::DHCPACK => "DHCPACK",
            DhcpMessageType::DHCPNAK => "DHCPNAK",
            DhcpMessageType::DHCPRELEASE => "DHCPRELEASE",
            DhcpMessageType::DHCPINFORM => "DHCPINFORM",
        };
        write!(f, "{}", s)
    }
}

impl TryFrom<u8> for DhcpMessageType {
    type Error = DhcpError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(DhcpMessageType::DHCPDISCOVER),
            2 => Ok(DhcpMessageType::DHCPOFFER),
            3 => Ok(DhcpMessageType::DHCPREQUEST),
            4 => Ok(DhcpMessageType::DHCPDECLINE),
            5 => Ok(DhcpMessageType::DHCPACK),
            6 => Ok(DhcpMessageType::DHCPNAK),
            7 => Ok(DhcpMessageType::DHCPRELEASE),
            8 => Ok(DhcpMessageType::DHCPINFORM),
            _ => Err(DhcpError::InvalidDhcpMessageType),
        }
    }
}

/// DHCP Option Code.
///   https://www.iana.org/assignments/bootp-dhcp-parameters/bootp-dhcp-parameters.xhtml
///
/// Only codes the test server decodes into typed options are listed here,
/// everything else is carried as DhcpOption::Unknown.
#[derive(Debug, PartialEq, Copy, Clone)]
pub enum DhcpOptionCode {
    Pad = 0,					// RFC2132
    SubnetMask = 1,				// RFC2132
    Router = 3,					// RFC2132
    DomainServer = 6,				// RFC2132
    HostName = 12,				// RFC2132
    DomainName = 15,				// RFC2132
    AddressRequest = 50,			// RFC2132
    AddressTime = 51,				// RFC2132
    DHCPMsgType = 53,				// RFC2132
    DHCPServerId = 54,				// RFC2132
    ParameterList = 55,				// RFC2132
    Message = 56,				// RFC2132
    RenewalTime = 58,				// RFC2132
    RebindingTime = 59,				// RFC2132
    VendorClassId = 60,				// RFC2132
    ClientId = 61,				// RFC2132, RFC4361
    End = 255,					// RFC2132
}

impl TryFrom<u8> for DhcpOptionCode {
    type Error = DhcpError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(DhcpOptionCode::Pad),
            1 => Ok(DhcpOptionCode::SubnetMask),
            3 => Ok(DhcpOptionCode::Router),
            6 => Ok(DhcpOptionCode::DomainServer),
            12 => Ok(DhcpOptionCode::HostName),
            15 => Ok(DhcpOptionCode::DomainName),
            50 => Ok(DhcpOptionCode::AddressRequest),
            51 => Ok(DhcpOptionCode::AddressTime),
            53 => Ok(DhcpOptionCode::DHCPMsgType),
            54 => Ok(DhcpOptionCode::DHCPServerId),
            55 => Ok(DhcpOptionCode::ParameterList),
            56 => Ok(DhcpOptionCode::Message),
            58 => Ok(DhcpOptionCode::RenewalTime),
            59 => Ok(DhcpOptionCode::RebindingTime),
            60 => Ok(DhcpOptionCode::VendorClassId),
            61 => Ok(DhcpOptionCode::ClientId),
            255 => Ok(DhcpOptionCode::End),
            _ => Err(DhcpError::UnknownOption),
        }
    }
}
