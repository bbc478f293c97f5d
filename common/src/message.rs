//
// DHCP-RS
//   Copyright (C) 2024-2025, Toshiaki Takada
//

use std::fmt;
use std::net::Ipv4Addr;

use crate::*;
use crate::encode::*;
use crate::options::*;

/// DHCP magic cookie, RFC2131 section 3.
pub const DHCP_MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];

/// Length of BOOTP fixed part including magic cookie.
pub const DHCP_FIXED_LEN: usize = 240;

/// Minimum BOOTP datagram length, shorter frames are padded.
pub const BOOTP_MIN_LEN: usize = 300;

/// Flags field broadcast bit.
pub const BOOTP_FLAG_BROADCAST: u16 = 0x8000;

/// Hardware type for Ethernet.
pub const HTYPE_ETHERNET: u8 = 1;

/// DHCP message.
#[derive(Clone, PartialEq)]
pub struct DhcpMessage {
    /// Message type.
    pub op: BootpMessageType,

    /// Hardware type.
    pub htype: u8,

    /// Hardware address len.
    pub hlen: u8,

    /// Hops.
    pub hops: u8,

    /// Transaction ID.
    pub xid: u32,

    /// Seconds elapsed.
    pub secs: u16,

    /// BOOTP flags.
    pub flags: u16,

    /// Client IP address.
    pub ciaddr: Ipv4Addr,

    /// Your (client) IP address.
    pub yiaddr: Ipv4Addr,

    /// Next Server IP address.
    pub siaddr: Ipv4Addr,

    /// Relay agent IP address.
    pub giaddr: Ipv4Addr,

    /// Client Hardware address.
    pub chaddr: [u8; 16],

    /// Server host name.
    pub sname: [u8; 64],

    /// Boot file name.
    pub file: [u8; 128],

    /// Options.
    pub options: Vec<DhcpOption>,
}

fn chaddr_str(hlen: u8, chaddr: &[u8; 16]) -> String {
    let hlen = std::cmp::min(hlen as usize, chaddr.len());
    chaddr[..hlen]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

fn u8_to_string(s: &[u8]) -> String {
    let end = s.iter().position(|&c| c == 0).unwrap_or(s.len());
    if end == 0 {
        String::from("(empty)")
    } else {
        match std::str::from_utf8(&s[..end]) {
            Ok(s) => s.to_string(),
            Err(_) => String::from("(error)")
        }
    }
}

impl fmt::Debug for DhcpMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op: {:?}, htype: {}, hlen: {}, hops: {}, xid: {:#010x}, secs: {}, flags: {:#x}, ciaddr: {}, yiaddr: {}, siaddr: {}, giaddr: {}, chaddr: {}, sname: {}, file: {}, options: {:?}",
               self.op, self.htype, self.hlen, self.hops, self.xid, self.secs, self.flags,
               self.ciaddr, self.yiaddr, self.siaddr, self.giaddr, chaddr_str(self.hlen, &self.chaddr),
               u8_to_string(&self.sname), u8_to_string(&self.file), &self.options)
    }
}

/// DhcpMessage implementation.
impl DhcpMessage {
    /// Construct an empty message of the given DHCP type, everything else zero.
    pub fn new(msg_type: DhcpMessageType, xid: u32, hwaddr: &[u8; 6]) -> DhcpMessage {
        let mut chaddr = [0u8; 16];
        chaddr[..6].copy_from_slice(hwaddr);

        DhcpMessage {
            op: msg_type.bootp_type(),
            htype: HTYPE_ETHERNET,
            hlen: 6,
            hops: 0,
            xid,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr,
            sname: [0; 64],
            file: [0; 128],
            options: vec![DhcpOption::DHCPMsgType(msg_type)],
        }
    }

    /// Construct a reply to a client query, carrying over the fields
    /// a client uses to match the reply with its transaction.
    pub fn new_reply(query: &DhcpMessage, msg_type: DhcpMessageType) -> DhcpMessage {
        DhcpMessage {
            op: BootpMessageType::BOOTREPLY,
            htype: query.htype,
            hlen: query.hlen,
            hops: 0,
            xid: query.xid,
            secs: 0,
            flags: query.flags,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: query.giaddr,
            chaddr: query.chaddr,
            sname: [0; 64],
            file: [0; 128],
            options: vec![DhcpOption::DHCPMsgType(msg_type)],
        }
    }

    /// Parse DHCP message.
    pub fn new_from(buf: &[u8]) -> Result<DhcpMessage, DhcpError> {
        if buf.len() < DHCP_FIXED_LEN {
            return Err(DhcpError::DecodeError(format!("message too short ({})", buf.len())))
        }

        let cookie: [u8; 4] = decode_array(&buf[236..240])?;
        if cookie != DHCP_MAGIC_COOKIE {
            return Err(DhcpError::DecodeError(format!("bad magic cookie {:02x?}", cookie)))
        }

        let msg = DhcpMessage {
            op: decode_u8(&buf[0..])?.try_into()?,
            htype: decode_u8(&buf[1..])?,
            hlen: decode_u8(&buf[2..])?,
            hops: decode_u8(&buf[3..])?,
            xid: decode_u32(&buf[4..])?,
            secs: decode_u16(&buf[8..])?,
            flags: decode_u16(&buf[10..])?,
            ciaddr: decode_ipv4(&buf[12..])?,
            yiaddr: decode_ipv4(&buf[16..])?,
            siaddr: decode_ipv4(&buf[20..])?,
            giaddr: decode_ipv4(&buf[24..])?,
            chaddr: decode_array(&buf[28..44])?,
            sname: decode_array(&buf[44..108])?,
            file: decode_array(&buf[108..236])?,
            options: options_from(&buf[DHCP_FIXED_LEN..])?,
        };

        // A BOOTP frame without option 53 is not a DHCP message.
        if msg.message_type().is_none() {
            return Err(DhcpError::DecodeError("no DHCP message type option".to_string()))
        }

        Ok(msg)
    }

    /// Generate DHCP datagram from a message.
    pub fn octets(&self) -> Result<Vec<u8>, DhcpError> {
        // Big enough for an Ethernet MTU worth of options.
        let mut buf = vec![0u8; 1500];
        let mut len = DHCP_FIXED_LEN;

        // Encode BOOTP compatible fields.
        encode_u8(&mut buf[0..], self.op as u8)?;
        encode_u8(&mut buf[1..], self.htype)?;
        encode_u8(&mut buf[2..], self.hlen)?;
        encode_u8(&mut buf[3..], self.hops)?;
        encode_u32(&mut buf[4..], self.xid)?;
        encode_u16(&mut buf[8..], self.secs)?;
        encode_u16(&mut buf[10..], self.flags)?;
        encode_ipv4(&mut buf[12..], self.ciaddr)?;
        encode_ipv4(&mut buf[16..], self.yiaddr)?;
        encode_ipv4(&mut buf[20..], self.siaddr)?;
        encode_ipv4(&mut buf[24..], self.giaddr)?;
        encode_data(&mut buf[28..], &self.chaddr)?;
        encode_data(&mut buf[44..], &self.sname)?;
        encode_data(&mut buf[108..], &self.file)?;
        encode_data(&mut buf[236..], &DHCP_MAGIC_COOKIE)?;

        len += options_to(&self.options, &mut buf[len..])?;
        len += encode_u8(&mut buf[len..], DhcpOptionCode::End as u8)?;

        buf.truncate(std::cmp::max(len, BOOTP_MIN_LEN));
        Ok(buf)
    }

    /// Return DHCP message type from option 53.
    pub fn message_type(&self) -> Option<DhcpMessageType> {
        self.options.iter().find_map(|opt| match opt {
            DhcpOption::DHCPMsgType(t) => Some(*t),
            _ => None,
        })
    }

    /// Return the first option with the given code.
    pub fn option(&self, code: DhcpOptionCode) -> Option<&DhcpOption> {
        self.options.iter().find(|opt| opt.code() == code as u8)
    }

    /// Return requested IP address (option 50).
    pub fn requested_ip(&self) -> Option<Ipv4Addr> {
        match self.option(DhcpOptionCode::AddressRequest) {
            Some(DhcpOption::AddressRequest(addr)) => Some(*addr),
            _ => None,
        }
    }

    /// Return server identifier (option 54).
    pub fn server_id(&self) -> Option<Ipv4Addr> {
        match self.option(DhcpOptionCode::DHCPServerId) {
            Some(DhcpOption::DHCPServerId(addr)) => Some(*addr),
            _ => None,
        }
    }

    /// Replace an option of the same code, or append it.
    pub fn set_option(&mut self, option: DhcpOption) {
        let code = option.code();
        match self.options.iter().position(|opt| opt.code() == code) {
            Some(index) => self.options[index] = option,
            None => self.options.push(option),
        }
    }

    /// Client hardware address as a colon separated string.
    pub fn client_hwaddr(&self) -> String {
        chaddr_str(self.hlen, &self.chaddr)
    }
}
