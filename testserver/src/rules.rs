//
// DHCP-RS
//   Copyright (C) 2024-2025, Toshiaki Takada
//
// Rules:
//  Handling rules for the usual DHCP exchanges.  Each rule expects one
//  message type; packets of any other type are ignored so that a client
//  retransmitting an earlier message does not break the chain.
//

use std::net::Ipv4Addr;

use tracing::debug;
use tracing::info;
use tracing::warn;

use common::DhcpError;
use common::DhcpMessageType;
use common::message::DhcpMessage;
use common::options::DhcpOption;

use crate::rule::*;

/// Lease parameters carried in OFFER and ACK.
#[derive(Debug, Clone, Default)]
pub struct LeaseOptions {
    pub subnet_mask: Option<Ipv4Addr>,
    pub router: Option<Ipv4Addr>,
    pub dns: Vec<Ipv4Addr>,
    pub lease_time: Option<u32>,
}

impl LeaseOptions {
    fn options(&self) -> Vec<DhcpOption> {
        let mut options = Vec::new();
        if let Some(mask) = self.subnet_mask {
            options.push(DhcpOption::SubnetMask(mask));
        }
        if let Some(router) = self.router {
            options.push(DhcpOption::Router(vec![router]));
        }
        if !self.dns.is_empty() {
            options.push(DhcpOption::DomainServer(self.dns.clone()));
        }
        if let Some(lease_time) = self.lease_time {
            options.push(DhcpOption::AddressTime(lease_time));
        }
        options
    }
}

/// State common to every DHCP rule.
#[derive(Debug, Clone)]
pub struct RuleBase {

    /// Message type this rule reacts to.
    message_type: DhcpMessageType,

    /// Server identifier put in every reply.
    server_ip: Ipv4Addr,

    /// Lease parameters.
    lease: LeaseOptions,

    /// Options appended to replies, replacing lease options of the same code.
    additional_options: Vec<DhcpOption>,

    /// Passing this rule ends the test successfully.
    is_final_handler: bool,

    /// Send a reply when the packet is accepted.
    should_respond: bool,
}

impl RuleBase {
    pub fn new(message_type: DhcpMessageType, server_ip: Ipv4Addr, lease: LeaseOptions) -> RuleBase {
        RuleBase {
            message_type,
            server_ip,
            lease,
            additional_options: Vec::new(),
            is_final_handler: false,
            should_respond: true,
        }
    }

    /// Return true if the packet has the message type this rule expects.
    fn matches(&self, name: &str, packet: &DhcpMessage) -> bool {
        match packet.message_type() {
            Some(t) if t == self.message_type => {
                debug!("{}: {:?} from {}", name, t, packet.client_hwaddr());
                true
            }
            t => {
                info!("{}: ignoring {:?}, waiting for {:?}", name, t, self.message_type);
                false
            }
        }
    }

    /// Response code for a packet the rule accepts.
    fn accept(&self) -> ResponseCode {
        let mut code = ResponseCode::POP_HANDLER;
        if self.should_respond {
            code |= ResponseCode::HAVE_RESPONSE;
        }
        if self.is_final_handler {
            code |= ResponseCode::TEST_SUCCEEDED;
        }
        code
    }

    /// Build a reply; NAKs carry no lease parameters.
    fn reply(&self, query: &DhcpMessage, msg_type: DhcpMessageType, yiaddr: Ipv4Addr) -> DhcpMessage {
        let mut reply = DhcpMessage::new_reply(query, msg_type);
        reply.yiaddr = yiaddr;
        reply.set_option(DhcpOption::DHCPServerId(self.server_ip));
        if msg_type != DhcpMessageType::DHCPNAK {
            reply.siaddr = self.server_ip;
            for opt in self.lease.options() {
                reply.set_option(opt);
            }
            for opt in &self.additional_options {
                reply.set_option(opt.clone());
            }
        }
        reply
    }
}

/// Builder methods shared by DHCP rules.
pub trait DhcpRule: Sized {
    fn base_mut(&mut self) -> &mut RuleBase;

    fn is_final_handler(mut self, is_final: bool) -> Self {
        self.base_mut().is_final_handler = is_final;
        self
    }

    fn should_respond(mut self, respond: bool) -> Self {
        self.base_mut().should_respond = respond;
        self
    }

    fn with_option(mut self, option: DhcpOption) -> Self {
        self.base_mut().additional_options.push(option);
        self
    }
}

macro_rules! impl_dhcp_rule {
    ($($t:ty),*) => {
        $(
            impl DhcpRule for $t {
                fn base_mut(&mut self) -> &mut RuleBase {
                    &mut self.base
                }
            }
        )*
    };
}

/// Answer a DISCOVER with an OFFER of intended_ip.
pub struct RespondToDiscovery {
    base: RuleBase,
    intended_ip: Ipv4Addr,
}

impl RespondToDiscovery {
    pub fn new(intended_ip: Ipv4Addr, server_ip: Ipv4Addr, lease: LeaseOptions) -> Self {
        RespondToDiscovery {
            base: RuleBase::new(DhcpMessageType::DHCPDISCOVER, server_ip, lease),
            intended_ip,
        }
    }
}

impl HandlingRule for RespondToDiscovery {
    fn name(&self) -> String {
        format!("RespondToDiscovery({})", self.intended_ip)
    }

    fn handle(&mut self, packet: &DhcpMessage) -> Result<ResponseCode, DhcpError> {
        if !self.base.matches(&self.name(), packet) {
            return Ok(ResponseCode::empty())
        }
        Ok(self.base.accept())
    }

    fn respond(&mut self, packet: &DhcpMessage) -> Result<Option<DhcpMessage>, DhcpError> {
        Ok(Some(self.base.reply(packet, DhcpMessageType::DHCPOFFER, self.intended_ip)))
    }
}

/// Answer a REQUEST with an ACK, optionally checking what the client asked for.
pub struct RespondToRequest {
    base: RuleBase,
    intended_ip: Ipv4Addr,
    expected_requested_ip: Option<Ipv4Addr>,
    expected_server_ip: Option<Ipv4Addr>,
}

impl RespondToRequest {
    pub fn new(intended_ip: Ipv4Addr, server_ip: Ipv4Addr, lease: LeaseOptions) -> Self {
        RespondToRequest {
            base: RuleBase::new(DhcpMessageType::DHCPREQUEST, server_ip, lease),
            intended_ip,
            expected_requested_ip: None,
            expected_server_ip: None,
        }
    }

    /// Fail the test unless option 50 carries this address.
    pub fn expect_requested_ip(mut self, addr: Ipv4Addr) -> Self {
        self.expected_requested_ip = Some(addr);
        self
    }

    /// Fail the test unless option 54 carries this address.
    pub fn expect_server_ip(mut self, addr: Ipv4Addr) -> Self {
        self.expected_server_ip = Some(addr);
        self
    }
}

impl HandlingRule for RespondToRequest {
    fn name(&self) -> String {
        format!("RespondToRequest({})", self.intended_ip)
    }

    fn handle(&mut self, packet: &DhcpMessage) -> Result<ResponseCode, DhcpError> {
        let name = self.name();
        if !self.base.matches(&name, packet) {
            return Ok(ResponseCode::empty())
        }

        if let Some(expected) = self.expected_requested_ip {
            if packet.requested_ip() != Some(expected) {
                warn!("{}: requested IP {:?}, expected {}", name, packet.requested_ip(), expected);
                return Ok(ResponseCode::TEST_FAILED)
            }
        }
        if let Some(expected) = self.expected_server_ip {
            if packet.server_id() != Some(expected) {
                warn!("{}: server ID {:?}, expected {}", name, packet.server_id(), expected);
                return Ok(ResponseCode::TEST_FAILED)
            }
        }

        Ok(self.base.accept())
    }

    fn respond(&mut self, packet: &DhcpMessage) -> Result<Option<DhcpMessage>, DhcpError> {
        Ok(Some(self.base.reply(packet, DhcpMessageType::DHCPACK, self.intended_ip)))
    }
}

/// Answer a REQUEST sent in REBINDING state (after T2), which carries
/// no server identifier and the current address in ciaddr.
pub struct RespondToPostT2Request {
    base: RuleBase,
    intended_ip: Ipv4Addr,
    expected_ciaddr: Option<Ipv4Addr>,
}

impl RespondToPostT2Request {
    pub fn new(intended_ip: Ipv4Addr, server_ip: Ipv4Addr, lease: LeaseOptions) -> Self {
        RespondToPostT2Request {
            base: RuleBase::new(DhcpMessageType::DHCPREQUEST, server_ip, lease),
            intended_ip,
            expected_ciaddr: None,
        }
    }

    pub fn expect_ciaddr(mut self, addr: Ipv4Addr) -> Self {
        self.expected_ciaddr = Some(addr);
        self
    }
}

impl HandlingRule for RespondToPostT2Request {
    fn name(&self) -> String {
        format!("RespondToPostT2Request({})", self.intended_ip)
    }

    fn handle(&mut self, packet: &DhcpMessage) -> Result<ResponseCode, DhcpError> {
        let name = self.name();
        if !self.base.matches(&name, packet) {
            return Ok(ResponseCode::empty())
        }

        if let Some(server_id) = packet.server_id() {
            warn!("{}: rebinding REQUEST carries server ID {}", name, server_id);
            return Ok(ResponseCode::TEST_FAILED)
        }
        if let Some(expected) = self.expected_ciaddr {
            if packet.ciaddr != expected {
                warn!("{}: ciaddr {}, expected {}", name, packet.ciaddr, expected);
                return Ok(ResponseCode::TEST_FAILED)
            }
        }

        Ok(self.base.accept())
    }

    fn respond(&mut self, packet: &DhcpMessage) -> Result<Option<DhcpMessage>, DhcpError> {
        Ok(Some(self.base.reply(packet, DhcpMessageType::DHCPACK, self.intended_ip)))
    }
}

/// Answer a REQUEST with a NAK.
pub struct RejectRequest {
    base: RuleBase,
}

impl RejectRequest {
    pub fn new(server_ip: Ipv4Addr) -> Self {
        RejectRequest {
            base: RuleBase::new(DhcpMessageType::DHCPREQUEST, server_ip, LeaseOptions::default()),
        }
    }
}

impl HandlingRule for RejectRequest {
    fn name(&self) -> String {
        "RejectRequest".to_string()
    }

    fn handle(&mut self, packet: &DhcpMessage) -> Result<ResponseCode, DhcpError> {
        if !self.base.matches(&self.name(), packet) {
            return Ok(ResponseCode::empty())
        }
        Ok(self.base.accept())
    }

    fn respond(&mut self, packet: &DhcpMessage) -> Result<Option<DhcpMessage>, DhcpError> {
        Ok(Some(self.base.reply(packet, DhcpMessageType::DHCPNAK, Ipv4Addr::UNSPECIFIED)))
    }
}

/// Answer a single REQUEST with a NAK followed by an ACK.
pub struct RejectAndRespondToRequest {
    base: RuleBase,
    intended_ip: Ipv4Addr,
    sent: usize,
}

impl RejectAndRespondToRequest {
    pub fn new(intended_ip: Ipv4Addr, server_ip: Ipv4Addr, lease: LeaseOptions) -> Self {
        RejectAndRespondToRequest {
            base: RuleBase::new(DhcpMessageType::DHCPREQUEST, server_ip, lease),
            intended_ip,
            sent: 0,
        }
    }
}

impl HandlingRule for RejectAndRespondToRequest {
    fn name(&self) -> String {
        format!("RejectAndRespondToRequest({})", self.intended_ip)
    }

    fn handle(&mut self, packet: &DhcpMessage) -> Result<ResponseCode, DhcpError> {
        if !self.base.matches(&self.name(), packet) {
            return Ok(ResponseCode::empty())
        }
        Ok(self.base.accept())
    }

    fn respond(&mut self, packet: &DhcpMessage) -> Result<Option<DhcpMessage>, DhcpError> {
        let reply = if self.sent % 2 == 0 {
            self.base.reply(packet, DhcpMessageType::DHCPNAK, Ipv4Addr::UNSPECIFIED)
        } else {
            self.base.reply(packet, DhcpMessageType::DHCPACK, self.intended_ip)
        };
        self.sent += 1;
        Ok(Some(reply))
    }

    fn response_packet_count(&self) -> usize {
        2
    }
}

/// Expect a RELEASE; nothing is sent back.
pub struct AcceptRelease {
    base: RuleBase,
}

impl AcceptRelease {
    pub fn new(server_ip: Ipv4Addr) -> Self {
        let mut base = RuleBase::new(DhcpMessageType::DHCPRELEASE, server_ip, LeaseOptions::default());
        base.should_respond = false;
        AcceptRelease { base }
    }

    pub fn is_final_handler(mut self, is_final: bool) -> Self {
        self.base.is_final_handler = is_final;
        self
    }
}

impl HandlingRule for AcceptRelease {
    fn name(&self) -> String {
        "AcceptRelease".to_string()
    }

    fn handle(&mut self, packet: &DhcpMessage) -> Result<ResponseCode, DhcpError> {
        if !self.base.matches(&self.name(), packet) {
            return Ok(ResponseCode::empty())
        }
        Ok(self.base.accept())
    }

    fn respond(&mut self, _packet: &DhcpMessage) -> Result<Option<DhcpMessage>, DhcpError> {
        Err(DhcpError::InvalidValue("AcceptRelease never sends a reply".to_string()))
    }
}

/// Expect a DECLINE; nothing is sent back.
pub struct AcceptDecline {
    base: RuleBase,
}

impl AcceptDecline {
    pub fn new(server_ip: Ipv4Addr) -> Self {
        let mut base = RuleBase::new(DhcpMessageType::DHCPDECLINE, server_ip, LeaseOptions::default());
        base.should_respond = false;
        AcceptDecline { base }
    }

    pub fn is_final_handler(mut self, is_final: bool) -> Self {
        self.base.is_final_handler = is_final;
        self
    }
}

impl HandlingRule for AcceptDecline {
    fn name(&self) -> String {
        "AcceptDecline".to_string()
    }

    fn handle(&mut self, packet: &DhcpMessage) -> Result<ResponseCode, DhcpError> {
        if !self.base.matches(&self.name(), packet) {
            return Ok(ResponseCode::empty())
        }
        Ok(self.base.accept())
    }

    fn respond(&mut self, _packet: &DhcpMessage) -> Result<Option<DhcpMessage>, DhcpError> {
        Err(DhcpError::InvalidValue("AcceptDecline never sends a reply".to_string()))
    }
}

impl_dhcp_rule!(RespondToDiscovery, RespondToRequest, RespondToPostT2Request,
                RejectRequest, RejectAndRespondToRequest);

///
/// Unit tests.
///
#[cfg(test)]
mod tests {
    use super::*;

    const HWADDR: [u8; 6] = [0x02, 0x11, 0x22, 0x33, 0x44, 0x55];
    const INTENDED_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 100, 20);
    const SERVER_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 100, 1);

    fn lease() -> LeaseOptions {
        LeaseOptions {
            subnet_mask: Some(Ipv4Addr::new(255, 255, 255, 0)),
            router: Some(SERVER_IP),
            dns: vec![Ipv4Addr::new(8, 8, 8, 8)],
            lease_time: Some(3600),
        }
    }

    fn query(msg_type: DhcpMessageType) -> DhcpMessage {
        DhcpMessage::new(msg_type, 0x1234, &HWADDR)
    }

    fn request(requested: Option<Ipv4Addr>, server_id: Option<Ipv4Addr>) -> DhcpMessage {
        let mut msg = query(DhcpMessageType::DHCPREQUEST);
        if let Some(addr) = requested {
            msg.options.push(DhcpOption::AddressRequest(addr));
        }
        if let Some(addr) = server_id {
            msg.options.push(DhcpOption::DHCPServerId(addr));
        }
        msg
    }

    #[test]
    pub fn test_respond_to_discovery() {
        let mut rule = RespondToDiscovery::new(INTENDED_IP, SERVER_IP, lease());
        assert_eq!(rule.name(), "RespondToDiscovery(192.168.100.20)");

        let discover = query(DhcpMessageType::DHCPDISCOVER);
        assert_eq!(rule.handle(&discover), Ok(ResponseCode::POP_HANDLER | ResponseCode::HAVE_RESPONSE));

        match rule.respond(&discover) {
            Ok(Some(offer)) => {
                assert_eq!(offer.message_type(), Some(DhcpMessageType::DHCPOFFER));
                assert_eq!(offer.xid, 0x1234);
                assert_eq!(offer.yiaddr, INTENDED_IP);
                assert_eq!(offer.server_id(), Some(SERVER_IP));
                assert_eq!(offer.option(common::DhcpOptionCode::AddressTime),
                           Some(&DhcpOption::AddressTime(3600)));
                assert_eq!(offer.option(common::DhcpOptionCode::SubnetMask),
                           Some(&DhcpOption::SubnetMask(Ipv4Addr::new(255, 255, 255, 0))));
            }
            res => assert!(false, "Unexpected {:?}", res),
        }
    }

    #[test]
    pub fn test_wrong_message_type_is_ignored() {
        let mut rule = RespondToDiscovery::new(INTENDED_IP, SERVER_IP, lease());
        assert_eq!(rule.handle(&request(None, None)), Ok(ResponseCode::empty()));

        let mut rule = AcceptRelease::new(SERVER_IP);
        assert_eq!(rule.handle(&query(DhcpMessageType::DHCPDISCOVER)), Ok(ResponseCode::empty()));
    }

    #[test]
    pub fn test_rule_builders() {
        let mut rule = RespondToDiscovery::new(INTENDED_IP, SERVER_IP, lease())
            .is_final_handler(true)
            .should_respond(false);
        assert_eq!(rule.handle(&query(DhcpMessageType::DHCPDISCOVER)),
                   Ok(ResponseCode::POP_HANDLER | ResponseCode::TEST_SUCCEEDED));

        let mut rule = RespondToRequest::new(INTENDED_IP, SERVER_IP, lease())
            .with_option(DhcpOption::AddressTime(60))
            .with_option(DhcpOption::DomainName("example.org".to_string()));
        let req = request(Some(INTENDED_IP), Some(SERVER_IP));
        match rule.respond(&req) {
            Ok(Some(ack)) => {
                assert_eq!(ack.option(common::DhcpOptionCode::AddressTime),
                           Some(&DhcpOption::AddressTime(60)));
                assert_eq!(ack.option(common::DhcpOptionCode::DomainName),
                           Some(&DhcpOption::DomainName("example.org".to_string())));
            }
            res => assert!(false, "Unexpected {:?}", res),
        }
    }

    #[test]
    pub fn test_respond_to_request_expectations() {
        let mut rule = RespondToRequest::new(INTENDED_IP, SERVER_IP, lease())
            .expect_requested_ip(INTENDED_IP)
            .expect_server_ip(SERVER_IP)
            .is_final_handler(true);

        assert_eq!(rule.handle(&request(Some(INTENDED_IP), Some(SERVER_IP))),
                   Ok(ResponseCode::POP_HANDLER | ResponseCode::HAVE_RESPONSE | ResponseCode::TEST_SUCCEEDED));
        assert_eq!(rule.handle(&request(Some(Ipv4Addr::new(192, 168, 100, 99)), Some(SERVER_IP))),
                   Ok(ResponseCode::TEST_FAILED));
        assert_eq!(rule.handle(&request(Some(INTENDED_IP), None)),
                   Ok(ResponseCode::TEST_FAILED));

        match rule.respond(&request(Some(INTENDED_IP), Some(SERVER_IP))) {
            Ok(Some(ack)) => {
                assert_eq!(ack.message_type(), Some(DhcpMessageType::DHCPACK));
                assert_eq!(ack.yiaddr, INTENDED_IP);
            }
            res => assert!(false, "Unexpected {:?}", res),
        }
    }

    #[test]
    pub fn test_respond_to_post_t2_request() {
        let mut rule = RespondToPostT2Request::new(INTENDED_IP, SERVER_IP, lease())
            .expect_ciaddr(INTENDED_IP);

        let mut rebind = request(None, None);
        rebind.ciaddr = INTENDED_IP;
        assert_eq!(rule.handle(&rebind), Ok(ResponseCode::POP_HANDLER | ResponseCode::HAVE_RESPONSE));

        let mut renew = request(None, Some(SERVER_IP));
        renew.ciaddr = INTENDED_IP;
        assert_eq!(rule.handle(&renew), Ok(ResponseCode::TEST_FAILED));

        let wrong = request(None, None);
        assert_eq!(rule.handle(&wrong), Ok(ResponseCode::TEST_FAILED));
    }

    #[test]
    pub fn test_reject_request() {
        let mut rule = RejectRequest::new(SERVER_IP);
        let req = request(Some(INTENDED_IP), Some(SERVER_IP));
        assert_eq!(rule.handle(&req), Ok(ResponseCode::POP_HANDLER | ResponseCode::HAVE_RESPONSE));

        match rule.respond(&req) {
            Ok(Some(nak)) => {
                assert_eq!(nak.message_type(), Some(DhcpMessageType::DHCPNAK));
                assert_eq!(nak.yiaddr, Ipv4Addr::UNSPECIFIED);
                assert_eq!(nak.server_id(), Some(SERVER_IP));
                assert_eq!(nak.options.len(), 2);
            }
            res => assert!(false, "Unexpected {:?}", res),
        }
    }

    #[test]
    pub fn test_reject_and_respond_to_request() {
        let mut rule = RejectAndRespondToRequest::new(INTENDED_IP, SERVER_IP, lease());
        assert_eq!(rule.response_packet_count(), 2);

        let req = request(Some(INTENDED_IP), None);
        assert!(rule.handle(&req).unwrap().contains(ResponseCode::HAVE_RESPONSE));

        let first = rule.respond(&req).unwrap().unwrap();
        let second = rule.respond(&req).unwrap().unwrap();
        assert_eq!(first.message_type(), Some(DhcpMessageType::DHCPNAK));
        assert_eq!(second.message_type(), Some(DhcpMessageType::DHCPACK));
        assert_eq!(second.yiaddr, INTENDED_IP);
    }

    #[test]
    pub fn test_accept_release_and_decline() {
        let mut rule = AcceptRelease::new(SERVER_IP).is_final_handler(true);
        assert_eq!(rule.handle(&query(DhcpMessageType::DHCPRELEASE)),
                   Ok(ResponseCode::POP_HANDLER | ResponseCode::TEST_SUCCEEDED));
        assert!(rule.respond(&query(DhcpMessageType::DHCPRELEASE)).is_err());

        let mut rule = AcceptDecline::new(SERVER_IP).is_final_handler(true);
        let code = rule.handle(&query(DhcpMessageType::DHCPDECLINE)).unwrap();
        assert_eq!(code, ResponseCode::POP_HANDLER | ResponseCode::TEST_SUCCEEDED);
        assert!(!code.contains(ResponseCode::HAVE_RESPONSE));
        assert_eq!(rule.respond(&query(DhcpMessageType::DHCPDECLINE)),
                   Err(DhcpError::InvalidValue("AcceptDecline never sends a reply".to_string())));
    }
}
