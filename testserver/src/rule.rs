//
// DHCP-RS
//   Copyright (C) 2024-2025, Toshiaki Takada
//
// Rule:
//  Contract between the test server and handling rules.  Only the rule at
//  the head of the chain sees a packet, and its response code tells the
//  server what to do next.
//

use std::fmt;

use bitflags::bitflags;
use common::DhcpError;
use common::message::DhcpMessage;

bitflags! {
    /// Response code returned by HandlingRule::handle().  Bits are
    /// independent; an empty code means ignore the packet and keep going.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct ResponseCode: u8 {
        /// Retire the rule at the head of the chain.
        const POP_HANDLER = 1 << 0;
        /// Call respond() response_packet_count() times and send results.
        const HAVE_RESPONSE = 1 << 1;
        /// End the test as failed.
        const TEST_FAILED = 1 << 2;
        /// End the test as passed.
        const TEST_SUCCEEDED = 1 << 3;
    }
}

/// Packet codec used by the server loop.
pub trait Packet: Sized + fmt::Debug + Send + 'static {
    /// Parse a datagram; an error means the packet is invalid and is dropped.
    fn from_bytes(buf: &[u8]) -> Result<Self, DhcpError>;

    /// Serialize for transmission.
    fn to_bytes(&self) -> Result<Vec<u8>, DhcpError>;
}

impl Packet for DhcpMessage {
    fn from_bytes(buf: &[u8]) -> Result<Self, DhcpError> {
        DhcpMessage::new_from(buf)
    }

    fn to_bytes(&self) -> Result<Vec<u8>, DhcpError> {
        self.octets()
    }
}

/// Handling rule trait.
pub trait HandlingRule<P: Packet = DhcpMessage>: Send {

    /// Name shown in logs and by DhcpTestServer::current_rule().
    fn name(&self) -> String;

    /// Inspect a packet and decide what happens to it.
    fn handle(&mut self, packet: &P) -> Result<ResponseCode, DhcpError>;

    /// Build a reply; only called when handle() returned HAVE_RESPONSE.
    /// Ok(None) means the rule could not produce one and fails the test.
    fn respond(&mut self, packet: &P) -> Result<Option<P>, DhcpError>;

    /// Number of times respond() is called per handled packet.
    fn response_packet_count(&self) -> usize {
        1
    }
}
