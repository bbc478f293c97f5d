//
// DHCP-RS
//   Copyright (C) 2024-2025, Toshiaki Takada
//

use std::fs;
use std::net::Ipv4Addr;
use std::net::SocketAddrV4;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::ServerError;

/// Standard DHCP server port.
pub const DHCP_SERVER_PORT: u16 = 67;

/// Standard DHCP client port.
pub const DHCP_CLIENT_PORT: u16 = 68;

const DEFAULT_TEST_TIMEOUT: u64 = 30;
const DEFAULT_LEASE_TIME: u32 = 3600;

#[derive(Debug, Default, Clone, Deserialize)]
pub struct Config {
    pub debug: Option<bool>,
    pub ingress: Option<ConfigEndpoint>,
    pub broadcast: Option<ConfigEndpoint>,
    pub interface: Option<String>,
    pub lease: Option<ConfigLease>,
}

impl Config {
    /// Load JSON config from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, ServerError> {
        let path = path.as_ref();
        let s = fs::read_to_string(path)
            .map_err(|err| ServerError::Config(format!("{}: {}", path.display(), err)))?;
        Config::from_json(&s)
    }

    /// Parse JSON config.
    pub fn from_json(s: &str) -> Result<Config, ServerError> {
        serde_json::from_str(s).map_err(|err| ServerError::Config(err.to_string()))
    }

    pub fn is_debug_enabled(&self) -> bool {
        self.debug.unwrap_or(false)
    }

    /// Local address the server socket binds to.
    pub fn ingress_addr(&self) -> SocketAddrV4 {
        ConfigEndpoint::or_default(&self.ingress, DHCP_SERVER_PORT)
    }

    /// Destination of every reply.
    pub fn broadcast_addr(&self) -> SocketAddrV4 {
        ConfigEndpoint::or_default(&self.broadcast, DHCP_CLIENT_PORT)
    }

    /// Builder style setters, mostly for tests.
    pub fn with_ingress(mut self, address: Ipv4Addr, port: u16) -> Config {
        self.ingress = Some(ConfigEndpoint { address: Some(address), port: Some(port) });
        self
    }

    pub fn with_broadcast(mut self, address: Ipv4Addr, port: u16) -> Config {
        self.broadcast = Some(ConfigEndpoint { address: Some(address), port: Some(port) });
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigEndpoint {
    pub address: Option<Ipv4Addr>,
    pub port: Option<u16>,
}

impl ConfigEndpoint {
    fn or_default(endpoint: &Option<ConfigEndpoint>, port: u16) -> SocketAddrV4 {
        let (address, port) = match endpoint {
            Some(e) => (e.address.unwrap_or(Ipv4Addr::BROADCAST), e.port.unwrap_or(port)),
            None => (Ipv4Addr::BROADCAST, port),
        };
        SocketAddrV4::new(address, port)
    }
}

/// Lease handed out by the default DISCOVER/REQUEST exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigLease {
    pub intended_ip: Ipv4Addr,
    pub server_ip: Ipv4Addr,
    pub subnet_mask: Option<Ipv4Addr>,
    pub router: Option<Ipv4Addr>,
    pub dns: Option<Vec<Ipv4Addr>>,
    pub lease_time: Option<u32>,
    pub test_timeout: Option<u64>,
}

impl ConfigLease {
    pub fn lease_time(&self) -> u32 {
        self.lease_time.unwrap_or(DEFAULT_LEASE_TIME)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout.unwrap_or(DEFAULT_TEST_TIMEOUT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn test_config_default() {
        let config = Config::default();
        assert!(!config.is_debug_enabled());
        assert_eq!(config.ingress_addr(), SocketAddrV4::new(Ipv4Addr::BROADCAST, 67));
        assert_eq!(config.broadcast_addr(), SocketAddrV4::new(Ipv4Addr::BROADCAST, 68));
        assert!(config.interface.is_none());
    }

    #[test]
    pub fn test_config_json() {
        let s = r#"{
            "debug": true,
            "interface": "pseudoethernet0",
            "ingress": { "port": 6767 },
            "broadcast": { "address": "127.0.0.1", "port": 6868 },
            "lease": {
                "intended_ip": "192.168.100.20",
                "server_ip": "192.168.100.1",
                "dns": ["8.8.8.8", "8.8.4.4"],
                "test_timeout": 5
            }
        }"#;

        match Config::from_json(s) {
            Ok(config) => {
                assert!(config.is_debug_enabled());
                assert_eq!(config.interface.as_deref(), Some("pseudoethernet0"));
                assert_eq!(config.ingress_addr(), SocketAddrV4::new(Ipv4Addr::BROADCAST, 6767));
                assert_eq!(config.broadcast_addr(), SocketAddrV4::new(Ipv4Addr::LOCALHOST, 6868));

                let lease = config.lease.unwrap();
                assert_eq!(lease.intended_ip, Ipv4Addr::new(192, 168, 100, 20));
                assert_eq!(lease.dns.as_ref().map(|v| v.len()), Some(2));
                assert_eq!(lease.lease_time(), 3600);
                assert_eq!(lease.test_timeout(), Duration::from_secs(5));
            }
            Err(err) => assert!(false, "Error: {:?}", err),
        }
    }

    #[test]
    pub fn test_config_error() {
        match Config::from_json(r#"{ "ingress": { "address": "not-an-address" } }"#) {
            Err(ServerError::Config(_)) => {}
            res => assert!(false, "Unexpected {:?}", res),
        }
        match Config::from_file("/nonexistent/testserver.json") {
            Err(ServerError::Config(_)) => {}
            res => assert!(false, "Unexpected {:?}", res),
        }
    }
}
