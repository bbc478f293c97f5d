//
// DHCP-RS
//   Copyright (C) 2024-2025, Toshiaki Takada
//

pub mod config;
pub mod rule;
pub mod rules;
pub mod session;
pub mod server;

use thiserror::Error;

pub use common::DhcpError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("I/O error {0}")]
    Io(#[from] std::io::Error),
    #[error("Socket error {0}")]
    Socket(#[from] nix::Error),
    #[error("Handling rule error {0}")]
    Rule(#[from] DhcpError),
    #[error("Server thread panicked: {0}")]
    Panic(String),
    #[error("Config error {0}")]
    Config(String),
}
