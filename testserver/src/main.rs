//
// DHCP-RS
//   Copyright (C) 2024-2025, Toshiaki Takada
//

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use testserver::config::*;
use testserver::rule::*;
use testserver::rules::*;
use testserver::server::*;

/// Serve one DISCOVER/OFFER/REQUEST/ACK exchange and report the outcome.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON config file.
    #[arg(short, long)]
    config: PathBuf,

    /// Network interface to bind to, overrides the config.
    #[arg(short, long)]
    interface: Option<String>,

    /// Test timeout in seconds, overrides the config.
    #[arg(short, long)]
    timeout: Option<u64>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };
    if args.interface.is_some() {
        config.interface = args.interface;
    }

    let default_level = if config.is_debug_enabled() { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let lease = match &config.lease {
        Some(lease) => lease.clone(),
        None => {
            error!("No lease configured in {}", args.config.display());
            return ExitCode::FAILURE;
        }
    };
    let timeout = args.timeout.map(Duration::from_secs).unwrap_or_else(|| lease.test_timeout());

    let options = LeaseOptions {
        subnet_mask: lease.subnet_mask,
        router: lease.router,
        dns: lease.dns.clone().unwrap_or_default(),
        lease_time: Some(lease.lease_time()),
    };

    info!("Starting DHCP test server");
    let server: DhcpTestServer = DhcpTestServer::new(config);
    server.start();
    if !server.is_healthy() {
        error!("DHCP test server failed to start");
        return ExitCode::FAILURE;
    }

    let rules: Vec<Box<dyn HandlingRule>> = vec![
        Box::new(RespondToDiscovery::new(lease.intended_ip, lease.server_ip, options.clone())),
        Box::new(RespondToRequest::new(lease.intended_ip, lease.server_ip, options)
                 .expect_requested_ip(lease.intended_ip)
                 .expect_server_ip(lease.server_ip)
                 .is_final_handler(true)),
    ];
    server.start_test(rules, timeout);

    let result = server.wait_for_test_to_finish();
    server.stop();

    match result {
        Ok(()) if server.last_test_passed() => {
            info!("Test passed");
            ExitCode::SUCCESS
        }
        Ok(()) => {
            error!("Test failed");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!("Test server error: {}", err);
            ExitCode::FAILURE
        }
    }
}
