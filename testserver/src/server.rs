//
// DHCP-RS
//   Copyright (C) 2024-2025, Toshiaki Takada
//
// Server:
//  One background thread owns the UDP socket and feeds every packet
//  received during a test to the rule at the head of the chain.  The
//  controller only ever touches the session, under the shared lock.
//

use std::any::Any;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::net::UdpSocket;
use std::os::fd::AsRawFd;
use std::os::fd::OwnedFd;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

use nix::sys::socket::bind;
use nix::sys::socket::setsockopt;
use nix::sys::socket::socket;
use nix::sys::socket::sockopt;
use nix::sys::socket::AddressFamily;
use nix::sys::socket::SockFlag;
use nix::sys::socket::SockProtocol;
use nix::sys::socket::SockType;
use nix::sys::socket::SockaddrIn;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use common::message::DhcpMessage;

use crate::config::Config;
use crate::rule::*;
use crate::session::Session;
use crate::ServerError;

/// Socket receive timeout; bounds stop() and deadline detection latency.
pub const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Poll interval of wait_for_test_to_finish().
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Yield at the bottom of each loop iteration.
const IDLE_YIELD: Duration = Duration::from_millis(10);

/// Large enough for any IPv4 UDP payload, so nothing is truncated.
const RECV_BUFFER_SIZE: usize = 65536;

/// State shared with the server thread.
struct Shared<P: Packet> {

    /// Server config.
    config: Config,

    /// Test session.
    session: Mutex<Session<P>>,
}

impl<P: Packet> Shared<P> {
    fn lock(&self) -> MutexGuard<'_, Session<P>> {
        // A rule panicking under the lock must not take the controller down.
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serve until stopped or a fatal error.
    fn serve(&self, sock: &UdpSocket) -> Result<(), ServerError> {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            if self.lock().stopped {
                return Ok(())
            }
            self.loop_body(sock, &mut buf)?;
            thread::sleep(IDLE_YIELD);
        }
    }

    /// One iteration: at most one packet, waiting at most RECV_TIMEOUT.
    fn loop_body(&self, sock: &UdpSocket, buf: &mut [u8]) -> Result<(), ServerError> {
        // Timeout is checked before receiving; a late packet is still logged.
        self.lock().check_deadline(Instant::now());

        let (len, src) = match sock.recv_from(buf) {
            Ok(v) => v,
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted) => {
                return Ok(())
            }
            Err(err) => return Err(err.into()),
        };

        let mut session = self.lock();
        if !session.in_progress() {
            debug!("Dropping {} bytes from {}, no test in progress", len, src);
            return Ok(())
        }

        let packet = match P::from_bytes(&buf[..len]) {
            Ok(packet) => packet,
            Err(err) => {
                warn!("Dropping invalid packet from {}: {}", src, err);
                return Ok(())
            }
        };
        debug!("Received from {}: {:?}", src, packet);

        let code = match session.rules.front_mut() {
            Some(rule) => {
                let code = rule.handle(&packet)?;
                debug!("{} returned {:?}", rule.name(), code);
                code
            }
            None => {
                warn!("No handling rule left for packet from {}", src);
                session.end_test(false);
                return Ok(())
            }
        };

        // Pop first; the popped rule still produces the responses.
        let mut popped = None;
        if code.contains(ResponseCode::POP_HANDLER) {
            popped = session.rules.pop_front();
        }

        if code.contains(ResponseCode::HAVE_RESPONSE) {
            let rule = match popped.as_mut() {
                Some(rule) => Some(rule),
                None => session.rules.front_mut(),
            };
            let sent = match rule {
                Some(rule) => self.send_responses(sock, &mut **rule, &packet)?,
                None => false,
            };
            if !sent {
                session.end_test(false);
                return Ok(())
            }
        }

        // Failure takes precedence when both outcome bits are set.
        if code.contains(ResponseCode::TEST_FAILED) {
            session.end_test(false);
            return Ok(())
        }
        if code.contains(ResponseCode::TEST_SUCCEEDED) {
            session.end_test(true);
        }

        Ok(())
    }

    /// Call respond() as many times as the rule asks and send each reply.
    /// Return false as soon as one reply cannot be built or sent.
    fn send_responses(&self, sock: &UdpSocket, rule: &mut dyn HandlingRule<P>, packet: &P) -> Result<bool, ServerError> {
        let dst = self.config.broadcast_addr();

        for _ in 0..rule.response_packet_count() {
            let response = match rule.respond(packet)? {
                Some(response) => response,
                None => {
                    warn!("{} produced no response", rule.name());
                    return Ok(false)
                }
            };

            let bytes = match response.to_bytes() {
                Ok(bytes) if !bytes.is_empty() => bytes,
                Ok(_) => {
                    warn!("{} produced an empty response", rule.name());
                    return Ok(false)
                }
                Err(err) => {
                    warn!("Failed to encode response of {}: {}", rule.name(), err);
                    return Ok(false)
                }
            };

            match sock.send_to(&bytes, dst) {
                Ok(len) => debug!("Sent {} bytes to {}: {:?}", len, dst, response),
                Err(err) => {
                    warn!("Failed to send response to {}: {}", dst, err);
                    return Ok(false)
                }
            }
        }

        Ok(true)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Server thread entry, the socket is closed when this returns.
fn server_thread<P: Packet>(shared: Arc<Shared<P>>, sock: UdpSocket) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| shared.serve(&sock)));
    let error = match result {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err),
        Err(payload) => Some(ServerError::Panic(panic_message(payload))),
    };

    let mut session = shared.lock();
    if let Some(err) = error {
        error!("DHCP test server stopped on fatal error: {}", err);
        session.end_test(false);
        session.error = Some(err);
    } else {
        info!("DHCP test server stopped");
    }
    session.healthy = false;
}

#[cfg(target_os = "linux")]
fn bind_to_device(fd: &OwnedFd, ifname: &str) -> Result<(), ServerError> {
    setsockopt(fd, sockopt::BindToDevice, &std::ffi::OsString::from(ifname))?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn bind_to_device(_fd: &OwnedFd, ifname: &str) -> Result<(), ServerError> {
    warn!("Binding to interface {} is not supported on this platform", ifname);
    Ok(())
}

/// Open the ingress socket.
fn open_socket(config: &Config) -> Result<UdpSocket, ServerError> {
    let fd = socket(AddressFamily::Inet, SockType::Datagram, SockFlag::empty(), SockProtocol::Udp)?;

    setsockopt(&fd, sockopt::ReuseAddr, &true)?;
    setsockopt(&fd, sockopt::Broadcast, &true)?;

    if let Some(ifname) = &config.interface {
        bind_to_device(&fd, ifname)?;
    }

    let addr = SockaddrIn::from(config.ingress_addr());
    bind(fd.as_raw_fd(), &addr)?;

    let sock = UdpSocket::from(fd);
    sock.set_read_timeout(Some(RECV_TIMEOUT))?;

    Ok(sock)
}

/// Programmable DHCP test server.
pub struct DhcpTestServer<P: Packet = DhcpMessage> {

    /// State shared with the server thread.
    shared: Arc<Shared<P>>,

    /// Server thread, set once by start().
    thread: Mutex<Option<JoinHandle<()>>>,

    /// Address the socket is bound to.
    local_addr: Mutex<Option<SocketAddr>>,
}

impl<P: Packet> DhcpTestServer<P> {
    pub fn new(config: Config) -> DhcpTestServer<P> {
        DhcpTestServer {
            shared: Arc::new(Shared {
                config,
                session: Mutex::new(Session::new()),
            }),
            thread: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session<P>> {
        self.shared.lock()
    }

    /// Open the socket and start the server thread.  Failures are logged
    /// and leave the server unhealthy.  Only the first call has effect.
    pub fn start(&self) {
        let mut thread = self.thread.lock().unwrap_or_else(PoisonError::into_inner);
        if thread.is_some() || self.lock().stopped {
            debug!("DHCP test server already started");
            return;
        }

        let sock = match open_socket(&self.shared.config) {
            Ok(sock) => sock,
            Err(err) => {
                error!("Failed to open socket on {}: {}", self.shared.config.ingress_addr(), err);
                return;
            }
        };

        let local_addr = sock.local_addr().ok();
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner) = local_addr;
        self.lock().healthy = true;

        let shared = self.shared.clone();
        match thread::Builder::new()
            .name("dhcp-test-server".to_string())
            .spawn(move || server_thread(shared, sock)) {
            Ok(handle) => {
                info!("DHCP test server listening on {:?}", local_addr);
                *thread = Some(handle);
            }
            Err(err) => {
                error!("Failed to spawn server thread: {}", err);
                self.lock().healthy = false;
            }
        }
    }

    /// Stop the server thread and wait for it to close the socket.
    pub fn stop(&self) {
        self.lock().stopped = true;

        let handle = self.thread.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("DHCP test server thread panicked");
            }
        }
    }

    /// Start a new test, abandoning any test in progress.
    pub fn start_test(&self, rules: Vec<Box<dyn HandlingRule<P>>>, timeout: Duration) {
        self.lock().start_test(rules, timeout, Instant::now());
    }

    /// Block until the test in progress finishes or times out.  Returns the
    /// fatal error that stopped the server thread, if any; it is reported once.
    pub fn wait_for_test_to_finish(&self) -> Result<(), ServerError> {
        loop {
            {
                let mut session = self.lock();
                // The server thread may be gone, so the deadline is enforced here too.
                session.check_deadline(Instant::now());
                if !session.in_progress() {
                    return match session.error.take() {
                        Some(err) => Err(err),
                        None => Ok(()),
                    }
                }
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    /// Fail the test in progress.
    pub fn abort_test(&self) {
        self.lock().abort();
    }

    pub fn stopped(&self) -> bool {
        self.lock().stopped
    }

    pub fn is_healthy(&self) -> bool {
        self.lock().healthy
    }

    pub fn test_in_progress(&self) -> bool {
        self.lock().in_progress()
    }

    pub fn last_test_passed(&self) -> bool {
        self.lock().last_test_passed()
    }

    /// Name of the rule at the head of the chain.
    pub fn current_rule(&self) -> Option<String> {
        self.lock().current_rule()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P: Packet> Drop for DhcpTestServer<P> {
    fn drop(&mut self) {
        self.stop();
    }
}
