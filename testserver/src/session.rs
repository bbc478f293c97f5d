//
// DHCP-RS
//   Copyright (C) 2024-2025, Toshiaki Takada
//

use std::collections::VecDeque;
use std::time::Duration;
use std::time::Instant;

use tracing::info;
use tracing::warn;

use crate::rule::*;
use crate::ServerError;

/// Test state.  A new test may start from any state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TestState {
    Idle,
    InProgress,
    Passed,
    Failed,
}

/// State shared by the controller and the server thread, always accessed
/// under a single lock.
pub struct Session<P: Packet> {

    /// Handling rules, head is the active one.
    pub rules: VecDeque<Box<dyn HandlingRule<P>>>,

    /// Deadline of the test in progress.
    pub deadline: Option<Instant>,

    /// Test state.
    pub state: TestState,

    /// Stop requested.
    pub stopped: bool,

    /// Socket is open and the server thread is serving.
    pub healthy: bool,

    /// Fatal error raised inside the server thread, not yet reported.
    pub error: Option<ServerError>,
}

impl<P: Packet> Session<P> {
    pub fn new() -> Session<P> {
        Session {
            rules: VecDeque::new(),
            deadline: None,
            state: TestState::Idle,
            stopped: false,
            healthy: false,
            error: None,
        }
    }

    /// Install a new rule chain; any test in progress is abandoned.
    pub fn start_test(&mut self, rules: Vec<Box<dyn HandlingRule<P>>>, timeout: Duration, now: Instant) {
        if self.state == TestState::InProgress {
            warn!("Abandoning test in progress with {} rules left", self.rules.len());
        }
        self.rules = rules.into();
        self.deadline = Some(now + timeout);
        self.state = TestState::InProgress;
        info!("Test started with {} rules, timeout {:?}", self.rules.len(), timeout);
    }

    /// Finish the test in progress.  No-op when no test is running.
    pub fn end_test(&mut self, passed: bool) {
        if self.state != TestState::InProgress {
            return;
        }
        self.state = if passed { TestState::Passed } else { TestState::Failed };
        self.deadline = None;
        info!("Test {}", if passed { "passed" } else { "failed" });
    }

    /// Fail the test in progress if its deadline has passed.
    pub fn check_deadline(&mut self, now: Instant) {
        if let (TestState::InProgress, Some(deadline)) = (self.state, self.deadline) {
            if now >= deadline {
                warn!("Test timed out with {} rules left", self.rules.len());
                self.end_test(false);
            }
        }
    }

    pub fn abort(&mut self) {
        if self.state == TestState::InProgress {
            info!("Aborting test");
        }
        self.end_test(false);
    }

    pub fn in_progress(&self) -> bool {
        self.state == TestState::InProgress
    }

    pub fn last_test_passed(&self) -> bool {
        self.state == TestState::Passed
    }

    /// Name of the active rule.
    pub fn current_rule(&self) -> Option<String> {
        self.rules.front().map(|rule| rule.name())
    }
}

impl<P: Packet> Default for Session<P> {
    fn default() -> Self {
        Session::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::DhcpError;
    use common::message::DhcpMessage;

    struct NamedRule(&'static str);

    impl HandlingRule for NamedRule {
        fn name(&self) -> String {
            self.0.to_string()
        }

        fn handle(&mut self, _packet: &DhcpMessage) -> Result<ResponseCode, DhcpError> {
            Ok(ResponseCode::empty())
        }

        fn respond(&mut self, _packet: &DhcpMessage) -> Result<Option<DhcpMessage>, DhcpError> {
            Ok(None)
        }
    }

    fn rules(names: &[&'static str]) -> Vec<Box<dyn HandlingRule>> {
        names.iter().map(|n| Box::new(NamedRule(*n)) as Box<dyn HandlingRule>).collect()
    }

    #[test]
    pub fn test_session_lifecycle() {
        let mut session: Session<DhcpMessage> = Session::new();
        assert_eq!(session.state, TestState::Idle);
        assert!(!session.in_progress());
        assert!(!session.last_test_passed());
        assert_eq!(session.current_rule(), None);

        let now = Instant::now();
        session.start_test(rules(&["first", "second"]), Duration::from_secs(5), now);
        assert!(session.in_progress());
        assert_eq!(session.current_rule().as_deref(), Some("first"));

        session.end_test(true);
        assert!(!session.in_progress());
        assert!(session.last_test_passed());

        // Ending again does not change the outcome.
        session.end_test(false);
        assert!(session.last_test_passed());
    }

    #[test]
    pub fn test_session_deadline() {
        let mut session: Session<DhcpMessage> = Session::new();
        let now = Instant::now();
        session.start_test(rules(&["only"]), Duration::from_millis(100), now);

        session.check_deadline(now + Duration::from_millis(50));
        assert!(session.in_progress());

        session.check_deadline(now + Duration::from_millis(100));
        assert_eq!(session.state, TestState::Failed);
        assert!(!session.last_test_passed());
    }

    #[test]
    pub fn test_session_restart_replaces_chain() {
        let mut session: Session<DhcpMessage> = Session::new();
        let now = Instant::now();
        session.start_test(rules(&["old"]), Duration::from_secs(5), now);
        session.start_test(rules(&["new", "newer"]), Duration::from_secs(5), now);
        assert!(session.in_progress());
        assert_eq!(session.rules.len(), 2);
        assert_eq!(session.current_rule().as_deref(), Some("new"));

        session.end_test(true);
        session.start_test(rules(&["again"]), Duration::from_secs(5), now);
        assert!(session.in_progress());
        assert!(!session.last_test_passed());
    }

    #[test]
    pub fn test_session_abort() {
        let mut session: Session<DhcpMessage> = Session::new();
        session.abort();
        assert_eq!(session.state, TestState::Idle);

        session.start_test(rules(&["only"]), Duration::from_secs(5), Instant::now());
        session.abort();
        assert_eq!(session.state, TestState::Failed);
    }
}
