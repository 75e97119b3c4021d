//! Port selection for the verification server.
//!
//! Each candidate is tested by binding a listener on the loopback interface
//! and releasing it straight away. Another process can still take the port
//! between this test and the server's own bind; that bind failure surfaces
//! separately as [`VerifyError::ServerBind`](crate::error::VerifyError).

use std::net::{Ipv4Addr, TcpListener};

use assetcheck_common::{Phase, Summary};
use log::{debug, warn};

use crate::error::{Result, VerifyError};

/// Port tried first when no override is configured.
pub const DEFAULT_PORT: u16 = 4579;

/// Default candidates: the default port, a few alternates, then any free port.
pub const DEFAULT_CANDIDATES: [u16; 5] = [DEFAULT_PORT, 4580, 4581, 4582, ANY_PORT];

/// Candidate asking the operating system for any free port.
pub const ANY_PORT: u16 = 0;

/// Ordered list of ports to try.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortAllocator {
    candidates: Vec<u16>,
}

impl PortAllocator {
    /// Uses `candidates` exactly as given.
    #[must_use]
    pub fn with_candidates(candidates: Vec<u16>) -> Self {
        Self { candidates }
    }

    /// Builds the candidate list from a raw override and the defaults.
    ///
    /// A valid override is tried before the defaults. An override that is not
    /// an integer in `1..=65535` is logged to the verify phase and ignored.
    pub fn from_override(
        raw_override: Option<&str>,
        defaults: &[u16],
        summary: &mut Summary,
    ) -> Self {
        let mut candidates = Vec::with_capacity(defaults.len() + 1);
        if let Some(raw) = raw_override {
            match parse_port(raw) {
                Some(port) => {
                    summary.log(Phase::Verify, format!("using port override {port}"));
                    candidates.push(port);
                }
                None => {
                    warn!(target: "port", "ignoring invalid port override `{raw}`");
                    summary.log(
                        Phase::Verify,
                        format!("invalid port override `{raw}` ignored; using default ports"),
                    );
                }
            }
        }
        for &port in defaults {
            if !candidates.contains(&port) {
                candidates.push(port);
            }
        }
        Self { candidates }
    }

    /// Candidates in the order they will be tried.
    #[must_use]
    pub fn candidates(&self) -> &[u16] {
        &self.candidates
    }

    /// Returns the first candidate that can be bound on loopback.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::PortExhausted`] when no candidate binds.
    pub fn allocate(&self, summary: &mut Summary) -> Result<u16> {
        for &candidate in &self.candidates {
            match probe_bind(candidate) {
                Ok(port) => {
                    debug!(target: "port", "selected port {port} (requested {candidate})");
                    summary.log(Phase::Verify, format!("selected port {port}"));
                    return Ok(port);
                }
                Err(err) => {
                    debug!(target: "port", "port {candidate} unavailable: {err}");
                    let line = format!(
                        "port {} unavailable ({}); trying next",
                        label(candidate),
                        err.kind()
                    );
                    summary.log(Phase::Verify, line);
                }
            }
        }

        Err(VerifyError::PortExhausted {
            tried: self.candidates.clone(),
        })
    }
}

/// Binds and releases a loopback listener, returning the bound port.
fn probe_bind(candidate: u16) -> std::io::Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, candidate))?;
    let port = listener.local_addr()?.port();
    drop(listener);
    if port == ANY_PORT {
        return Err(std::io::Error::other("bound port reported as 0"));
    }
    Ok(port)
}

fn parse_port(raw: &str) -> Option<u16> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|value| u16::try_from(value).ok())
        .filter(|&port| port != ANY_PORT)
}

fn label(candidate: u16) -> String {
    if candidate == ANY_PORT {
        "any".to_owned()
    } else {
        candidate.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn held_port() -> (TcpListener, u16) {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind test listener");
        let port = listener.local_addr().expect("local addr").port();
        (listener, port)
    }

    #[rstest]
    #[case::valid("4600", Some(4600))]
    #[case::upper_bound("65535", Some(65535))]
    #[case::lower_bound("1", Some(1))]
    #[case::too_large("99999", None)]
    #[case::zero("0", None)]
    #[case::negative("-5", None)]
    #[case::not_a_number("http", None)]
    fn override_validation(#[case] raw: &str, #[case] expected: Option<u16>) {
        assert_eq!(parse_port(raw), expected);
    }

    #[test]
    fn valid_override_is_prepended() {
        let mut summary = Summary::new();
        let allocator =
            PortAllocator::from_override(Some("4600"), &DEFAULT_CANDIDATES, &mut summary);
        assert_eq!(allocator.candidates(), [4600, 4579, 4580, 4581, 4582, 0]);
    }

    #[test]
    fn override_equal_to_a_default_is_not_repeated() {
        let mut summary = Summary::new();
        let allocator =
            PortAllocator::from_override(Some("4580"), &DEFAULT_CANDIDATES, &mut summary);
        assert_eq!(allocator.candidates(), [4580, 4579, 4581, 4582, 0]);
    }

    #[test]
    fn invalid_override_is_logged_and_ignored() {
        let mut summary = Summary::new();
        let allocator =
            PortAllocator::from_override(Some("99999"), &DEFAULT_CANDIDATES, &mut summary);
        assert_eq!(allocator.candidates(), DEFAULT_CANDIDATES);
        assert!(
            summary
                .phase(Phase::Verify)
                .log()
                .iter()
                .any(|line| line.contains("invalid port override `99999`"))
        );
        assert!(summary.errors(Phase::Verify).is_empty());
    }

    #[test]
    fn held_candidate_is_skipped() {
        let (_guard, held) = held_port();
        let mut summary = Summary::new();
        let allocator = PortAllocator::with_candidates(vec![held, ANY_PORT]);

        let port = allocator.allocate(&mut summary).expect("allocate port");
        assert_ne!(port, held);
        assert_ne!(port, ANY_PORT);
        assert!(
            summary
                .phase(Phase::Verify)
                .log()
                .iter()
                .any(|line| line.starts_with(&format!("port {held} unavailable")))
        );
    }

    #[test]
    fn exhaustion_reports_every_candidate() {
        let (_guard, held) = held_port();
        let mut summary = Summary::new();
        let allocator = PortAllocator::with_candidates(vec![held]);

        let err = allocator.allocate(&mut summary).expect_err("expected exhaustion");
        match err {
            VerifyError::PortExhausted { tried } => assert_eq!(tried, [held]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn allocated_port_is_bindable_after_release() {
        let mut summary = Summary::new();
        let port = PortAllocator::with_candidates(vec![ANY_PORT])
            .allocate(&mut summary)
            .expect("allocate port");
        assert!(port >= 1);
        TcpListener::bind((Ipv4Addr::LOCALHOST, port)).expect("rebind released port");
    }
}
