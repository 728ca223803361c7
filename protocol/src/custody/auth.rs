//! # Authentication Gate
//!
//! Keys generated with an authentication window can only be used within
//! `auth_validity` of a successful user authentication. How the user
//! authenticates is an injected capability ([`AuthenticationGate`]); the
//! custodian only tracks when the window was last opened ([`AuthWindow`]).

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;

use crate::crypto::domain_separated_hash;

const GATE_CONTEXT: &str = "warden/gate";

/// Something that can ask a user to prove presence.
///
/// Returns `true` if the user authenticated, `false` if they failed or
/// cancelled. Implementations must not block indefinitely.
pub trait AuthenticationGate: Send + Sync {
    fn authenticate(&self) -> bool;
}

/// Gate that always succeeds. For keys without an authentication window,
/// and for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAllow;

impl AuthenticationGate for AlwaysAllow {
    fn authenticate(&self) -> bool {
        true
    }
}

/// Gate that always fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysDeny;

impl AuthenticationGate for AlwaysDeny {
    fn authenticate(&self) -> bool {
        false
    }
}

/// Gate that compares a prompted passphrase against a stored digest in
/// constant time.
///
/// The prompt closure is called once per authentication attempt. Returning
/// `None` means the user cancelled.
pub struct PassphraseGate<P> {
    digest: [u8; 32],
    prompt: P,
}

impl<P> PassphraseGate<P>
where
    P: Fn() -> Option<String> + Send + Sync,
{
    pub fn new(expected: &str, prompt: P) -> Self {
        Self {
            digest: domain_separated_hash(GATE_CONTEXT, expected.as_bytes()),
            prompt,
        }
    }
}

impl<P> AuthenticationGate for PassphraseGate<P>
where
    P: Fn() -> Option<String> + Send + Sync,
{
    fn authenticate(&self) -> bool {
        let Some(attempt) = (self.prompt)() else {
            return false;
        };
        let candidate = domain_separated_hash(GATE_CONTEXT, attempt.as_bytes());
        bool::from(candidate.ct_eq(&self.digest))
    }
}

impl<P> std::fmt::Debug for PassphraseGate<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PassphraseGate(<redacted>)")
    }
}

/// Time of the last successful authentication.
#[derive(Debug, Default)]
pub struct AuthWindow {
    opened_at: Mutex<Option<Instant>>,
}

impl AuthWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or re-open) the window now.
    pub fn record(&self) {
        *self.opened_at.lock() = Some(Instant::now());
    }

    /// Close the window immediately.
    pub fn expire(&self) {
        *self.opened_at.lock() = None;
    }

    /// Whether a key with the given validity may be used right now.
    pub fn is_open(&self, validity: Duration) -> bool {
        match *self.opened_at.lock() {
            Some(at) => at.elapsed() < validity,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fixed_gates() {
        assert!(AlwaysAllow.authenticate());
        assert!(!AlwaysDeny.authenticate());
    }

    #[test]
    fn passphrase_gate_matches_only_the_right_passphrase() {
        let ok = PassphraseGate::new("hunter2", || Some("hunter2".to_string()));
        let bad = PassphraseGate::new("hunter2", || Some("hunter3".to_string()));
        let cancelled = PassphraseGate::new("hunter2", || None);
        assert!(ok.authenticate());
        assert!(!bad.authenticate());
        assert!(!cancelled.authenticate());
    }

    #[test]
    fn passphrase_gate_debug_redacts() {
        let gate = PassphraseGate::new("hunter2", || None);
        assert!(!format!("{gate:?}").contains("hunter2"));
    }

    #[test]
    fn window_starts_closed() {
        let w = AuthWindow::new();
        assert!(!w.is_open(Duration::from_secs(60)));
    }

    #[test]
    fn window_opens_and_expires() {
        let w = AuthWindow::new();
        w.record();
        assert!(w.is_open(Duration::from_secs(60)));
        w.expire();
        assert!(!w.is_open(Duration::from_secs(60)));
    }

    #[test]
    fn window_lapses_with_time() {
        let w = AuthWindow::new();
        w.record();
        thread::sleep(Duration::from_millis(30));
        assert!(!w.is_open(Duration::from_millis(10)));
        assert!(w.is_open(Duration::from_secs(60)));
    }
}
