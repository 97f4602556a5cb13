use std::time::Duration;

/// Failure classes that drive the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Another process holds this account's browser profile.
    Contention,
    /// Navigation/protocol hiccup worth another attempt.
    Transient,
    /// The underlying page or session is gone; retrying cannot help.
    SessionGone,
    /// Anything else: give up and surface.
    Fatal,
}

/// Substring -> class table, checked case-insensitively in order.
/// First hit wins; no hit means `Fatal`.
const CLASSIFICATION: &[(&str, ErrorKind)] = &[
    ("browser is already running", ErrorKind::Contention),
    ("singletonlock", ErrorKind::Contention),
    ("process singleton", ErrorKind::Contention),
    ("profile is in use", ErrorKind::Contention),
    ("session closed", ErrorKind::SessionGone),
    ("page has been closed", ErrorKind::SessionGone),
    ("execution context was destroyed", ErrorKind::SessionGone),
    ("navigation timeout", ErrorKind::Transient),
    ("navigating frame was detached", ErrorKind::Transient),
    ("detached frame", ErrorKind::Transient),
    ("protocol error", ErrorKind::Transient),
    ("target closed", ErrorKind::Transient),
    ("net::err", ErrorKind::Transient),
];

pub fn classify(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    for (needle, kind) in CLASSIFICATION {
        if lower.contains(needle) {
            return *kind;
        }
    }
    ErrorKind::Fatal
}

/// Engine errors that routinely fire while a browser session is being
/// torn down. Logged quietly; everything else is surfaced loudly.
pub fn is_teardown_noise(message: &str) -> bool {
    matches!(
        classify(message),
        ErrorKind::Transient | ErrorKind::SessionGone
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backoff {
    Fixed(Duration),
    Linear(Duration),
    Exponential(Duration),
}

/// How many retries an operation gets and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    pub const fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed(delay),
        }
    }

    pub const fn linear(max_retries: u32, step: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Linear(step),
        }
    }

    pub const fn exponential(max_retries: u32, base: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Exponential(base),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before the retry that follows failed attempt `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Linear(step) => step * attempt,
            Backoff::Exponential(base) => base * 2u32.saturating_pow(attempt.saturating_sub(1)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Attempting { attempt: u32 },
    Backoff { next_attempt: u32, delay: Duration },
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay` (after orphan cleanup when `cleanup` is set), then retry.
    Retry { delay: Duration, cleanup: bool },
    GiveUp,
}

/// Explicit retry machine for one operation.
///
/// Contention failures get the cleanup-then-retry policy, transient ones
/// plain backoff; session-gone and fatal failures terminate immediately.
#[derive(Debug)]
pub struct RetryFsm {
    contention: RetryPolicy,
    transient: RetryPolicy,
    attempt: u32,
    state: RetryState,
}

impl RetryFsm {
    pub fn new(contention: RetryPolicy, transient: RetryPolicy) -> Self {
        Self {
            contention,
            transient,
            attempt: 0,
            state: RetryState::Idle,
        }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Enter the next attempt; returns its 1-based number.
    pub fn begin(&mut self) -> u32 {
        self.attempt += 1;
        self.state = RetryState::Attempting {
            attempt: self.attempt,
        };
        self.attempt
    }

    pub fn succeed(&mut self) {
        self.state = RetryState::Succeeded;
    }

    /// Record a classified failure and decide the next transition.
    pub fn fail(&mut self, kind: ErrorKind) -> RetryDecision {
        let policy = match kind {
            ErrorKind::Contention => Some((self.contention, true)),
            ErrorKind::Transient => Some((self.transient, false)),
            ErrorKind::SessionGone | ErrorKind::Fatal => None,
        };
        match policy {
            Some((policy, cleanup)) if self.attempt <= policy.max_retries() => {
                let delay = policy.delay(self.attempt);
                self.state = RetryState::Backoff {
                    next_attempt: self.attempt + 1,
                    delay,
                };
                RetryDecision::Retry { delay, cleanup }
            }
            _ => {
                self.state = RetryState::Failed;
                RetryDecision::GiveUp
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_contention() {
        assert_eq!(
            classify("Failed to launch: the browser is already running"),
            ErrorKind::Contention
        );
        assert_eq!(classify("SingletonLock exists"), ErrorKind::Contention);
    }

    #[test]
    fn classifies_transient() {
        assert_eq!(
            classify("Navigation timeout of 30000 ms exceeded"),
            ErrorKind::Transient
        );
        assert_eq!(
            classify("Protocol error (Runtime.callFunctionOn): Target closed"),
            ErrorKind::Transient
        );
    }

    #[test]
    fn classifies_session_gone() {
        assert_eq!(
            classify("Protocol error: Session closed. Most likely the page has been closed."),
            ErrorKind::SessionGone
        );
    }

    #[test]
    fn unknown_is_fatal() {
        assert_eq!(classify("disk quota exceeded"), ErrorKind::Fatal);
    }

    #[test]
    fn contention_retries_with_cleanup() {
        let mut fsm = RetryFsm::new(
            RetryPolicy::fixed(2, Duration::from_secs(2)),
            RetryPolicy::linear(2, Duration::from_secs(3)),
        );
        fsm.begin();
        match fsm.fail(ErrorKind::Contention) {
            RetryDecision::Retry { delay, cleanup } => {
                assert!(cleanup);
                assert_eq!(delay, Duration::from_secs(2));
            }
            RetryDecision::GiveUp => panic!("expected retry"),
        }
    }

    #[test]
    fn transient_backoff_is_linear() {
        let mut fsm = RetryFsm::new(
            RetryPolicy::fixed(2, Duration::from_secs(2)),
            RetryPolicy::linear(2, Duration::from_secs(3)),
        );
        fsm.begin();
        assert_eq!(
            fsm.fail(ErrorKind::Transient),
            RetryDecision::Retry {
                delay: Duration::from_secs(3),
                cleanup: false
            }
        );
        fsm.begin();
        assert_eq!(
            fsm.fail(ErrorKind::Transient),
            RetryDecision::Retry {
                delay: Duration::from_secs(6),
                cleanup: false
            }
        );
        fsm.begin();
        assert_eq!(fsm.fail(ErrorKind::Transient), RetryDecision::GiveUp);
        assert_eq!(fsm.state(), RetryState::Failed);
    }

    #[test]
    fn fatal_gives_up_immediately() {
        let mut fsm = RetryFsm::new(
            RetryPolicy::fixed(2, Duration::from_secs(2)),
            RetryPolicy::linear(2, Duration::from_secs(3)),
        );
        fsm.begin();
        assert_eq!(fsm.fail(ErrorKind::Fatal), RetryDecision::GiveUp);
    }

    #[test]
    fn exponential_policy_doubles() {
        let policy = RetryPolicy::exponential(3, Duration::from_secs(2));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.delay(3), Duration::from_secs(8));
    }
}
