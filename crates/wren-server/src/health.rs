use std::sync::atomic::{AtomicU32, Ordering};

use wren_core::HealthState;

/// One missed heartbeat degrades the signal; three in a row mean the
/// link is effectively down.
const DEGRADED_AFTER: u32 = 1;
const ERROR_AFTER: u32 = 3;

/// Coarse bridge health derived from consecutive missed heartbeats.
///
/// Transport-level reconnect backoff belongs to the client library; this
/// only summarizes what the server observes so the dashboard can show a
/// connection indicator and offer a manual reconnect.
#[derive(Default)]
pub struct ConnectionHealth {
    misses: AtomicU32,
}

impl ConnectionHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> HealthState {
        level(self.misses.load(Ordering::SeqCst))
    }

    pub fn record_miss(&self) -> HealthState {
        level(self.misses.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn record_ok(&self) -> HealthState {
        self.misses.store(0, Ordering::SeqCst);
        HealthState::Healthy
    }

    pub fn reset(&self) {
        self.misses.store(0, Ordering::SeqCst);
    }
}

fn level(misses: u32) -> HealthState {
    if misses >= ERROR_AFTER {
        HealthState::Error
    } else if misses >= DEGRADED_AFTER {
        HealthState::Degraded
    } else {
        HealthState::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_degrades_then_errors() {
        let health = ConnectionHealth::new();
        assert_eq!(health.state(), HealthState::Healthy);
        assert_eq!(health.record_miss(), HealthState::Degraded);
        assert_eq!(health.record_miss(), HealthState::Degraded);
        assert_eq!(health.record_miss(), HealthState::Error);
    }

    #[test]
    fn a_pong_recovers_immediately() {
        let health = ConnectionHealth::new();
        health.record_miss();
        health.record_miss();
        health.record_miss();
        assert_eq!(health.record_ok(), HealthState::Healthy);
        assert_eq!(health.state(), HealthState::Healthy);
    }
}
