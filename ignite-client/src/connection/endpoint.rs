//! Known server endpoints and their health.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::config::RetryConfig;

/// Where an endpoint came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointOrigin {
    /// Listed in the client configuration or returned by discovery.
    Configured,
    /// Learned from a server topology hint.
    Discovered,
}

/// Connectivity state of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointHealth {
    /// Eligible for requests.
    Healthy,
    /// In backoff until `retry_at`.
    Degraded {
        /// When the endpoint becomes eligible again.
        retry_at: Instant,
        /// Consecutive failures so far.
        failures: u32,
    },
    /// Excluded until the endpoints are reset or re-advertised.
    Failed {
        /// Consecutive failures so far.
        failures: u32,
    },
}

/// A server address together with its backoff state.
#[derive(Debug, Clone)]
pub struct Endpoint {
    address: SocketAddr,
    origin: EndpointOrigin,
    health: EndpointHealth,
    backoff: Duration,
    retired: bool,
}

/// Calculates the next backoff duration with jitter applied.
pub(crate) fn calculate_backoff_with_jitter(
    current_backoff: Duration,
    multiplier: f64,
    max_backoff: Duration,
    jitter: f64,
) -> Duration {
    let base_backoff = current_backoff.as_secs_f64() * multiplier;

    let jitter_factor = if jitter > 0.0 {
        let mut rng = rand::thread_rng();
        1.0 + rng.gen_range(-jitter..=jitter)
    } else {
        1.0
    };

    let jittered_backoff = (base_backoff * jitter_factor).max(0.0);

    Duration::try_from_secs_f64(jittered_backoff)
        .map_or(max_backoff, |backoff| backoff.min(max_backoff))
}

impl Endpoint {
    /// Creates a healthy endpoint.
    pub fn new(address: SocketAddr, origin: EndpointOrigin) -> Self {
        Self {
            address,
            origin,
            health: EndpointHealth::Healthy,
            backoff: Duration::ZERO,
            retired: false,
        }
    }

    /// Returns the endpoint address.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Returns where the endpoint came from.
    pub fn origin(&self) -> EndpointOrigin {
        self.origin
    }

    /// Returns the current health.
    pub fn health(&self) -> EndpointHealth {
        self.health
    }

    /// Returns `true` if a newer topology stopped advertising this endpoint.
    pub fn is_retired(&self) -> bool {
        self.retired
    }

    /// Returns consecutive connect failures.
    pub fn failures(&self) -> u32 {
        match self.health {
            EndpointHealth::Healthy => 0,
            EndpointHealth::Degraded { failures, .. } | EndpointHealth::Failed { failures } => {
                failures
            }
        }
    }

    /// Returns `true` if a connection attempt may be made at `now`.
    pub fn is_available(&self, now: Instant) -> bool {
        if self.retired {
            return false;
        }
        match self.health {
            EndpointHealth::Healthy => true,
            EndpointHealth::Degraded { retry_at, .. } => now >= retry_at,
            EndpointHealth::Failed { .. } => false,
        }
    }

    /// Returns when the endpoint leaves backoff, if it is in backoff.
    pub fn retry_at(&self) -> Option<Instant> {
        match self.health {
            EndpointHealth::Degraded { retry_at, .. } if !self.retired => Some(retry_at),
            _ => None,
        }
    }

    /// Clears failures after a successful connect.
    pub fn record_success(&mut self) {
        self.health = EndpointHealth::Healthy;
        self.backoff = Duration::ZERO;
    }

    /// Records a failure and schedules the next attempt.
    ///
    /// After `max_connect_attempts` consecutive failures (when non-zero) the
    /// endpoint becomes [`EndpointHealth::Failed`].
    pub fn record_failure(&mut self, retry: &RetryConfig, now: Instant) -> EndpointHealth {
        let failures = self.failures().saturating_add(1);

        if retry.max_connect_attempts() > 0 && failures >= retry.max_connect_attempts() {
            self.health = EndpointHealth::Failed { failures };
            return self.health;
        }

        self.backoff = if self.backoff.is_zero() {
            retry.initial_backoff()
        } else {
            calculate_backoff_with_jitter(
                self.backoff,
                retry.multiplier(),
                retry.max_backoff(),
                retry.jitter(),
            )
        };
        let retry_at = now
            .checked_add(self.backoff)
            .or_else(|| now.checked_add(retry.max_backoff()))
            .unwrap_or(now);
        self.health = EndpointHealth::Degraded {
            retry_at,
            failures,
        };
        self.health
    }

    /// Marks the endpoint failed regardless of its attempt count.
    pub fn mark_failed(&mut self) {
        self.health = EndpointHealth::Failed {
            failures: self.failures().saturating_add(1),
        };
    }

    /// Returns the endpoint to service with a clean slate.
    pub fn reset(&mut self) {
        self.retired = false;
        self.record_success();
    }

    pub(crate) fn set_retired(&mut self, retired: bool) {
        self.retired = retired;
    }
}
