use std::time::Duration;

use uds_config::PushConfig;

/// Reconnect delays: `initial`, doubled per failed attempt, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(5),
        }
    }
}

impl ReconnectPolicy {
    pub fn from_config(config: &PushConfig) -> Self {
        Self {
            initial: config.reconnect_delay(),
            max: config.reconnect_delay_max(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl Backoff {
    pub(crate) fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    pub(crate) fn next_delay(&mut self) -> Duration {
        let factor = 2u32.saturating_pow(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        self.policy
            .initial
            .saturating_mul(factor)
            .min(self.policy.max)
    }

    pub(crate) fn reset(&mut self) {
        self.attempts = 0;
    }
}
