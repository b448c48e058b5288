use std::time::Duration;

use uds_config::DataSetOverride;

use crate::connectivity::ConnectivityMode;

/// Refresh cadence of one data set.
///
/// The realtime pair applies while the push channel is live and is expected
/// to be at least as long as the polling pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    pub poll_interval_realtime: Duration,
    pub poll_interval_polling: Duration,
    pub stale_window_realtime: Duration,
    pub stale_window_polling: Duration,
}

impl FreshnessPolicy {
    pub const fn new(
        poll_interval_realtime: Duration,
        poll_interval_polling: Duration,
        stale_window_realtime: Duration,
        stale_window_polling: Duration,
    ) -> Self {
        Self {
            poll_interval_realtime,
            poll_interval_polling,
            stale_window_realtime,
            stale_window_polling,
        }
    }

    /// Same interval and window regardless of connectivity.
    pub const fn fixed(poll_interval: Duration, stale_window: Duration) -> Self {
        Self::new(poll_interval, poll_interval, stale_window, stale_window)
    }

    pub fn poll_interval(&self, mode: ConnectivityMode) -> Duration {
        match mode {
            ConnectivityMode::Realtime => self.poll_interval_realtime,
            ConnectivityMode::Polling => self.poll_interval_polling,
        }
    }

    pub fn stale_window(&self, mode: ConnectivityMode) -> Duration {
        match mode {
            ConnectivityMode::Realtime => self.stale_window_realtime,
            ConnectivityMode::Polling => self.stale_window_polling,
        }
    }

    /// Apply configured millisecond overrides field by field.
    pub fn with_override(mut self, over: &DataSetOverride) -> Self {
        if let Some(ms) = over.poll_interval_realtime_ms {
            self.poll_interval_realtime = Duration::from_millis(ms);
        }
        if let Some(ms) = over.poll_interval_polling_ms {
            self.poll_interval_polling = Duration::from_millis(ms);
        }
        if let Some(ms) = over.stale_window_realtime_ms {
            self.stale_window_realtime = Duration::from_millis(ms);
        }
        if let Some(ms) = over.stale_window_polling_ms {
            self.stale_window_polling = Duration::from_millis(ms);
        }
        self
    }

    /// Checks that every duration is non-zero and the realtime pair is not
    /// shorter than the polling pair.
    pub fn validate(&self) -> Result<(), String> {
        let all = [
            self.poll_interval_realtime,
            self.poll_interval_polling,
            self.stale_window_realtime,
            self.stale_window_polling,
        ];
        if all.iter().any(Duration::is_zero) {
            return Err("intervals must be greater than zero".to_string());
        }
        if self.poll_interval_realtime < self.poll_interval_polling {
            return Err(format!(
                "realtime poll interval {:?} is shorter than polling interval {:?}",
                self.poll_interval_realtime, self.poll_interval_polling
            ));
        }
        if self.stale_window_realtime < self.stale_window_polling {
            return Err(format!(
                "realtime stale window {:?} is shorter than polling window {:?}",
                self.stale_window_realtime, self.stale_window_polling
            ));
        }
        Ok(())
    }
}
