//! Push channel liveness, shared by every data set.
//!
//! Mutated only by the push client (or a test). Readers either sample the
//! current [`ConnectivityMode`] or subscribe to transitions.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Which interval pair the freshness policies use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectivityMode {
    /// Push channel is live; poll slowly.
    Realtime,
    /// Push channel is down; poll quickly.
    Polling,
}

impl std::fmt::Display for ConnectivityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityMode::Realtime => write!(f, "realtime"),
            ConnectivityMode::Polling => write!(f, "polling"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectivityState {
    pub is_connected: bool,
}

impl ConnectivityState {
    pub fn mode(&self) -> ConnectivityMode {
        if self.is_connected {
            ConnectivityMode::Realtime
        } else {
            ConnectivityMode::Polling
        }
    }
}

/// Shared connectivity flag. Cloning yields another handle to the same state.
#[derive(Debug, Clone)]
pub struct ConnectivitySignal {
    tx: Arc<watch::Sender<ConnectivityState>>,
}

impl Default for ConnectivitySignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivitySignal {
    /// Starts disconnected.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectivityState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Push channel opened. No refetch is forced.
    pub fn on_open(&self) {
        self.set(true);
    }

    /// Push channel closed, intentionally or not.
    pub fn on_close(&self) {
        self.set(false);
    }

    fn set(&self, connected: bool) {
        let changed = self.tx.send_if_modified(|state| {
            if state.is_connected == connected {
                return false;
            }
            state.is_connected = connected;
            true
        });
        if changed {
            info!(
                event = "core.connectivity.changed",
                connected = connected,
                mode = %self.mode(),
            );
        }
    }

    pub fn is_connected(&self) -> bool {
        self.tx.borrow().is_connected
    }

    pub fn mode(&self) -> ConnectivityMode {
        self.tx.borrow().mode()
    }

    /// Receiver notified on every actual transition.
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_polling() {
        let signal = ConnectivitySignal::new();
        assert!(!signal.is_connected());
        assert_eq!(signal.mode(), ConnectivityMode::Polling);
    }

    #[test]
    fn test_open_close_switch_mode() {
        let signal = ConnectivitySignal::new();
        signal.on_open();
        assert_eq!(signal.mode(), ConnectivityMode::Realtime);
        signal.on_close();
        assert_eq!(signal.mode(), ConnectivityMode::Polling);
    }

    #[test]
    fn test_clones_share_state() {
        let signal = ConnectivitySignal::new();
        let other = signal.clone();
        other.on_open();
        assert!(signal.is_connected());
    }

    #[tokio::test]
    async fn test_repeated_open_notifies_once() {
        let signal = ConnectivitySignal::new();
        let mut rx = signal.subscribe();

        signal.on_open();
        signal.on_open();
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        signal.on_open();
        assert!(!rx.has_changed().unwrap());

        signal.on_close();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().mode(), ConnectivityMode::Polling);
    }
}
