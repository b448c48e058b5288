//! Per-key poll timer, alive while the key has subscribers.

use std::sync::Arc;

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::slot::Slot;
use crate::connectivity::ConnectivitySignal;

pub(super) fn spawn_poller(
    slot: Arc<Slot>,
    connectivity: ConnectivitySignal,
    cancel: CancellationToken,
    anchor: Instant,
) {
    tokio::spawn(poll_loop(slot, connectivity, cancel, anchor));
}

/// Fetch once per currently selected poll interval, measured from the last
/// fetch completion (or from `anchor` before the first one).
///
/// A connectivity change re-arms the timer with the new interval from the
/// same anchor, so a link that keeps flapping cannot postpone polls
/// indefinitely. A deadline that has already passed fires at once. A wake
/// from invalidation fetches immediately.
async fn poll_loop(
    slot: Arc<Slot>,
    connectivity: ConnectivitySignal,
    cancel: CancellationToken,
    mut anchor: Instant,
) {
    let mut mode_rx = connectivity.subscribe();
    debug!(event = "core.cache.poller_started", key = %slot.key());

    loop {
        let mode = mode_rx.borrow_and_update().mode();
        let deadline = anchor + slot.policy().poll_interval(mode);

        let trigger = tokio::select! {
            _ = cancel.cancelled() => break,
            changed = mode_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                debug!(
                    event = "core.cache.poll_timer_rearmed",
                    key = %slot.key(),
                    mode = %connectivity.mode(),
                );
                continue;
            }
            _ = slot.wake().notified() => "invalidated",
            _ = sleep_until(deadline) => "interval",
        };

        let Some(flight) = slot.refresh() else {
            break;
        };
        debug!(event = "core.cache.poll_triggered", key = %slot.key(), trigger = trigger);

        // Errors are recorded on the entry; the next attempt is simply the
        // next interval.
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = flight => {}
        }
        anchor = Instant::now();
    }

    debug!(event = "core.cache.poller_exited", key = %slot.key());
}
