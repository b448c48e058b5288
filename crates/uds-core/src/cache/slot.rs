//! Per-key entry state and fetch coordination.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde_json::Value;
use tokio::sync::{Notify, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uds_protocol::DataSetKey;

use super::scheduler;
use super::{EntryStatus, Snapshot};
use crate::connectivity::ConnectivitySignal;
use crate::errors::FetchError;
use crate::fetch::Fetch;
use crate::policy::FreshnessPolicy;

pub(super) type FetchOutcome = Result<Arc<Value>, FetchError>;
type InFlight = Shared<BoxFuture<'static, FetchOutcome>>;

struct SlotState {
    value: Option<Arc<Value>>,
    fetched_at: Option<Instant>,
    updated_at: Option<DateTime<Utc>>,
    error: Option<FetchError>,
    /// Forced stale regardless of age.
    invalidated: bool,
    /// Invalidated while a fetch was running; that fetch's result is kept
    /// but considered stale.
    refetch_pending: bool,
    in_flight: Option<InFlight>,
    /// Bumped on reset; completions carrying an older value are dropped.
    generation: u64,
    observers: usize,
    poller: Option<CancellationToken>,
    last_used: Instant,
    retired: bool,
}

impl SlotState {
    fn status(&self, window: Duration, now: Instant) -> EntryStatus {
        if self.in_flight.is_some() {
            return EntryStatus::Fetching;
        }
        if self.error.is_some() {
            return EntryStatus::Error;
        }
        match (&self.value, self.fetched_at) {
            (None, _) => EntryStatus::Empty,
            (Some(_), Some(at)) if !self.invalidated && now.duration_since(at) < window => {
                EntryStatus::Fresh
            }
            _ => EntryStatus::Stale,
        }
    }
}

pub(super) struct Slot {
    key: DataSetKey,
    fetch: Arc<dyn Fetch>,
    policy: FreshnessPolicy,
    connectivity: ConnectivitySignal,
    state: Mutex<SlotState>,
    /// Wakes the poller for an immediate refetch.
    wake: Notify,
    snapshots: watch::Sender<Snapshot>,
}

impl Slot {
    pub(super) fn new(
        key: DataSetKey,
        fetch: Arc<dyn Fetch>,
        policy: FreshnessPolicy,
        connectivity: ConnectivitySignal,
    ) -> Self {
        let (snapshots, _rx) = watch::channel(Snapshot::empty(key.clone()));
        Self {
            key,
            fetch,
            policy,
            connectivity,
            state: Mutex::new(SlotState {
                value: None,
                fetched_at: None,
                updated_at: None,
                error: None,
                invalidated: false,
                refetch_pending: false,
                in_flight: None,
                generation: 0,
                observers: 0,
                poller: None,
                last_used: Instant::now(),
                retired: false,
            }),
            wake: Notify::new(),
            snapshots,
        }
    }

    pub(super) fn key(&self) -> &DataSetKey {
        &self.key
    }

    pub(super) fn policy(&self) -> &FreshnessPolicy {
        &self.policy
    }

    pub(super) fn wake(&self) -> &Notify {
        &self.wake
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            error!(event = "core.cache.slot_lock_poisoned", key = %self.key);
            poisoned.into_inner()
        })
    }

    fn snapshot_of(&self, state: &SlotState) -> Snapshot {
        let window = self.policy.stale_window(self.connectivity.mode());
        Snapshot {
            key: self.key.clone(),
            value: state.value.clone(),
            updated_at: state.updated_at,
            error: state.error.clone(),
            status: state.status(window, Instant::now()),
        }
    }

    fn publish(&self, state: &SlotState) {
        self.snapshots.send_replace(self.snapshot_of(state));
    }

    pub(super) fn snapshot(&self) -> Snapshot {
        let state = self.lock();
        self.snapshot_of(&state)
    }

    pub(super) fn subscribe_snapshots(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.subscribe()
    }

    /// Cached value if fresh, otherwise the running or a newly started fetch.
    pub(super) async fn read(self: &Arc<Self>) -> FetchOutcome {
        let flight = {
            let mut state = self.lock();
            state.last_used = Instant::now();
            let window = self.policy.stale_window(self.connectivity.mode());
            if state.status(window, Instant::now()) == EntryStatus::Fresh
                && let Some(ref value) = state.value
            {
                return Ok(Arc::clone(value));
            }
            self.start_locked(&mut state)
        };
        flight.await
    }

    /// Join the running fetch or start one, ignoring freshness.
    pub(super) fn refresh(self: &Arc<Self>) -> Option<BoxFuture<'static, FetchOutcome>> {
        let mut state = self.lock();
        if state.retired {
            return None;
        }
        Some(self.start_locked(&mut state).boxed())
    }

    fn start_locked(self: &Arc<Self>, state: &mut SlotState) -> InFlight {
        if let Some(ref flight) = state.in_flight {
            return flight.clone();
        }

        let generation = state.generation;
        let fetch = self.fetch.fetch();
        let slot = Arc::clone(self);
        debug!(event = "core.cache.fetch_started", key = %self.key, generation = generation);

        // The fetch runs on its own task so it completes into the cache even
        // when every reader stops waiting. The lock is held until in_flight
        // is set, so completion cannot overtake it.
        let handle = tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(fetch).catch_unwind().await {
                Ok(result) => result.map(Arc::new),
                Err(_) => Err(FetchError::Aborted {
                    message: "fetch panicked".to_string(),
                }),
            };
            slot.complete(generation, &outcome);
            outcome
        });

        let flight = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(FetchError::Aborted {
                    message: e.to_string(),
                }),
            }
        }
        .boxed()
        .shared();

        state.in_flight = Some(flight.clone());
        self.publish(state);
        flight
    }

    fn complete(&self, generation: u64, outcome: &FetchOutcome) {
        let mut state = self.lock();
        if state.generation != generation {
            debug!(
                event = "core.cache.fetch_superseded",
                key = %self.key,
                generation = generation,
                current = state.generation,
            );
            return;
        }

        state.in_flight = None;
        state.last_used = Instant::now();
        match outcome {
            Ok(value) => {
                state.value = Some(Arc::clone(value));
                state.fetched_at = Some(Instant::now());
                state.updated_at = Some(Utc::now());
                state.error = None;
                state.invalidated = false;
                debug!(event = "core.cache.fetch_completed", key = %self.key);
            }
            Err(e) => {
                state.error = Some(e.clone());
                warn!(
                    event = "core.cache.fetch_failed",
                    key = %self.key,
                    has_previous = state.value.is_some(),
                    error = %e,
                );
            }
        }

        let refetch = std::mem::take(&mut state.refetch_pending);
        if refetch {
            state.invalidated = true;
        }
        self.publish(&state);

        if refetch && state.observers > 0 {
            self.wake.notify_one();
        }
    }

    pub(super) fn invalidate(&self) {
        let mut state = self.lock();
        if state.retired {
            return;
        }
        if state.in_flight.is_some() {
            state.refetch_pending = true;
            debug!(event = "core.cache.invalidated_in_flight", key = %self.key);
            return;
        }
        state.invalidated = true;
        self.publish(&state);
        debug!(
            event = "core.cache.invalidated",
            key = %self.key,
            observers = state.observers,
        );
        if state.observers > 0 {
            self.wake.notify_one();
        }
    }

    pub(super) fn acquire(self: &Arc<Self>) {
        let mut state = self.lock();
        state.observers += 1;
        state.last_used = Instant::now();
        if state.poller.is_none() && !state.retired {
            let cancel = CancellationToken::new();
            state.poller = Some(cancel.clone());
            scheduler::spawn_poller(
                Arc::clone(self),
                self.connectivity.clone(),
                cancel,
                Instant::now(),
            );
        }
    }

    pub(super) fn release(&self) {
        let mut state = self.lock();
        state.observers = state.observers.saturating_sub(1);
        state.last_used = Instant::now();
        if state.observers == 0
            && let Some(poller) = state.poller.take()
        {
            poller.cancel();
            debug!(event = "core.cache.poller_stopped", key = %self.key);
        }
    }

    pub(super) fn observers(&self) -> usize {
        self.lock().observers
    }

    /// Drop the value of an unobserved, idle entry. Returns whether it did.
    pub(super) fn evict_if_idle(&self, gc_after: Duration) -> bool {
        let mut state = self.lock();
        let idle = state.observers == 0
            && state.in_flight.is_none()
            && (state.value.is_some() || state.error.is_some())
            && Instant::now().duration_since(state.last_used) >= gc_after;
        if !idle {
            return false;
        }
        state.generation += 1;
        state.value = None;
        state.fetched_at = None;
        state.updated_at = None;
        state.error = None;
        state.invalidated = false;
        self.publish(&state);
        true
    }

    /// Forget everything and refuse further work. Results of fetches started
    /// before this call are discarded.
    pub(super) fn retire(&self) {
        let mut state = self.lock();
        state.retired = true;
        state.generation += 1;
        state.in_flight = None;
        state.value = None;
        state.fetched_at = None;
        state.updated_at = None;
        state.error = None;
        state.invalidated = false;
        state.refetch_pending = false;
        if let Some(poller) = state.poller.take() {
            poller.cancel();
        }
        self.publish(&state);
    }
}
