//! Request cache: slots, waiters, and loading-episode tracking.

use crate::error::RpcError;
use crate::request::Fingerprint;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Host notification invoked when a loading episode begins.
pub type LoadingCallback = Arc<dyn Fn() + Send + Sync>;

pub(crate) type SlotReceiver = oneshot::Receiver<Result<Value, RpcError>>;
type SlotSender = oneshot::Sender<Result<Value, RpcError>>;

enum SlotState {
    Pending,
    Resolved(Value),
    Rejected(RpcError),
}

/// Cache entry for one fingerprint.
///
/// Created pending, transitions once to a terminal state, never reverts.
/// `single_claimed` records whether the single-request path has taken
/// responsibility for driving (or co-driving) this slot.
struct Slot {
    state: SlotState,
    single_claimed: bool,
    waiters: Vec<SlotSender>,
}

impl Slot {
    fn pending(single_claimed: bool) -> Self {
        Self {
            state: SlotState::Pending,
            single_claimed,
            waiters: Vec::new(),
        }
    }
}

/// Snapshot of a slot's state, for synchronous reads.
pub(crate) enum Lookup {
    Absent,
    Pending,
    Resolved(Value),
    Rejected(RpcError),
}

/// Outcome of [`RequestCache::claim_for_single`].
pub(crate) enum Claim {
    /// Fresh pending slot inserted; the caller drives the RPC.
    Issue,
    /// Pending slot of batch provenance, now also claimed by the single
    /// path. The caller issues its own RPC; the first terminal transition
    /// wins and the later one is a no-op.
    DuplicateIssue,
    /// Pending slot already driven by the single path; wait for it.
    Wait(SlotReceiver),
    /// Terminal slot; the stored outcome is replayed.
    Ready(Result<Value, RpcError>),
}

/// Mapping from fingerprint to slot, plus the pending-slot counter that
/// backs the `when_data_start_loading` notification. One instance per
/// [`ServerData`](crate::ServerData); entries live for the process
/// lifetime.
pub(crate) struct RequestCache {
    inner: Mutex<Inner>,
    when_data_start_loading: Option<LoadingCallback>,
}

struct Inner {
    slots: HashMap<Fingerprint, Slot>,
    pending: usize,
}

impl RequestCache {
    pub fn new(when_data_start_loading: Option<LoadingCallback>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: HashMap::new(),
                pending: 0,
            }),
            when_data_start_loading,
        }
    }

    pub fn lookup(&self, fp: &Fingerprint) -> Lookup {
        let inner = self.inner.lock();
        match inner.slots.get(fp) {
            None => Lookup::Absent,
            Some(slot) => match &slot.state {
                SlotState::Pending => Lookup::Pending,
                SlotState::Resolved(value) => Lookup::Resolved(value.clone()),
                SlotState::Rejected(err) => Lookup::Rejected(err.clone()),
            },
        }
    }

    /// Insert a fresh pending slot for the batch path.
    ///
    /// Returns `false` without touching the cache if the fingerprint is
    /// already present, in which case the caller must not accumulate the
    /// request again.
    pub fn insert_pending(&self, fp: Fingerprint) -> bool {
        let episode_started = {
            let mut inner = self.inner.lock();
            if inner.slots.contains_key(&fp) {
                return false;
            }
            inner.slots.insert(fp, Slot::pending(false));
            inner.pending += 1;
            inner.pending == 1
        };
        if episode_started {
            self.notify_loading();
        }
        true
    }

    /// Atomically decide how the single-request path should treat `fp`.
    pub fn claim_for_single(&self, fp: &Fingerprint) -> Claim {
        let (claim, episode_started) = {
            let mut inner = self.inner.lock();
            match inner.slots.get_mut(fp) {
                None => {
                    inner.slots.insert(fp.clone(), Slot::pending(true));
                    inner.pending += 1;
                    (Claim::Issue, inner.pending == 1)
                }
                Some(slot) => match &slot.state {
                    SlotState::Resolved(value) => (Claim::Ready(Ok(value.clone())), false),
                    SlotState::Rejected(err) => (Claim::Ready(Err(err.clone())), false),
                    SlotState::Pending if slot.single_claimed => {
                        let (tx, rx) = oneshot::channel();
                        slot.waiters.push(tx);
                        (Claim::Wait(rx), false)
                    }
                    SlotState::Pending => {
                        slot.single_claimed = true;
                        (Claim::DuplicateIssue, false)
                    }
                },
            }
        };
        if episode_started {
            self.notify_loading();
        }
        claim
    }

    /// Terminal transition to `resolved`. Idempotent: resolving an already
    /// terminal slot (or an absent fingerprint) is a no-op.
    pub fn resolve(&self, fp: &Fingerprint, value: Value) {
        self.finish(fp, Ok(value));
    }

    /// Terminal transition to `rejected`. The error is sticky: every later
    /// read replays it and no further RPC is issued for this fingerprint.
    pub fn reject(&self, fp: &Fingerprint, err: RpcError) {
        self.finish(fp, Err(err));
    }

    fn finish(&self, fp: &Fingerprint, outcome: Result<Value, RpcError>) {
        let waiters = {
            let mut inner = self.inner.lock();
            let Some(slot) = inner.slots.get_mut(fp) else {
                return;
            };
            if !matches!(slot.state, SlotState::Pending) {
                return;
            }
            slot.state = match &outcome {
                Ok(value) => SlotState::Resolved(value.clone()),
                Err(err) => SlotState::Rejected(err.clone()),
            };
            let waiters = std::mem::take(&mut slot.waiters);
            inner.pending -= 1;
            waiters
        };
        // Waiters are released in attachment order, outside the lock.
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    /// Number of slots currently pending.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending
    }

    fn notify_loading(&self) {
        if let Some(callback) = &self.when_data_start_loading {
            callback();
        }
    }
}
