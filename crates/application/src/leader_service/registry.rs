use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use helmsman_domain::{LeaderStatus, ResourceId};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, watch};

/// Election state of one registered resource.
pub(super) struct ResourceSlot {
    resource_id: ResourceId,
    status: watch::Sender<LeaderStatus>,
    cycle_lock: Arc<AsyncMutex<()>>,
}

impl ResourceSlot {
    fn new(resource_id: ResourceId, cycle_lock: Arc<AsyncMutex<()>>, now: DateTime<Utc>) -> Self {
        let (status, _) = watch::channel(LeaderStatus::unknown(now));
        Self {
            resource_id,
            status,
            cycle_lock,
        }
    }

    pub(super) fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }

    pub(super) fn status(&self) -> LeaderStatus {
        self.status.borrow().clone()
    }

    pub(super) fn publish(&self, status: LeaderStatus) {
        self.status.send_replace(status);
    }

    pub(super) fn subscribe(&self) -> watch::Receiver<LeaderStatus> {
        self.status.subscribe()
    }

    /// Claims the slot for one cycle unless a previous cycle still runs.
    pub(super) fn try_claim(&self) -> Option<OwnedMutexGuard<()>> {
        self.cycle_lock.clone().try_lock_owned().ok()
    }

    /// Waits until the slot can run one cycle.
    pub(super) async fn claim(&self) -> OwnedMutexGuard<()> {
        self.cycle_lock.clone().lock_owned().await
    }
}

/// Resource table shared between the scheduler and readers.
///
/// Cycle locks are kept per resource id and survive removal, so a slot
/// registered again shares the lock with cycles still running on its
/// predecessor.
#[derive(Default)]
pub(super) struct ResourceRegistry {
    slots: RwLock<BTreeMap<ResourceId, Arc<ResourceSlot>>>,
    cycle_locks: Mutex<HashMap<ResourceId, Arc<AsyncMutex<()>>>>,
    running: AtomicBool,
    last_election_at: Mutex<Option<DateTime<Utc>>>,
}

impl ResourceRegistry {
    pub(super) fn add(&self, resource_id: ResourceId, now: DateTime<Utc>) -> bool {
        let mut slots = self.slots.write();
        if slots.contains_key(&resource_id) {
            return false;
        }

        let cycle_lock = self
            .cycle_locks
            .lock()
            .entry(resource_id.clone())
            .or_default()
            .clone();
        let slot = Arc::new(ResourceSlot::new(resource_id.clone(), cycle_lock, now));
        slots.insert(resource_id, slot);
        true
    }

    /// Unregisters `slot` unless it was already replaced or removed.
    pub(super) fn remove(&self, slot: &Arc<ResourceSlot>) -> bool {
        let mut slots = self.slots.write();
        let registered = slots
            .get(slot.resource_id())
            .is_some_and(|current| Arc::ptr_eq(current, slot));
        if registered {
            slots.remove(slot.resource_id());
        }

        registered
    }

    /// Returns whether `slot` is the one currently registered for its resource.
    pub(super) fn is_registered(&self, slot: &Arc<ResourceSlot>) -> bool {
        self.slots
            .read()
            .get(slot.resource_id())
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    pub(super) fn get(&self, resource_id: &ResourceId) -> Option<Arc<ResourceSlot>> {
        self.slots.read().get(resource_id).cloned()
    }

    pub(super) fn slots(&self) -> Vec<Arc<ResourceSlot>> {
        self.slots.read().values().cloned().collect()
    }

    pub(super) fn resource_ids(&self) -> Vec<ResourceId> {
        self.slots.read().keys().cloned().collect()
    }

    pub(super) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub(super) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(super) fn mark_election_completed(&self, completed_at: DateTime<Utc>) {
        let mut last_election_at = self.last_election_at.lock();
        if last_election_at.is_none_or(|previous| previous < completed_at) {
            *last_election_at = Some(completed_at);
        }
    }

    pub(super) fn last_election_at(&self) -> Option<DateTime<Utc>> {
        *self.last_election_at.lock()
    }
}
