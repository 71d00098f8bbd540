//! In-memory switch registry with per-switch advisory locking.
//!
//! Durable persistence (the row in a real database, the check-in log, the
//! audit log) is an external collaborator's job per the persistence
//! interface; this store only has to provide the concurrency guarantee
//! the spec actually asks for — one outstanding lifecycle operation per
//! switch at a time, with a post-lock re-check of `expires_at` so a
//! check-in landing just before a timer scan always wins the race.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::model::{AuditEntry, Switch};
use crate::SwitchId;

#[derive(Default)]
pub struct SwitchStore {
    switches: RwLock<HashMap<SwitchId, Switch>>,
    locks: RwLock<HashMap<SwitchId, Arc<Mutex<()>>>>,
    audit: RwLock<HashMap<SwitchId, Vec<AuditEntry>>>,
}

impl SwitchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, switch: Switch) {
        let id = switch.switch_id;
        self.switches.write().await.insert(id, switch);
        self.audit.write().await.entry(id).or_default();
    }

    pub async fn get(&self, id: SwitchId) -> Option<Switch> {
        self.switches.read().await.get(&id).cloned()
    }

    pub async fn ids(&self) -> Vec<SwitchId> {
        self.switches.read().await.keys().copied().collect()
    }

    pub async fn audit_log(&self, id: SwitchId) -> Vec<AuditEntry> {
        self.audit.read().await.get(&id).cloned().unwrap_or_default()
    }

    pub async fn record_audit(&self, id: SwitchId, entry: AuditEntry) {
        self.audit.write().await.entry(id).or_default().push(entry);
    }

    /// Mutate a switch under the advisory lock for its id. The closure
    /// sees a `&mut Switch` pulled fresh from the map, and the result is
    /// written back before the lock is released, so any re-check the
    /// caller performs inside the closure observes the latest state.
    pub async fn with_lock<F, T>(&self, id: SwitchId, f: F) -> Option<T>
    where
        F: FnOnce(&mut Switch) -> T,
    {
        let lock = self.lock_for(id).await;
        let _guard: OwnedMutexGuard<()> = lock.lock_owned().await;

        let mut switches = self.switches.write().await;
        let switch = switches.get_mut(&id)?;
        Some(f(switch))
    }

    async fn lock_for(&self, id: SwitchId) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(&id) {
            return lock.clone();
        }
        let mut locks = self.locks.write().await;
        locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
