//! Advisory-lock abstraction ensuring at-most-one run per agent (spec §4.4,
//! C4).
//!
//! `dashmap` is already part of the teacher's workspace dependencies; a
//! try-insert into a `DashMap<AgentId, ()>` gives a non-blocking,
//! process-local advisory lock with no extra machinery. The guard removes
//! its own entry on drop, so the lock releases on every exit path —
//! success, error, or panic unwind — without a manual `finally`.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use zerg_common::AgentId;

#[derive(Clone, Default)]
pub struct AgentLockManager {
    locks: Arc<DashMap<AgentId, ()>>,
}

pub struct AgentLockGuard {
    locks: Arc<DashMap<AgentId, ()>>,
    agent_id: AgentId,
}

impl Drop for AgentLockGuard {
    fn drop(&mut self) {
        self.locks.remove(&self.agent_id);
    }
}

impl AgentLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking try-acquire. `None` means another run currently holds
    /// the lock; the caller surfaces this as `AgentBusyError` rather than
    /// queuing (spec: "fails fast ... rather than queuing").
    pub fn try_acquire(&self, agent_id: AgentId) -> Option<AgentLockGuard> {
        match self.locks.entry(agent_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(v) => {
                v.insert(());
                Some(AgentLockGuard {
                    locks: self.locks.clone(),
                    agent_id,
                })
            }
        }
    }

    pub fn is_locked(&self, agent_id: AgentId) -> bool {
        self.locks.contains_key(&agent_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_first_holds() {
        let manager = AgentLockManager::new();
        let agent_id = AgentId::new();

        let first = manager.try_acquire(agent_id);
        assert!(first.is_some());

        let second = manager.try_acquire(agent_id);
        assert!(second.is_none());
    }

    #[test]
    fn lock_releases_on_guard_drop() {
        let manager = AgentLockManager::new();
        let agent_id = AgentId::new();

        {
            let _guard = manager.try_acquire(agent_id).unwrap();
            assert!(manager.is_locked(agent_id));
        }

        assert!(!manager.is_locked(agent_id));
        assert!(manager.try_acquire(agent_id).is_some());
    }
}
