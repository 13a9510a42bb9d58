use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

const PRUNE_THRESHOLD: usize = 256;

/// Per-key async mutexes. Slots are held weakly so a key's mutex disappears
/// once no caller holds it.
#[derive(Default)]
pub(crate) struct KeyedLocks {
    slots: Mutex<HashMap<String, Weak<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    pub(crate) fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut slots = self.slots.lock();
        if let Some(existing) = slots.get(key).and_then(Weak::upgrade) {
            return existing;
        }

        if slots.len() >= PRUNE_THRESHOLD {
            slots.retain(|_, slot| slot.strong_count() > 0);
        }

        let lock = Arc::new(tokio::sync::Mutex::new(()));
        slots.insert(key.to_string(), Arc::downgrade(&lock));
        lock
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.lock().len()
    }
}

const GENERATION_STRIPES: usize = 1024;

/// Per-user change counters, striped so memory stays fixed. Users sharing a
/// stripe only cause extra cache skips.
pub(crate) struct CacheGenerations {
    hasher: RandomState,
    stripes: Box<[AtomicU64]>,
}

impl Default for CacheGenerations {
    fn default() -> Self {
        Self {
            hasher: RandomState::new(),
            stripes: (0..GENERATION_STRIPES).map(|_| AtomicU64::new(0)).collect(),
        }
    }
}

impl CacheGenerations {
    fn stripe(&self, user_id: &str) -> &AtomicU64 {
        let slot = self.hasher.hash_one(user_id) as usize % self.stripes.len();
        &self.stripes[slot]
    }

    pub(crate) fn current(&self, user_id: &str) -> u64 {
        self.stripe(user_id).load(Ordering::SeqCst)
    }

    pub(crate) fn bump(&self, user_id: &str) {
        self.stripe(user_id).fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_shares_a_mutex() {
        let locks = KeyedLocks::default();
        let a = locks.lock_for("u1:t1");
        let b = locks.lock_for("u1:t1");
        let c = locks.lock_for("u1:t2");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn released_slot_is_replaced_in_place() {
        let locks = KeyedLocks::default();
        drop(locks.lock_for("k"));
        let _held = locks.lock_for("k");
        assert_eq!(locks.slot_count(), 1);
    }

    #[test]
    fn dead_slots_are_pruned() {
        let locks = KeyedLocks::default();
        for i in 0..PRUNE_THRESHOLD {
            drop(locks.lock_for(&format!("k{i}")));
        }
        let _held = locks.lock_for("fresh");
        assert_eq!(locks.slot_count(), 1);
    }

    #[test]
    fn generation_moves_only_on_bump() {
        let generations = CacheGenerations::default();
        let before = generations.current("u1");
        assert_eq!(generations.current("u1"), before);
        generations.bump("u1");
        assert_eq!(generations.current("u1"), before + 1);
    }
}
