use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};

/// Per-short-id mutual exclusion.
///
/// Holding a [`PasteGuard`] makes the holder the only caller inside the
/// check-expiry / check-burn / record-view / serve / delete sequence for
/// that paste. Slots are dropped once nobody holds or waits on them.
#[derive(Default)]
pub struct PasteLocks {
    slots: DashMap<String, Arc<Mutex<()>>>,
}

pub struct PasteGuard<'a> {
    locks: &'a PasteLocks,
    key: String,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl PasteLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the slot for `short_id` is free.
    pub fn lock(&self, short_id: &str) -> PasteGuard<'_> {
        // Clone out of the map first so the shard lock is not held while waiting.
        let slot = self.slots.entry(short_id.to_string()).or_default().value().clone();
        let guard = slot.lock_arc();
        PasteGuard {
            locks: self,
            key: short_id.to_string(),
            guard: Some(guard),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Drop for PasteGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .slots
            .remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn same_key_is_exclusive() {
        let locks = PasteLocks::new();
        let inside = AtomicUsize::new(0);
        let max_inside = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let _guard = locks.lock("abc");
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(2));
                    inside.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[test]
    fn different_keys_do_not_block_each_other() {
        let locks = PasteLocks::new();
        let a = locks.lock("a");
        let b = locks.lock("b");
        assert_eq!(locks.len(), 2);
        drop(a);
        drop(b);
        assert!(locks.is_empty());
    }
}
