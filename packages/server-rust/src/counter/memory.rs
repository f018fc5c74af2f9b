//! In-process [`CounterStore`] backed by [`DashMap`].
//!
//! Increments run under the shard lock of their key, which makes them atomic
//! with respect to every other operation on that key. Expired entries are
//! dropped lazily on access and in bulk by [`MemoryCounterStore::purge_expired`].

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::clock::{Clock, SystemClock};
use super::{CounterStore, StoreError, StoreValue};

#[derive(Debug, Clone)]
struct Slot {
    value: StoreValue,
    expires_at: Option<i64>,
}

impl Slot {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Counter store living in this process.
pub struct MemoryCounterStore {
    entries: DashMap<String, Slot>,
    clock: Arc<dyn Clock>,
}

impl MemoryCounterStore {
    /// Creates an empty store reading time from the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store reading time from `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    fn now(&self) -> i64 {
        self.clock.now().timestamp()
    }

    /// Number of stored entries, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.now();
        let before = self.entries.len();
        self.entries.retain(|_, slot| !slot.is_expired(now));
        before.saturating_sub(self.entries.len())
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterStore for MemoryCounterStore {
    fn get(&self, key: &str) -> Result<Option<StoreValue>, StoreError> {
        let now = self.now();
        let live = self
            .entries
            .get(key)
            .map(|slot| (slot.is_expired(now), slot.value.clone()));
        match live {
            Some((false, value)) => Ok(Some(value)),
            Some((true, _)) => {
                self.entries.remove_if(key, |_, slot| slot.is_expired(now));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: StoreValue) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            Slot {
                value,
                expires_at: None,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = self.now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, slot)| !slot.is_expired(now)))
    }

    fn increment(
        &self,
        key: &str,
        step: u64,
        initial: u64,
        expires_at: Option<i64>,
    ) -> Result<u64, StoreError> {
        let now = self.now();
        let fresh = Slot {
            value: StoreValue::Counter(initial.saturating_add(step)),
            expires_at,
        };
        let first = initial.saturating_add(step);

        match self.entries.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(first)
            }
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(fresh);
                    return Ok(first);
                }
                match &mut occupied.get_mut().value {
                    StoreValue::Counter(n) => {
                        *n = n.saturating_add(step);
                        Ok(*n)
                    }
                    StoreValue::List(_) => Err(StoreError::WrongType {
                        key: key.to_string(),
                        expected: "counter",
                    }),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::counter::ManualClock;

    fn store_at_noon() -> (MemoryCounterStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        ));
        (MemoryCounterStore::with_clock(clock.clone()), clock)
    }

    #[test]
    fn get_absent_is_none() {
        let (store, _) = store_at_noon();
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn set_get_delete() {
        let (store, _) = store_at_noon();
        store
            .set("list", StoreValue::List(vec!["a".to_string()]))
            .unwrap();
        assert_eq!(
            store.get("list").unwrap(),
            Some(StoreValue::List(vec!["a".to_string()]))
        );
        assert!(store.delete("list").unwrap());
        assert!(!store.delete("list").unwrap());
    }

    #[test]
    fn increment_absent_starts_from_initial() {
        let (store, _) = store_at_noon();
        assert_eq!(store.increment("c", 1, 0, None).unwrap(), 1);
        assert_eq!(store.increment("c", 1, 0, None).unwrap(), 2);
        assert_eq!(store.increment("d", 5, 10, None).unwrap(), 15);
    }

    #[test]
    fn increment_on_list_is_wrong_type() {
        let (store, _) = store_at_noon();
        store.set("l", StoreValue::List(Vec::new())).unwrap();
        let err = store.increment("l", 1, 0, None).unwrap_err();
        assert!(matches!(err, StoreError::WrongType { expected: "counter", .. }));
    }

    #[test]
    fn expired_keys_read_as_absent() {
        let (store, clock) = store_at_noon();
        let expiry = clock.now().timestamp() + 60;
        store.increment("c", 1, 0, Some(expiry)).unwrap();
        assert_eq!(store.get("c").unwrap(), Some(StoreValue::Counter(1)));

        clock.advance(Duration::seconds(60));
        assert_eq!(store.get("c").unwrap(), None);
        assert!(!store.delete("c").unwrap());
    }

    #[test]
    fn increment_after_expiry_restarts() {
        let (store, clock) = store_at_noon();
        let expiry = clock.now().timestamp() + 10;
        store.increment("c", 1, 0, Some(expiry)).unwrap();
        store.increment("c", 1, 0, Some(expiry)).unwrap();

        clock.advance(Duration::seconds(11));
        assert_eq!(store.increment("c", 1, 0, None).unwrap(), 1);
    }

    #[test]
    fn expiry_is_kept_from_creation() {
        let (store, clock) = store_at_noon();
        let expiry = clock.now().timestamp() + 10;
        store.increment("c", 1, 0, Some(expiry)).unwrap();
        // Later increments do not extend the lifetime.
        store
            .increment("c", 1, 0, Some(expiry + 1_000))
            .unwrap();

        clock.advance(Duration::seconds(10));
        assert_eq!(store.get("c").unwrap(), None);
    }

    #[test]
    fn purge_removes_only_expired() {
        let (store, clock) = store_at_noon();
        let now = clock.now().timestamp();
        store.increment("short", 1, 0, Some(now + 5)).unwrap();
        store.increment("long", 1, 0, Some(now + 500)).unwrap();
        store.increment("forever", 1, 0, None).unwrap();

        clock.advance(Duration::seconds(6));
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let store = Arc::new(MemoryCounterStore::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        store.increment("hot", 1, 0, None).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(store.get("hot").unwrap(), Some(StoreValue::Counter(8_000)));
    }
}
