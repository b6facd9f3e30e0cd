//! In-memory `RoomStore` with real version semantics. Used by tests to
//! exercise the coordinator without a Redis server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Room;
use crate::store::RoomStore;

#[derive(Default)]
pub struct MemoryRoomStore {
    rooms: Mutex<HashMap<String, (u64, Room)>>,
    counters: Mutex<HashMap<String, u64>>,
    forced_conflicts: AtomicUsize,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` compare_and_swap calls report a version
    /// mismatch without touching stored state, as if a concurrent writer
    /// had won the race. Lets tests drive the retry loop deterministically.
    pub fn inject_cas_conflicts(&self, n: usize) {
        self.forced_conflicts.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl RoomStore for MemoryRoomStore {
    async fn read(&self, rid: &str) -> Result<Option<(Room, u64)>> {
        let rooms = self.rooms.lock().unwrap();
        Ok(rooms
            .get(rid)
            .map(|(version, room)| (room.clone(), *version)))
    }

    async fn create_if_absent(&self, rid: &str, room: &Room, _ttl_seconds: u64) -> Result<bool> {
        let mut rooms = self.rooms.lock().unwrap();
        if rooms.contains_key(rid) {
            return Ok(false);
        }
        rooms.insert(rid.to_string(), (1, room.clone()));
        Ok(true)
    }

    async fn compare_and_swap(
        &self,
        rid: &str,
        next: Option<&Room>,
        version: u64,
        _ttl_seconds: u64,
    ) -> Result<bool> {
        if self
            .forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(false);
        }

        let mut rooms = self.rooms.lock().unwrap();
        match rooms.get(rid) {
            Some((stored, _)) if *stored == version => {}
            _ => return Ok(false),
        }
        match next {
            Some(room) => {
                rooms.insert(rid.to_string(), (version + 1, room.clone()));
            }
            None => {
                rooms.remove(rid);
            }
        }
        Ok(true)
    }

    async fn atomic_increment(&self, counter: &str) -> Result<u64> {
        let mut counters = self.counters.lock().unwrap();
        let value = counters.entry(counter.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn ping(&self) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cas_rejects_stale_version() {
        let store = MemoryRoomStore::new();
        let room = Room::default();
        assert!(store.create_if_absent("r", &room, 60).await.unwrap());
        assert!(!store.create_if_absent("r", &room, 60).await.unwrap());

        // A write at the read version succeeds and bumps the version.
        assert!(store.compare_and_swap("r", Some(&room), 1, 60).await.unwrap());
        // The old version is now stale.
        assert!(!store.compare_and_swap("r", Some(&room), 1, 60).await.unwrap());
        assert!(store.compare_and_swap("r", Some(&room), 2, 60).await.unwrap());
    }

    #[tokio::test]
    async fn cas_none_deletes_the_key() {
        let store = MemoryRoomStore::new();
        let room = Room::default();
        store.create_if_absent("r", &room, 60).await.unwrap();
        assert!(store.compare_and_swap("r", None, 1, 60).await.unwrap());
        assert!(store.read("r").await.unwrap().is_none());
        // CAS against an absent key is a conflict, not an error.
        assert!(!store.compare_and_swap("r", Some(&room), 1, 60).await.unwrap());
    }

    #[tokio::test]
    async fn increment_is_monotonic_per_counter() {
        let store = MemoryRoomStore::new();
        assert_eq!(store.atomic_increment("a").await.unwrap(), 1);
        assert_eq!(store.atomic_increment("a").await.unwrap(), 2);
        assert_eq!(store.atomic_increment("b").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn injected_conflicts_fail_without_mutating() {
        let store = MemoryRoomStore::new();
        let room = Room::default();
        store.create_if_absent("r", &room, 60).await.unwrap();

        store.inject_cas_conflicts(1);
        assert!(!store.compare_and_swap("r", Some(&room), 1, 60).await.unwrap());
        // State untouched: the stored version still wins.
        assert!(store.compare_and_swap("r", Some(&room), 1, 60).await.unwrap());
    }
}
