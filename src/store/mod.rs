pub mod memory;
pub mod redis;

pub use memory::MemoryRoomStore;
pub use redis::{create_pool, RedisRoomStore};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Room;

/// Optimistic-concurrency key-value contract the coordinator runs against.
///
/// A room is read together with a version; a write only lands if the
/// stored version is still the one that was read. Writers never block each
/// other; a version mismatch means the whole read-compute-write cycle is
/// repeated from a fresh read.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Current room snapshot plus the version to CAS against.
    async fn read(&self, rid: &str) -> Result<Option<(Room, u64)>>;

    /// Creates the room unless the key already exists. Returns false when
    /// another writer got there first.
    async fn create_if_absent(&self, rid: &str, room: &Room, ttl_seconds: u64) -> Result<bool>;

    /// Writes `next` (or deletes the key when `None`) only if the stored
    /// version still matches `version`. Returns false on a mismatch or
    /// when the key has expired in the meantime. Every successful write
    /// re-arms the TTL.
    async fn compare_and_swap(
        &self,
        rid: &str,
        next: Option<&Room>,
        version: u64,
        ttl_seconds: u64,
    ) -> Result<bool>;

    /// Increments the named counter and returns the new value. Allocated
    /// outside the CAS cycle, so values handed to losing attempts are
    /// simply skipped, never reused.
    async fn atomic_increment(&self, counter: &str) -> Result<u64>;

    /// Connectivity probe for the health endpoint.
    async fn ping(&self) -> Result<bool>;
}
