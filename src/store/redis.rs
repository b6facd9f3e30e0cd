use std::sync::Arc;

use async_trait::async_trait;
use deadpool_redis::{Config as RedisConfig, Pool, Runtime};
use redis::{AsyncCommands, Script};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::Room;
use crate::store::RoomStore;

/// Create a Redis connection pool
pub fn create_pool(config: &Config) -> Result<Pool> {
    let redis_config = RedisConfig::from_url(&config.redis_url);
    let pool = redis_config
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| AppError::StoreUnavailable(format!("Failed to create Redis pool: {}", e)))?;

    Ok(pool)
}

fn room_key(rid: &str) -> String {
    format!("room:{}", rid)
}

/// Versioned envelope persisted for each room.
#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u64,
    room: Room,
}

/// Compares the stored envelope version and, on a match, replaces the
/// value (re-arming the TTL) or deletes the key when the new payload is
/// empty. Runs atomically server-side.
const CAS_SCRIPT: &str = r#"
local cur = redis.call('GET', KEYS[1])
if cur == false then
  return 0
end
local doc = cjson.decode(cur)
if doc['version'] ~= tonumber(ARGV[1]) then
  return 0
end
if ARGV[2] == '' then
  redis.call('DEL', KEYS[1])
else
  redis.call('SET', KEYS[1], ARGV[2], 'EX', tonumber(ARGV[3]))
end
return 1
"#;

/// Room store backed by Redis: versioned JSON envelopes under `room:{rid}`,
/// `SET NX` for creation, a Lua script for compare-and-swap, and `INCR`
/// for the sequence counter.
#[derive(Clone)]
pub struct RedisRoomStore {
    pool: Pool,
    cas: Arc<Script>,
}

impl RedisRoomStore {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            cas: Arc::new(Script::new(CAS_SCRIPT)),
        }
    }
}

#[async_trait]
impl RoomStore for RedisRoomStore {
    async fn read(&self, rid: &str) -> Result<Option<(Room, u64)>> {
        let mut conn = self.pool.get().await?;

        let json: Option<String> = conn.get(room_key(rid)).await?;

        match json {
            Some(data) => {
                let envelope: Envelope = serde_json::from_str(&data)?;
                Ok(Some((envelope.room, envelope.version)))
            }
            None => Ok(None),
        }
    }

    async fn create_if_absent(&self, rid: &str, room: &Room, ttl_seconds: u64) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let json = serde_json::to_string(&Envelope {
            version: 1,
            room: room.clone(),
        })?;

        let created: Option<String> = redis::cmd("SET")
            .arg(room_key(rid))
            .arg(&json)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds as i64)
            .query_async(&mut *conn)
            .await?;

        Ok(created.is_some())
    }

    async fn compare_and_swap(
        &self,
        rid: &str,
        next: Option<&Room>,
        version: u64,
        ttl_seconds: u64,
    ) -> Result<bool> {
        let mut conn = self.pool.get().await?;

        let payload = match next {
            Some(room) => serde_json::to_string(&Envelope {
                version: version + 1,
                room: room.clone(),
            })?,
            None => String::new(),
        };

        let swapped: i64 = self
            .cas
            .key(room_key(rid))
            .arg(version)
            .arg(payload)
            .arg(ttl_seconds as i64)
            .invoke_async(&mut *conn)
            .await?;

        Ok(swapped == 1)
    }

    async fn atomic_increment(&self, counter: &str) -> Result<u64> {
        let mut conn = self.pool.get().await?;

        let value: u64 = conn.incr(counter, 1).await?;
        Ok(value)
    }

    async fn ping(&self) -> Result<bool> {
        let mut conn = self.pool.get().await?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;

        Ok(pong == "PONG")
    }
}
