//! Shared key/value cache.
//!
//! The cache is the system's only cross-process shared mutable state.
//! [`Cache::set_if_absent`] is the sole idempotency primitive: it is
//! server-side atomic (`SET ... EX ... NX`), returns true exactly once per
//! key per TTL window across all callers, and every side-effecting handler
//! calls it before producing any durable record or broadcast.

use redis::aio::ConnectionManager;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::Result;
use crate::keys;

#[derive(Clone)]
pub struct Cache {
    conn: ConnectionManager,
}

impl Cache {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Atomic set-if-absent with TTL. True when this caller is the first
    /// writer and therefore owns the side effects for the key.
    pub async fn set_if_absent(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    /// Store a JSON value; `ttl_secs` of 0 means no expiry.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let encoded = serde_json::to_string(value)?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(encoded);
        if ttl_secs > 0 {
            cmd.arg("EX").arg(ttl_secs);
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    /// Fetch a JSON value. A missing key and an undecodable value both come
    /// back as `None`; the cache never poisons a handler.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                debug!(key, "discarding undecodable cache value: {e}");
                Ok(None)
            }
        }
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }

    /// Increment a counter, setting its TTL when freshly created. Used for
    /// simple rate limiting.
    pub async fn incr(&self, key: &str, ttl_secs: u64) -> Result<i64> {
        let mut conn = self.conn.clone();
        let count: i64 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;
        if count == 1 && ttl_secs > 0 {
            let _: () = redis::cmd("EXPIRE")
                .arg(key)
                .arg(ttl_secs)
                .query_async(&mut conn)
                .await?;
        }
        Ok(count)
    }

    /// Append a member to a time-ranked sorted set.
    pub async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Ranked range read, ascending by score.
    pub async fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
        limit: usize,
    ) -> Result<Vec<(String, f64)>> {
        let mut conn = self.conn.clone();
        let reply: Vec<(String, f64)> = redis::cmd("ZRANGEBYSCORE")
            .arg(key)
            .arg(min)
            .arg(max)
            .arg("WITHSCORES")
            .arg("LIMIT")
            .arg(0)
            .arg(limit)
            .query_async(&mut conn)
            .await?;
        Ok(reply)
    }
}

/// Membership map of rooms currently running a raffle.
///
/// Stored as one JSON map of room id to last-marked unix time. Expiry is
/// swept on read: stale entries are dropped and the cleaned map written back.
#[derive(Clone)]
pub struct InLotteryRooms {
    cache: Cache,
}

impl InLotteryRooms {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }

    pub async fn add(&self, room_id: u64) -> Result<()> {
        let mut rooms: HashMap<u64, i64> = self
            .cache
            .get_json(keys::IN_LOTTERY_KEY)
            .await?
            .unwrap_or_default();
        rooms.insert(room_id, chrono::Utc::now().timestamp());
        self.cache.set_json(keys::IN_LOTTERY_KEY, &rooms, 0).await
    }

    pub async fn all(&self) -> Result<HashSet<u64>> {
        let rooms: HashMap<u64, i64> = self
            .cache
            .get_json(keys::IN_LOTTERY_KEY)
            .await?
            .unwrap_or_default();

        let now = chrono::Utc::now().timestamp();
        let fresh: HashMap<u64, i64> = rooms
            .iter()
            .filter(|(_, marked)| now - **marked < keys::IN_LOTTERY_TIMEOUT as i64)
            .map(|(room, marked)| (*room, *marked))
            .collect();

        if fresh.len() != rooms.len() {
            self.cache.set_json(keys::IN_LOTTERY_KEY, &fresh, 0).await?;
        }

        Ok(fresh.keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::DEDUP_SENTINEL;

    async fn test_cache() -> Option<Cache> {
        // Integration tests need a local redis; skipped silently without one.
        Cache::connect("redis://127.0.0.1/").await.ok()
    }

    /// Run with a local redis: cargo test -p raffle-core -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_set_if_absent_is_first_writer_wins() {
        let Some(cache) = test_cache().await else {
            return;
        };
        let key = format!("test_dedup_{}", std::process::id());
        cache.delete(&key).await.unwrap();

        assert!(cache.set_if_absent(&key, DEDUP_SENTINEL, 60).await.unwrap());
        assert!(!cache.set_if_absent(&key, DEDUP_SENTINEL, 60).await.unwrap());
        cache.delete(&key).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_json_round_trip_and_ttl() {
        let Some(cache) = test_cache().await else {
            return;
        };
        let key = format!("test_json_{}", std::process::id());

        cache.set_json(&key, &vec![1u64, 2, 3], 60).await.unwrap();
        let back: Option<Vec<u64>> = cache.get_json(&key).await.unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));
        cache.delete(&key).await.unwrap();

        let missing: Option<Vec<u64>> = cache.get_json(&key).await.unwrap();
        assert_eq!(missing, None);
    }
}
