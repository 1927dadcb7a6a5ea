//! Outward broadcast feed.
//!
//! Detected raffles are appended to a time-ranked sorted set that downstream
//! readers consume. Entries are never mutated after append.

use chrono::Utc;
use tracing::debug;

use crate::cache::Cache;
use crate::error::Result;
use crate::keys;
use crate::records::BroadcastMessage;

#[derive(Clone)]
pub struct BroadcastSink {
    cache: Cache,
}

impl BroadcastSink {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }

    pub async fn publish(&self, message: &BroadcastMessage) -> Result<()> {
        let member = serde_json::to_string(message)?;
        self.cache
            .zadd(keys::BROADCAST_KEY, &member, Utc::now().timestamp() as f64)
            .await
    }

    /// Entries appended at or after `since` unix seconds, oldest first.
    pub async fn recent(&self, since: i64) -> Result<Vec<BroadcastMessage>> {
        let members = self
            .cache
            .zrange_by_score(keys::BROADCAST_KEY, since as f64, f64::INFINITY, 10_000)
            .await?;

        let mut messages = Vec::with_capacity(members.len());
        for (member, score) in members {
            match serde_json::from_str(&member) {
                Ok(message) => messages.push(message),
                Err(e) => debug!(score, "skipping undecodable feed entry: {e}"),
            }
        }
        Ok(messages)
    }
}
