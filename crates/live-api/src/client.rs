//! The API client.

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::{ApiError, Result};

const DEFAULT_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

const REFERER: &str = "https://live.bilibili.com";

/// One entry of the guard-list feed: a room and its guard-count
/// characteristic, used by the bootstrap poll to spot changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct GuardListEntry {
    #[serde(rename = "roomid")]
    pub room_id: u64,
    #[serde(default)]
    pub guard_count: u32,
}

/// Client for the live platform HTTP API.
#[derive(Clone)]
pub struct LiveApi {
    client: Client,
    base: String,
    guard_list_url: String,
}

impl LiveApi {
    const ROOM_LIST_PATH: &str = "/xlive/web-interface/v1/second/getList";
    const LOTTERY_CHECK_PATH: &str = "/xlive/lottery-interface/v1/lottery/Check";

    const DEFAULT_BASE: &str = "https://api.live.bilibili.com";
    const DEFAULT_GUARD_LIST_URL: &str = "https://api.vtbs.moe/v1/guard/all";

    pub fn new() -> Self {
        Self::with_base(Self::DEFAULT_BASE, Self::DEFAULT_GUARD_LIST_URL)
    }

    /// Point the client at alternate endpoints (tests, mirrors).
    pub fn with_base(base: impl Into<String>, guard_list_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base: base.into(),
            guard_list_url: guard_list_url.into(),
        }
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let json: Value = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, DEFAULT_UA)
            .header(reqwest::header::REFERER, REFERER)
            .send()
            .await?
            .json()
            .await?;

        let code = json.get("code").and_then(Value::as_i64).unwrap_or(-1);
        if code != 0 {
            let message = json
                .get("message")
                .or_else(|| json.get("msg"))
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            return Err(ApiError::Api { code, message });
        }
        Ok(json)
    }

    /// Currently-live rooms in a category, ordered by the feed (online desc).
    pub async fn get_live_rooms(&self, area_id: u32) -> Result<Vec<u64>> {
        let url = format!(
            "{}{}?platform=web&parent_area_id={}&area_id=0&sort_type=online&page=1",
            self.base,
            Self::ROOM_LIST_PATH,
            area_id
        );

        let json = self.get_json(&url).await?;
        let rooms = json
            .pointer("/data/list")
            .and_then(Value::as_array)
            .ok_or_else(|| ApiError::MalformedResponse("missing data.list".into()))?
            .iter()
            .filter_map(|room| room.get("roomid").and_then(Value::as_u64))
            .collect::<Vec<_>>();

        debug!(area_id, count = rooms.len(), "fetched live rooms");
        Ok(rooms)
    }

    /// Authoritative per-room check.
    ///
    /// Returns the current guard purchase list and active gift raffle list.
    /// A response without either list is the transiently-retryable
    /// empty-raffle condition, not a hard failure.
    pub async fn check_room(&self, room_id: u64) -> Result<(Vec<Value>, Vec<Value>)> {
        let url = format!("{}{}?roomid={}", self.base, Self::LOTTERY_CHECK_PATH, room_id);
        let json = self.get_json(&url).await?;

        let data = json.get("data").ok_or(ApiError::EmptyRaffleList)?;
        if data.get("guard").is_none() && data.get("gift").is_none() {
            return Err(ApiError::EmptyRaffleList);
        }

        let list = |field: &str| -> Vec<Value> {
            data.get(field)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        };

        Ok((list("guard"), list("gift")))
    }

    /// The guard-list feed: a recency-ordered window of rooms with recent
    /// guard activity, each with its guard-count characteristic.
    pub async fn get_guard_list(&self) -> Result<Vec<GuardListEntry>> {
        let json = self.get_json(&self.guard_list_url).await?;
        let entries = json
            .get("list")
            .or_else(|| json.pointer("/data/list"))
            .and_then(Value::as_array)
            .ok_or_else(|| ApiError::MalformedResponse("missing guard list".into()))?
            .iter()
            .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
            .collect::<Vec<GuardListEntry>>();

        debug!(count = entries.len(), "fetched guard list");
        Ok(entries)
    }
}

impl Default for LiveApi {
    fn default() -> Self {
        Self::new()
    }
}
