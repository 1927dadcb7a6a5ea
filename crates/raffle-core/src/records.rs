//! Record entities: raffles, guards, broadcast entries.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// How far back the announce time is estimated when a result arrives with no
/// matching pre-phase record.
pub const RESULT_BACKDATE_SECS: i64 = 180;

/// Synthetic sender recorded for storm entries.
pub const STORM_SENDER_NAME: &str = "&__STORM_SENDER__";

/// A user as seen in event payloads. The uid is frequently absent; the name
/// is a point-in-time snapshot, not an identity lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub uid: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub face: String,
}

impl UserIdentity {
    pub fn new(uid: Option<i64>, name: impl Into<String>, face: impl Into<String>) -> Self {
        Self {
            uid,
            name: name.into(),
            face: face.into(),
        }
    }

    pub fn storm_sender() -> Self {
        Self::new(Some(-1), STORM_SENDER_NAME, "")
    }
}

/// Closed set of broadcastable raffle kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaffleType {
    Guard,
    Tv,
    Storm,
    Pk,
    Anchor,
}

impl RaffleType {
    pub fn as_str(self) -> &'static str {
        match self {
            RaffleType::Guard => "guard",
            RaffleType::Tv => "tv",
            RaffleType::Storm => "storm",
            RaffleType::Pk => "pk",
            RaffleType::Anchor => "anchor",
        }
    }
}

impl fmt::Display for RaffleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RaffleType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guard" => Ok(RaffleType::Guard),
            "tv" => Ok(RaffleType::Tv),
            "storm" => Ok(RaffleType::Storm),
            "pk" => Ok(RaffleType::Pk),
            "anchor" => Ok(RaffleType::Anchor),
            other => Err(CoreError::Validation {
                field: "raffle_type",
                value: other.to_string(),
            }),
        }
    }
}

/// Canonical representation of a detected raffle.
///
/// Created in the pre (announced) phase with sender info and an observed
/// expiry; optionally finalized when the result arrives, which fills in the
/// prize and winner fields and keeps the original id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaffleRecord {
    pub raffle_id: i64,
    pub room_id: u64,
    pub gift_name: String,
    pub gift_type: Option<String>,
    pub sender: UserIdentity,
    pub created_time: DateTime<Utc>,
    pub expire_time: DateTime<Utc>,
    #[serde(default)]
    pub prize_gift_name: Option<String>,
    #[serde(default)]
    pub prize_count: Option<i64>,
    #[serde(default)]
    pub winner: Option<UserIdentity>,
    #[serde(default)]
    pub result_payload: Option<String>,
}

/// Result-phase fields merged into a raffle record.
#[derive(Debug, Clone)]
pub struct RaffleOutcome {
    pub prize_gift_name: String,
    pub prize_count: i64,
    pub winner: UserIdentity,
    pub payload: String,
}

impl RaffleRecord {
    /// A freshly announced raffle, result fields empty.
    pub fn announced(
        raffle_id: i64,
        room_id: u64,
        gift_name: impl Into<String>,
        gift_type: Option<String>,
        sender: UserIdentity,
        created_time: DateTime<Utc>,
        expire_time: DateTime<Utc>,
    ) -> Self {
        Self {
            raffle_id,
            room_id,
            gift_name: gift_name.into(),
            gift_type,
            sender,
            created_time,
            expire_time,
            prize_gift_name: None,
            prize_count: None,
            winner: None,
            result_payload: None,
        }
    }

    /// Approximate record synthesized when the announcement was missed,
    /// e.g. the watching slot joined the room stream after the raffle
    /// started. The announce time is estimated a fixed offset back from the
    /// result time.
    pub fn fallback(
        raffle_id: i64,
        room_id: u64,
        gift_name: impl Into<String>,
        gift_type: Option<String>,
        sender: UserIdentity,
        result_time: DateTime<Utc>,
    ) -> Self {
        Self::announced(
            raffle_id,
            room_id,
            gift_name,
            gift_type,
            sender,
            result_time - Duration::seconds(RESULT_BACKDATE_SECS),
            result_time,
        )
    }

    /// Merge result fields; announcement fields are left untouched.
    pub fn merge_result(&mut self, outcome: RaffleOutcome) {
        self.prize_gift_name = Some(outcome.prize_gift_name);
        self.prize_count = Some(outcome.prize_count);
        self.winner = Some(outcome.winner);
        self.result_payload = Some(outcome.payload);
    }
}

/// Single-phase record: guard purchases have no separate result
/// notification, so creation is also finalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardRecord {
    pub raffle_id: i64,
    pub room_id: u64,
    pub gift_name: String,
    pub sender: UserIdentity,
    pub created_time: DateTime<Utc>,
    pub expire_time: DateTime<Utc>,
}

/// Outward-facing, append-only feed entry. Never mutated after append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub raffle_type: RaffleType,
    pub ts: i64,
    pub real_room_id: u64,
    pub raffle_id: i64,
    pub gift_name: String,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl BroadcastMessage {
    pub fn new(
        raffle_type: RaffleType,
        real_room_id: u64,
        raffle_id: i64,
        gift_name: impl Into<String>,
    ) -> Self {
        Self {
            raffle_type,
            ts: Utc::now().timestamp(),
            real_room_id,
            raffle_id,
            gift_name: gift_name.into(),
            extra: Map::new(),
        }
    }

    pub fn with_extra(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }
}
