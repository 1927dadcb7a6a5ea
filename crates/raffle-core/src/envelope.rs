//! The unit carried on the inter-process queue.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event kind, one variant per handler.
///
/// Tag strings keep the historical one-letter wire values so envelopes stay
/// readable on the wire; the two check kinds are the ones the processor
/// collapses per room per drain cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Guard purchase carried inline (bootstrap poll and check responses).
    #[serde(rename = "G")]
    GuardBuy,
    /// Raffle resolved with a winner.
    #[serde(rename = "R")]
    RaffleResult,
    /// Anchor draw definition / award.
    #[serde(rename = "A")]
    AnchorAward,
    /// Chat line passthrough.
    #[serde(rename = "D")]
    Danmaku,
    /// PK draw.
    #[serde(rename = "P")]
    Pk,
    /// Room-wide bonus gift.
    #[serde(rename = "S")]
    Storm,
    /// Raffle announced inline on the stream.
    #[serde(rename = "RAFFLE_START")]
    RaffleStart,
    /// Trigger: something raffle-shaped happened, run the authoritative check.
    #[serde(rename = "T")]
    TvCheck,
    /// Trigger: a guard purchase happened, run the authoritative check.
    #[serde(rename = "Z")]
    GuardCheck,
}

impl EventKind {
    /// Kinds that trigger the expensive authoritative room lookup. The
    /// lookup returns the room's full current state, so one trigger per room
    /// per drain cycle is enough.
    pub fn needs_room_check(self) -> bool {
        matches!(self, EventKind::TvCheck | EventKind::GuardCheck)
    }
}

/// A serialized event on its way from a discovery process to the processor.
///
/// Immutable once created; exactly one component owns it at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub kind: EventKind,
    pub room_id: u64,
    #[serde(default)]
    pub payload: Value,
    pub enqueued_at: i64,
}

impl EventEnvelope {
    pub fn new(kind: EventKind, room_id: u64, payload: Value) -> Self {
        Self {
            kind,
            room_id,
            payload,
            enqueued_at: Utc::now().timestamp(),
        }
    }

    /// A payload-less trigger envelope; the processor fetches the detail.
    pub fn trigger(kind: EventKind, room_id: u64) -> Self {
        Self::new(kind, room_id, Value::Null)
    }
}
