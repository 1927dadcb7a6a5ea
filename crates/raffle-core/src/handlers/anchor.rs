//! Anchor-initiated draws: the broadcaster defines the prize and the
//! qualification rule. Two sub-events share the kind, keyed by the payload
//! command.

use serde_json::Value;
use tracing::debug;

use super::value_as_i64;
use crate::envelope::EventEnvelope;
use crate::error::Result;
use crate::keys;
use crate::processor::HandlerContext;
use crate::records::{BroadcastMessage, RaffleType};

pub(super) async fn handle(ctx: &HandlerContext, envelope: EventEnvelope) -> Result<()> {
    let cmd = envelope
        .payload
        .get("cmd")
        .and_then(Value::as_str)
        .unwrap_or("");

    match cmd {
        "ANCHOR_LOT_AWARD" => handle_award(ctx, envelope).await,
        "ANCHOR_LOT_START" => handle_start(ctx, envelope).await,
        other => {
            debug!(room_id = envelope.room_id, cmd = other, "ignored anchor command");
            Ok(())
        }
    }
}

/// The award notice is simply upserted keyed by its raffle id; no dedup gate
/// is needed because rewrites are identical.
async fn handle_award(ctx: &HandlerContext, envelope: EventEnvelope) -> Result<()> {
    let Some(data) = envelope.payload.get("data") else {
        return Ok(());
    };
    let Some(raffle_id) = value_as_i64(data.get("id")) else {
        debug!(room_id = envelope.room_id, "anchor award without id");
        return Ok(());
    };

    let mut stored = data.clone();
    if let Some(map) = stored.as_object_mut() {
        map.insert("room_id".to_string(), Value::from(envelope.room_id));
    }
    ctx.cache
        .set_json(&keys::anchor_record(raffle_id), &stored, keys::DEDUP_TTL)
        .await
}

/// The draw definition is broadcast once per raffle id.
async fn handle_start(ctx: &HandlerContext, envelope: EventEnvelope) -> Result<()> {
    let Some(data) = envelope.payload.get("data") else {
        return Ok(());
    };
    let Some(raffle_id) = value_as_i64(data.get("id")) else {
        debug!(room_id = envelope.room_id, "anchor start without id");
        return Ok(());
    };
    // The definition names the room itself; prefer it over the envelope's.
    let room_id = data
        .get("room_id")
        .and_then(Value::as_u64)
        .unwrap_or(envelope.room_id);

    let key = keys::anchor(room_id, raffle_id);
    if !ctx
        .cache
        .set_if_absent(&key, keys::DEDUP_SENTINEL, keys::DEDUP_TTL)
        .await?
    {
        return Ok(());
    }

    let message = BroadcastMessage::new(RaffleType::Anchor, room_id, raffle_id, "天选时刻")
        .with_extra(
            "join_type",
            data.get("join_type").cloned().unwrap_or(Value::Null),
        )
        .with_extra("require", Value::String(require_text(data)))
        .with_extra("gift", Value::String(gift_text(data)))
        .with_extra("award", Value::String(award_text(data)));
    ctx.sink.publish(&message).await
}

/// Qualification rule, e.g. "3-1:大航海".
fn require_text(data: &Value) -> String {
    let require_type = value_as_i64(data.get("require_type")).unwrap_or(0);
    let require_value = value_as_i64(data.get("require_value")).unwrap_or(0);
    let require_text = data
        .get("require_text")
        .and_then(Value::as_str)
        .unwrap_or("");
    format!("{require_type}-{require_value}:{require_text}")
}

/// Entry cost, e.g. "1*辣条(100)".
fn gift_text(data: &Value) -> String {
    let gift_num = value_as_i64(data.get("gift_num")).unwrap_or(0);
    let gift_name = data
        .get("gift_name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .unwrap_or("null");
    let gift_price = value_as_i64(data.get("gift_price")).unwrap_or(0);
    format!("{gift_num}*{gift_name}({gift_price})")
}

/// Prize, e.g. "2*签名照".
fn award_text(data: &Value) -> String {
    let award_num = value_as_i64(data.get("award_num")).unwrap_or(0);
    let award_name = data.get("award_name").and_then(Value::as_str).unwrap_or("");
    format!("{award_num}*{award_name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_require_and_gift_and_award_texts() {
        let data = json!({
            "require_type": 3,
            "require_value": 1,
            "require_text": "大航海",
            "gift_num": 1,
            "gift_name": "辣条",
            "gift_price": 100,
            "award_num": 2,
            "award_name": "签名照"
        });
        assert_eq!(require_text(&data), "3-1:大航海");
        assert_eq!(gift_text(&data), "1*辣条(100)");
        assert_eq!(award_text(&data), "2*签名照");
    }

    #[test]
    fn test_free_entry_gift_is_null() {
        let data = json!({"gift_num": 0, "gift_name": "", "gift_price": 0});
        assert_eq!(gift_text(&data), "0*null(0)");
    }
}
