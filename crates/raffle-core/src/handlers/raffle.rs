//! Gift raffle handling: announcements (pre phase) and results.

use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

use super::{value_as_i64, value_as_string};
use crate::envelope::EventEnvelope;
use crate::error::Result;
use crate::keys;
use crate::processor::HandlerContext;
use crate::records::{
    BroadcastMessage, RaffleOutcome, RaffleRecord, RaffleType, UserIdentity,
};

/// A raffle announced inline on the stream carries one gift entry.
pub(super) async fn handle_start(ctx: &HandlerContext, envelope: EventEnvelope) -> Result<()> {
    let Some(data) = envelope.payload.get("data") else {
        debug!(room_id = envelope.room_id, "raffle start without data");
        return Ok(());
    };
    handle_announcements(ctx, envelope.room_id, std::slice::from_ref(data)).await
}

/// Display name out of the free-text thank-you field: the part after the
/// donation phrase, or the whole text when the phrase is absent.
fn display_gift_name(thank_text: &str) -> String {
    thank_text
        .split_once("赠送的")
        .map(|(_, rest)| rest)
        .unwrap_or(thank_text)
        .to_string()
}

/// Process announced gift raffles for one room. Shared by the inline
/// announcement and the authoritative check response.
pub(super) async fn handle_announcements(
    ctx: &HandlerContext,
    room_id: u64,
    entries: &[Value],
) -> Result<()> {
    ctx.in_lottery.add(room_id).await?;

    let mut display_names: HashMap<String, String> = HashMap::new();

    for info in entries {
        let Some(raffle_id) = value_as_i64(info.get("raffleId")) else {
            debug!(room_id, "gift entry without raffleId");
            continue;
        };

        let key = keys::tv(room_id, raffle_id);
        if !ctx
            .cache
            .set_if_absent(&key, keys::DEDUP_SENTINEL, keys::DEDUP_TTL)
            .await?
        {
            continue;
        }

        let gift_type = value_as_string(info.get("type")).unwrap_or_default();
        let thank_text = info.get("thank_text").and_then(Value::as_str).unwrap_or("");
        let gift_name = display_gift_name(thank_text);
        let duration = info.get("time").and_then(Value::as_i64).unwrap_or(0);
        let created_time = Utc::now();
        let expire_time = created_time + chrono::Duration::seconds(duration);

        let mut message = BroadcastMessage::new(RaffleType::Tv, room_id, raffle_id, &gift_name)
            .with_extra("gift_type", Value::String(gift_type.clone()));
        if let Some(time_wait) = info.get("time_wait").and_then(Value::as_i64) {
            message = message.with_extra("time_wait", Value::from(time_wait));
        }
        if let Some(max_time) = info.get("max_time").and_then(Value::as_i64) {
            message = message.with_extra("max_time", Value::from(max_time));
        }
        ctx.sink.publish(&message).await?;

        let sender = UserIdentity::new(
            None,
            info.pointer("/from_user/uname")
                .and_then(Value::as_str)
                .unwrap_or(""),
            info.pointer("/from_user/face")
                .and_then(Value::as_str)
                .unwrap_or(""),
        );
        info!(
            room_id,
            raffle_id,
            gift_name,
            sender = %sender.name,
            "lottery found"
        );

        let record = RaffleRecord::announced(
            raffle_id,
            room_id,
            &gift_name,
            Some(gift_type.clone()).filter(|t| !t.is_empty()),
            sender,
            created_time,
            expire_time,
        );
        ctx.cache
            .set_json(&keys::pre_raffle(raffle_id), &record, keys::PRE_RAFFLE_TTL)
            .await?;
        ctx.cache
            .set_json(&keys::raffle_record(raffle_id), &record, keys::DEDUP_TTL)
            .await?;
        ctx.storage.record_announced(&record).await?;

        if !gift_type.is_empty() {
            display_names.insert(gift_type, gift_name);
        }
    }

    // The result event only carries the type code, so remember the display
    // name for the result handler (and for slots that miss the announcement).
    for (code, name) in display_names {
        ctx.cache
            .set_json(&keys::gift_type(&code), &name, keys::DEDUP_TTL)
            .await?;
    }

    Ok(())
}

/// Merge a raffle result into its record. Dedup is implicit: finalize is an
/// upsert keyed by the raffle id.
pub(super) async fn handle_result(ctx: &HandlerContext, envelope: EventEnvelope) -> Result<()> {
    let room_id = envelope.room_id;
    let Some(data) = envelope.payload.get("data") else {
        debug!(room_id, "raffle result without data");
        return Ok(());
    };
    let Some(raffle_id) = value_as_i64(data.get("raffleId")) else {
        debug!(room_id, "raffle result without raffleId");
        return Ok(());
    };

    let gift_type = value_as_string(data.get("type")).unwrap_or_default();
    let winner = UserIdentity::new(
        None,
        data.get("uname").and_then(Value::as_str).unwrap_or(""),
        data.pointer("/win/face").and_then(Value::as_str).unwrap_or(""),
    );
    let sender = UserIdentity::new(
        None,
        data.get("from").and_then(Value::as_str).unwrap_or(""),
        data.get("fromFace").and_then(Value::as_str).unwrap_or(""),
    );
    let prize_gift_name = data
        .get("giftName")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let prize_count = value_as_i64(data.pointer("/win/giftNum")).unwrap_or(0);

    let mut record = match ctx
        .cache
        .get_json::<RaffleRecord>(&keys::pre_raffle(raffle_id))
        .await?
    {
        Some(record) => record,
        None => {
            // Announcement was missed (e.g. the watching slot joined the
            // room stream after the raffle started): synthesize it.
            let gift_name: Option<String> =
                ctx.cache.get_json(&keys::gift_type(&gift_type)).await?;
            RaffleRecord::fallback(
                raffle_id,
                room_id,
                gift_name.unwrap_or_default(),
                Some(gift_type.clone()).filter(|t| !t.is_empty()),
                sender,
                Utc::now(),
            )
        }
    };

    record.merge_result(RaffleOutcome {
        prize_gift_name,
        prize_count,
        winner,
        payload: serde_json::to_string(&envelope.payload)?,
    });

    ctx.cache
        .set_json(&keys::raffle_record(raffle_id), &record, keys::DEDUP_TTL)
        .await?;
    ctx.storage.finalize(&record).await?;

    info!(
        room_id,
        raffle_id,
        winner = %record.winner.as_ref().map(|w| w.name.as_str()).unwrap_or(""),
        prize = %record.prize_gift_name.as_deref().unwrap_or(""),
        "raffle result recorded"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_gift_name_takes_tail_after_phrase() {
        assert_eq!(display_gift_name("感谢 user 赠送的小电视飞船"), "小电视飞船");
        assert_eq!(display_gift_name("摩天大楼"), "摩天大楼");
        assert_eq!(display_gift_name(""), "");
        // Only the first occurrence splits.
        assert_eq!(display_gift_name("赠送的赠送的礼物"), "赠送的礼物");
    }
}
