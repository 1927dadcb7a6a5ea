//! Guard purchase handling. Single-phase: no later result event exists, so
//! creation is also finalization.

use chrono::{Duration, Utc};
use serde_json::Value;
use tracing::{debug, info};

use super::value_as_i64;
use crate::envelope::EventEnvelope;
use crate::error::Result;
use crate::keys;
use crate::processor::HandlerContext;
use crate::records::{BroadcastMessage, GuardRecord, RaffleType, UserIdentity};

pub(super) async fn handle(ctx: &HandlerContext, envelope: EventEnvelope) -> Result<()> {
    let Some(entry) = envelope.payload.pointer("/data/lottery") else {
        debug!(room_id = envelope.room_id, "guard envelope without lottery entry");
        return Ok(());
    };
    handle_guards(ctx, envelope.room_id, std::slice::from_ref(entry)).await
}

/// Tier code to display name.
fn tier_name(privilege_type: i64) -> String {
    match privilege_type {
        1 => "舰长".to_string(),
        2 => "提督".to_string(),
        3 => "总督".to_string(),
        other => format!("guard_{other}"),
    }
}

fn sender_identity(value: Option<&Value>) -> UserIdentity {
    let uid = value.and_then(|s| value_as_i64(s.get("uid")));
    let name = value
        .and_then(|s| s.get("uname"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let face = value
        .and_then(|s| s.get("face"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    UserIdentity::new(uid, name, face)
}

/// Process a list of guard purchase entries for one room. Shared by the
/// inline guard envelope and the authoritative check response.
pub(super) async fn handle_guards(
    ctx: &HandlerContext,
    room_id: u64,
    entries: &[Value],
) -> Result<()> {
    for info in entries {
        let Some(raffle_id) = value_as_i64(info.get("id")) else {
            debug!(room_id, "guard entry without id");
            continue;
        };

        let key = keys::guard(room_id, raffle_id);
        if !ctx
            .cache
            .set_if_absent(&key, keys::DEDUP_SENTINEL, keys::DEDUP_TTL)
            .await?
        {
            continue;
        }

        let privilege = info.get("privilege_type").and_then(Value::as_i64).unwrap_or(0);
        let gift_name = tier_name(privilege);
        let duration = info.get("time").and_then(Value::as_i64).unwrap_or(0);
        let created_time = Utc::now();
        let expire_time = created_time + Duration::seconds(duration);

        ctx.sink
            .publish(&BroadcastMessage::new(
                RaffleType::Guard,
                room_id,
                raffle_id,
                &gift_name,
            ))
            .await?;

        let record = GuardRecord {
            raffle_id,
            room_id,
            gift_name: gift_name.clone(),
            sender: sender_identity(info.get("sender")),
            created_time,
            expire_time,
        };
        ctx.cache
            .set_json(&keys::guard_record(raffle_id), &record, keys::DEDUP_TTL)
            .await?;
        ctx.storage.save_guard(&record).await?;

        info!(
            room_id,
            raffle_id,
            gift_name,
            sender = %record.sender.name,
            "guard purchase recorded"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_names() {
        assert_eq!(tier_name(1), "舰长");
        assert_eq!(tier_name(2), "提督");
        assert_eq!(tier_name(3), "总督");
        assert_eq!(tier_name(9), "guard_9");
    }

    #[test]
    fn test_sender_identity_tolerates_missing_fields() {
        let full = serde_json::json!({"uid": 5, "uname": "buyer", "face": "url"});
        let identity = sender_identity(Some(&full));
        assert_eq!(identity.uid, Some(5));
        assert_eq!(identity.name, "buyer");

        let empty = sender_identity(None);
        assert_eq!(empty.uid, None);
        assert_eq!(empty.name, "");
    }
}
