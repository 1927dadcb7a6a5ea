//! Storm handling. Storm ids are composite: the inner raffle id is embedded
//! in a larger numeric id.

use chrono::{Duration, Utc};
use tracing::{debug, info};

use super::value_as_i64;
use crate::envelope::EventEnvelope;
use crate::error::Result;
use crate::keys;
use crate::processor::HandlerContext;
use crate::records::{BroadcastMessage, GuardRecord, RaffleType, UserIdentity};

const STORM_GIFT_NAME: &str = "节奏风暴";
const STORM_ID_DIVISOR: i64 = 1_000_000;
const STORM_EXPIRE_OFFSET_SECS: i64 = 90;

/// Inner raffle id embedded in the composite storm id.
fn inner_raffle_id(storm_id: i64) -> i64 {
    storm_id / STORM_ID_DIVISOR
}

pub(super) async fn handle(ctx: &HandlerContext, envelope: EventEnvelope) -> Result<()> {
    let room_id = envelope.room_id;
    let Some(raffle_id) = value_as_i64(envelope.payload.pointer("/data/39/id")) else {
        debug!(room_id, "storm envelope without id");
        return Ok(());
    };

    let key = keys::storm(room_id, raffle_id);
    if !ctx
        .cache
        .set_if_absent(&key, keys::DEDUP_SENTINEL, keys::DEDUP_TTL)
        .await?
    {
        return Ok(());
    }

    let created_time = Utc::now();
    let expire_time = created_time - Duration::seconds(STORM_EXPIRE_OFFSET_SECS);
    let inner_id = inner_raffle_id(raffle_id);

    let record = GuardRecord {
        raffle_id: inner_id,
        room_id,
        gift_name: STORM_GIFT_NAME.to_string(),
        sender: UserIdentity::storm_sender(),
        created_time,
        expire_time,
    };
    ctx.cache
        .set_json(&keys::guard_record(inner_id), &record, keys::DEDUP_TTL)
        .await?;
    ctx.storage.save_guard(&record).await?;

    ctx.sink
        .publish(&BroadcastMessage::new(
            RaffleType::Storm,
            room_id,
            raffle_id,
            STORM_GIFT_NAME,
        ))
        .await?;

    info!(room_id, raffle_id, inner_id, "storm recorded");
    Ok(())
}
