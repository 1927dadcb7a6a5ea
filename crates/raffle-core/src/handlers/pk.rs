//! PK draws: broadcast only, no durable record.

use tracing::{debug, info};

use super::value_as_i64;
use crate::envelope::EventEnvelope;
use crate::error::Result;
use crate::keys;
use crate::processor::HandlerContext;
use crate::records::{BroadcastMessage, RaffleType};

pub(super) async fn handle(ctx: &HandlerContext, envelope: EventEnvelope) -> Result<()> {
    let room_id = envelope.room_id;
    let Some(raffle_id) = value_as_i64(envelope.payload.pointer("/data/id")) else {
        debug!(room_id, "pk envelope without id");
        return Ok(());
    };

    let key = keys::pk(room_id, raffle_id);
    if !ctx
        .cache
        .set_if_absent(&key, keys::DEDUP_SENTINEL, keys::DEDUP_TTL)
        .await?
    {
        return Ok(());
    }

    ctx.sink
        .publish(&BroadcastMessage::new(
            RaffleType::Pk,
            room_id,
            raffle_id,
            "PK",
        ))
        .await?;

    info!(room_id, raffle_id, "pk broadcast");
    Ok(())
}
