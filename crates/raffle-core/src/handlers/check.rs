//! Authoritative per-room check, triggered by the collapsed TvCheck /
//! GuardCheck envelopes. One response carries both the guard list and the
//! gift raffle list; both handlers run from it.

use std::time::Duration;
use tracing::error;

use super::{guard, raffle};
use crate::envelope::EventEnvelope;
use crate::error::Result;
use crate::processor::HandlerContext;

const EMPTY_RETRY_DELAY: Duration = Duration::from_secs(1);

pub(super) async fn handle(ctx: &HandlerContext, envelope: EventEnvelope) -> Result<()> {
    let room_id = envelope.room_id;

    let result = match ctx.api.check_room(room_id).await {
        // The upstream occasionally reports an empty list transiently;
        // retry exactly once after a short delay.
        Err(e) if e.is_transient_empty() => {
            tokio::time::sleep(EMPTY_RETRY_DELAY).await;
            ctx.api.check_room(room_id).await
        }
        other => other,
    };

    let (guards, gifts) = match result {
        Ok(lists) => lists,
        Err(e) => {
            error!(room_id, kind = ?envelope.kind, "authoritative check failed: {e}");
            return Ok(());
        }
    };

    guard::handle_guards(ctx, room_id, &guards).await?;
    raffle::handle_announcements(ctx, room_id, &gifts).await?;
    Ok(())
}
