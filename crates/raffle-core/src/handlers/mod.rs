//! One handler per event kind.
//!
//! Each follows the same shape: check the dedup key, fetch or enrich,
//! persist, optionally broadcast. Dispatch is an exhaustive match so a new
//! kind cannot be forgotten silently.

mod anchor;
mod chat;
mod check;
mod guard;
mod pk;
mod raffle;
mod storm;

use serde_json::Value;

use crate::envelope::{EventEnvelope, EventKind};
use crate::error::Result;
use crate::processor::HandlerContext;

pub async fn dispatch(ctx: &HandlerContext, envelope: EventEnvelope) -> Result<()> {
    match envelope.kind {
        EventKind::GuardBuy => guard::handle(ctx, envelope).await,
        EventKind::TvCheck | EventKind::GuardCheck => check::handle(ctx, envelope).await,
        EventKind::RaffleStart => raffle::handle_start(ctx, envelope).await,
        EventKind::RaffleResult => raffle::handle_result(ctx, envelope).await,
        EventKind::AnchorAward => anchor::handle(ctx, envelope).await,
        EventKind::Storm => storm::handle(ctx, envelope).await,
        EventKind::Pk => pk::handle(ctx, envelope).await,
        EventKind::Danmaku => chat::handle(ctx, envelope).await,
    }
}

/// Numeric field that upstream serializes inconsistently as number or
/// string.
pub(crate) fn value_as_i64(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// String field that is occasionally a bare number.
pub(crate) fn value_as_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_as_i64_accepts_both_encodings() {
        assert_eq!(value_as_i64(Some(&json!(7))), Some(7));
        assert_eq!(value_as_i64(Some(&json!("7"))), Some(7));
        assert_eq!(value_as_i64(Some(&json!("x"))), None);
        assert_eq!(value_as_i64(Some(&json!([]))), None);
        assert_eq!(value_as_i64(None), None);
    }

    #[test]
    fn test_value_as_string_accepts_both_encodings() {
        assert_eq!(
            value_as_string(Some(&json!("small_tv"))),
            Some("small_tv".into())
        );
        assert_eq!(value_as_string(Some(&json!(3))), Some("3".into()));
        assert_eq!(value_as_string(Some(&json!(null))), None);
    }
}
