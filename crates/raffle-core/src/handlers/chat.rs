//! Chat passthrough: not raffle-related, but it shares the dispatch table.
//! Formats chat lines from configured rooms and forwards them to the
//! notification sink.

use chrono::{TimeZone, Utc};
use serde_json::Value;
use tracing::{debug, info};

use super::value_as_string;
use crate::envelope::EventEnvelope;
use crate::error::Result;
use crate::processor::HandlerContext;

/// Forwarded lines per room per minute; beyond this the line is dropped.
const RATE_LIMIT_PER_MINUTE: i64 = 30;

/// Formatted line built from the raw chat info array.
fn format_line(room_id: u64, ts: i64, info: &[Value]) -> Option<String> {
    let body = value_as_string(info.get(1))?;

    let user = info.get(2).and_then(Value::as_array);
    let uid = user
        .and_then(|u| u.first())
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let user_name = user
        .and_then(|u| u.get(1))
        .and_then(Value::as_str)
        .unwrap_or("");
    let is_admin = user
        .and_then(|u| u.get(2))
        .and_then(Value::as_i64)
        .unwrap_or(0)
        != 0;

    let user_level = info
        .get(4)
        .and_then(Value::as_array)
        .and_then(|l| l.first())
        .and_then(Value::as_i64)
        .unwrap_or(0);

    let medal = info.get(3).and_then(Value::as_array).filter(|m| !m.is_empty());
    let medal_level = medal
        .and_then(|m| m.first())
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string());
    let medal_name = medal
        .and_then(|m| m.get(1))
        .and_then(Value::as_str)
        .unwrap_or("undefined")
        .to_string();

    let time = Utc
        .timestamp_opt(ts, 0)
        .single()
        .unwrap_or_else(Utc::now)
        .format("%Y-%m-%d %H:%M:%S");
    let admin_mark = if is_admin { "[管] " } else { "" };

    Some(format!(
        "{room_id} ({time}) ->\n\n\
         {admin_mark}[{medal_name} {medal_level}] [{uid}][{user_name}][{user_level}]-> {body}"
    ))
}

pub(super) async fn handle(ctx: &HandlerContext, envelope: EventEnvelope) -> Result<()> {
    let room_id = envelope.room_id;
    let Some(info) = envelope.payload.get("info").and_then(Value::as_array) else {
        debug!(room_id, "chat envelope without info array");
        return Ok(());
    };

    let Some(body) = value_as_string(info.get(1)) else {
        return Ok(());
    };
    if ctx.ignored_danmaku.contains(&body) {
        return Ok(());
    }

    let counter = crate::keys::notify_counter(room_id);
    if ctx.cache.incr(&counter, 60).await? > RATE_LIMIT_PER_MINUTE {
        debug!(room_id, "chat passthrough rate limited");
        return Ok(());
    }

    let Some(line) = format_line(room_id, envelope.enqueued_at, info) else {
        return Ok(());
    };
    info!("{line}");
    ctx.notifier.send(&line).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn info_array() -> Value {
        json!([
            [0, 1, 25, 16777215],
            "老板大气",
            [12345, "viewer", 1],
            [21, "粉丝团", 101, 4424],
            [40, 0, 10512625]
        ])
    }

    #[test]
    fn test_format_line_full_info() {
        let info = info_array();
        let line = format_line(4424, 1700000000, info.as_array().unwrap()).unwrap();
        assert!(line.starts_with("4424 ("));
        assert!(line.contains("[管] "));
        assert!(line.contains("[粉丝团 21]"));
        assert!(line.contains("[12345][viewer][40]"));
        assert!(line.ends_with("-> 老板大气"));
    }

    #[test]
    fn test_format_line_without_medal() {
        let info = json!([
            [0],
            "hi",
            [7, "someone", 0],
            [],
            [12]
        ]);
        let line = format_line(1, 1700000000, info.as_array().unwrap()).unwrap();
        assert!(line.contains("[undefined -]"));
        assert!(!line.contains("[管]"));
    }

    #[test]
    fn test_format_line_without_body() {
        let info = json!([[0]]);
        assert!(format_line(1, 0, info.as_array().unwrap()).is_none());
    }
}
