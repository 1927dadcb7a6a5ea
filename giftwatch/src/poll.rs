//! Guard-list bootstrap poll.
//!
//! Periodically (via cron or a supervisor timer) fetches the guard-list
//! feed, works out which rooms are worth an authoritative check, and feeds
//! the resulting guard purchases through the same queue as live triggers.
//! The feed is a sliding window: the window trim bounds the candidate set
//! and the per-room characteristic cache filters rooms whose guard count
//! has not actually changed.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{error, info};

use live_api::{LiveApi, new_room_ids};
use raffle_core::{Cache, Config, EventEnvelope, EventKind, QueueProducer, keys};

/// Pacing between per-room authoritative checks.
const CHECK_PACING: Duration = Duration::from_millis(1100);

pub async fn poll_guards(config: Config) -> anyhow::Result<()> {
    let api = LiveApi::new();
    let cache = Cache::connect(&config.redis_url).await?;
    let producer = QueueProducer::connect(&config.queue_addr).await?;

    let started = Instant::now();
    info!("now fetch guard list");

    let entries = api.get_guard_list().await?;
    let characteristics: HashMap<u64, u32> = entries
        .iter()
        .map(|entry| (entry.room_id, entry.guard_count))
        .collect();
    let window: Vec<u64> = entries.iter().map(|entry| entry.room_id).collect();

    let previous: Vec<u64> = cache
        .get_json(keys::GUARD_WINDOW_KEY)
        .await?
        .unwrap_or_default();
    cache.set_json(keys::GUARD_WINDOW_KEY, &window, 0).await?;

    let candidates = new_room_ids(&window, &previous);
    let shown_rooms: Vec<String> = candidates.iter().take(15).map(u64::to_string).collect();
    info!(
        total = window.len(),
        candidates = candidates.len(),
        "new rooms: {}{}",
        shown_rooms.join(", "),
        if candidates.len() > 15 { "..." } else { "" }
    );

    let mut checked = 0usize;
    for room_id in candidates {
        let count = characteristics.get(&room_id).copied().unwrap_or(0);
        if !characteristic_changed(&cache, room_id, count).await? {
            continue;
        }

        if let Err(e) = check_one_room(&api, &producer, room_id).await {
            error!(room_id, "cannot get lottery from room: {e}");
        }
        checked += 1;
        tokio::time::sleep(CHECK_PACING).await;
    }

    info!(
        checked,
        cost_secs = started.elapsed().as_secs(),
        "guard list poll finished"
    );
    Ok(())
}

/// True when the room's cached characteristic is missing or different.
/// Writing the fresh value renews the 24h window either way.
async fn characteristic_changed(cache: &Cache, room_id: u64, count: u32) -> anyhow::Result<bool> {
    let cached: Option<u32> = cache.get_json(&keys::guard_char(room_id)).await?;
    cache
        .set_json(&keys::guard_char(room_id), &count, keys::GUARD_CHAR_TTL)
        .await?;
    Ok(cached != Some(count))
}

async fn check_one_room(
    api: &LiveApi,
    producer: &QueueProducer,
    room_id: u64,
) -> anyhow::Result<()> {
    let (guards, _gifts) = api.check_room(room_id).await?;
    for guard in guards {
        let payload = serde_json::json!({"data": {"lottery": guard}});
        producer
            .send(&EventEnvelope::new(EventKind::GuardBuy, room_id, payload))
            .await?;
    }
    Ok(())
}
