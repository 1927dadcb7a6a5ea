//! The processing side: queue drain, per-cycle collapsing, worker pool.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use crate::broadcast::BroadcastSink;
use crate::cache::{Cache, InLotteryRooms};
use crate::envelope::EventEnvelope;
use crate::error::Result;
use crate::handlers;
use crate::notify::Notifier;
use crate::queue::QueueConsumer;
use crate::storage::Storage;
use live_api::LiveApi;

/// How often the receive loop drains the inter-process queue.
const DRAIN_INTERVAL: Duration = Duration::from_secs(3);
/// Handlers running longer than this are logged, not interrupted.
const SLOW_HANDLER: Duration = Duration::from_secs(5);

/// Everything a handler needs. Cloned into each worker task.
pub struct HandlerContext {
    pub cache: Cache,
    pub storage: Storage,
    pub sink: BroadcastSink,
    pub api: LiveApi,
    pub notifier: Notifier,
    pub in_lottery: InLotteryRooms,
    pub ignored_danmaku: HashSet<String>,
}

pub struct RaffleProcessor {
    ctx: Arc<HandlerContext>,
    workers: usize,
}

/// Per-cycle collapsing decision. The two check kinds trigger an
/// authoritative lookup that returns the room's full state, so extra
/// triggers for a room already forwarded this cycle carry no information.
/// Every other kind already names a specific raffle id and is cheap to dedup
/// at the cache layer, so it passes unconditionally.
fn should_forward(envelope: &EventEnvelope, checked_rooms: &mut HashSet<u64>) -> bool {
    if envelope.kind.needs_room_check() {
        checked_rooms.insert(envelope.room_id)
    } else {
        true
    }
}

impl RaffleProcessor {
    pub fn new(ctx: HandlerContext, workers: usize) -> Self {
        Self {
            ctx: Arc::new(ctx),
            workers,
        }
    }

    /// Run the receive loop and worker pool forever.
    pub async fn run(self, mut queue: QueueConsumer) -> Result<()> {
        let (tx, rx) = kanal::unbounded_async::<EventEnvelope>();

        for index in 0..self.workers {
            let rx = rx.clone();
            let ctx = self.ctx.clone();
            tokio::spawn(worker_loop(index, rx, ctx));
        }

        let mut ticker = tokio::time::interval(DRAIN_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            // Snapshot the depth at loop entry to bound the batch; datagrams
            // arriving mid-drain wait for the next cycle.
            let batch = queue.pending();
            let mut checked_rooms = HashSet::new();

            for _ in 0..batch {
                let Some(envelope) = queue.try_next() else {
                    break;
                };
                if !should_forward(&envelope, &mut checked_rooms) {
                    continue;
                }
                debug!(kind = ?envelope.kind, room_id = envelope.room_id, "assign task");
                if tx.send(envelope).await.is_err() {
                    return Err(crate::error::CoreError::other("worker channel closed"));
                }
            }
        }
    }
}

async fn worker_loop(
    index: usize,
    rx: kanal::AsyncReceiver<EventEnvelope>,
    ctx: Arc<HandlerContext>,
) {
    while let Ok(envelope) = rx.recv().await {
        let kind = envelope.kind;
        let room_id = envelope.room_id;
        let started = Instant::now();

        // A single event's failure never stops the worker or other events.
        if let Err(e) = handlers::dispatch(&ctx, envelope).await {
            error!(worker = index, ?kind, room_id, "handler failed: {e}");
        }

        let elapsed = started.elapsed();
        if elapsed > SLOW_HANDLER {
            warn!(
                worker = index,
                ?kind,
                room_id,
                elapsed_ms = elapsed.as_millis() as u64,
                "slow handler"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EventKind;

    fn drain(envelopes: Vec<EventEnvelope>) -> Vec<EventEnvelope> {
        let mut checked_rooms = HashSet::new();
        envelopes
            .into_iter()
            .filter(|e| should_forward(e, &mut checked_rooms))
            .collect()
    }

    #[test]
    fn test_check_triggers_collapse_per_room_per_cycle() {
        let envelopes = (0..5)
            .map(|_| EventEnvelope::trigger(EventKind::TvCheck, 42))
            .collect();
        assert_eq!(drain(envelopes).len(), 1);
    }

    #[test]
    fn test_both_check_kinds_collapse_on_the_same_room() {
        let forwarded = drain(vec![
            EventEnvelope::trigger(EventKind::TvCheck, 42),
            EventEnvelope::trigger(EventKind::GuardCheck, 42),
            EventEnvelope::trigger(EventKind::TvCheck, 43),
        ]);
        assert_eq!(forwarded.len(), 2);
        assert_eq!(forwarded[0].room_id, 42);
        assert_eq!(forwarded[1].room_id, 43);
    }

    #[test]
    fn test_other_kinds_are_never_collapsed() {
        let payload = serde_json::json!({"data": {"id": 1}});
        let envelopes = vec![
            EventEnvelope::new(EventKind::Pk, 42, payload.clone()),
            EventEnvelope::new(EventKind::Pk, 42, payload.clone()),
            EventEnvelope::new(EventKind::Storm, 42, payload.clone()),
            EventEnvelope::new(EventKind::RaffleResult, 42, payload),
        ];
        assert_eq!(drain(envelopes).len(), 4);
    }

    #[test]
    fn test_collapsing_resets_between_cycles() {
        let mut first_cycle = HashSet::new();
        let envelope = EventEnvelope::trigger(EventKind::TvCheck, 42);
        assert!(should_forward(&envelope, &mut first_cycle));
        assert!(!should_forward(&envelope, &mut first_cycle));

        let mut second_cycle = HashSet::new();
        assert!(should_forward(&envelope, &mut second_cycle));
    }
}
