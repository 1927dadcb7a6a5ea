//! The monitor fleet: N long-lived chat connections discovering and watching
//! live rooms, translating interesting events into queue envelopes.
//!
//! Each slot owns one room at a time and loops through discover, connect,
//! consume, teardown. Slot failures are isolated and self-healing; the only
//! shared state is the watched-room set, the active-connection registry and
//! the fire-and-forget queue producer.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rand::RngExt;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, error, info, warn};

use danmaku::{LiveEvent, packet};

use crate::config::Config;
use crate::envelope::{EventEnvelope, EventKind};
use crate::error::Result;
use crate::queue::QueueProducer;
use live_api::LiveApi;

/// Pause after a failed discovery call.
const DISCOVERY_RETRY: Duration = Duration::from_secs(10);
/// Pause when every candidate room is already watched.
const NO_CANDIDATE_RETRY: Duration = Duration::from_secs(30);
/// Keep-alive cadence across all open connections.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Rooms currently watched across all slots.
///
/// Only atomic operations are exposed; `claim` is the single-step
/// contains-insert-release so two slots can never pick the same room.
#[derive(Default)]
pub struct WatchedRooms {
    inner: Mutex<HashSet<u64>>,
}

impl WatchedRooms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `room` for a slot, releasing the slot's previous room. False
    /// when another slot already watches `room`.
    pub fn claim(&self, room: u64, previous: Option<u64>) -> bool {
        let mut set = self.inner.lock();
        if set.contains(&room) {
            return false;
        }
        set.insert(room);
        if let Some(previous) = previous {
            set.remove(&previous);
        }
        true
    }

    pub fn contains(&self, room: u64) -> bool {
        self.inner.lock().contains(&room)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outbound senders of the currently open connections, keyed by slot.
///
/// The heartbeat task only reads; registration and removal belong to the
/// slot's consume loop, so the two never race on membership.
#[derive(Default)]
pub struct ActiveConnections {
    inner: Mutex<HashMap<usize, mpsc::Sender<Message>>>,
}

impl ActiveConnections {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, slot: usize, tx: mpsc::Sender<Message>) {
        self.inner.lock().insert(slot, tx);
    }

    fn remove(&self, slot: usize) {
        self.inner.lock().remove(&slot);
    }

    fn senders(&self) -> Vec<mpsc::Sender<Message>> {
        self.inner.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct SlotContext {
    api: LiveApi,
    producer: Arc<QueueProducer>,
    watched: Arc<WatchedRooms>,
    active: Arc<ActiveConnections>,
    ws_url: String,
    passthrough_rooms: HashSet<u64>,
}

pub struct MonitorFleet {
    config: Config,
    api: LiveApi,
    producer: QueueProducer,
}

impl MonitorFleet {
    pub fn new(config: Config, api: LiveApi, producer: QueueProducer) -> Self {
        Self {
            config,
            api,
            producer,
        }
    }

    /// Run the heartbeat task and all monitor slots. Never returns in
    /// normal operation.
    pub async fn run(self) -> Result<()> {
        let watched = Arc::new(WatchedRooms::new());
        let active = Arc::new(ActiveConnections::new());

        tokio::spawn(heartbeat_loop(active.clone()));

        let producer = Arc::new(self.producer);
        let ctx = Arc::new(SlotContext {
            api: self.api.clone(),
            producer,
            watched,
            active,
            ws_url: self.config.ws_url.clone(),
            passthrough_rooms: self.config.passthrough_rooms.clone(),
        });

        let mut slots = Vec::with_capacity(self.config.monitor_slots);
        for slot in 0..self.config.monitor_slots {
            let category = (slot as u32 % self.config.categories) + 1;
            slots.push(tokio::spawn(slot_loop(slot, category, ctx.clone())));
        }

        futures::future::join_all(slots).await;
        Ok(())
    }
}

/// Send a keep-alive to every open connection. A closed connection is
/// skipped, not removed; removal is the consume loop's teardown step.
async fn heartbeat_loop(active: Arc<ActiveConnections>) {
    let heartbeat = Bytes::from_static(packet::HEARTBEAT);
    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        for tx in active.senders() {
            let _ = tx.try_send(Message::Binary(heartbeat.clone()));
        }
    }
}

async fn slot_loop(slot: usize, category: u32, ctx: Arc<SlotContext>) {
    let mut current_room: Option<u64> = None;
    loop {
        let room = discover(slot, category, current_room, &ctx).await;
        current_room = Some(room);

        if let Err(e) = watch_room(slot, room, &ctx).await {
            warn!(slot, room, "watch failed: {e}");
        }

        info!(
            slot,
            category,
            watched = ctx.watched.len(),
            active = ctx.active.len(),
            "watch ended, rediscovering"
        );
    }
}

/// Find the next room for a slot: the first live room in the category not
/// already watched by another slot. Discovery failures only delay
/// assignment, never kill the slot.
async fn discover(slot: usize, category: u32, previous: Option<u64>, ctx: &SlotContext) -> u64 {
    loop {
        match ctx.api.get_live_rooms(category).await {
            Err(e) => {
                error!(slot, category, "cannot get live rooms: {e}");
                tokio::time::sleep(DISCOVERY_RETRY).await;
            }
            Ok(rooms) => {
                for room in rooms {
                    if ctx.watched.claim(room, previous) {
                        info!(slot, category, old = ?previous, new = room, "room assigned");
                        return room;
                    }
                }
                tokio::time::sleep(NO_CANDIDATE_RETRY).await;
            }
        }
    }
}

/// Connect, subscribe, consume until the room stops broadcasting or the
/// connection drops.
async fn watch_room(slot: usize, room: u64, ctx: &SlotContext) -> Result<()> {
    let (stream, _) = connect_async(ctx.ws_url.as_str()).await?;
    let (mut sink, mut read) = stream.split();

    let uid = rand::rng().random_range(1_000_000_000u64..3_000_000_000);
    sink.send(Message::Binary(packet::encode_join(room, uid).into()))
        .await?;

    // Outbound writer: the consume loop below owns the read half, the
    // heartbeat task (and nothing else) feeds this channel.
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(8);
    ctx.active.register(slot, out_tx);
    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut preparing = false;
    'consume: while let Some(frame) = read.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!(slot, room, "stream error: {e}");
                break;
            }
        };
        let data = match frame {
            Message::Binary(data) => data,
            Message::Close(_) => break,
            _ => continue,
        };

        for body in packet::decode_frames(&data) {
            let Some(event) = LiveEvent::classify(&body) else {
                continue;
            };
            if event.is_stop() {
                preparing = true;
                break 'consume;
            }
            forward_event(slot, room, event, &body, ctx).await;
        }
    }

    ctx.active.remove(slot);
    writer.abort();
    info!(slot, room, preparing, "client closed");
    Ok(())
}

/// Translate a classified event into a queue envelope. Detection only: the
/// processor fetches authoritative detail where the event is a trigger.
async fn forward_event(slot: usize, room: u64, event: LiveEvent, body: &Value, ctx: &SlotContext) {
    let envelope = match event {
        LiveEvent::Notice {
            msg_type,
            real_room_id,
        } => {
            if !matches!(msg_type, 2 | 8) {
                return;
            }
            info!(slot, room_id = real_room_id, "NOTICE_MSG received");
            EventEnvelope::trigger(EventKind::TvCheck, real_room_id)
        }
        LiveEvent::Guard { buy_type, room_id } => {
            if buy_type != 1 {
                return;
            }
            info!(slot, room_id, "GUARD_MSG received");
            EventEnvelope::trigger(EventKind::GuardCheck, room_id)
        }
        LiveEvent::RaffleStart => EventEnvelope::new(EventKind::RaffleStart, room, body.clone()),
        LiveEvent::RaffleEnd => EventEnvelope::new(EventKind::RaffleResult, room, body.clone()),
        LiveEvent::AnchorAward | LiveEvent::AnchorStart => {
            EventEnvelope::new(EventKind::AnchorAward, room, body.clone())
        }
        LiveEvent::Storm => EventEnvelope::new(EventKind::Storm, room, body.clone()),
        LiveEvent::Pk => EventEnvelope::new(EventKind::Pk, room, body.clone()),
        LiveEvent::Chat => {
            if !ctx.passthrough_rooms.contains(&room) {
                return;
            }
            EventEnvelope::new(EventKind::Danmaku, room, body.clone())
        }
        // Stop events are handled by the consume loop.
        LiveEvent::Preparing | LiveEvent::RoomChange => return,
    };

    if let Err(e) = ctx.producer.send(&envelope).await {
        debug!(slot, room, "envelope send failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_exclusive() {
        let watched = WatchedRooms::new();
        assert!(watched.claim(4424, None));
        assert!(!watched.claim(4424, None));
        assert!(watched.contains(4424));
    }

    #[test]
    fn test_claim_releases_previous_room() {
        let watched = WatchedRooms::new();
        assert!(watched.claim(1, None));
        assert!(watched.claim(2, Some(1)));
        assert!(!watched.contains(1));
        // The released room is claimable again.
        assert!(watched.claim(1, None));
        assert_eq!(watched.len(), 2);
    }

    #[test]
    fn test_no_two_slots_claim_the_same_room() {
        let watched = Arc::new(WatchedRooms::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let watched = watched.clone();
            handles.push(std::thread::spawn(move || watched.claim(9171, None)));
        }
        let wins = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(watched.len(), 1);
    }

    #[test]
    fn test_active_connections_registry() {
        let active = ActiveConnections::new();
        let (tx, _rx) = mpsc::channel(1);
        active.register(3, tx);
        assert_eq!(active.len(), 1);
        assert_eq!(active.senders().len(), 1);
        active.remove(3);
        assert!(active.is_empty());
    }

    #[test]
    fn test_heartbeat_skips_closed_senders() {
        let active = ActiveConnections::new();
        let (tx, rx) = mpsc::channel::<Message>(1);
        active.register(0, tx);
        drop(rx);

        // A closed sender fails try_send; membership is untouched.
        for sender in active.senders() {
            assert!(sender.try_send(Message::Binary(Bytes::new())).is_err());
        }
        assert_eq!(active.len(), 1);
    }
}
