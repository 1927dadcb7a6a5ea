//! Raffle detection core.
//!
//! Ties the pieces together: the monitor fleet discovers live rooms and
//! pushes trigger envelopes onto the fire-and-forget UDP queue; the
//! processor drains the queue, collapses redundant check triggers per cycle,
//! and fans events out to a worker pool; one handler per event kind
//! classifies, enriches, persists and re-broadcasts. The redis cache is the
//! only cross-process shared state and its atomic set-if-absent is the only
//! idempotency mechanism.

pub mod broadcast;
pub mod cache;
pub mod config;
pub mod envelope;
pub mod error;
pub mod fleet;
pub mod handlers;
pub mod keys;
pub mod notify;
pub mod processor;
pub mod queue;
pub mod records;
pub mod storage;

pub use broadcast::BroadcastSink;
pub use cache::{Cache, InLotteryRooms};
pub use config::Config;
pub use envelope::{EventEnvelope, EventKind};
pub use error::{CoreError, Result};
pub use fleet::MonitorFleet;
pub use notify::Notifier;
pub use processor::{HandlerContext, RaffleProcessor};
pub use queue::{QueueConsumer, QueueProducer};
pub use records::{BroadcastMessage, GuardRecord, RaffleRecord, RaffleType, UserIdentity};
pub use storage::Storage;
