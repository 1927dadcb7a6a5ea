//! HTTP API client for the live platform.
//!
//! Covers the three calls the watcher depends on: room discovery per
//! category, the authoritative per-room lottery/guard check, and the
//! guard-list feed consumed by the bootstrap poll. Also hosts the
//! sliding-window diff used to find newly-surfaced rooms in that feed.

pub mod client;
pub mod diff;
pub mod error;

pub use client::{GuardListEntry, LiveApi};
pub use diff::new_room_ids;
pub use error::{ApiError, Result};
