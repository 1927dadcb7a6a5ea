//! Cache key namespaces and TTLs.
//!
//! The first successful writer of a dedup key owns every side effect tied to
//! that logical event instance; the TTL bounds how long that ownership is
//! remembered.

/// Default lifetime of a dedup key and of durable cached records.
pub const DEDUP_TTL: u64 = 7 * 24 * 3600;
/// Lifetime of a pre-phase raffle entry awaiting its result.
pub const PRE_RAFFLE_TTL: u64 = 20 * 60;
/// Entry timeout of the in-lottery room membership map.
pub const IN_LOTTERY_TIMEOUT: u64 = 10 * 60;
/// Lifetime of a guard-poll characteristic entry.
pub const GUARD_CHAR_TTL: u64 = 24 * 3600;

/// Sentinel value written under dedup keys.
pub const DEDUP_SENTINEL: &str = "de-duplication";

/// Broadcast feed sorted set.
pub const BROADCAST_KEY: &str = "LTS:RF_BR";
/// Membership map of rooms with an active raffle.
pub const IN_LOTTERY_KEY: &str = "IN_LOTTERY_LIVE_ROOM";
/// Previous guard-list poll window.
pub const GUARD_WINDOW_KEY: &str = "LT_INTERVAL_GUARD_LIST";

pub fn pk(room_id: u64, raffle_id: i64) -> String {
    format!("P${room_id}${raffle_id}")
}

pub fn storm(room_id: u64, raffle_id: i64) -> String {
    format!("S${room_id}${raffle_id}")
}

pub fn anchor(room_id: u64, raffle_id: i64) -> String {
    format!("A${room_id}${raffle_id}")
}

pub fn guard(room_id: u64, raffle_id: i64) -> String {
    format!("G${room_id}${raffle_id}")
}

pub fn tv(room_id: u64, raffle_id: i64) -> String {
    format!("T${room_id}${raffle_id}")
}

/// Display-name cache for a gift-type code; the result event only carries
/// the code.
pub fn gift_type(code: &str) -> String {
    format!("GIFT_TYPE_{code}")
}

pub fn pre_raffle(raffle_id: i64) -> String {
    format!("LT_PRE_RAFFLE_{raffle_id}")
}

pub fn raffle_record(raffle_id: i64) -> String {
    format!("LT_RAFFLE_{raffle_id}")
}

pub fn guard_record(raffle_id: i64) -> String {
    format!("LT_GUARD_{raffle_id}")
}

pub fn anchor_record(raffle_id: i64) -> String {
    format!("LT_ANCHOR_{raffle_id}")
}

/// Guard-poll characteristic cache for a room.
pub fn guard_char(room_id: u64) -> String {
    format!("LT_GUARD_CHAR_{room_id}")
}

/// Per-room passthrough rate-limit counter.
pub fn notify_counter(room_id: u64) -> String {
    format!("LT_NOTIFY_CNT_{room_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_key_namespaces() {
        assert_eq!(pk(42, 7), "P$42$7");
        assert_eq!(storm(42, 7), "S$42$7");
        assert_eq!(anchor(42, 7), "A$42$7");
        assert_eq!(guard(42, 7), "G$42$7");
        assert_eq!(tv(42, 7), "T$42$7");
    }

    #[test]
    fn test_record_key_namespaces() {
        assert_eq!(gift_type("small_tv"), "GIFT_TYPE_small_tv");
        assert_eq!(pre_raffle(9), "LT_PRE_RAFFLE_9");
        assert_eq!(raffle_record(9), "LT_RAFFLE_9");
        assert_eq!(guard_record(9), "LT_GUARD_9");
        assert_eq!(anchor_record(9), "LT_ANCHOR_9");
        assert_eq!(guard_char(9), "LT_GUARD_CHAR_9");
        assert_eq!(notify_counter(9), "LT_NOTIFY_CNT_9");
    }
}
