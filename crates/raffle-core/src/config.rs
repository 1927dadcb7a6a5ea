//! Runtime configuration, collected from the environment.

use std::collections::HashSet;

/// Process configuration. Every field has a working default so a bare
/// `giftwatch monitor` against local redis/sqlite just runs.
#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub database_url: String,
    pub queue_addr: String,
    pub ws_url: String,
    pub notify_webhook_url: Option<String>,
    /// Rooms whose chat lines are forwarded as passthrough envelopes.
    pub passthrough_rooms: HashSet<u64>,
    /// Chat bodies dropped by the passthrough handler (lottery spam).
    pub ignored_danmaku: HashSet<String>,
    pub monitor_slots: usize,
    pub categories: u32,
    pub workers: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            redis_url: var("REDIS_URL", "redis://127.0.0.1/"),
            database_url: var("DATABASE_URL", "sqlite:giftwatch.db?mode=rwc"),
            queue_addr: var("QUEUE_ADDR", crate::queue::DEFAULT_QUEUE_ADDR),
            ws_url: var("DANMAKU_WS_URL", danmaku::DEFAULT_WS_URL),
            notify_webhook_url: std::env::var("NOTIFY_WEBHOOK_URL").ok(),
            passthrough_rooms: id_set(&var("PASSTHROUGH_ROOMS", "")),
            ignored_danmaku: str_set(&var("IGNORED_DANMAKU", "")),
            monitor_slots: var("MONITOR_SLOTS", "18").parse().unwrap_or(18),
            categories: var("MONITOR_CATEGORIES", "6").parse().unwrap_or(6),
            workers: var("PROCESSOR_WORKERS", "8").parse().unwrap_or(8),
        }
    }
}

fn var(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn id_set(raw: &str) -> HashSet<u64> {
    raw.split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

fn str_set(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_set_parses_and_skips_junk() {
        let rooms = id_set("123, 456,, abc ,789");
        assert_eq!(rooms, HashSet::from([123, 456, 789]));
        assert!(id_set("").is_empty());
    }

    #[test]
    fn test_str_set_trims() {
        let set = str_set("抽奖, 老板大气 ,");
        assert!(set.contains("抽奖"));
        assert!(set.contains("老板大气"));
        assert_eq!(set.len(), 2);
    }
}
