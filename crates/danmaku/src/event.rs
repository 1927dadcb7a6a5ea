//! Classification of notification commands.
//!
//! The stream carries far more command types than this system consumes.
//! [`LiveEvent::classify`] maps the interesting ones into a closed enum and
//! returns `None` for everything else, so the caller's dispatch is exhaustive
//! and adding a command is a compile-time decision.

use serde_json::Value;

/// A notification command the watcher reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveEvent {
    /// The room stopped broadcasting.
    Preparing,
    /// The room changed identity (title/area); treated like a stop.
    RoomChange,
    /// System notice that may carry an embedded real room id.
    Notice { msg_type: i64, real_room_id: u64 },
    /// Guard purchase notice.
    Guard { buy_type: i64, room_id: u64 },
    /// A raffle announced directly on the stream.
    RaffleStart,
    /// A raffle resolved with a winner (both historical end spellings).
    RaffleEnd,
    /// Anchor draw award definition / result.
    AnchorAward,
    /// Anchor draw opened.
    AnchorStart,
    /// Room-wide bonus gift (storm).
    Storm,
    /// PK draw opened.
    Pk,
    /// Plain chat line.
    Chat,
}

impl LiveEvent {
    /// Classify a decoded notification body.
    pub fn classify(value: &Value) -> Option<LiveEvent> {
        let cmd = value.get("cmd")?.as_str()?;
        // Chat commands carry variant suffixes (e.g. "DANMU_MSG:4:0:2:2:2:0").
        let cmd_base = cmd.split(':').next().unwrap_or(cmd);

        match cmd_base {
            "PREPARING" => Some(LiveEvent::Preparing),
            "ROOM_CHANGE" => Some(LiveEvent::RoomChange),
            "NOTICE_MSG" => Some(LiveEvent::Notice {
                msg_type: value.get("msg_type").and_then(Value::as_i64).unwrap_or(0),
                real_room_id: value.get("real_roomid").and_then(Value::as_u64)?,
            }),
            "GUARD_MSG" => Some(LiveEvent::Guard {
                buy_type: value.get("buy_type").and_then(Value::as_i64).unwrap_or(0),
                room_id: value.get("roomid").and_then(Value::as_u64)?,
            }),
            "RAFFLE_START" => Some(LiveEvent::RaffleStart),
            "RAFFLE_END" | "TV_END" => Some(LiveEvent::RaffleEnd),
            "ANCHOR_LOT_AWARD" => Some(LiveEvent::AnchorAward),
            "ANCHOR_LOT_START" => Some(LiveEvent::AnchorStart),
            "SPECIAL_GIFT" => Some(LiveEvent::Storm),
            "PK_LOTTERY_START" => Some(LiveEvent::Pk),
            "DANMU_MSG" => Some(LiveEvent::Chat),
            _ => None,
        }
    }

    /// Whether this event ends the watch on the room.
    pub fn is_stop(self) -> bool {
        matches!(self, LiveEvent::Preparing | LiveEvent::RoomChange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_stop_events() {
        let preparing = json!({"cmd": "PREPARING"});
        let change = json!({"cmd": "ROOM_CHANGE", "data": {"title": "t"}});

        assert_eq!(LiveEvent::classify(&preparing), Some(LiveEvent::Preparing));
        assert_eq!(LiveEvent::classify(&change), Some(LiveEvent::RoomChange));
        assert!(LiveEvent::Preparing.is_stop());
        assert!(LiveEvent::RoomChange.is_stop());
    }

    #[test]
    fn test_classify_notice_carries_real_room() {
        let notice = json!({"cmd": "NOTICE_MSG", "msg_type": 2, "real_roomid": 9171});
        assert_eq!(
            LiveEvent::classify(&notice),
            Some(LiveEvent::Notice {
                msg_type: 2,
                real_room_id: 9171
            })
        );

        // No embedded room id means nothing to act on.
        let broken = json!({"cmd": "NOTICE_MSG", "msg_type": 2});
        assert_eq!(LiveEvent::classify(&broken), None);
    }

    #[test]
    fn test_classify_guard_msg() {
        let guard = json!({"cmd": "GUARD_MSG", "buy_type": 1, "roomid": 4424});
        assert_eq!(
            LiveEvent::classify(&guard),
            Some(LiveEvent::Guard {
                buy_type: 1,
                room_id: 4424
            })
        );
    }

    #[test]
    fn test_classify_end_spellings() {
        for cmd in ["RAFFLE_END", "TV_END"] {
            let v = json!({"cmd": cmd, "data": {}});
            assert_eq!(LiveEvent::classify(&v), Some(LiveEvent::RaffleEnd));
        }
    }

    #[test]
    fn test_classify_chat_variant_suffix() {
        let chat = json!({"cmd": "DANMU_MSG:4:0:2:2:2:0", "info": []});
        assert_eq!(LiveEvent::classify(&chat), Some(LiveEvent::Chat));
    }

    #[test]
    fn test_unknown_commands_are_none() {
        for cmd in ["SEND_GIFT", "SUPER_CHAT_MESSAGE", "WATCHED_CHANGE", ""] {
            let v = json!({"cmd": cmd});
            assert_eq!(LiveEvent::classify(&v), None, "cmd {cmd:?}");
        }
        assert_eq!(LiveEvent::classify(&json!({"data": {}})), None);
    }
}
