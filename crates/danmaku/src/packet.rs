//! Binary frame encoding and decoding.

use byteorder::{BigEndian, ByteOrder};
use flate2::read::ZlibDecoder;
use serde::Serialize;
use serde_json::Value;
use std::io::Read;
use tracing::debug;

use crate::error::{DanmakuError, Result};

/// Operation codes.
pub mod op {
    pub const HEARTBEAT: u32 = 2;
    pub const HEARTBEAT_REPLY: u32 = 3;
    pub const NOTIFICATION: u32 = 5;
    pub const JOIN: u32 = 7;
    pub const JOIN_REPLY: u32 = 8;
}

/// Protocol versions.
mod ver {
    pub const RAW_JSON: u16 = 0;
    pub const POPULARITY: u16 = 1;
    pub const ZLIB: u16 = 2;
}

const HEADER_LEN: usize = 16;

/// Heartbeat packet (operation = 2)
/// Header: len=31, header_len=16, ver=1, op=2, seq=1
/// Body: "[object Object]"
pub const HEARTBEAT: &[u8] = &[
    0x00, 0x00, 0x00, 0x1f, // packet length = 31
    0x00, 0x10, // header length = 16
    0x00, 0x01, // version = 1
    0x00, 0x00, 0x00, 0x02, // operation = 2 (heartbeat)
    0x00, 0x00, 0x00, 0x01, // sequence = 1
    // "[object Object]"
    0x5b, 0x6f, 0x62, 0x6a, 0x65, 0x63, 0x74, 0x20, 0x4f, 0x62, 0x6a, 0x65, 0x63, 0x74, 0x5d,
];

/// Join data sent when subscribing to a room.
#[derive(Debug, Serialize)]
struct JoinBody {
    uid: u64,
    roomid: u64,
    protover: u8,
    platform: &'static str,
}

/// Build the subscribe packet for a room (operation = 7).
///
/// `protover` 2 requests zlib-compressed aggregate frames, the only
/// compression the legacy subscribe endpoint emits.
pub fn encode_join(room_id: u64, uid: u64) -> Vec<u8> {
    let body = JoinBody {
        uid,
        roomid: room_id,
        protover: 2,
        platform: "web",
    };

    let json_data = serde_json::to_vec(&body).unwrap();
    build_packet(&json_data, op::JOIN)
}

/// The heartbeat packet, sent every ~30s on an open connection.
pub fn encode_heartbeat() -> &'static [u8] {
    HEARTBEAT
}

/// Build a packet with the given body and operation code.
fn build_packet(body: &[u8], operation: u32) -> Vec<u8> {
    let packet_len = HEADER_LEN + body.len();
    let mut packet = Vec::with_capacity(packet_len);

    // Header
    packet.extend_from_slice(&(packet_len as u32).to_be_bytes()); // packet length
    packet.extend_from_slice(&(HEADER_LEN as u16).to_be_bytes()); // header length
    packet.extend_from_slice(&1u16.to_be_bytes()); // version
    packet.extend_from_slice(&operation.to_be_bytes()); // operation
    packet.extend_from_slice(&1u32.to_be_bytes()); // sequence

    // Body
    packet.extend_from_slice(body);

    packet
}

/// Decode every notification body embedded in `data`.
///
/// Frames arrive concatenated; zlib aggregates (version 2) are inflated and
/// walked recursively. Truncated frames, failed inflation and unparseable
/// JSON bodies are skipped, never fatal: one poisoned frame must not cost
/// the connection.
pub fn decode_frames(data: &[u8]) -> Vec<Value> {
    let mut bodies = Vec::new();
    let mut offset = 0;

    while offset + HEADER_LEN <= data.len() {
        let packet_len = BigEndian::read_u32(&data[offset..offset + 4]) as usize;
        let version = BigEndian::read_u16(&data[offset + 6..offset + 8]);
        let operation = BigEndian::read_u32(&data[offset + 8..offset + 12]);

        if packet_len < HEADER_LEN || offset + packet_len > data.len() {
            debug!(packet_len, remaining = data.len() - offset, "truncated frame");
            break;
        }

        let body = &data[offset + HEADER_LEN..offset + packet_len];

        match version {
            ver::ZLIB => match decompress_zlib(body) {
                Ok(decompressed) => bodies.extend(decode_frames(&decompressed)),
                Err(e) => debug!("zlib frame skipped: {e}"),
            },
            ver::RAW_JSON | ver::POPULARITY => {
                if operation == op::NOTIFICATION {
                    match serde_json::from_slice::<Value>(body) {
                        Ok(value) => bodies.push(value),
                        Err(e) => debug!(operation, "unparseable notification body: {e}"),
                    }
                }
            }
            other => {
                debug!(version = other, "unknown protocol version");
            }
        }

        offset += packet_len;
    }

    bodies
}

/// Decompress zlib data.
fn decompress_zlib(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| DanmakuError::protocol(format!("zlib decompression failed: {e}")))?;
    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{Compression, write::ZlibEncoder};
    use std::io::Write;

    fn raw_frame(body: &[u8], operation: u32) -> Vec<u8> {
        build_packet(body, operation)
    }

    fn zlib_frame(inner: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(inner).unwrap();
        let compressed = encoder.finish().unwrap();

        let packet_len = HEADER_LEN + compressed.len();
        let mut packet = Vec::with_capacity(packet_len);
        packet.extend_from_slice(&(packet_len as u32).to_be_bytes());
        packet.extend_from_slice(&(HEADER_LEN as u16).to_be_bytes());
        packet.extend_from_slice(&2u16.to_be_bytes());
        packet.extend_from_slice(&op::NOTIFICATION.to_be_bytes());
        packet.extend_from_slice(&1u32.to_be_bytes());
        packet.extend_from_slice(&compressed);
        packet
    }

    #[test]
    fn test_encode_join_header_layout() {
        let packet = encode_join(12345, 42);

        assert_eq!(
            BigEndian::read_u32(&packet[0..4]) as usize,
            packet.len()
        );
        assert_eq!(BigEndian::read_u16(&packet[4..6]), 16);
        assert_eq!(BigEndian::read_u16(&packet[6..8]), 1);
        assert_eq!(BigEndian::read_u32(&packet[8..12]), op::JOIN);
        assert_eq!(BigEndian::read_u32(&packet[12..16]), 1);

        let json: Value = serde_json::from_slice(&packet[16..]).unwrap();
        assert_eq!(json.get("roomid").and_then(Value::as_u64), Some(12345));
        assert_eq!(json.get("uid").and_then(Value::as_u64), Some(42));
        assert_eq!(json.get("protover").and_then(Value::as_u64), Some(2));
    }

    #[test]
    fn test_heartbeat_header_layout() {
        let packet = encode_heartbeat();
        assert_eq!(BigEndian::read_u32(&packet[0..4]), 31);
        assert_eq!(BigEndian::read_u32(&packet[8..12]), op::HEARTBEAT);
        assert_eq!(&packet[16..], b"[object Object]");
    }

    #[test]
    fn test_decode_concatenated_frames() {
        let first = serde_json::to_vec(&serde_json::json!({"cmd": "PREPARING"})).unwrap();
        let second = serde_json::to_vec(&serde_json::json!({"cmd": "DANMU_MSG"})).unwrap();

        let mut data = raw_frame(&first, op::NOTIFICATION);
        data.extend(raw_frame(&second, op::NOTIFICATION));

        let bodies = decode_frames(&data);
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0]["cmd"], "PREPARING");
        assert_eq!(bodies[1]["cmd"], "DANMU_MSG");
    }

    #[test]
    fn test_decode_zlib_aggregate() {
        let first = raw_frame(
            &serde_json::to_vec(&serde_json::json!({"cmd": "SEND_GIFT"})).unwrap(),
            op::NOTIFICATION,
        );
        let second = raw_frame(
            &serde_json::to_vec(&serde_json::json!({"cmd": "GUARD_MSG"})).unwrap(),
            op::NOTIFICATION,
        );

        let mut inner = first;
        inner.extend(second);

        // Raw frame before the aggregate, to check ordering across kinds.
        let mut data = raw_frame(
            &serde_json::to_vec(&serde_json::json!({"cmd": "NOTICE_MSG"})).unwrap(),
            op::NOTIFICATION,
        );
        data.extend(zlib_frame(&inner));

        let bodies = decode_frames(&data);
        assert_eq!(bodies.len(), 3);
        assert_eq!(bodies[0]["cmd"], "NOTICE_MSG");
        assert_eq!(bodies[1]["cmd"], "SEND_GIFT");
        assert_eq!(bodies[2]["cmd"], "GUARD_MSG");
    }

    #[test]
    fn test_non_notification_ops_are_ignored() {
        let mut data = raw_frame(&[0, 0, 0, 1], op::HEARTBEAT_REPLY);
        data.extend(raw_frame(b"{}", op::JOIN_REPLY));
        assert!(decode_frames(&data).is_empty());
    }

    #[test]
    fn test_poisoned_frame_is_skipped() {
        // Valid header but garbage JSON body, followed by a good frame.
        let mut data = raw_frame(b"not json", op::NOTIFICATION);
        data.extend(raw_frame(
            &serde_json::to_vec(&serde_json::json!({"cmd": "PREPARING"})).unwrap(),
            op::NOTIFICATION,
        ));

        let bodies = decode_frames(&data);
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["cmd"], "PREPARING");
    }

    #[test]
    fn test_truncated_frame_stops_cleanly() {
        let frame = raw_frame(
            &serde_json::to_vec(&serde_json::json!({"cmd": "PREPARING"})).unwrap(),
            op::NOTIFICATION,
        );
        assert!(decode_frames(&frame[..frame.len() - 3]).is_empty());
        assert!(decode_frames(&frame[..10]).is_empty());
    }
}
