//! Fire-and-forget inter-process event queue.
//!
//! One serialized envelope per UDP datagram to a fixed destination. No
//! delivery guarantee, no ordering, no flow control: the decoupling is the
//! point, both processes restart independently. Consumers tolerate gaps and
//! duplicates; correctness lives in the dedup cache, not here.

use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::envelope::EventEnvelope;
use crate::error::Result;

/// Default queue endpoint.
pub const DEFAULT_QUEUE_ADDR: &str = "127.0.0.1:40000";

/// Practical datagram bound; larger envelopes are dropped, not fragmented.
const MAX_DATAGRAM: usize = 60 * 1024;

/// Sending side: serialize and fire, never wait for anyone.
pub struct QueueProducer {
    socket: UdpSocket,
}

impl QueueProducer {
    pub async fn connect(target: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(target).await?;
        Ok(Self { socket })
    }

    pub async fn send(&self, envelope: &EventEnvelope) -> Result<()> {
        let data = serde_json::to_vec(envelope)?;
        if data.len() > MAX_DATAGRAM {
            warn!(
                kind = ?envelope.kind,
                room_id = envelope.room_id,
                size = data.len(),
                "envelope exceeds datagram bound, dropped"
            );
            return Ok(());
        }
        self.socket.send(&data).await?;
        Ok(())
    }
}

/// Receiving side: buffer arriving datagrams in an unbounded in-memory
/// queue. `pending()` snapshots the current depth so a drain loop can bound
/// its batch at loop entry.
pub struct QueueConsumer {
    rx: mpsc::UnboundedReceiver<EventEnvelope>,
    local_addr: SocketAddr,
    recv_task: JoinHandle<()>,
}

impl QueueConsumer {
    pub async fn bind(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        let local_addr = socket.local_addr()?;
        let (tx, rx) = mpsc::unbounded_channel();

        let recv_task = tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM + 1];
            loop {
                match socket.recv(&mut buf).await {
                    Ok(len) => match serde_json::from_slice::<EventEnvelope>(&buf[..len]) {
                        Ok(envelope) => {
                            if tx.send(envelope).is_err() {
                                break;
                            }
                        }
                        Err(e) => debug!(len, "dropping undecodable datagram: {e}"),
                    },
                    Err(e) => warn!("queue socket receive failed: {e}"),
                }
            }
        });

        Ok(Self {
            rx,
            local_addr,
            recv_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of envelopes buffered right now.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Non-blocking pop.
    pub fn try_next(&mut self) -> Option<EventEnvelope> {
        self.rx.try_recv().ok()
    }

    /// Blocking pop; `None` only if the receive task died.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        self.rx.recv().await
    }
}

impl Drop for QueueConsumer {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EventKind;
    use std::time::Duration;

    async fn wait_for(consumer: &QueueConsumer, count: usize) {
        for _ in 0..100 {
            if consumer.pending() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let mut consumer = QueueConsumer::bind("127.0.0.1:0").await.unwrap();
        let producer = QueueProducer::connect(&consumer.local_addr().to_string())
            .await
            .unwrap();

        producer
            .send(&EventEnvelope::trigger(EventKind::TvCheck, 42))
            .await
            .unwrap();
        producer
            .send(&EventEnvelope::new(
                EventKind::Pk,
                7,
                serde_json::json!({"data": {"id": 3}}),
            ))
            .await
            .unwrap();

        wait_for(&consumer, 2).await;
        assert_eq!(consumer.pending(), 2);

        let first = consumer.try_next().unwrap();
        let second = consumer.next().await.unwrap();
        let mut kinds = [first.kind, second.kind];
        kinds.sort_by_key(|k| format!("{k:?}"));
        assert!(kinds.contains(&EventKind::TvCheck));
        assert!(kinds.contains(&EventKind::Pk));
        assert_eq!(consumer.pending(), 0);
    }

    #[tokio::test]
    async fn test_garbage_datagrams_are_skipped() {
        let mut consumer = QueueConsumer::bind("127.0.0.1:0").await.unwrap();
        let addr = consumer.local_addr();

        let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        raw.send_to(b"not an envelope", addr).await.unwrap();

        let producer = QueueProducer::connect(&addr.to_string()).await.unwrap();
        producer
            .send(&EventEnvelope::trigger(EventKind::GuardCheck, 9))
            .await
            .unwrap();

        wait_for(&consumer, 1).await;
        let envelope = consumer.try_next().unwrap();
        assert_eq!(envelope.kind, EventKind::GuardCheck);
        assert_eq!(consumer.pending(), 0);
    }

    #[tokio::test]
    async fn test_oversized_envelope_is_dropped_by_producer() {
        let consumer = QueueConsumer::bind("127.0.0.1:0").await.unwrap();
        let producer = QueueProducer::connect(&consumer.local_addr().to_string())
            .await
            .unwrap();

        let huge = EventEnvelope::new(
            EventKind::Danmaku,
            1,
            serde_json::json!({"text": "x".repeat(MAX_DATAGRAM)}),
        );
        producer.send(&huge).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(consumer.pending(), 0);
    }
}
