//! Connection hub for the relay
//!
//! The hub is the only owner of the live connection set. Handlers never touch
//! the set; they send registration and submission events over one channel and
//! a single task applies them one at a time. Fan-out happens inside that task,
//! so a broadcast can never race a join or a leave.

mod event;
mod handle;
mod outbound;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::error::WebSocketError;
use crate::websocket::Payload;

use event::HubEvent;
pub use event::{ConnectionId, Registration};
pub use handle::{HubHandle, Membership};
pub use outbound::Outbound;

pub struct Hub {
    events: mpsc::UnboundedReceiver<HubEvent>,
    live: HashMap<ConnectionId, Arc<dyn Outbound>>,
    write_timeout: Option<Duration>,
}

impl Hub {
    pub fn new(config: &HubConfig) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = Self {
            events: rx,
            live: HashMap::new(),
            write_timeout: config.write_timeout(),
        };
        (hub, HubHandle::new(tx))
    }

    /// Processes events until every [`HubHandle`] is gone.
    pub async fn run(mut self) {
        match self.write_timeout {
            Some(limit) => info!("Hub started, per-recipient write bound {:?}", limit),
            None => info!("Hub started, per-recipient writes unbounded"),
        }

        while let Some(event) = self.events.recv().await {
            match event {
                HubEvent::Register(registration) => self.apply(registration),
                HubEvent::Submit(payload) => self.broadcast(payload).await,
                HubEvent::Inspect(reply) => {
                    let _ = reply.send(self.live.len());
                }
            }
        }

        info!("Hub stopped with {} connections still registered", self.live.len());
    }

    fn apply(&mut self, registration: Registration) {
        match registration {
            Registration::Join { id, outbound } => {
                if self.live.insert(id, outbound).is_some() {
                    debug!("Refreshed membership of connection {}", id);
                } else {
                    info!("Connection {} joined ({} live)", id, self.live.len());
                }
            }
            Registration::Leave { id } => {
                if self.live.remove(&id).is_some() {
                    info!("Connection {} left ({} live)", id, self.live.len());
                } else {
                    debug!("Leave for connection {} ignored, not in live set", id);
                }
            }
        }
    }

    async fn broadcast(&mut self, payload: Payload) {
        let mut evicted = Vec::new();

        for (id, outbound) in &self.live {
            let outcome = match self.write_timeout {
                Some(limit) => match timeout(limit, outbound.deliver(&payload)).await {
                    Ok(result) => result,
                    Err(_) => Err(WebSocketError::Timeout(limit)),
                },
                None => outbound.deliver(&payload).await,
            };

            if let Err(e) = outcome {
                warn!("Delivery to connection {} failed: {}", id, e);
                evicted.push(*id);
            }
        }

        for id in evicted {
            if let Some(outbound) = self.live.remove(&id) {
                outbound.evict();
                info!("Evicted connection {} ({} live)", id, self.live.len());
            }
        }

        debug!("Delivery pass finished for {} connections", self.live.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::outbound::MockOutbound;
    use crate::websocket::{ChatMessage, Frame};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;
    use tokio::sync::mpsc::error::TryRecvError;
    use tokio::time::sleep;

    struct Recorder {
        tx: mpsc::UnboundedSender<Payload>,
    }

    #[async_trait]
    impl Outbound for Recorder {
        async fn deliver(&self, payload: &Payload) -> Result<(), WebSocketError> {
            self.tx
                .send(payload.clone())
                .map_err(|e| WebSocketError::SendError(e.to_string()))
        }
    }

    fn recorder() -> (Arc<dyn Outbound>, mpsc::UnboundedReceiver<Payload>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Recorder { tx }), rx)
    }

    /// Never completes a write.
    #[derive(Default)]
    struct Stalled {
        evicted: AtomicBool,
    }

    #[async_trait]
    impl Outbound for Stalled {
        async fn deliver(&self, _payload: &Payload) -> Result<(), WebSocketError> {
            std::future::pending::<()>().await;
            Ok(())
        }

        fn evict(&self) {
            self.evicted.store(true, Ordering::SeqCst);
        }
    }

    struct Slow(Duration);

    #[async_trait]
    impl Outbound for Slow {
        async fn deliver(&self, _payload: &Payload) -> Result<(), WebSocketError> {
            sleep(self.0).await;
            Ok(())
        }
    }

    fn spawn_hub(config: HubConfig) -> HubHandle {
        let (hub, handle) = Hub::new(&config);
        tokio::spawn(hub.run());
        handle
    }

    fn chat(text: &str, id: i64) -> Payload {
        Payload::Structured(ChatMessage {
            text: text.to_string(),
            id,
            user: "alice".to_string(),
        })
    }

    #[test_log::test(tokio::test)]
    async fn test_fan_out_reaches_every_live_connection() {
        let hub = spawn_hub(HubConfig::default());
        let (a, mut rx_a) = recorder();
        let (b, mut rx_b) = recorder();
        let (c, mut rx_c) = recorder();
        let (_outsider, mut rx_outsider) = recorder();

        let _a = hub.join(ConnectionId::new(), a).unwrap();
        let _b = hub.join(ConnectionId::new(), b).unwrap();
        let _c = hub.join(ConnectionId::new(), c).unwrap();
        assert_eq!(hub.connection_count().await.unwrap(), 3);

        hub.submit(chat("hi", 1)).unwrap();
        hub.connection_count().await.unwrap();

        for rx in [&mut rx_a, &mut rx_b, &mut rx_c] {
            assert_eq!(rx.try_recv().unwrap(), chat("hi", 1));
            assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
        }
        assert_eq!(rx_outsider.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[test_log::test(tokio::test)]
    async fn test_late_joiner_misses_earlier_messages() {
        let hub = spawn_hub(HubConfig::default());
        let (early, mut rx_early) = recorder();
        let (late, mut rx_late) = recorder();

        let _early = hub.join(ConnectionId::new(), early).unwrap();
        hub.submit(chat("first", 1)).unwrap();
        hub.connection_count().await.unwrap();

        let _late = hub.join(ConnectionId::new(), late).unwrap();
        hub.submit(chat("second", 2)).unwrap();
        hub.connection_count().await.unwrap();

        assert_eq!(rx_early.try_recv().unwrap(), chat("first", 1));
        assert_eq!(rx_early.try_recv().unwrap(), chat("second", 2));
        assert_eq!(rx_late.try_recv().unwrap(), chat("second", 2));
        assert!(rx_late.try_recv().is_err());
    }

    #[test_log::test(tokio::test)]
    async fn test_leave_stops_delivery_to_writable_connection() {
        let hub = spawn_hub(HubConfig::default());
        let (stays, mut rx_stays) = recorder();
        let (leaves, mut rx_leaves) = recorder();

        let _stays = hub.join(ConnectionId::new(), stays).unwrap();
        let membership = hub.join(ConnectionId::new(), leaves.clone()).unwrap();
        drop(membership);

        hub.submit(Payload::Raw(Frame::Text("hi".to_string()))).unwrap();
        assert_eq!(hub.connection_count().await.unwrap(), 1);

        assert_eq!(rx_stays.try_recv().unwrap(), Payload::Raw(Frame::Text("hi".to_string())));
        // the receiver is still open, the hub simply no longer routes to it
        assert_eq!(rx_leaves.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_delivery_evicts_exactly_once() {
        let hub = spawn_hub(HubConfig::default());

        let mut broken = MockOutbound::new();
        broken
            .expect_deliver()
            .times(1)
            .returning(|_| Err(WebSocketError::SendError("connection closed".to_string())));
        broken.expect_evict().times(1).return_const(());

        let (healthy, mut rx_healthy) = recorder();
        let broken_id = ConnectionId::new();

        hub.register(Registration::Join { id: broken_id, outbound: Arc::new(broken) }).unwrap();
        let _healthy = hub.join(ConnectionId::new(), healthy).unwrap();

        hub.submit(chat("one", 1)).unwrap();
        hub.submit(chat("two", 2)).unwrap();
        assert_eq!(hub.connection_count().await.unwrap(), 1);

        // a late leave for the evicted connection is a no-op
        hub.leave(broken_id).unwrap();
        assert_eq!(hub.connection_count().await.unwrap(), 1);

        assert_eq!(rx_healthy.try_recv().unwrap(), chat("one", 1));
        assert_eq!(rx_healthy.try_recv().unwrap(), chat("two", 2));
    }

    #[test_log::test(tokio::test)]
    async fn test_join_refreshes_existing_membership() {
        let hub = spawn_hub(HubConfig::default());
        let (old, mut rx_old) = recorder();
        let (new, mut rx_new) = recorder();
        let id = ConnectionId::new();

        hub.register(Registration::Join { id, outbound: old }).unwrap();
        hub.register(Registration::Join { id, outbound: new }).unwrap();
        assert_eq!(hub.connection_count().await.unwrap(), 1);

        hub.submit(chat("hi", 1)).unwrap();
        hub.connection_count().await.unwrap();

        assert!(rx_old.try_recv().is_err());
        assert_eq!(rx_new.try_recv().unwrap(), chat("hi", 1));
    }

    // With the default configuration writes are unbounded: a slow recipient
    // holds up the whole delivery pass, and with it every later event.
    #[test_log::test(tokio::test)]
    async fn test_unbounded_write_stalls_the_pass() {
        let hub = spawn_hub(HubConfig::default());
        let (fast, mut rx_fast) = recorder();

        let _slow = hub.join(ConnectionId::new(), Arc::new(Slow(Duration::from_millis(200)))).unwrap();
        let _fast = hub.join(ConnectionId::new(), fast).unwrap();
        hub.connection_count().await.unwrap();

        let started = Instant::now();
        hub.submit(chat("hi", 1)).unwrap();
        assert_eq!(hub.connection_count().await.unwrap(), 2);

        assert!(started.elapsed() >= Duration::from_millis(150));
        assert_eq!(rx_fast.try_recv().unwrap(), chat("hi", 1));
    }

    #[test_log::test(tokio::test)]
    async fn test_bounded_write_evicts_stalled_recipient() {
        let hub = spawn_hub(HubConfig { write_timeout_ms: 50 });
        let stalled = Arc::new(Stalled::default());
        let (healthy, mut rx_healthy) = recorder();

        let _stalled = hub.join(ConnectionId::new(), stalled.clone()).unwrap();
        let _healthy = hub.join(ConnectionId::new(), healthy).unwrap();

        hub.submit(chat("hi", 1)).unwrap();
        assert_eq!(hub.connection_count().await.unwrap(), 1);

        assert!(stalled.evicted.load(Ordering::SeqCst));
        assert_eq!(rx_healthy.try_recv().unwrap(), chat("hi", 1));
    }

    #[tokio::test]
    async fn test_hub_stops_when_handles_are_dropped() {
        let (hub, handle) = Hub::new(&HubConfig::default());
        let task = tokio::spawn(hub.run());
        let (outbound, _rx) = recorder();

        let membership = handle.join(ConnectionId::new(), outbound).unwrap();
        drop(handle);

        // the membership guard still holds a handle
        assert!(!task.is_finished());
        drop(membership);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("hub did not stop")
            .unwrap();
    }
}
