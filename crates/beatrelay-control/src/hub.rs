//! Subscriber fan-out
//!
//! [`SubscriberBroadcastHub`] is a plain state machine: the subscriber set plus
//! the last known sample. It is owned by exactly one task ([`spawn_hub`]) and
//! everything else talks to it through a [`HubHandle`], so registration,
//! removal and broadcast never interleave and need no lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use beatrelay_core::AudioSample;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::{ControlError, RelayStats, Result};

/// Identifier assigned to each accepted subscriber
pub type SubscriberId = u64;

/// Serialized sample shared by every subscriber of one broadcast
pub type Payload = Arc<str>;

/// Hub side of a subscriber's outbound queue
pub type SubscriberSink = broadcast::Sender<Payload>;

/// Writer side of a subscriber's outbound queue
pub type SubscriberQueue = broadcast::Receiver<Payload>;

/// Create an outbound queue for one subscriber.
///
/// The queue holds at least `capacity` undelivered payloads. Once full, each
/// new payload evicts the oldest one and the reader sees
/// [`broadcast::error::RecvError::Lagged`] before resuming, so the newest
/// sample is never the one dropped.
pub fn subscriber_queue(capacity: usize) -> (SubscriberSink, SubscriberQueue) {
    broadcast::channel(capacity.max(1))
}

/// The subscriber's queue reader is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Disconnected;

fn deliver(sink: &SubscriberSink, payload: &Payload) -> std::result::Result<(), Disconnected> {
    sink.send(payload.clone()).map(|_| ()).map_err(|_| Disconnected)
}

#[derive(Debug, Clone)]
struct LastKnownSample {
    sample: AudioSample,
    payload: Payload,
    cached_at: Instant,
}

/// Outcome of one [`SubscriberBroadcastHub::broadcast`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub removed: usize,
}

/// Hub state visible to the status API
#[derive(Debug, Clone, PartialEq)]
pub struct HubSnapshot {
    pub subscribers: usize,
    pub last_sample: Option<AudioSample>,
    pub last_sample_age: Option<Duration>,
}

/// Subscriber set and last known sample.
#[derive(Debug, Default)]
pub struct SubscriberBroadcastHub {
    subscribers: HashMap<SubscriberId, SubscriberSink>,
    last_known: Option<LastKnownSample>,
    next_id: SubscriberId,
}

impl SubscriberBroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber and push the last known sample to it alone.
    pub fn accept(&mut self, sink: SubscriberSink) -> SubscriberId {
        let id = self.next_id;
        self.next_id += 1;
        self.subscribers.insert(id, sink);

        if let Some(last) = &self.last_known {
            let sink = &self.subscribers[&id];
            match deliver(sink, &last.payload) {
                Ok(()) => trace!("Sent catch-up sample to subscriber {}", id),
                Err(Disconnected) => {
                    debug!("Subscriber {} closed before catch-up", id);
                    self.subscribers.remove(&id);
                }
            }
        }

        id
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub fn remove(&mut self, id: SubscriberId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    /// Cache `sample` as the last known sample and offer it to every current
    /// subscriber exactly once.
    ///
    /// The sample is serialized once; all subscribers share the payload.
    /// A full queue evicts its oldest entry to make room, so a slow
    /// subscriber still ends on this sample. Subscribers whose reader has
    /// closed are dropped from the set without affecting the rest.
    pub fn broadcast(&mut self, sample: AudioSample) -> Result<BroadcastReport> {
        let payload: Payload = sample.to_json()?.into();
        self.last_known = Some(LastKnownSample {
            sample,
            payload: payload.clone(),
            cached_at: Instant::now(),
        });

        let mut report = BroadcastReport::default();
        self.subscribers
            .retain(|id, sink| match deliver(sink, &payload) {
                Ok(()) => {
                    report.delivered += 1;
                    true
                }
                Err(Disconnected) => {
                    debug!("Subscriber {} gone, removing", id);
                    report.removed += 1;
                    false
                }
            });

        Ok(report)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn last_sample(&self) -> Option<AudioSample> {
        self.last_known.as_ref().map(|l| l.sample)
    }

    /// Serialized form of the last known sample, as sent on catch-up
    pub fn last_payload(&self) -> Option<Payload> {
        self.last_known.as_ref().map(|l| l.payload.clone())
    }

    pub fn snapshot(&self) -> HubSnapshot {
        HubSnapshot {
            subscribers: self.subscribers.len(),
            last_sample: self.last_sample(),
            last_sample_age: self.last_known.as_ref().map(|l| l.cached_at.elapsed()),
        }
    }
}

/// Commands processed by the hub task
#[derive(Debug)]
pub enum HubCommand {
    Register {
        sink: SubscriberSink,
        reply: oneshot::Sender<SubscriberId>,
    },
    Unregister(SubscriberId),
    Publish(AudioSample),
    Snapshot(oneshot::Sender<HubSnapshot>),
}

/// Cloneable handle to the hub task
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    async fn send(&self, command: HubCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| ControlError::HubClosed)
    }

    /// Register a subscriber sink; the catch-up sample (if any) is already
    /// queued on `sink` when this returns.
    pub async fn register(&self, sink: SubscriberSink) -> Result<SubscriberId> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Register { sink, reply }).await?;
        rx.await.map_err(|_| ControlError::HubClosed)
    }

    pub async fn unregister(&self, id: SubscriberId) -> Result<()> {
        self.send(HubCommand::Unregister(id)).await
    }

    /// Hand a decoded sample to the hub. Samples are broadcast in call order.
    pub async fn publish(&self, sample: AudioSample) -> Result<()> {
        self.send(HubCommand::Publish(sample)).await
    }

    pub async fn snapshot(&self) -> Result<HubSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Snapshot(reply)).await?;
        rx.await.map_err(|_| ControlError::HubClosed)
    }
}

/// Spawn the hub task. It stops once every [`HubHandle`] is dropped.
pub fn spawn_hub(queue: usize, stats: Arc<RelayStats>) -> (HubHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(queue);
    let task = tokio::spawn(run_hub(SubscriberBroadcastHub::new(), rx, stats));
    (HubHandle { tx }, task)
}

async fn run_hub(
    mut hub: SubscriberBroadcastHub,
    mut rx: mpsc::Receiver<HubCommand>,
    stats: Arc<RelayStats>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            HubCommand::Register { sink, reply } => {
                let id = hub.accept(sink);
                info!(
                    "Subscriber {} registered, total subscribers: {}",
                    id,
                    hub.subscriber_count()
                );
                // Requester gone means the connection already closed
                if reply.send(id).is_err() {
                    hub.remove(id);
                }
            }
            HubCommand::Unregister(id) => {
                if hub.remove(id) {
                    info!(
                        "Subscriber {} unregistered, total subscribers: {}",
                        id,
                        hub.subscriber_count()
                    );
                }
            }
            HubCommand::Publish(sample) => match hub.broadcast(sample) {
                Ok(report) => {
                    stats.record_sample();
                    trace!(?report, "Broadcast sample");
                }
                Err(e) => warn!("Failed to serialize audio sample: {}", e),
            },
            HubCommand::Snapshot(reply) => {
                let _ = reply.send(hub.snapshot());
            }
        }
    }

    debug!("Hub command channel closed, stopping hub");
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    fn sample(bass: f64) -> AudioSample {
        AudioSample {
            bass,
            mids: 10.0,
            treble: 5.0,
            beat: false,
            total_energy: 100.0,
            timestamp: 1_700_000_000_000.0,
        }
    }

    #[test]
    fn test_no_catch_up_before_first_sample() {
        let mut hub = SubscriberBroadcastHub::new();
        let (tx, mut rx) = subscriber_queue(4);
        hub.accept(tx);

        assert!(rx.try_recv().is_err());
        assert_eq!(hub.subscriber_count(), 1);
        assert!(hub.last_sample().is_none());
    }

    #[test]
    fn test_catch_up_is_latest_sample() {
        let mut hub = SubscriberBroadcastHub::new();
        hub.broadcast(sample(1.0)).unwrap();
        hub.broadcast(sample(2.0)).unwrap();

        let (tx, mut rx) = subscriber_queue(4);
        hub.accept(tx);

        let first = rx.try_recv().unwrap();
        assert_eq!(AudioSample::decode(&first).unwrap(), sample(2.0));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_catch_up_payload_matches_broadcast_bytes() {
        let mut hub = SubscriberBroadcastHub::new();
        let (early_tx, mut early_rx) = subscriber_queue(4);
        hub.accept(early_tx);
        hub.broadcast(sample(7.0)).unwrap();

        let (late_tx, mut late_rx) = subscriber_queue(4);
        hub.accept(late_tx);

        assert_eq!(early_rx.try_recv().unwrap(), late_rx.try_recv().unwrap());
    }

    #[test]
    fn test_closed_subscriber_removed_others_served() {
        let mut hub = SubscriberBroadcastHub::new();
        let (tx_a, mut rx_a) = subscriber_queue(4);
        let (tx_b, rx_b) = subscriber_queue(4);
        let (tx_c, mut rx_c) = subscriber_queue(4);
        hub.accept(tx_a);
        let broken = hub.accept(tx_b);
        hub.accept(tx_c);
        drop(rx_b);

        let report = hub.broadcast(sample(3.0)).unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(report.removed, 1);
        assert_eq!(hub.subscriber_count(), 2);
        assert!(!hub.remove(broken));

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_c.try_recv().is_ok());
    }

    /// Drain a queue, skipping lag notices, and return the samples seen
    fn drain(rx: &mut SubscriberQueue) -> Vec<f64> {
        let mut seen = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(payload) => seen.push(AudioSample::decode(&payload).unwrap().bass),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => return seen,
            }
        }
    }

    #[test]
    fn test_full_queue_drops_oldest_and_keeps_latest() {
        let mut hub = SubscriberBroadcastHub::new();
        let (slow_tx, mut slow_rx) = subscriber_queue(2);
        let (fast_tx, mut fast_rx) = subscriber_queue(8);
        hub.accept(slow_tx);
        hub.accept(fast_tx);

        for bass in [1.0, 2.0, 3.0] {
            let report = hub.broadcast(sample(bass)).unwrap();
            assert_eq!(report.delivered, 2);
            assert_eq!(report.removed, 0);
        }
        assert_eq!(hub.subscriber_count(), 2);

        let slow = drain(&mut slow_rx);
        assert_eq!(slow, vec![2.0, 3.0]);
        assert_eq!(slow.last().copied(), hub.last_sample().map(|s| s.bass));

        assert_eq!(drain(&mut fast_rx), vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_lagged_reader_resumes_at_latest() {
        let mut hub = SubscriberBroadcastHub::new();
        let (tx, mut rx) = subscriber_queue(1);
        hub.accept(tx);

        hub.broadcast(sample(1.0)).unwrap();
        hub.broadcast(sample(2.0)).unwrap();

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(1))));
        let payload = rx.recv().await.unwrap();
        assert_eq!(AudioSample::decode(&payload).unwrap(), sample(2.0));
    }

    #[test]
    fn test_ordering_per_subscriber() {
        let mut hub = SubscriberBroadcastHub::new();
        let (tx, mut rx) = subscriber_queue(8);
        hub.accept(tx);

        hub.broadcast(sample(1.0)).unwrap();
        hub.broadcast(sample(2.0)).unwrap();

        assert_eq!(AudioSample::decode(&rx.try_recv().unwrap()).unwrap(), sample(1.0));
        assert_eq!(AudioSample::decode(&rx.try_recv().unwrap()).unwrap(), sample(2.0));
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut hub = SubscriberBroadcastHub::new();
        assert!(!hub.remove(42));
    }

    #[test]
    fn test_snapshot_reports_age() {
        let mut hub = SubscriberBroadcastHub::new();
        assert_eq!(hub.snapshot().last_sample_age, None);

        hub.broadcast(sample(4.0)).unwrap();
        let snap = hub.snapshot();
        assert_eq!(snap.last_sample, Some(sample(4.0)));
        assert!(snap.last_sample_age.is_some());
    }

    proptest! {
        #[test]
        fn prop_fan_out_reaches_every_subscriber_once(n in 1usize..48, bass in 0.0f64..255.0) {
            let mut hub = SubscriberBroadcastHub::new();
            let mut receivers = Vec::with_capacity(n);
            for _ in 0..n {
                let (tx, rx) = subscriber_queue(4);
                hub.accept(tx);
                receivers.push(rx);
            }

            let report = hub.broadcast(sample(bass)).unwrap();
            prop_assert_eq!(report.delivered, n);

            let expected = hub.last_payload().unwrap();
            for rx in receivers.iter_mut() {
                let got = rx.try_recv().unwrap();
                prop_assert!(Arc::ptr_eq(&got, &expected));
                prop_assert!(rx.try_recv().is_err());
            }
        }
    }

    #[tokio::test]
    async fn test_hub_task_register_and_publish() {
        let stats = Arc::new(RelayStats::default());
        let (hub, task) = spawn_hub(16, stats.clone());

        let (tx, mut rx) = subscriber_queue(4);
        let id = hub.register(tx).await.unwrap();
        hub.publish(sample(9.0)).await.unwrap();

        let payload = rx.recv().await.unwrap();
        assert_eq!(AudioSample::decode(&payload).unwrap(), sample(9.0));

        hub.unregister(id).await.unwrap();
        let snap = hub.snapshot().await.unwrap();
        assert_eq!(snap.subscribers, 0);
        assert_eq!(snap.last_sample, Some(sample(9.0)));
        assert_eq!(stats.snapshot().samples_relayed, 1);

        drop(hub);
        task.await.unwrap();
    }
}
