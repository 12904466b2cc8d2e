//! Maps topic strings to subscribed clients, with bounded per-client
//! outbound queues (spec §4.2, C2).
//!
//! The per-client queue is the one place this spec diverges from the
//! pack's `TopicBroadcaster` reference (`websocket_topics.rs`): a raw
//! `tokio::sync::broadcast` channel drops the *oldest* unread message only
//! implicitly, by letting a lagging receiver's `recv()` return
//! `RecvError::Lagged` — there is no way to guarantee "exactly capacity
//! messages remain, oldest evicted first" from that primitive. So each
//! client gets an explicit bounded `VecDeque` instead, with `push`
//! performing FIFO eviction itself.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Notify, RwLock};
use tracing::warn;
use zerg_common::{events::Envelope, AgentId, ThreadId, UserId, WorkflowId};

pub type ClientId = uuid::Uuid;

/// Ownership checks needed to authorize a subscription; implemented by
/// `zerg-api` against the persistence layer so this crate stays storage-
/// agnostic.
#[async_trait]
pub trait TopicAuthorizer: Send + Sync {
    async fn owns_agent(&self, user_id: UserId, agent_id: AgentId) -> bool;
    async fn owns_thread(&self, user_id: UserId, thread_id: ThreadId) -> bool;
    async fn owns_workflow_execution(&self, user_id: UserId, execution_id: zerg_common::ExecutionId) -> bool;
    async fn is_admin(&self, user_id: UserId) -> bool;
}

/// A bounded, FIFO-evicting outbound mailbox for one client connection.
pub struct ClientQueue {
    capacity: usize,
    inner: Mutex<VecDeque<Envelope>>,
    notify: Notify,
}

impl ClientQueue {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
        })
    }

    /// Pushes `envelope`, evicting the oldest pending message if full.
    /// Returns `true` if an eviction occurred.
    pub fn push(&self, envelope: Envelope) -> bool {
        let mut guard = self.inner.lock().unwrap();
        let evicted = if guard.len() >= self.capacity {
            guard.pop_front();
            true
        } else {
            false
        };
        guard.push_back(envelope);
        drop(guard);
        if evicted {
            warn!("client outbound queue overflowed, dropped oldest message");
        }
        self.notify.notify_one();
        evicted
    }

    /// Waits for and removes the oldest pending envelope.
    pub async fn pop(&self) -> Envelope {
        loop {
            if let Some(envelope) = self.inner.lock().unwrap().pop_front() {
                return envelope;
            }
            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

struct ClientEntry {
    user_id: UserId,
    queue: Arc<ClientQueue>,
    topics: HashSet<String>,
}

pub struct TopicManager {
    clients: RwLock<HashMap<ClientId, ClientEntry>>,
    topics: RwLock<HashMap<String, HashSet<ClientId>>>,
    authorizer: Arc<dyn TopicAuthorizer>,
    queue_capacity: usize,
}

impl TopicManager {
    pub fn new(authorizer: Arc<dyn TopicAuthorizer>, queue_capacity: usize) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            topics: RwLock::new(HashMap::new()),
            authorizer,
            queue_capacity,
        }
    }

    pub async fn register_client(&self, client_id: ClientId, user_id: UserId) -> Arc<ClientQueue> {
        let queue = ClientQueue::new(self.queue_capacity);
        self.clients.write().await.insert(
            client_id,
            ClientEntry {
                user_id,
                queue: queue.clone(),
                topics: HashSet::new(),
            },
        );
        queue
    }

    /// Removes the client from every topic it was subscribed to.
    pub async fn deregister_client(&self, client_id: ClientId) {
        let mut clients = self.clients.write().await;
        if let Some(entry) = clients.remove(&client_id) {
            let mut topics = self.topics.write().await;
            for topic in entry.topics {
                if let Some(set) = topics.get_mut(&topic) {
                    set.remove(&client_id);
                }
            }
        }
    }

    async fn authorize(&self, user_id: UserId, topic: &str) -> bool {
        if topic == "system" {
            return true;
        }
        if self.authorizer.is_admin(user_id).await {
            return true;
        }
        if let Some(rest) = topic.strip_prefix("agent:") {
            if let Ok(id) = rest.parse::<uuid::Uuid>() {
                return self.authorizer.owns_agent(user_id, AgentId(id)).await;
            }
        }
        if let Some(rest) = topic.strip_prefix("thread:") {
            if let Ok(id) = rest.parse::<uuid::Uuid>() {
                return self.authorizer.owns_thread(user_id, ThreadId(id)).await;
            }
        }
        if let Some(rest) = topic.strip_prefix("user:") {
            if let Ok(id) = rest.parse::<uuid::Uuid>() {
                return id == user_id.0;
            }
        }
        if let Some(rest) = topic.strip_prefix("workflow_execution:") {
            if let Ok(id) = rest.parse::<uuid::Uuid>() {
                return self
                    .authorizer
                    .owns_workflow_execution(user_id, zerg_common::ExecutionId(id))
                    .await;
            }
        }
        false
    }

    /// Subscriptions are idempotent: subscribing twice yields two acks but
    /// exactly one logical subscription (spec §8 testable property).
    /// `message_id` echoes the inbound envelope's `req_id`, per spec §4.2's
    /// `subscribe_ack{message_id, topics}` / `subscribe_error{message_id,
    /// topics, error}` payload shape.
    pub async fn subscribe(&self, client_id: ClientId, topic: String, message_id: Option<String>) {
        let user_id = {
            let clients = self.clients.read().await;
            match clients.get(&client_id) {
                Some(entry) => entry.user_id,
                None => return,
            }
        };

        if !self.authorize(user_id, &topic).await {
            self.send_to(client_id, Envelope::new(
                "subscribe_error",
                topic.clone(),
                serde_json::json!({ "message_id": message_id, "topics": [topic], "error": "not authorized" }),
            ))
            .await;
            return;
        }

        {
            let mut clients = self.clients.write().await;
            if let Some(entry) = clients.get_mut(&client_id) {
                entry.topics.insert(topic.clone());
            }
        }
        self.topics
            .write()
            .await
            .entry(topic.clone())
            .or_default()
            .insert(client_id);

        self.send_to(client_id, Envelope::new(
            "subscribe_ack",
            topic.clone(),
            serde_json::json!({ "message_id": message_id, "topics": [topic] }),
        ))
        .await;
    }

    pub async fn unsubscribe(&self, client_id: ClientId, topic: &str) {
        if let Some(entry) = self.clients.write().await.get_mut(&client_id) {
            entry.topics.remove(topic);
        }
        if let Some(set) = self.topics.write().await.get_mut(topic) {
            set.remove(&client_id);
        }
    }

    /// Pushes `envelope` onto the outbound queue of every client currently
    /// subscribed to `topic`. The subscriber snapshot is cloned under the
    /// lock and released before any enqueueing, so a slow client's push
    /// never holds up the broadcast to others.
    pub async fn broadcast_to_topic(&self, topic: &str, envelope: Envelope) {
        let client_ids: Vec<ClientId> = match self.topics.read().await.get(topic) {
            Some(set) => set.iter().copied().collect(),
            None => return,
        };
        let clients = self.clients.read().await;
        for client_id in client_ids {
            if let Some(entry) = clients.get(&client_id) {
                entry.queue.push(envelope.clone());
            }
        }
    }

    async fn send_to(&self, client_id: ClientId, envelope: Envelope) {
        if let Some(entry) = self.clients.read().await.get(&client_id) {
            entry.queue.push(envelope);
        }
    }

    /// Pushes `envelope` directly onto one client's outbound queue. Used by
    /// `zerg-api`'s WebSocket hub for replies that aren't a broadcast
    /// (`pong`, `error`) and don't belong in `subscribe`/`unsubscribe`.
    pub async fn send_direct(&self, client_id: ClientId, envelope: Envelope) {
        self.send_to(client_id, envelope).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AllowAll;

    #[async_trait]
    impl TopicAuthorizer for AllowAll {
        async fn owns_agent(&self, _user_id: UserId, _agent_id: AgentId) -> bool {
            true
        }
        async fn owns_thread(&self, _user_id: UserId, _thread_id: ThreadId) -> bool {
            true
        }
        async fn owns_workflow_execution(&self, _user_id: UserId, _execution_id: zerg_common::ExecutionId) -> bool {
            true
        }
        async fn is_admin(&self, _user_id: UserId) -> bool {
            false
        }
    }

    #[test]
    fn bounded_queue_evicts_oldest_first() {
        let queue = ClientQueue::new(100);
        for i in 0..150 {
            queue.push(Envelope::new("event", "agent:1", serde_json::json!({ "i": i })));
        }
        assert_eq!(queue.len(), 100);
        let first = queue.inner.lock().unwrap().front().unwrap().data.clone();
        assert_eq!(first, serde_json::json!({ "i": 50 }));
    }

    #[tokio::test]
    async fn subscribe_ack_echoes_the_inbound_request_id_as_message_id() {
        let manager = TopicManager::new(Arc::new(AllowAll), 100);
        let client_id = ClientId::new_v4();
        let queue = manager.register_client(client_id, UserId::new()).await;

        manager.subscribe(client_id, "system".to_string(), Some("req-42".to_string())).await;

        let ack = queue.pop().await;
        assert_eq!(ack.ty, "subscribe_ack");
        assert_eq!(ack.data["message_id"], serde_json::json!("req-42"));
        assert_eq!(ack.data["topics"], serde_json::json!(["system"]));
    }

    #[tokio::test]
    async fn subscribe_is_idempotent_but_acks_twice() {
        let manager = TopicManager::new(Arc::new(AllowAll), 100);
        let client_id = ClientId::new_v4();
        let queue = manager.register_client(client_id, UserId::new()).await;

        manager.subscribe(client_id, "system".to_string(), Some("req-1".to_string())).await;
        manager.subscribe(client_id, "system".to_string(), Some("req-2".to_string())).await;

        let acks: Vec<_> = (0..2).map(|_| queue.inner.lock().unwrap().pop_front()).collect();
        assert!(acks.iter().all(|a| a.is_some()));
        assert_eq!(queue.len(), 0);

        let topics = manager.topics.read().await;
        assert_eq!(topics.get("system").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn broadcast_reaches_only_subscribed_clients() {
        let manager = TopicManager::new(Arc::new(AllowAll), 100);
        let a = ClientId::new_v4();
        let b = ClientId::new_v4();
        let queue_a = manager.register_client(a, UserId::new()).await;
        let queue_b = manager.register_client(b, UserId::new()).await;

        manager.subscribe(a, "system".to_string(), None).await;
        queue_a.pop().await; // drain the ack

        manager
            .broadcast_to_topic("system", Envelope::new("ping", "system", serde_json::json!({})))
            .await;

        assert_eq!(queue_a.len(), 1);
        assert_eq!(queue_b.len(), 0);
    }
}
