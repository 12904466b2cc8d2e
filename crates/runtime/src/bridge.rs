//! Wires the Event Bus to the Topic Manager (spec §4.2: "on event-bus
//! receipt the manager synthesises a topic from the payload ... and calls
//! BroadcastToTopic"). Without this forwarder every domain event is
//! published into the bus and never reaches a WebSocket client.

use std::sync::Arc;

use zerg_common::events::{Envelope, Event, EventKind};

use crate::bus::EventBus;
use crate::topics::TopicManager;

const ALL_EVENT_KINDS: &[EventKind] = &[
    EventKind::AgentCreated,
    EventKind::AgentUpdated,
    EventKind::AgentDeleted,
    EventKind::ThreadCreated,
    EventKind::ThreadUpdated,
    EventKind::ThreadDeleted,
    EventKind::ThreadMessageCreated,
    EventKind::RunCreated,
    EventKind::RunUpdated,
    EventKind::TriggerFired,
    EventKind::NodeState,
    EventKind::NodeLog,
    EventKind::ExecutionFinished,
    EventKind::UserUpdate,
    EventKind::StreamStart,
    EventKind::StreamChunk,
    EventKind::StreamEnd,
];

/// Subscribes to every `EventKind` and forwards each event onto its
/// synthesised topic. Call once at startup, after both `bus` and `topics`
/// are constructed but before the server starts accepting connections.
pub async fn forward_events_to_topics(bus: Arc<EventBus>, topics: Arc<TopicManager>) {
    for kind in ALL_EVENT_KINDS {
        let topics = topics.clone();
        bus.subscribe(
            *kind,
            Arc::new(move |event: Event| {
                let topics = topics.clone();
                Box::pin(async move {
                    let envelope = Envelope::new(event.envelope_type(), event.topic(), to_payload(&event));
                    topics.broadcast_to_topic(&event.topic(), envelope).await;
                })
            }),
        )
        .await;
    }
}

fn to_payload(event: &Event) -> serde_json::Value {
    serde_json::to_value(event).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topics::TopicAuthorizer;
    use async_trait::async_trait;
    use zerg_common::{AgentId, UserId};

    struct AllowAll;

    #[async_trait]
    impl TopicAuthorizer for AllowAll {
        async fn owns_agent(&self, _user_id: UserId, _agent_id: AgentId) -> bool {
            true
        }
        async fn owns_thread(&self, _user_id: UserId, _thread_id: zerg_common::ThreadId) -> bool {
            true
        }
        async fn owns_workflow_execution(&self, _user_id: UserId, _execution_id: zerg_common::ExecutionId) -> bool {
            true
        }
        async fn is_admin(&self, _user_id: UserId) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn agent_updated_event_reaches_a_subscribed_client() {
        let bus = Arc::new(EventBus::new());
        let topics = Arc::new(TopicManager::new(Arc::new(AllowAll), 100));
        forward_events_to_topics(bus.clone(), topics.clone()).await;

        let agent_id = AgentId::new();
        let client_id = uuid::Uuid::new_v4();
        let queue = topics.register_client(client_id, UserId::new()).await;
        topics.subscribe(client_id, format!("agent:{agent_id}"), None).await;
        queue.pop().await; // drain subscribe_ack

        bus.publish(Event::AgentUpdated {
            agent_id,
            status: zerg_common::AgentStatus::Running,
            last_run_at: None,
            last_error: None,
        })
        .await;

        // The subscriber handler runs on its own task; give it a turn.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let envelope = queue.pop().await;
        assert_eq!(envelope.ty, "AGENT_UPDATED");
        assert_eq!(envelope.topic, format!("agent:{agent_id}"));
    }
}
