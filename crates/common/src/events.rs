//! Event Bus payloads (spec §4.1) and the WebSocket envelope (spec §4.3).
//!
//! A tagged union rather than an untyped map (spec §9 "Dynamic payload
//! shapes") — publisher and subscriber share the same schema, and the
//! compiler catches a handler that forgets a variant.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AgentId, AgentStatus, ExecutionId, RunStatus, ThreadId, WorkflowId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    AgentCreated { agent_id: AgentId },
    AgentUpdated { agent_id: AgentId, status: AgentStatus, last_run_at: Option<chrono::DateTime<chrono::Utc>>, last_error: Option<String> },
    AgentDeleted { agent_id: AgentId },

    ThreadCreated { thread_id: ThreadId, agent_id: AgentId },
    ThreadUpdated { thread_id: ThreadId },
    ThreadDeleted { thread_id: ThreadId },
    ThreadMessageCreated { thread_id: ThreadId, message_id: Uuid },

    RunCreated { run_id: Uuid, agent_id: AgentId, thread_id: ThreadId, status: RunStatus },
    RunUpdated { run_id: Uuid, agent_id: AgentId, status: RunStatus, error: Option<String> },

    TriggerFired { trigger_id: Uuid, agent_id: AgentId },

    NodeState { execution_id: ExecutionId, node_id: String, status: NodeStatus, error: Option<String> },
    NodeLog { execution_id: ExecutionId, node_id: String, stream: LogStream, text: String },
    ExecutionFinished { execution_id: ExecutionId, workflow_id: WorkflowId, status: ExecutionStatusEvent, duration_ms: i64, error: Option<String> },

    UserUpdate { user_id: Uuid },

    StreamStart { thread_id: ThreadId, run_id: Uuid },
    StreamChunk { thread_id: ThreadId, run_id: Uuid, chunk: StreamChunk },
    StreamEnd { thread_id: ThreadId, run_id: Uuid },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Running,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatusEvent {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "chunk_type", rename_all = "snake_case")]
pub enum StreamChunk {
    AssistantToken { text: String },
    ToolOutput { tool_name: String, tool_call_id: String, output: serde_json::Value },
}

impl Event {
    /// The event's "kind" discriminant, used by the Event Bus to dispatch
    /// to per-kind subscriber lists without matching the whole payload.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::AgentCreated { .. } => EventKind::AgentCreated,
            Event::AgentUpdated { .. } => EventKind::AgentUpdated,
            Event::AgentDeleted { .. } => EventKind::AgentDeleted,
            Event::ThreadCreated { .. } => EventKind::ThreadCreated,
            Event::ThreadUpdated { .. } => EventKind::ThreadUpdated,
            Event::ThreadDeleted { .. } => EventKind::ThreadDeleted,
            Event::ThreadMessageCreated { .. } => EventKind::ThreadMessageCreated,
            Event::RunCreated { .. } => EventKind::RunCreated,
            Event::RunUpdated { .. } => EventKind::RunUpdated,
            Event::TriggerFired { .. } => EventKind::TriggerFired,
            Event::NodeState { .. } => EventKind::NodeState,
            Event::NodeLog { .. } => EventKind::NodeLog,
            Event::ExecutionFinished { .. } => EventKind::ExecutionFinished,
            Event::UserUpdate { .. } => EventKind::UserUpdate,
            Event::StreamStart { .. } => EventKind::StreamStart,
            Event::StreamChunk { .. } => EventKind::StreamChunk,
            Event::StreamEnd { .. } => EventKind::StreamEnd,
        }
    }

    /// The wire `type` string used on the WebSocket envelope (spec §4.1's
    /// event type list, e.g. `RUN_CREATED`). Distinct from `EventKind`'s
    /// `snake_case` serde representation, which is an internal dispatch key
    /// rather than a wire value.
    pub fn envelope_type(&self) -> &'static str {
        match self {
            Event::AgentCreated { .. } => "AGENT_CREATED",
            Event::AgentUpdated { .. } => "AGENT_UPDATED",
            Event::AgentDeleted { .. } => "AGENT_DELETED",
            Event::ThreadCreated { .. } => "THREAD_CREATED",
            Event::ThreadUpdated { .. } => "THREAD_UPDATED",
            Event::ThreadDeleted { .. } => "THREAD_DELETED",
            Event::ThreadMessageCreated { .. } => "THREAD_MESSAGE_CREATED",
            Event::RunCreated { .. } => "RUN_CREATED",
            Event::RunUpdated { .. } => "RUN_UPDATED",
            Event::TriggerFired { .. } => "TRIGGER_FIRED",
            Event::NodeState { .. } => "NODE_STATE",
            Event::NodeLog { .. } => "NODE_LOG",
            Event::ExecutionFinished { .. } => "EXECUTION_FINISHED",
            Event::UserUpdate { .. } => "USER_UPDATE",
            Event::StreamStart { .. } => "STREAM_START",
            Event::StreamChunk { .. } => "STREAM_CHUNK",
            Event::StreamEnd { .. } => "STREAM_END",
        }
    }

    /// The topic this event broadcasts to, per the Topic Manager's topic
    /// synthesis rule (spec §4.2).
    pub fn topic(&self) -> String {
        match self {
            Event::AgentCreated { agent_id }
            | Event::AgentDeleted { agent_id } => format!("agent:{agent_id}"),
            Event::AgentUpdated { agent_id, .. } => format!("agent:{agent_id}"),
            Event::ThreadCreated { thread_id, .. }
            | Event::ThreadUpdated { thread_id }
            | Event::ThreadDeleted { thread_id }
            | Event::ThreadMessageCreated { thread_id, .. } => format!("thread:{thread_id}"),
            Event::RunCreated { agent_id, .. } => format!("agent:{agent_id}"),
            Event::RunUpdated { agent_id, .. } => format!("agent:{agent_id}"),
            Event::TriggerFired { agent_id, .. } => format!("agent:{agent_id}"),
            Event::NodeState { execution_id, .. }
            | Event::NodeLog { execution_id, .. } => format!("workflow_execution:{execution_id}"),
            Event::ExecutionFinished { execution_id, .. } => format!("workflow_execution:{execution_id}"),
            Event::UserUpdate { user_id } => format!("user:{user_id}"),
            Event::StreamStart { thread_id, .. }
            | Event::StreamChunk { thread_id, .. }
            | Event::StreamEnd { thread_id, .. } => format!("thread:{thread_id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AgentCreated,
    AgentUpdated,
    AgentDeleted,
    ThreadCreated,
    ThreadUpdated,
    ThreadDeleted,
    ThreadMessageCreated,
    RunCreated,
    RunUpdated,
    TriggerFired,
    NodeState,
    NodeLog,
    ExecutionFinished,
    UserUpdate,
    StreamStart,
    StreamChunk,
    StreamEnd,
}

/// The uniform JSON envelope for every WebSocket message (spec §4.3).
/// Unknown fields are ignored by `serde`'s default behavior; `v != 1` is
/// checked explicitly by the hub before dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub v: u8,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub req_id: Option<String>,
    pub ts: i64,
    #[serde(default = "default_data")]
    pub data: serde_json::Value,
}

fn default_data() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

impl Envelope {
    pub fn new(ty: impl Into<String>, topic: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            v: 1,
            ty: ty.into(),
            topic: topic.into(),
            req_id: None,
            ts: chrono::Utc::now().timestamp_millis(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_type_is_shouting_snake_case() {
        let evt = Event::RunCreated {
            run_id: Uuid::new_v4(),
            agent_id: AgentId::new(),
            thread_id: ThreadId::new(),
            status: RunStatus::Queued,
        };
        assert_eq!(evt.envelope_type(), "RUN_CREATED");
    }

    #[test]
    fn topic_synthesis_matches_grammar() {
        let agent_id = AgentId::new();
        let evt = Event::AgentUpdated {
            agent_id,
            status: AgentStatus::Running,
            last_run_at: None,
            last_error: None,
        };
        assert_eq!(evt.topic(), format!("agent:{agent_id}"));
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let env = Envelope::new("ping", "system", serde_json::json!({}));
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.v, 1);
        assert_eq!(back.ty, "ping");
    }

    #[test]
    fn unknown_fields_are_ignored_on_deserialize() {
        let json = r#"{"v":1,"type":"ping","topic":"system","ts":0,"data":{},"extra":"whatever"}"#;
        let env: Envelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.ty, "ping");
    }
}
