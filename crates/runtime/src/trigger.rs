//! Webhook trigger ingress (spec §4.8, C8).
//!
//! Validation order is timestamp → signature → active, matching spec.md
//! §4.8 literally. Existence of the trigger itself is a lookup, not one of
//! the three checks, and happens before any of them (you need the trigger's
//! secret before you can check its signature at all).
//!
//! Grounded on `toka-capability-jwt-hs256`'s constant-time-comparison
//! discipline (verify via the MAC crate's own `verify_slice`, never a
//! hand-rolled `==`) applied to HMAC instead of JWT.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use zerg_common::events::Event;
use zerg_common::{CoreError, RunTrigger, ThreadType, Trigger, TriggerId};
use zerg_storage::PersistenceStore;

use crate::bus::EventBus;
use crate::error::{RuntimeError, RuntimeResult};
use crate::task_runner::{RunRequest, TaskRunner};

type HmacSha256 = Hmac<Sha256>;

pub struct TriggerIngress {
    store: Arc<dyn PersistenceStore>,
    bus: Arc<EventBus>,
    task_runner: Arc<TaskRunner>,
    timestamp_tolerance_secs: i64,
}

/// The three pieces of an inbound webhook request relevant to verification.
pub struct WebhookRequest<'a> {
    pub timestamp_header: &'a str,
    pub signature_header: &'a str,
    pub body: &'a [u8],
}

impl TriggerIngress {
    pub fn new(store: Arc<dyn PersistenceStore>, bus: Arc<EventBus>, task_runner: Arc<TaskRunner>, timestamp_tolerance_secs: i64) -> Self {
        Self { store, bus, task_runner, timestamp_tolerance_secs }
    }

    /// Validates the webhook and, on success, emits `TRIGGER_FIRED` and
    /// dispatches the Task Runner with `trigger=webhook` and the raw body as
    /// the task-override payload. Any validation failure returns an error
    /// with no side effect (spec: "Failure at any step → 401 and no side
    /// effect").
    #[instrument(skip(self, req), fields(trigger_id = %trigger_id))]
    pub async fn ingest(&self, trigger_id: TriggerId, req: WebhookRequest<'_>) -> RuntimeResult<()> {
        let trigger = self.store.get_trigger(trigger_id).await?;
        verify_signature(&trigger, &req, self.timestamp_tolerance_secs).map_err(RuntimeError::Core)?;

        self.bus
            .publish(Event::TriggerFired { trigger_id: trigger_id.0, agent_id: trigger.agent_id })
            .await;

        let task_override = String::from_utf8(req.body.to_vec())
            .map_err(|e| RuntimeError::Core(CoreError::Protocol(e.to_string())))?;
        let dispatch_req = RunRequest {
            agent_id: trigger.agent_id,
            thread_id: None,
            thread_type: ThreadType::Trigger,
            trigger: RunTrigger::Webhook,
            task_override: Some(task_override),
        };
        self.task_runner.dispatch(dispatch_req, CancellationToken::new()).await?;
        Ok(())
    }
}

/// Checks timestamp freshness, then HMAC-SHA256 signature, then that the
/// trigger is active — in that order, each a hard stop on failure.
fn verify_signature(trigger: &Trigger, req: &WebhookRequest<'_>, tolerance_secs: i64) -> Result<(), CoreError> {
    let claimed_ts: i64 = req
        .timestamp_header
        .parse()
        .map_err(|_| CoreError::Auth("invalid X-Zerg-Timestamp header".to_string()))?;
    let now = chrono::Utc::now().timestamp();
    if (now - claimed_ts).abs() > tolerance_secs {
        return Err(CoreError::Auth("timestamp outside tolerance window".to_string()));
    }

    let mut mac = HmacSha256::new_from_slice(trigger.secret.as_bytes())
        .map_err(|e| CoreError::Auth(e.to_string()))?;
    mac.update(req.timestamp_header.as_bytes());
    mac.update(b".");
    mac.update(req.body);

    let expected_bytes =
        hex::decode(req.signature_header).map_err(|_| CoreError::Auth("X-Zerg-Signature is not valid hex".to_string()))?;
    mac.verify_slice(&expected_bytes)
        .map_err(|_| CoreError::Auth("signature mismatch".to_string()))?;

    if !trigger.active {
        return Err(CoreError::Auth("trigger is not active".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::AgentLockManager;
    use crate::model_runner::EchoModelRunner;
    use crate::test_support::InMemoryStore;
    use crate::tools::ToolRegistry;
    use zerg_common::{Agent, AgentId, AgentStatus, UserId};

    fn sign(secret: &str, timestamp: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    fn fixture_trigger(store: &InMemoryStore, active: bool) -> (Agent, Trigger) {
        let agent = Agent {
            id: AgentId::new(),
            owner_id: UserId::new(),
            system_instructions: "be terse".to_string(),
            task_instructions: "say hi".to_string(),
            model: "echo".to_string(),
            cron_schedule: None,
            status: AgentStatus::Idle,
            last_error: None,
            last_run_at: None,
            next_run_at: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        store.seed_agent(agent.clone());
        let trigger = Trigger { id: TriggerId::new(), agent_id: agent.id, secret: "s3cr3t".to_string(), active };
        store.seed_trigger(trigger.clone());
        (agent, trigger)
    }

    fn ingress(store: Arc<InMemoryStore>) -> TriggerIngress {
        let bus = Arc::new(EventBus::new());
        let task_runner = Arc::new(TaskRunner::new(
            store.clone(),
            bus.clone(),
            AgentLockManager::new(),
            Arc::new(EchoModelRunner),
            ToolRegistry::new(),
        ));
        TriggerIngress::new(store, bus, task_runner, 300)
    }

    #[tokio::test]
    async fn valid_signature_and_fresh_timestamp_dispatches_a_run() {
        let store = Arc::new(InMemoryStore::new());
        let (agent, trigger) = fixture_trigger(&store, true);
        let ingress = ingress(store.clone());

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let body = b"hello from webhook";
        let signature = sign(&trigger.secret, &timestamp, body);

        ingress
            .ingest(trigger.id, WebhookRequest { timestamp_header: &timestamp, signature_header: &signature, body })
            .await
            .expect("valid webhook should dispatch");

        let runs = store.list_runs(agent.id, 10).await.unwrap();
        assert_eq!(runs.len(), 1);
    }

    #[tokio::test]
    async fn stale_timestamp_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let (_, trigger) = fixture_trigger(&store, true);
        let ingress = ingress(store.clone());

        let timestamp = (chrono::Utc::now().timestamp() - 10_000).to_string();
        let body = b"payload";
        let signature = sign(&trigger.secret, &timestamp, body);

        let result = ingress
            .ingest(trigger.id, WebhookRequest { timestamp_header: &timestamp, signature_header: &signature, body })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn wrong_signature_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let (_, trigger) = fixture_trigger(&store, true);
        let ingress = ingress(store.clone());

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let body = b"payload";
        let bogus_signature = sign("wrong-secret", &timestamp, body);

        let result = ingress
            .ingest(trigger.id, WebhookRequest { timestamp_header: &timestamp, signature_header: &bogus_signature, body })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn inactive_trigger_is_rejected_even_with_a_valid_signature() {
        let store = Arc::new(InMemoryStore::new());
        let (_, trigger) = fixture_trigger(&store, false);
        let ingress = ingress(store.clone());

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let body = b"payload";
        let signature = sign(&trigger.secret, &timestamp, body);

        let result = ingress
            .ingest(trigger.id, WebhookRequest { timestamp_header: &timestamp, signature_header: &signature, body })
            .await;
        assert!(result.is_err());
    }
}
