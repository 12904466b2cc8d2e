//! `TopicAuthorizer` backed by the persistence layer — ownership checks
//! walk agent/thread/workflow rows back to their `owner_id` (spec §4.2).

use std::sync::Arc;

use async_trait::async_trait;
use zerg_common::{ExecutionId, ThreadId, UserId};
use zerg_common::AgentId;
use zerg_runtime::topics::TopicAuthorizer;
use zerg_storage::PersistenceStore;

pub struct StoreAuthorizer {
    store: Arc<dyn PersistenceStore>,
}

impl StoreAuthorizer {
    pub fn new(store: Arc<dyn PersistenceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TopicAuthorizer for StoreAuthorizer {
    async fn owns_agent(&self, user_id: UserId, agent_id: AgentId) -> bool {
        matches!(self.store.get_agent(agent_id).await, Ok(agent) if agent.owner_id == user_id)
    }

    async fn owns_thread(&self, user_id: UserId, thread_id: ThreadId) -> bool {
        let Ok(thread) = self.store.get_thread(thread_id).await else { return false };
        self.owns_agent(user_id, thread.agent_id).await
    }

    async fn owns_workflow_execution(&self, user_id: UserId, execution_id: ExecutionId) -> bool {
        let Ok(execution) = self.store.get_execution(execution_id).await else { return false };
        matches!(self.store.get_workflow(execution.workflow_id).await, Ok(w) if w.owner_id == user_id)
    }

    async fn is_admin(&self, _user_id: UserId) -> bool {
        false
    }
}
