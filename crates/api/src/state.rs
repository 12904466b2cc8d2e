//! The explicitly-constructed bundle of singletons every handler needs.
//! Built once in the binary entry point and cloned (cheaply, via `Arc`)
//! into each request — never an ambient global (spec §5, §9: the teacher's
//! `once_cell::sync::Lazy` `HITL_STORAGE` is the antipattern this avoids).

use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use zerg_common::config::SystemConfig;
use zerg_common::ExecutionId;
use zerg_runtime::bus::EventBus;
use zerg_runtime::scheduler::Scheduler;
use zerg_runtime::task_runner::TaskRunner;
use zerg_runtime::tools::ToolRegistry;
use zerg_runtime::topics::TopicManager;
use zerg_runtime::trigger::TriggerIngress;
use zerg_runtime::workflow::WorkflowEngine;
use zerg_storage::PersistenceStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PersistenceStore>,
    pub bus: Arc<EventBus>,
    pub topics: Arc<TopicManager>,
    pub task_runner: Arc<TaskRunner>,
    pub workflow_engine: Arc<WorkflowEngine>,
    pub tools: ToolRegistry,
    pub scheduler: Arc<Scheduler>,
    pub trigger_ingress: Arc<TriggerIngress>,
    pub config: Arc<SystemConfig>,
    /// Cancellation handles for in-flight workflow executions, so
    /// `POST /workflow-executions/{id}/cancel` can reach a run that's
    /// already spawned on its own task (spec §5 "cooperative cancel").
    pub active_executions: Arc<DashMap<ExecutionId, CancellationToken>>,
}
