//! `zerg-server` binary entry point.
//!
//! Loads `SystemConfig`, constructs every runtime service explicitly, and
//! runs the `axum` server to completion. No ambient globals: everything
//! handlers need is built here once and threaded through `AppState`.

use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use zerg_api::authorizer::StoreAuthorizer;
use zerg_api::state::AppState;
use zerg_api::Server;
use zerg_common::config::SystemConfig;
use zerg_runtime::bus::EventBus;
use zerg_runtime::lock::AgentLockManager;
use zerg_runtime::model_runner::EchoModelRunner;
use zerg_runtime::scheduler::Scheduler;
use zerg_runtime::task_runner::TaskRunner;
use zerg_runtime::tools::ToolRegistry;
use zerg_runtime::topics::TopicManager;
use zerg_runtime::trigger::TriggerIngress;
use zerg_runtime::workflow::WorkflowEngine;
use zerg_storage::PostgresStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = Arc::new(SystemConfig::load(&config_path)?);
    tracing::info!(path = %config_path, "configuration loaded");

    let store = PostgresStore::new(&config.database.url, config.database.max_connections).await?;
    store.run_migrations().await?;
    let store: Arc<dyn zerg_storage::PersistenceStore> = Arc::new(store);

    let bus = Arc::new(EventBus::new());
    let authorizer: Arc<dyn zerg_runtime::topics::TopicAuthorizer> =
        Arc::new(StoreAuthorizer::new(store.clone()));
    let topics = Arc::new(TopicManager::new(authorizer, config.websocket.client_queue_depth));
    zerg_runtime::bridge::forward_events_to_topics(bus.clone(), topics.clone()).await;

    let locks = AgentLockManager::default();
    let model: Arc<dyn zerg_runtime::model_runner::ModelRunner> = Arc::new(EchoModelRunner);
    let mut tools = ToolRegistry::new();
    tools.register("echo", Arc::new(zerg_runtime::tools::EchoTool));

    let task_runner = Arc::new(TaskRunner::new(store.clone(), bus.clone(), locks, model, tools.clone()));
    let workflow_engine = Arc::new(WorkflowEngine::new(store.clone(), bus.clone(), task_runner.clone(), tools.clone()));

    let poll_interval = std::time::Duration::from_secs(config.scheduler.poll_interval_secs);
    let scheduler = Arc::new(Scheduler::new(store.clone(), task_runner.clone(), poll_interval));
    scheduler.bootstrap().await?;
    let scheduler_cancel = CancellationToken::new();
    let scheduler_task = scheduler.clone();
    let scheduler_cancel_handle = scheduler_cancel.clone();
    tokio::spawn(async move { scheduler_task.run(scheduler_cancel_handle).await });

    let trigger_ingress = Arc::new(TriggerIngress::new(
        store.clone(),
        bus.clone(),
        task_runner.clone(),
        config.trigger.timestamp_tolerance_secs,
    ));

    let state = AppState {
        store,
        bus,
        topics,
        task_runner,
        workflow_engine,
        tools,
        scheduler,
        trigger_ingress,
        config: config.clone(),
        active_executions: Arc::new(DashMap::new()),
    };

    let bind_addr = format!("{}:{}", config.server.bind_addr, config.server.port);
    let result = Server::new(state, bind_addr).run().await;
    scheduler_cancel.cancel();
    result
}
