//! Executes a single agent turn against a thread (spec §4.5, C5).

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use zerg_common::events::{Event, LogStream, StreamChunk};
use zerg_common::{
    Agent, AgentId, AgentRun, AgentStatus, Message, MessageRole, RunId, RunStatus, RunTrigger,
    Thread, ThreadId, ThreadType,
};
use zerg_storage::PersistenceStore;

use crate::bus::EventBus;
use crate::error::{RuntimeError, RuntimeResult};
use crate::lock::AgentLockManager;
use crate::model_runner::{ModelChunk, ModelRunner};
use crate::tools::ToolRegistry;

const SUMMARY_MAX_CHARS: usize = 256;

/// Registry of cancellation tokens for in-flight runs (spec §4.5
/// `CancelRun(run_id)`), the run-level analogue of `zerg-api`'s
/// `active_executions` map. Entries are removed on drop of the guard
/// returned by `register`, so a run is reachable for cancellation exactly
/// while its dispatch is in flight.
#[derive(Clone, Default)]
pub struct RunCancelRegistry {
    tokens: Arc<DashMap<RunId, CancellationToken>>,
}

pub struct RunCancelGuard {
    tokens: Arc<DashMap<RunId, CancellationToken>>,
    run_id: RunId,
}

impl Drop for RunCancelGuard {
    fn drop(&mut self) {
        self.tokens.remove(&self.run_id);
    }
}

impl RunCancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, run_id: RunId, token: CancellationToken) -> RunCancelGuard {
        self.tokens.insert(run_id, token);
        RunCancelGuard { tokens: self.tokens.clone(), run_id }
    }

    /// Flips the cancellation flag for `run_id`. Returns `false` if no run
    /// with that id is currently in flight.
    pub fn cancel(&self, run_id: RunId) -> bool {
        match self.tokens.get(&run_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

pub struct TaskRunner {
    store: Arc<dyn PersistenceStore>,
    bus: Arc<EventBus>,
    locks: AgentLockManager,
    model: Arc<dyn ModelRunner>,
    tools: ToolRegistry,
    run_registry: RunCancelRegistry,
}

/// Result of a completed dispatch; `final_text` is the concatenated
/// assistant output, used by the workflow engine as a node's output value.
pub struct TaskOutcome {
    pub run_id: RunId,
    pub status: RunStatus,
    pub final_text: Option<String>,
}

pub struct RunRequest {
    pub agent_id: AgentId,
    pub thread_id: Option<ThreadId>,
    pub thread_type: ThreadType,
    pub trigger: RunTrigger,
    pub task_override: Option<String>,
}

impl TaskRunner {
    pub fn new(
        store: Arc<dyn PersistenceStore>,
        bus: Arc<EventBus>,
        locks: AgentLockManager,
        model: Arc<dyn ModelRunner>,
        tools: ToolRegistry,
    ) -> Self {
        Self { store, bus, locks, model, tools, run_registry: RunCancelRegistry::new() }
    }

    /// Cancels the in-flight run `run_id`, if any (spec §4.5 `CancelRun`).
    pub fn cancel_run(&self, run_id: RunId) -> bool {
        self.run_registry.cancel(run_id)
    }

    #[instrument(skip(self, req, cancel), fields(agent_id = %req.agent_id))]
    pub async fn dispatch(&self, req: RunRequest, cancel: CancellationToken) -> RuntimeResult<TaskOutcome> {
        let _guard = self
            .locks
            .try_acquire(req.agent_id)
            .ok_or(RuntimeError::AgentBusy(req.agent_id))?;

        let agent = self.store.get_agent(req.agent_id).await?;
        let (thread, opening_message) = self.resolve_thread(&req, &agent).await?;

        let mut run = AgentRun::new_queued(req.agent_id, thread.id, agent.model.clone(), req.trigger);
        let _cancel_guard = self.run_registry.register(run.id, cancel.clone());
        self.bus
            .publish(Event::RunCreated {
                run_id: run.id.0,
                agent_id: req.agent_id,
                thread_id: thread.id,
                status: RunStatus::Queued,
            })
            .await;

        run.status = RunStatus::Running;
        self.store.start_run(&run, &opening_message).await?;
        self.bus
            .publish(Event::RunUpdated { run_id: run.id.0, agent_id: req.agent_id, status: RunStatus::Running, error: None })
            .await;
        self.bus
            .publish(Event::AgentUpdated {
                agent_id: req.agent_id,
                status: AgentStatus::Running,
                last_run_at: None,
                last_error: None,
            })
            .await;

        let history = vec![
            Message::new(thread.id, MessageRole::System, agent.system_instructions.clone()),
            opening_message.clone(),
        ];

        let outcome = match self.run_model_loop(&thread, &run, history, cancel).await {
            Ok((full_text, summary, total_tokens)) => {
                self.finish_success(&run, summary, total_tokens).await?;
                TaskOutcome { run_id: run.id, status: RunStatus::Success, final_text: Some(full_text) }
            }
            Err(error) => {
                self.finish_failure(&run, error.to_string()).await?;
                TaskOutcome { run_id: run.id, status: RunStatus::Failed, final_text: None }
            }
        };

        Ok(outcome)
    }

    async fn resolve_thread(&self, req: &RunRequest, agent: &Agent) -> RuntimeResult<(Thread, Message)> {
        if req.thread_type == ThreadType::Chat {
            if let Some(thread_id) = req.thread_id {
                let thread = Thread {
                    id: thread_id,
                    agent_id: req.agent_id,
                    thread_type: ThreadType::Chat,
                    created_at: Utc::now(),
                };
                let message = Message::new(
                    thread_id,
                    MessageRole::User,
                    req.task_override.clone().unwrap_or_default(),
                );
                return Ok((thread, message));
            }
        }

        let thread = Thread {
            id: ThreadId::new(),
            agent_id: req.agent_id,
            thread_type: req.thread_type,
            created_at: Utc::now(),
        };
        self.store.create_thread(&thread).await?;

        let system_message = Message::new(thread.id, MessageRole::System, agent.system_instructions.clone());
        self.store.append_message(&system_message).await?;

        let task_text = req
            .task_override
            .clone()
            .unwrap_or_else(|| agent.task_instructions.clone());
        let opening_message = Message::new(thread.id, MessageRole::User, task_text);

        Ok((thread, opening_message))
    }

    async fn run_model_loop(
        &self,
        thread: &Thread,
        run: &AgentRun,
        history: Vec<Message>,
        cancel: CancellationToken,
    ) -> RuntimeResult<(String, String, Option<i64>)> {
        self.bus
            .publish(Event::StreamStart { thread_id: thread.id, run_id: run.id.0 })
            .await;

        let mut stream = self
            .model
            .run(&history, &[])
            .await
            .map_err(RuntimeError::Core)?;

        let mut assistant_text = String::new();

        while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                return Err(RuntimeError::Core(zerg_common::CoreError::ModelRunner("cancelled".to_string())));
            }

            match chunk {
                ModelChunk::AssistantToken { text } => {
                    assistant_text.push_str(&text);
                    self.bus
                        .publish(Event::StreamChunk {
                            thread_id: thread.id,
                            run_id: run.id.0,
                            chunk: StreamChunk::AssistantToken { text },
                        })
                        .await;
                }
                ModelChunk::ToolCall { name, args, call_id } => {
                    let output = match self.tools.get(&name) {
                        Some(tool) => tool.execute(args).await.unwrap_or_else(|e| {
                            serde_json::json!({ "error": e.to_string() })
                        }),
                        None => serde_json::json!({ "error": format!("unknown tool: {name}") }),
                    };

                    let tool_message = Message {
                        tool_call: Some(zerg_common::ToolCallMeta {
                            tool_name: name.clone(),
                            tool_call_id: call_id.clone(),
                        }),
                        ..Message::new(thread.id, MessageRole::Tool, output.to_string())
                    };
                    self.store.append_message(&tool_message).await?;

                    self.bus
                        .publish(Event::StreamChunk {
                            thread_id: thread.id,
                            run_id: run.id.0,
                            chunk: StreamChunk::ToolOutput { tool_name: name, tool_call_id: call_id, output },
                        })
                        .await;
                }
                ModelChunk::End => break,
            }
        }

        let final_message = Message::new(thread.id, MessageRole::Assistant, assistant_text.clone());
        self.store.append_message(&final_message).await?;
        self.bus
            .publish(Event::StreamEnd { thread_id: thread.id, run_id: run.id.0 })
            .await;

        let summary: String = assistant_text.chars().take(SUMMARY_MAX_CHARS).collect();
        Ok((assistant_text, summary, None))
    }

    async fn finish_success(&self, run: &AgentRun, summary: String, total_tokens: Option<i64>) -> RuntimeResult<()> {
        let _ = total_tokens;
        self.store
            .update_run(run.id, RunStatus::Success, None, Some(summary))
            .await?;
        self.bus
            .publish(Event::RunUpdated { run_id: run.id.0, agent_id: run.agent_id, status: RunStatus::Success, error: None })
            .await;

        let now = Utc::now();
        self.store
            .update_agent_status(run.agent_id, AgentStatus::Idle, None, Some(now))
            .await?;
        self.bus
            .publish(Event::AgentUpdated {
                agent_id: run.agent_id,
                status: AgentStatus::Idle,
                last_run_at: Some(now),
                last_error: None,
            })
            .await;
        Ok(())
    }

    async fn finish_failure(&self, run: &AgentRun, error: String) -> RuntimeResult<()> {
        self.store
            .update_run(run.id, RunStatus::Failed, Some(error.clone()), None)
            .await?;
        self.bus
            .publish(Event::RunUpdated { run_id: run.id.0, agent_id: run.agent_id, status: RunStatus::Failed, error: Some(error.clone()) })
            .await;

        self.store
            .update_agent_status(run.agent_id, AgentStatus::Error, Some(error.clone()), None)
            .await?;
        self.bus
            .publish(Event::AgentUpdated {
                agent_id: run.agent_id,
                status: AgentStatus::Error,
                last_run_at: None,
                last_error: Some(error),
            })
            .await;
        Ok(())
    }
}

/// Node-log emission helper, used by the workflow engine to attribute
/// stdout/stderr lines to a node (spec §4.6's `NODE_LOG`).
pub async fn emit_node_log(bus: &EventBus, execution_id: zerg_common::ExecutionId, node_id: &str, stream: LogStream, text: String) {
    bus.publish(Event::NodeLog {
        execution_id,
        node_id: node_id.to_string(),
        stream,
        text,
    })
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_runner::EchoModelRunner;
    use crate::test_support::InMemoryStore;
    use zerg_common::UserId;

    fn fixture_agent(store: &InMemoryStore) -> Agent {
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
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.seed_agent(agent.clone());
        agent
    }

    #[tokio::test]
    async fn happy_path_run_transitions_idle_to_running_to_idle() {
        let store = Arc::new(InMemoryStore::new());
        let agent = fixture_agent(&store);
        let bus = Arc::new(EventBus::new());
        let runner = TaskRunner::new(
            store.clone(),
            bus.clone(),
            AgentLockManager::new(),
            Arc::new(EchoModelRunner),
            ToolRegistry::new(),
        );

        let req = RunRequest {
            agent_id: agent.id,
            thread_id: None,
            thread_type: ThreadType::Manual,
            trigger: RunTrigger::Manual,
            task_override: Some("hello there".to_string()),
        };

        let outcome = runner.dispatch(req, CancellationToken::new()).await.expect("dispatch should succeed");
        assert_eq!(outcome.status, RunStatus::Success);
        assert_eq!(outcome.final_text.as_deref(), Some("hello there "));

        let fetched = store.get_agent(agent.id).await.unwrap();
        assert_eq!(fetched.status, AgentStatus::Idle);
        assert!(fetched.last_run_at.is_some());

        let runs = store.list_runs(agent.id, 10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, outcome.run_id);
        assert_eq!(runs[0].status, RunStatus::Success);
    }

    #[tokio::test]
    async fn concurrent_dispatch_to_same_agent_yields_one_success_and_one_busy() {
        let store = Arc::new(InMemoryStore::new());
        let agent = fixture_agent(&store);
        let bus = Arc::new(EventBus::new());
        let locks = AgentLockManager::new();

        // Hold the lock manually to simulate an in-flight run, then ensure
        // the second dispatch fails fast with AgentBusy rather than queuing.
        let _guard = locks.try_acquire(agent.id).unwrap();

        let runner = TaskRunner::new(
            store.clone(),
            bus.clone(),
            locks,
            Arc::new(EchoModelRunner),
            ToolRegistry::new(),
        );

        let req = RunRequest {
            agent_id: agent.id,
            thread_id: None,
            thread_type: ThreadType::Manual,
            trigger: RunTrigger::Manual,
            task_override: Some("hello".to_string()),
        };

        let result = runner.dispatch(req, CancellationToken::new()).await;
        assert!(matches!(result, Err(RuntimeError::AgentBusy(_))));
    }

    /// Yields a few `AssistantToken` chunks with a small delay between each,
    /// so a concurrently-issued `cancel_run` has a window to land mid-loop.
    struct SlowModelRunner;

    #[async_trait::async_trait]
    impl crate::model_runner::ModelRunner for SlowModelRunner {
        async fn run(
            &self,
            _messages: &[Message],
            _tool_allowlist: &[String],
        ) -> Result<futures::stream::BoxStream<'static, crate::model_runner::ModelChunk>, zerg_common::CoreError> {
            let tokens = futures::stream::unfold(0u32, |i| async move {
                if i >= 5 {
                    return None;
                }
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                Some((crate::model_runner::ModelChunk::AssistantToken { text: format!("tok{i} ") }, i + 1))
            });
            Ok(Box::pin(tokens.chain(futures::stream::once(async { crate::model_runner::ModelChunk::End }))))
        }
    }

    #[tokio::test]
    async fn cancel_run_aborts_an_in_flight_dispatch_with_failed_status() {
        let store = Arc::new(InMemoryStore::new());
        let agent = fixture_agent(&store);
        let bus = Arc::new(EventBus::new());
        let runner = Arc::new(TaskRunner::new(
            store.clone(),
            bus.clone(),
            AgentLockManager::new(),
            Arc::new(SlowModelRunner),
            ToolRegistry::new(),
        ));

        let req = RunRequest {
            agent_id: agent.id,
            thread_id: None,
            thread_type: ThreadType::Manual,
            trigger: RunTrigger::Manual,
            task_override: Some("hello there friend".to_string()),
        };

        let runner_for_dispatch = runner.clone();
        let handle = tokio::spawn(async move { runner_for_dispatch.dispatch(req, CancellationToken::new()).await });

        let run_id = loop {
            if let Some(run) = store.list_runs(agent.id, 10).await.unwrap().into_iter().next() {
                break run.id;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        };
        assert!(runner.cancel_run(run_id));

        let outcome = handle.await.unwrap().expect("dispatch still returns Ok with a failed outcome, not an error");
        assert_eq!(outcome.status, RunStatus::Failed);

        let runs = store.list_runs(agent.id, 10).await.unwrap();
        let fetched_run = runs.iter().find(|r| r.id == run_id).expect("run row must exist");
        assert_eq!(fetched_run.error.as_deref(), Some("model runner failed: cancelled"));
    }

    #[test]
    fn run_cancel_registry_releases_entry_on_guard_drop() {
        let registry = RunCancelRegistry::new();
        let run_id = RunId::new();

        {
            let _guard = registry.register(run_id, CancellationToken::new());
            assert!(registry.cancel(run_id));
        }

        assert!(!registry.cancel(run_id));
    }
}
