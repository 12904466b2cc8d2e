//! Cron-driven agent firing (spec §4.7, C7).
//!
//! A single cooperative loop polls for due jobs rather than spawning one
//! timer task per agent — this keeps the scheduler's state (the `jobs` map)
//! single-threaded-simple while `cron::Schedule` does the actual
//! next-occurrence arithmetic, the same division of labor the `cron` crate
//! is built for.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, instrument, warn};
use zerg_common::{AgentId, CoreError, RunTrigger, ThreadType};
use zerg_storage::PersistenceStore;

use crate::error::{RuntimeError, RuntimeResult};
use crate::task_runner::{RunRequest, TaskRunner};

struct Job {
    schedule: Schedule,
    next_fire: DateTime<Utc>,
}

pub struct Scheduler {
    store: Arc<dyn PersistenceStore>,
    task_runner: Arc<TaskRunner>,
    jobs: RwLock<HashMap<AgentId, Job>>,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(store: Arc<dyn PersistenceStore>, task_runner: Arc<TaskRunner>, poll_interval: Duration) -> Self {
        Self { store, task_runner, jobs: RwLock::new(HashMap::new()), poll_interval }
    }

    /// Enumerates all agents with a non-null schedule and registers their
    /// jobs. Called once at process startup.
    pub async fn bootstrap(&self) -> RuntimeResult<()> {
        for agent in self.store.list_scheduled_agents().await? {
            let Some(expr) = agent.cron_schedule.clone() else { continue };
            if let Err(e) = self.register(agent.id, &expr).await {
                warn!(agent_id = %agent.id, error = %e, "failed to register scheduled agent at startup");
            }
        }
        Ok(())
    }

    /// (Re)registers the job for `agent_id` under the given cron expression
    /// and writes the computed `next_run_at` to the agent row. Cron syntax
    /// is validated at the REST write boundary (spec §4.7); a parse failure
    /// here indicates stale or hand-edited data, not a client error.
    #[instrument(skip(self))]
    pub async fn register(&self, agent_id: AgentId, cron_expr: &str) -> RuntimeResult<()> {
        let schedule: Schedule = cron_expr
            .parse()
            .map_err(|e: cron::error::Error| RuntimeError::Core(CoreError::Config(e.to_string())))?;
        let next_fire = schedule
            .upcoming(Utc)
            .next()
            .ok_or_else(|| RuntimeError::Core(CoreError::Config("cron schedule has no upcoming occurrences".to_string())))?;

        self.jobs.write().await.insert(agent_id, Job { schedule, next_fire });
        self.store.update_agent_next_run_at(agent_id, Some(next_fire)).await?;
        Ok(())
    }

    /// Removes the job for `agent_id`, e.g. on agent delete or schedule
    /// clear. A no-op if no job was registered.
    pub async fn unregister(&self, agent_id: AgentId) -> RuntimeResult<()> {
        self.jobs.write().await.remove(&agent_id);
        self.store.update_agent_next_run_at(agent_id, None).await?;
        Ok(())
    }

    /// The scheduler's single cooperative loop. Runs until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.fire_due_jobs().await,
            }
        }
    }

    async fn fire_due_jobs(&self) {
        let now = Utc::now();
        let due: Vec<AgentId> = {
            let jobs = self.jobs.read().await;
            jobs.iter().filter(|(_, job)| job.next_fire <= now).map(|(id, _)| *id).collect()
        };
        for agent_id in due {
            self.fire(agent_id, now).await;
        }
    }

    /// Advances the job's `next_fire` and dispatches the Task Runner.
    /// Dispatch is fire-and-forget (`tokio::spawn`) so a slow run never
    /// delays the next poll tick.
    async fn fire(&self, agent_id: AgentId, now: DateTime<Utc>) {
        let next_fire = {
            let mut jobs = self.jobs.write().await;
            match jobs.get_mut(&agent_id) {
                Some(job) => {
                    let next = job.schedule.after(&now).next();
                    if let Some(next) = next {
                        job.next_fire = next;
                    }
                    next
                }
                None => return,
            }
        };

        if let Err(e) = self.store.update_agent_next_run_at(agent_id, next_fire).await {
            error!(agent_id = %agent_id, error = %e, "failed to persist next_run_at");
        }

        let req = RunRequest {
            agent_id,
            thread_id: None,
            thread_type: ThreadType::Schedule,
            trigger: RunTrigger::Schedule,
            task_override: None,
        };
        let task_runner = self.task_runner.clone();
        tokio::spawn(async move {
            match task_runner.dispatch(req, CancellationToken::new()).await {
                Ok(_) => {}
                Err(RuntimeError::AgentBusy(id)) => {
                    warn!(agent_id = %id, "scheduled fire skipped: agent busy (overrun = skip, not queue)");
                }
                Err(e) => error!(agent_id = %agent_id, error = %e, "scheduled run failed"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::lock::AgentLockManager;
    use crate::model_runner::EchoModelRunner;
    use crate::test_support::InMemoryStore;
    use crate::tools::ToolRegistry;
    use zerg_common::{Agent, AgentStatus, UserId};

    fn fixture_agent(store: &InMemoryStore, cron_schedule: Option<String>) -> Agent {
        let agent = Agent {
            id: AgentId::new(),
            owner_id: UserId::new(),
            system_instructions: "be terse".to_string(),
            task_instructions: "say hi".to_string(),
            model: "echo".to_string(),
            cron_schedule,
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

    fn scheduler_with(store: Arc<InMemoryStore>) -> Scheduler {
        let bus = Arc::new(EventBus::new());
        let task_runner = Arc::new(TaskRunner::new(
            store.clone(),
            bus,
            AgentLockManager::new(),
            Arc::new(EchoModelRunner),
            ToolRegistry::new(),
        ));
        Scheduler::new(store, task_runner, Duration::from_millis(50))
    }

    #[tokio::test]
    async fn register_computes_and_persists_next_run_at() {
        let store = Arc::new(InMemoryStore::new());
        let agent = fixture_agent(&store, None);
        let scheduler = scheduler_with(store.clone());

        scheduler.register(agent.id, "* * * * * * *").await.expect("every-second schedule should register");

        let fetched = store.get_agent(agent.id).await.unwrap();
        assert!(fetched.next_run_at.is_some());
    }

    #[tokio::test]
    async fn unregister_clears_next_run_at() {
        let store = Arc::new(InMemoryStore::new());
        let agent = fixture_agent(&store, None);
        let scheduler = scheduler_with(store.clone());

        scheduler.register(agent.id, "* * * * * * *").await.unwrap();
        scheduler.unregister(agent.id).await.unwrap();

        let fetched = store.get_agent(agent.id).await.unwrap();
        assert!(fetched.next_run_at.is_none());
    }

    #[tokio::test]
    async fn invalid_cron_expression_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let agent = fixture_agent(&store, None);
        let scheduler = scheduler_with(store.clone());

        let result = scheduler.register(agent.id, "not a cron expression").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn bootstrap_registers_every_agent_with_a_schedule() {
        let store = Arc::new(InMemoryStore::new());
        fixture_agent(&store, Some("* * * * * * *".to_string()));
        fixture_agent(&store, None);
        let scheduler = scheduler_with(store.clone());

        scheduler.bootstrap().await.unwrap();

        assert_eq!(scheduler.jobs.read().await.len(), 1);
    }

    #[tokio::test]
    async fn due_job_fires_the_task_runner_and_reschedules() {
        let store = Arc::new(InMemoryStore::new());
        let agent = fixture_agent(&store, None);
        let scheduler = scheduler_with(store.clone());
        scheduler.register(agent.id, "* * * * * * *").await.unwrap();

        let past_due = Utc::now() + chrono::Duration::seconds(2);
        scheduler.fire(agent.id, past_due).await;

        // Dispatch is fire-and-forget; give the spawned task a moment to run.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let runs = store.list_runs(agent.id, 10).await.unwrap();
        assert_eq!(runs.len(), 1);

        let jobs = scheduler.jobs.read().await;
        assert!(jobs.get(&agent.id).unwrap().next_fire > past_due);
    }
}
