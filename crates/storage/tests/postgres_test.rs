use chrono::Utc;
use zerg_common::{Agent, AgentId, AgentStatus, Message, MessageRole, RunTrigger, Thread, ThreadType, UserId};
use zerg_common::AgentRun;
use zerg_storage::{PersistenceStore, PostgresStore};

fn get_test_db_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set (use docker-compose.test.yml)")
}

async fn setup_test_db() -> PostgresStore {
    let store = PostgresStore::new(&get_test_db_url(), 5)
        .await
        .expect("failed to connect to test database");
    store.run_migrations().await.expect("failed to run migrations");
    store
}

fn fixture_agent() -> Agent {
    Agent {
        id: AgentId::new(),
        owner_id: UserId::new(),
        system_instructions: "be helpful".to_string(),
        task_instructions: "summarize the input".to_string(),
        model: "gpt-test".to_string(),
        cron_schedule: None,
        status: AgentStatus::Idle,
        last_error: None,
        last_run_at: None,
        next_run_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

async fn insert_agent(store: &PostgresStore, agent: &Agent) {
    sqlx::query(
        "INSERT INTO agents (id, owner_id, system_instructions, task_instructions, model, \
         cron_schedule, status, last_error, last_run_at, next_run_at, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, 'idle', $7, $8, $9, $10, $11)",
    )
    .bind(agent.id.0)
    .bind(agent.owner_id.0)
    .bind(&agent.system_instructions)
    .bind(&agent.task_instructions)
    .bind(&agent.model)
    .bind(&agent.cron_schedule)
    .bind(&agent.last_error)
    .bind(agent.last_run_at)
    .bind(agent.next_run_at)
    .bind(agent.created_at)
    .bind(agent.updated_at)
    .execute(store.pool())
    .await
    .expect("failed to insert fixture agent");
}

async fn cleanup_agent(store: &PostgresStore, agent_id: AgentId) {
    sqlx::query("DELETE FROM agents WHERE id = $1")
        .bind(agent_id.0)
        .execute(store.pool())
        .await
        .ok();
}

#[tokio::test]
#[ignore]
async fn test_postgres_connection() {
    let store = setup_test_db().await;
    assert!(store.pool().acquire().await.is_ok());
}

#[tokio::test]
#[ignore]
async fn test_get_agent_round_trips() {
    let store = setup_test_db().await;
    let agent = fixture_agent();
    insert_agent(&store, &agent).await;

    let fetched = store.get_agent(agent.id).await.expect("get_agent failed");
    assert_eq!(fetched.id, agent.id);
    assert_eq!(fetched.model, agent.model);

    cleanup_agent(&store, agent.id).await;
}

#[tokio::test]
#[ignore]
async fn test_start_run_is_atomic() {
    let store = setup_test_db().await;
    let agent = fixture_agent();
    insert_agent(&store, &agent).await;

    let thread = Thread {
        id: zerg_common::ThreadId::new(),
        agent_id: agent.id,
        thread_type: ThreadType::Manual,
        created_at: Utc::now(),
    };
    store.create_thread(&thread).await.expect("create_thread failed");

    let run = AgentRun::new_queued(agent.id, thread.id, agent.model.clone(), RunTrigger::Manual);
    let opening = Message::new(thread.id, MessageRole::User, "run me");

    store
        .start_run(&run, &opening)
        .await
        .expect("start_run failed");

    let fetched_agent = store.get_agent(agent.id).await.unwrap();
    assert_eq!(fetched_agent.status, AgentStatus::Running);

    let runs = store.list_runs(agent.id, 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].id, run.id);

    cleanup_agent(&store, agent.id).await;
}

#[tokio::test]
#[ignore]
async fn test_update_run_sets_finished_at_on_terminal_status() {
    let store = setup_test_db().await;
    let agent = fixture_agent();
    insert_agent(&store, &agent).await;

    let thread = Thread {
        id: zerg_common::ThreadId::new(),
        agent_id: agent.id,
        thread_type: ThreadType::Manual,
        created_at: Utc::now(),
    };
    store.create_thread(&thread).await.unwrap();

    let run = AgentRun::new_queued(agent.id, thread.id, agent.model.clone(), RunTrigger::Manual);
    store.create_run(&run).await.unwrap();

    store
        .update_run(run.id, zerg_common::RunStatus::Success, None, Some("done".to_string()))
        .await
        .expect("update_run failed");

    let runs = store.list_runs(agent.id, 10).await.unwrap();
    assert_eq!(runs[0].status, zerg_common::RunStatus::Success);
    assert!(runs[0].finished_at.is_some());

    cleanup_agent(&store, agent.id).await;
}
