//! One-shot operator actions dispatched straight to the REST API, each a
//! single request/response round trip.

use anyhow::Result;
use uuid::Uuid;

use crate::api_client::ApiClient;

pub async fn execute_task(base_url: &str, agent_id: Uuid, task: Option<String>) -> Result<()> {
    let client = ApiClient::new(base_url);
    let response = client.dispatch_task(agent_id, task).await?;
    println!("run {} dispatched, status={}", response.run_id, response.status);
    Ok(())
}

pub async fn send_message(base_url: &str, thread_id: Uuid, content: String) -> Result<()> {
    let client = ApiClient::new(base_url);
    let response = client.post_message(thread_id, content).await?;
    println!("run {} dispatched, status={}", response.run_id, response.status);
    Ok(())
}

pub async fn list_runs(base_url: &str, agent_id: Uuid, limit: i64) -> Result<()> {
    let client = ApiClient::new(base_url);
    let response = client.list_runs(agent_id, limit).await?;
    if response.runs.is_empty() {
        println!("no runs recorded for agent {agent_id}");
    }
    for run in response.runs {
        println!(
            "{}  {:<10} trigger={:<8} started={} finished={}",
            run.run_id,
            run.status,
            run.trigger,
            run.started_at,
            run.finished_at.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

pub async fn start_workflow(base_url: &str, execution_id: Uuid) -> Result<()> {
    let client = ApiClient::new(base_url);
    let response = client.start_execution(execution_id).await?;
    println!("execution {} status={}", response.execution_id, response.status);
    Ok(())
}

pub async fn cancel_workflow(base_url: &str, execution_id: Uuid) -> Result<()> {
    let client = ApiClient::new(base_url);
    let response = client.cancel_execution(execution_id).await?;
    println!("execution {} status={}", response.execution_id, response.status);
    Ok(())
}
