//! Thin `reqwest` wrapper over `zerg-api`'s REST surface. Response DTOs are
//! defined locally rather than imported from `zerg-api` — the CLI only
//! needs a handful of fields off each response, not the server's full
//! request/response type graph.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct TaskRequest {
    task: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct TaskResponse {
    pub run_id: Uuid,
    pub status: String,
}

#[derive(Serialize)]
struct ThreadMessageRequest {
    content: String,
}

#[derive(Deserialize, Debug)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: String,
    pub trigger: String,
    pub started_at: String,
    pub finished_at: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct RunListResponse {
    pub runs: Vec<RunSummary>,
}

#[derive(Deserialize, Debug)]
pub struct ExecutionResponse {
    pub execution_id: Uuid,
    pub status: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self { base_url: base_url.trim_end_matches('/').to_string(), client: reqwest::Client::new() }
    }

    pub async fn dispatch_task(&self, agent_id: Uuid, task: Option<String>) -> Result<TaskResponse> {
        let url = format!("{}/agents/{}/task", self.base_url, agent_id);
        let response = self.client.post(&url).json(&TaskRequest { task }).send().await?;
        check_status(&response)?;
        Ok(response.json().await?)
    }

    pub async fn post_message(&self, thread_id: Uuid, content: String) -> Result<TaskResponse> {
        let url = format!("{}/threads/{}/messages", self.base_url, thread_id);
        let response = self.client.post(&url).json(&ThreadMessageRequest { content }).send().await?;
        check_status(&response)?;
        Ok(response.json().await?)
    }

    pub async fn list_runs(&self, agent_id: Uuid, limit: i64) -> Result<RunListResponse> {
        let url = format!("{}/agents/{}/runs", self.base_url, agent_id);
        let response = self.client.get(&url).query(&[("limit", limit)]).send().await?;
        check_status(&response)?;
        Ok(response.json().await?)
    }

    pub async fn start_execution(&self, execution_id: Uuid) -> Result<ExecutionResponse> {
        let url = format!("{}/workflow-executions/{}/start", self.base_url, execution_id);
        let response = self.client.post(&url).send().await?;
        check_status(&response)?;
        Ok(response.json().await?)
    }

    pub async fn cancel_execution(&self, execution_id: Uuid) -> Result<ExecutionResponse> {
        let url = format!("{}/workflow-executions/{}/cancel", self.base_url, execution_id);
        let response = self.client.post(&url).send().await?;
        check_status(&response)?;
        Ok(response.json().await?)
    }
}

fn check_status(response: &reqwest::Response) -> Result<()> {
    if !response.status().is_success() {
        anyhow::bail!("API request failed: {}", response.status());
    }
    Ok(())
}
