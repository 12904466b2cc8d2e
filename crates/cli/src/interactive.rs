//! Interactive mode: a `rustyline` REPL that dispatches each line as a
//! manual task against one agent, grounded on the teacher's
//! `DefaultEditor` loop shape.

use anyhow::Result;
use rustyline::DefaultEditor;
use uuid::Uuid;

use crate::api_client::ApiClient;

pub async fn run(base_url: &str, agent_id: Uuid) -> Result<()> {
    let client = ApiClient::new(base_url);
    let mut rl = DefaultEditor::new()?;

    println!("zerg operator console — agent {agent_id}");
    println!("type a task and press enter, or 'exit' to quit");

    loop {
        let readline = rl.readline("zerg> ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "exit" {
                    break;
                }
                let _ = rl.add_history_entry(line);
                match client.dispatch_task(agent_id, Some(line.to_string())).await {
                    Ok(response) => println!("run {} dispatched, status={}", response.run_id, response.status),
                    Err(e) => eprintln!("dispatch failed: {e}"),
                }
            }
            Err(_) => break,
        }
    }

    Ok(())
}
