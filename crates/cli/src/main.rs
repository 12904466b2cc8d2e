use clap::{CommandFactory, Parser, Subcommand};
use uuid::Uuid;
use zerg_cli::{completions, interactive, oneshot, stream};

#[derive(Parser)]
#[command(name = "zerg")]
#[command(about = "Operator CLI for the zerg agent automation platform")]
struct Cli {
    /// Base URL of the zerg-api REST server
    #[arg(long, global = true, default_value = "http://localhost:8080")]
    base_url: String,

    /// WebSocket hub URL, used only by `stream`
    #[arg(long, global = true, default_value = "ws://localhost:8080/ws")]
    ws_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch a one-off manual task to an agent
    Execute {
        agent_id: Uuid,
        /// Task text overriding the agent's default system task, if any
        task: Option<String>,
    },
    /// Post a message to an existing chat thread
    Message { thread_id: Uuid, content: String },
    /// List an agent's recent runs
    Runs {
        agent_id: Uuid,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Control a workflow execution
    #[command(subcommand)]
    Workflow(WorkflowCommands),
    /// Tail the WebSocket hub for a topic
    Stream {
        /// HS256 JWT for the websocket handshake
        #[arg(long)]
        token: String,
        /// Topic to subscribe to, e.g. `agent:<id>` or `execution:<id>`
        #[arg(long)]
        topic: String,
    },
    /// Open an interactive REPL against one agent
    Interactive { agent_id: Uuid },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum WorkflowCommands {
    /// Start a previously-created workflow execution
    Start { execution_id: Uuid },
    /// Request cancellation of a running execution
    Cancel { execution_id: Uuid },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Execute { agent_id, task } => oneshot::execute_task(&cli.base_url, agent_id, task).await?,
        Commands::Message { thread_id, content } => oneshot::send_message(&cli.base_url, thread_id, content).await?,
        Commands::Runs { agent_id, limit } => oneshot::list_runs(&cli.base_url, agent_id, limit).await?,
        Commands::Workflow(WorkflowCommands::Start { execution_id }) => {
            oneshot::start_workflow(&cli.base_url, execution_id).await?
        }
        Commands::Workflow(WorkflowCommands::Cancel { execution_id }) => {
            oneshot::cancel_workflow(&cli.base_url, execution_id).await?
        }
        Commands::Stream { token, topic } => stream::tail(&cli.ws_url, &token, &topic).await?,
        Commands::Interactive { agent_id } => interactive::run(&cli.base_url, agent_id).await?,
        Commands::Completions { shell } => completions::generate(Cli::command(), shell),
    }

    Ok(())
}
