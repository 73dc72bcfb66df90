//! Administrative CLI against the hub's HTTP surface (§6). Exit codes follow
//! the wire contract: 0 success, 1 generic error, 2 usage error, 3 connection
//! failure, 4 not found, 5 state conflict.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "exostack-admin", about = "Administrative CLI for the exostack hub")]
struct Cli {
    #[arg(long, env = "EXOSTACK_HUB_URL", default_value = "http://127.0.0.1:7700")]
    hub_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Agents {
        #[command(subcommand)]
        action: AgentsAction,
    },
    Tasks {
        #[command(subcommand)]
        action: TasksAction,
    },
}

#[derive(Subcommand)]
enum AgentsAction {
    List,
}

#[derive(Subcommand)]
enum TasksAction {
    List {
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        status: Option<String>,
    },
    Get {
        task_id: String,
    },
    Cancel {
        task_id: String,
    },
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    kind: String,
    message: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let result = match cli.command {
        Command::Agents { action: AgentsAction::List } => list_agents(&client, &cli.hub_url).await,
        Command::Tasks { action } => match action {
            TasksAction::List { limit, status } => list_tasks(&client, &cli.hub_url, limit, status).await,
            TasksAction::Get { task_id } => get_task(&client, &cli.hub_url, &task_id).await,
            TasksAction::Cancel { task_id } => cancel_task(&client, &cli.hub_url, &task_id).await,
        },
    };

    match result {
        Ok(()) => ExitCode::from(0),
        Err(code) => ExitCode::from(code),
    }
}

async fn list_agents(client: &reqwest::Client, hub_url: &str) -> Result<(), u8> {
    let response = send(client.get(format!("{hub_url}/nodes/status"))).await?;
    print_json(response).await
}

async fn list_tasks(
    client: &reqwest::Client,
    hub_url: &str,
    limit: Option<usize>,
    status: Option<String>,
) -> Result<(), u8> {
    let mut request = client.get(format!("{hub_url}/tasks/status"));
    if let Some(limit) = limit {
        request = request.query(&[("limit", limit.to_string())]);
    }
    if let Some(status) = status {
        request = request.query(&[("status", status)]);
    }
    let response = send(request).await?;
    print_json(response).await
}

async fn get_task(client: &reqwest::Client, hub_url: &str, task_id: &str) -> Result<(), u8> {
    let response = send(client.get(format!("{hub_url}/tasks/{task_id}"))).await?;
    print_json(response).await
}

async fn cancel_task(client: &reqwest::Client, hub_url: &str, task_id: &str) -> Result<(), u8> {
    let response = send(client.delete(format!("{hub_url}/tasks/{task_id}"))).await?;
    print_json(response).await
}

async fn send(request: reqwest::RequestBuilder) -> Result<reqwest::Response, u8> {
    request.send().await.map_err(|e| {
        eprintln!("connection error: {e}");
        3
    })
}

async fn print_json(response: reqwest::Response) -> Result<(), u8> {
    let status = response.status();
    let body = response.text().await.map_err(|_| 1u8)?;

    if status.is_success() {
        println!("{body}");
        return Ok(());
    }

    match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => {
            eprintln!("{}: {}", envelope.error.kind, envelope.error.message);
            Err(exit_code_for_kind(&envelope.error.kind))
        }
        Err(_) => {
            eprintln!("unexpected response ({status}): {body}");
            Err(1)
        }
    }
}

fn exit_code_for_kind(kind: &str) -> u8 {
    match kind {
        "not_found" => 4,
        "state_conflict" => 5,
        "invalid_argument" => 2,
        "unavailable" => 3,
        _ => 1,
    }
}
