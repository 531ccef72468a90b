// Classroom Hub CLI
// Operator tool: inspects the catalog and dashboard feed, publishes tasks and
// plays a student over the socket to validate a running server.

use clap::{Parser, Subcommand};
use colored::*;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use classroom_hub::classroom::{OutboundMessage, ProgressRecord, Task, TestCase};

type WsWrite = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsRead = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

#[derive(Parser)]
#[command(name = "classroom-cli")]
#[command(about = "Classroom Hub CLI", long_about = None)]
struct Cli {
    /// Server address (default: 127.0.0.1:8080)
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Admin user for the task and stats API
    #[arg(short, long, default_value = "admin")]
    user: String,

    /// Admin password for the task and stats API
    #[arg(short, long, default_value = "admin")]
    password: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server health endpoint
    Health,

    /// List the full task catalog (admin)
    Tasks,

    /// Publish or replace a task (admin)
    Publish {
        #[arg(long)]
        id: String,

        #[arg(long)]
        title: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long, default_value = "")]
        starter_code: String,

        /// Assertion script, repeatable
        #[arg(long = "test")]
        tests: Vec<String>,
    },

    /// Print every participant's progress (admin)
    Stats,

    /// Join as a student and print everything the server sends
    Join {
        #[arg(short, long)]
        name: String,
    },

    /// Join, submit a file for a task and wait for the verdict
    Submit {
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        task: String,

        #[arg(short, long)]
        file: std::path::PathBuf,
    },

    /// Run automated validation scenarios
    Validate,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let ok = match &cli.command {
        Commands::Health => check_health(&cli.server).await,
        Commands::Tasks => list_tasks(&cli).await,
        Commands::Publish {
            id,
            title,
            description,
            starter_code,
            tests,
        } => {
            let task = Task {
                id: id.clone(),
                title: title.clone(),
                description: description.clone(),
                starter_code: starter_code.clone(),
                test_cases: tests
                    .iter()
                    .map(|code| TestCase {
                        code: code.clone(),
                        ..Default::default()
                    })
                    .collect(),
            };
            publish_task(&cli, &task).await
        }
        Commands::Stats => show_stats(&cli).await,
        Commands::Join { name } => join(&cli.server, name).await,
        Commands::Submit { name, task, file } => match tokio::fs::read_to_string(file).await {
            Ok(code) => submit(&cli.server, name, task, &code).await,
            Err(e) => {
                println!("{} Cannot read {}: {}", "✗".red(), file.display(), e);
                false
            }
        },
        Commands::Validate => run_all_validations(&cli.server).await,
    };

    if !ok {
        std::process::exit(1);
    }
}

async fn check_health(server: &str) -> bool {
    println!("{}", "Checking server health...".cyan());

    let url = format!("http://{}/health", server);
    match reqwest::get(&url).await {
        Ok(resp) if resp.status().is_success() => {
            println!("{} Health check passed", "✓".green());
            if let Ok(body) = resp.json::<serde_json::Value>().await {
                println!("  Status: {}", body["status"].as_str().unwrap_or("unknown"));
                println!("  Service: {}", body["service"].as_str().unwrap_or("unknown"));
                println!("  Version: {}", body["version"].as_str().unwrap_or("unknown"));
            }
            true
        }
        Ok(resp) => {
            println!("{} Health check failed: {}", "✗".red(), resp.status());
            false
        }
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            println!("  Make sure the server is running on {}", server);
            false
        }
    }
}

async fn list_tasks(cli: &Cli) -> bool {
    let url = format!("http://{}/api/tasks", cli.server);
    let resp = reqwest::Client::new()
        .get(&url)
        .basic_auth(&cli.user, Some(&cli.password))
        .send()
        .await;

    match resp {
        Ok(resp) if resp.status().is_success() => match resp.json::<Vec<Task>>().await {
            Ok(tasks) => {
                println!("{} {} task(s)", "✓".green(), tasks.len());
                for task in tasks {
                    println!(
                        "  [{}] {} ({} test case(s))",
                        task.id.bold(),
                        task.title,
                        task.test_cases.len()
                    );
                }
                true
            }
            Err(e) => {
                println!("{} Unexpected response: {}", "✗".red(), e);
                false
            }
        },
        Ok(resp) => {
            println!("{} Request failed: {}", "✗".red(), resp.status());
            false
        }
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            false
        }
    }
}

async fn publish_task(cli: &Cli, task: &Task) -> bool {
    println!("{} {}", "Publishing task".cyan(), task.id.bold());

    let url = format!("http://{}/api/tasks", cli.server);
    let resp = reqwest::Client::new()
        .post(&url)
        .basic_auth(&cli.user, Some(&cli.password))
        .json(task)
        .send()
        .await;

    match resp {
        Ok(resp) if resp.status().is_success() => {
            let body = resp.json::<serde_json::Value>().await.unwrap_or_default();
            let verb = if body["replaced"] == true { "replaced" } else { "added" };
            println!("{} Task {} {}", "✓".green(), task.id, verb);
            true
        }
        Ok(resp) => {
            println!("{} Publish failed: {}", "✗".red(), resp.status());
            false
        }
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            false
        }
    }
}

async fn show_stats(cli: &Cli) -> bool {
    let url = format!("http://{}/api/stats", cli.server);
    let resp = reqwest::Client::new()
        .get(&url)
        .basic_auth(&cli.user, Some(&cli.password))
        .send()
        .await;

    match resp {
        Ok(resp) if resp.status().is_success() => match resp.json::<Vec<ProgressRecord>>().await {
            Ok(records) => {
                print_stats(&records);
                true
            }
            Err(e) => {
                println!("{} Unexpected response: {}", "✗".red(), e);
                false
            }
        },
        Ok(resp) => {
            println!("{} Request failed: {}", "✗".red(), resp.status());
            false
        }
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            false
        }
    }
}

fn print_stats(records: &[ProgressRecord]) {
    println!("{}", "═".repeat(60).green());
    for record in records {
        let status = format!("{:?}", record.status);
        let status = match record.status {
            classroom_hub::classroom::Status::Solved => status.green(),
            classroom_hub::classroom::Status::Failed => status.red(),
            classroom_hub::classroom::Status::Flagged => status.yellow().bold(),
            _ => status.normal(),
        };
        println!(
            "{:<20} score {:<3} task {:<6} {:<10} {} snapshot(s)",
            record.name.bold(),
            record.total_score,
            record.current_task_id.as_deref().unwrap_or("-"),
            status,
            record.history.len()
        );
        if let Some(paste) = &record.paste_content {
            println!("    {} {}", "pasted:".yellow(), paste.lines().next().unwrap_or(""));
        }
    }
    println!("{}", "═".repeat(60).green());
}

async fn connect(server: &str, name: &str) -> Option<(WsWrite, WsRead)> {
    let url = format!("ws://{}/ws?name={}", server, urlencoding::encode(name));
    match connect_async(&url).await {
        Ok((ws_stream, _)) => Some(ws_stream.split()),
        Err(e) => {
            println!("{} WebSocket connection failed: {}", "✗".red(), e);
            None
        }
    }
}

async fn send(write: &mut WsWrite, kind: &str, payload: &str) -> bool {
    let msg = json!({ "type": kind, "payload": payload });
    if write.send(Message::Text(msg.to_string())).await.is_err() {
        println!("{} Failed to send {} message", "✗".red(), kind);
        return false;
    }
    true
}

/// Next decoded server message, or `None` on close, error or timeout
async fn next_message(read: &mut WsRead, wait: Duration) -> Option<OutboundMessage> {
    loop {
        match timeout(wait, read.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => match OutboundMessage::decode(&text) {
                Ok(message) => return Some(message),
                Err(e) => println!("{} Undecodable message: {}", "✗".yellow(), e),
            },
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                println!("{} Server closed the connection", "✗".yellow());
                return None;
            }
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => {
                println!("{} Connection error: {}", "✗".red(), e);
                return None;
            }
            Err(_) => return None,
        }
    }
}

async fn join(server: &str, name: &str) -> bool {
    println!("{} {}", "Joining as".cyan(), name.bold());
    let Some((_write, mut read)) = connect(server, name).await else {
        return false;
    };
    println!("{} Connected. Press {} to leave.", "✓".green(), "Ctrl+C".bold());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return true,
            message = next_message(&mut read, Duration::from_secs(3600)) => match message {
                Some(OutboundMessage::TaskList(tasks)) => {
                    println!("{} task_list", "◀".green());
                    for task in tasks {
                        println!("    [{}] {}", task.id.bold(), task.title);
                    }
                }
                Some(OutboundMessage::UserStats(record)) => {
                    println!("{} user_stats: score {} status {:?}", "◀".green(), record.total_score, record.status);
                }
                Some(OutboundMessage::GlobalStats(records)) => {
                    println!("{} global_stats", "◀".green());
                    print_stats(&records);
                }
                Some(OutboundMessage::TestResult(result)) => print_result(&result),
                None => return false,
            }
        }
    }
}

fn print_result(result: &classroom_hub::classroom::TestResult) {
    if result.success {
        println!("{} Task {} passed ({} test(s))", "✓".green(), result.task_id, result.passed);
    } else {
        println!("{} Task {} failed", "✗".red(), result.task_id);
    }
    for line in result.output.lines() {
        println!("    {}", line.bright_white());
    }
}

async fn submit(server: &str, name: &str, task_id: &str, code: &str) -> bool {
    println!("{} task {} as {}", "Submitting".cyan(), task_id.bold(), name.bold());
    let Some((mut write, mut read)) = connect(server, name).await else {
        return false;
    };

    if !send(&mut write, "select_task", task_id).await || !send(&mut write, "submit", code).await {
        return false;
    }

    while let Some(message) = next_message(&mut read, Duration::from_secs(60)).await {
        if let OutboundMessage::TestResult(result) = message {
            print_result(&result);
            let _ = write.send(Message::Close(None)).await;
            return result.success;
        }
    }

    println!("{} No verdict received (unknown task or evaluator timeout)", "✗".red());
    false
}

async fn run_all_validations(server: &str) -> bool {
    println!("{}", "Running validation scenarios...".cyan().bold());

    let results = vec![
        ("health", check_health(server).await),
        ("registration", validate_registration(server).await),
        ("cheat flag", validate_cheat_flag(server).await),
    ];

    println!("\n{}", "Summary".bold());
    let mut all_passed = true;
    for (name, passed) in results {
        if passed {
            println!("  {} {}", "✓".green(), name);
        } else {
            println!("  {} {}", "✗".red(), name);
            all_passed = false;
        }
    }
    all_passed
}

async fn validate_registration(server: &str) -> bool {
    let name = "cli-validate-registration";
    let Some((_write, mut read)) = connect(server, name).await else {
        return false;
    };

    let tasks_ok = match next_message(&mut read, Duration::from_secs(5)).await {
        Some(OutboundMessage::TaskList(tasks)) => !tasks.is_empty(),
        _ => false,
    };
    let stats_ok = match next_message(&mut read, Duration::from_secs(5)).await {
        Some(OutboundMessage::UserStats(record)) => record.id == name,
        _ => false,
    };
    tasks_ok && stats_ok
}

async fn validate_cheat_flag(server: &str) -> bool {
    let name = "cli-validate-flag";
    let Some((mut write, mut read)) = connect(server, name).await else {
        return false;
    };

    if !send(&mut write, "cheat_warning", "validation paste").await {
        return false;
    }
    let flagged = wait_for_status(&mut read, name, classroom_hub::classroom::Status::Flagged).await;

    if !send(&mut write, "select_task", "1").await {
        return false;
    }
    let cleared = wait_for_status(&mut read, name, classroom_hub::classroom::Status::Idle).await;
    flagged && cleared
}

async fn wait_for_status(read: &mut WsRead, name: &str, status: classroom_hub::classroom::Status) -> bool {
    while let Some(message) = next_message(read, Duration::from_secs(5)).await {
        if let OutboundMessage::GlobalStats(records) = message {
            if records.iter().any(|r| r.id == name && r.status == status) {
                return true;
            }
        }
    }
    false
}
