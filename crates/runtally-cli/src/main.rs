//! runtally - run shell commands as tasks and tally their outcomes.

use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::info;
use tracing_subscriber::EnvFilter;

use runtally_console::ConsoleUi;
use runtally_core::{RunTally, TallyError, TaskHandle, TaskId, TraceCollector};
use runtally_trace::{ChromeTracer, FsProfileCopier};

/// Run commands as tasks and tally their outcomes
#[derive(Parser)]
#[command(name = "runtally")]
#[command(about = "Run commands as tasks and tally their outcomes", long_about = None)]
struct Cli {
    /// Commands to execute, each as its own task
    #[arg(required = true)]
    commands: Vec<String>,

    /// Maximum number of tasks running at once
    #[arg(short, long, default_value_t = 4)]
    jobs: usize,

    /// Write a chrome-trace profile to this file
    #[arg(long)]
    profile: Option<String>,

    /// Print the run report as JSON after the summary
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let tracer = cli
        .profile
        .as_ref()
        .map(|_| Arc::new(ChromeTracer::new()) as Arc<dyn TraceCollector>);
    let tally = RunTally::new(Utc::now(), cli.profile.clone(), tracer);

    info!(tasks = cli.commands.len(), jobs = cli.jobs, "starting run");

    let semaphore = Arc::new(Semaphore::new(cli.jobs.max(1)));
    let mut workers = JoinSet::new();

    for (index, command) in cli.commands.iter().enumerate() {
        let handle = tally.begin(TaskId::new(format!("cmd-{index}")))?;
        let semaphore = Arc::clone(&semaphore);
        let command = command.clone();
        workers.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            run_task(handle, &command).await
        });
    }

    while let Some(joined) = workers.join_next().await {
        joined??;
    }

    let mut terminal = ConsoleUi::new();
    tally.finish(&mut terminal, &FsProfileCopier)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&tally.report())?);
    }

    let failed = tally.totals().failed;
    if failed > 0 {
        return Err(format!("{failed} task(s) failed").into());
    }
    Ok(())
}

/// Execute one command and report its outcome through the handle.
async fn run_task(mut handle: TaskHandle, command: &str) -> Result<(), TallyError> {
    info!(task = %handle.id(), command, "running");

    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => handle.built(),
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = match stderr.trim() {
                "" => format!("command failed: {command}"),
                stderr => stderr.to_string(),
            };
            handle.failed(detail, output.status.code())
        }
        Err(err) => handle.failed(format!("failed to spawn: {err}"), None),
    }
}
