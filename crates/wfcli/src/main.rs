// crates/wfcli/src/main.rs

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use wfcore::HistoryEvent;
use wfruntime::{
    ActivityRegistry, DurableRuntime, OrchestratorRegistry, RetryPolicy, RuntimeConfig,
    RuntimeStatus, TurnExecutor, TurnOutcome,
};

#[derive(Parser)]
#[command(name = "wf")]
#[command(about = "Employee onboarding workflow runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow instance to completion in-process
    Run {
        /// Registered workflow name
        #[arg(short, long, default_value = wfactivities::EMPLOYEE_ONBOARDING_WORKFLOW)]
        workflow: String,

        /// Input data as JSON string
        #[arg(short, long)]
        input: Option<String>,

        /// Record activity history in the result
        #[arg(short, long)]
        debug: bool,

        /// Simulated work per activity, in milliseconds
        #[arg(long, default_value_t = 2000)]
        delay_ms: u64,

        /// Per-attempt activity deadline, in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Attempts per activity before it is reported as failed
        #[arg(long, default_value_t = 1)]
        max_attempts: u32,

        /// Write the recorded history to this file
        #[arg(long)]
        save_history: Option<PathBuf>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// List registered activities and workflows
    Activities,

    /// Replay a saved history and print the reproduced outcome
    Replay {
        /// Path to a history JSON file written by `run --save-history`
        file: PathBuf,

        /// Replay with activity history recording on
        #[arg(short, long)]
        debug: bool,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

fn registries(debug: bool, delay: Duration) -> (ActivityRegistry, OrchestratorRegistry) {
    let mut activities = ActivityRegistry::new();
    wfactivities::register_all(&mut activities, delay);

    let mut orchestrators = OrchestratorRegistry::new();
    wfactivities::register_workflows(&mut orchestrators, debug);

    (activities, orchestrators)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            workflow,
            input,
            debug,
            delay_ms,
            timeout_ms,
            max_attempts,
            save_history,
            verbose,
        } => {
            init_logging(verbose);

            let mut config = RuntimeConfig::default();
            if let Some(ms) = timeout_ms {
                config = config.with_activity_timeout(Duration::from_millis(ms));
            }
            if max_attempts > 1 {
                config = config.with_retry_policy(RetryPolicy {
                    max_attempts,
                    ..RetryPolicy::default()
                });
            }

            let options = RunOptions {
                debug,
                delay: Duration::from_millis(delay_ms),
                config,
                save_history,
            };
            run_workflow(&workflow, input, options).await?;
        }

        Commands::Activities => {
            list_activities();
        }

        Commands::Replay { file, debug } => {
            init_logging(false);
            replay_history(file, debug)?;
        }
    }

    Ok(())
}

struct RunOptions {
    debug: bool,
    delay: Duration,
    config: RuntimeConfig,
    save_history: Option<PathBuf>,
}

async fn run_workflow(workflow: &str, input: Option<String>, options: RunOptions) -> Result<()> {
    let input: Value = match input {
        Some(input_str) => serde_json::from_str(&input_str).context("Input must be valid JSON")?,
        None => Value::Object(Default::default()),
    };

    let (activities, orchestrators) = registries(options.debug, options.delay);
    let runtime = DurableRuntime::with_config(activities, orchestrators, options.config);

    println!("Starting workflow: {}", workflow);
    let instance_id = runtime.start_instance(workflow, None, input).await?;
    println!("   Instance: {}", instance_id);

    let status = runtime
        .wait_for_completion(&instance_id, Duration::from_secs(600))
        .await?;
    let history = runtime.history(&instance_id).await?;
    runtime.shutdown();

    println!();
    println!("Execution Summary:");
    println!("   Status: {:?}", status.status);
    println!("   History events: {}", history.len());

    if let Some(path) = options.save_history {
        std::fs::write(&path, serde_json::to_string_pretty(&history)?)?;
        println!("   History saved to: {}", path.display());
    }

    match status.status {
        RuntimeStatus::Completed => {
            let output = status.output.unwrap_or(Value::Null);
            println!();
            println!("Result:");
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        _ => Err(anyhow!(
            "Instance {} failed: {}",
            instance_id,
            status.error.unwrap_or_default()
        )),
    }
}

fn list_activities() {
    let (activities, orchestrators) = registries(false, wfactivities::DEFAULT_ACTIVITY_DELAY);

    println!("Available Activities:");
    for name in activities.list_activities() {
        match activities.get_metadata(&name) {
            Some(metadata) if !metadata.description.is_empty() => {
                println!("  • {}", name);
                println!("    {}", metadata.description);
            }
            _ => println!("  • {}", name),
        }
    }

    println!();
    println!("Available Workflows:");
    for name in orchestrators.list_workflows() {
        println!("  • {}", name);
    }
}

fn replay_history(file: PathBuf, debug: bool) -> Result<()> {
    let history_json = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let history: Vec<HistoryEvent> = serde_json::from_str(&history_json)?;

    let workflow = match history.first() {
        Some(HistoryEvent::ExecutionStarted { name, .. }) => name.clone(),
        _ => return Err(anyhow!("History must begin with ExecutionStarted")),
    };

    let (_, orchestrators) = registries(debug, wfactivities::DEFAULT_ACTIVITY_DELAY);
    let orchestrator = orchestrators
        .get(&workflow)
        .ok_or_else(|| anyhow!("Unknown workflow: {}", workflow))?;

    println!("Replaying {} events of {}", history.len(), workflow);
    match TurnExecutor::replay(orchestrator.as_ref(), "replay", &history) {
        TurnOutcome::Completed(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            let recorded = history.iter().rev().find_map(|e| match e {
                HistoryEvent::ExecutionCompleted { output } => Some(output),
                _ => None,
            });
            match recorded {
                Some(recorded) if recorded == &output => println!("Replay matches recorded output"),
                Some(_) => return Err(anyhow!("Replay diverged from recorded output")),
                None => println!("History has no recorded output to compare"),
            }
        }
        TurnOutcome::Pending => println!("Instance is still waiting on outstanding tasks"),
        TurnOutcome::ContinuedAsNew(input) => {
            println!("Instance continued as new with input: {}", input)
        }
        TurnOutcome::Failed(err) => return Err(anyhow!("Replay failed: {}", err)),
    }

    Ok(())
}
