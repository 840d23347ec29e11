//! prdloop - PRD-driven agent loop
//!
//! Autonomous task execution: each iteration dispatches the next eligible
//! task to an agent CLI and admits it only when the quality gate passes.

use clap::{Parser, Subcommand};
use colored::Colorize;
use prdloop::{
    Backend, CommandGate, Dispatcher, ExecutionMode, FileLedger, GitCommitter, LoopRunner, Prd,
    PrdError, ProgressLog, ProjectConfig, RunOutcome, Task, TaskStore,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "prdloop")]
#[command(version = "0.1.0")]
#[command(about = "PRD-driven agent loop with quality gating", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the loop to completion or the iteration ceiling
    Run {
        /// Agent backend to dispatch to
        #[arg(short, long, value_enum, default_value = "claude")]
        backend: Backend,

        /// Fan out to every available backend and aggregate
        #[arg(long)]
        consensus: bool,

        /// Override the iteration ceiling stored in the ledger
        #[arg(short, long)]
        max_iterations: Option<u32>,

        /// Override the inter-iteration sleep in seconds
        #[arg(long)]
        sleep_secs: Option<u64>,
    },

    /// Show a read-only ledger summary
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a new PRD ledger
    Init {
        /// Project name
        #[arg(long)]
        name: String,

        /// Project description
        #[arg(long)]
        description: String,

        /// JSON file with the initial task list
        #[arg(long)]
        tasks_file: Option<PathBuf>,

        /// Iteration ceiling
        #[arg(long, default_value = "100")]
        max_iterations: u32,
    },

    /// Print the next eligible task as JSON
    Next,

    /// Print the consensus decision prompt for the next eligible task
    ConsensusPrompt,

    /// Record a learning in the ledger and progress log
    Learn {
        /// Learning message
        message: String,
    },

    /// Report whether the loop should continue (exit 0) or stop (exit 1)
    Check,
}

/// Task entry accepted by `init --tasks-file`.
#[derive(Deserialize)]
struct TaskSpec {
    #[serde(default)]
    id: Option<u64>,
    description: String,
    #[serde(default)]
    success_criteria: String,
    #[serde(default)]
    files_to_modify: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "prdloop=debug,info"
    } else {
        "prdloop=info,warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Resolve project path
    let project_path = cli.project.canonicalize().unwrap_or(cli.project.clone());

    if !project_path.exists() {
        eprintln!(
            "{} Project directory does not exist: {}",
            "Error:".red().bold(),
            project_path.display()
        );
        std::process::exit(1);
    }

    let config = match ProjectConfig::load(&project_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(PrdError::config(e.to_string()).exit_code());
        }
    };

    match cli.command {
        Commands::Run {
            backend,
            consensus,
            max_iterations,
            sleep_secs,
        } => {
            if let Err(e) = run_loop(
                &project_path,
                &config,
                backend,
                consensus,
                max_iterations,
                sleep_secs,
            )
            .await
            {
                report_error(&e, &config);
                std::process::exit(e.exit_code());
            }
        }

        Commands::Status { json } => {
            let ledger = load_ledger(&project_path, &config);
            print_status(&ledger.snapshot(), json);
        }

        Commands::Init {
            name,
            description,
            tasks_file,
            max_iterations,
        } => {
            let tasks = match tasks_file {
                Some(path) => match load_tasks(&path) {
                    Ok(tasks) => tasks,
                    Err(e) => {
                        eprintln!("{} {}", "Error:".red().bold(), e);
                        std::process::exit(e.exit_code());
                    }
                },
                None => Vec::new(),
            };

            let mut prd = Prd::new(name, description, tasks);
            prd.max_iterations = max_iterations;
            let prd_path = config.prd_file(&project_path);
            match FileLedger::create(&prd_path, prd) {
                Ok(ledger) => {
                    println!(
                        "{} Created PRD: {}",
                        "OK".green().bold(),
                        ledger.path().display()
                    );
                    println!("{}", serde_json::to_string_pretty(&ledger.snapshot())?);
                }
                Err(e) => {
                    report_error(&e, &config);
                    std::process::exit(e.exit_code());
                }
            }
        }

        Commands::Next => {
            let ledger = load_ledger(&project_path, &config);
            match ledger.fetch_next() {
                Some(task) => println!("{}", serde_json::to_string_pretty(&task)?),
                None => {
                    println!("No pending tasks");
                    std::process::exit(1);
                }
            }
        }

        Commands::ConsensusPrompt => {
            let ledger = load_ledger(&project_path, &config);
            let prd = ledger.snapshot();
            match prd.next_task() {
                Some(task) => println!("{}", prdloop::prompt::consensus_prompt(&prd, task)),
                None => {
                    println!("No pending tasks");
                    std::process::exit(1);
                }
            }
        }

        Commands::Learn { message } => {
            let mut ledger = load_ledger(&project_path, &config);
            let iteration = ledger.snapshot().iteration;
            if let Err(e) = ledger.record_learning(&message) {
                report_error(&e, &config);
                std::process::exit(e.exit_code());
            }
            let progress = ProgressLog::new(config.progress_file(&project_path));
            if let Err(e) = progress.append_learning(iteration, &message) {
                report_error(&e, &config);
                std::process::exit(e.exit_code());
            }
            println!("Learning recorded: {message}");
        }

        Commands::Check => {
            let ledger = load_ledger(&project_path, &config);
            if ledger.should_continue() {
                println!("continue");
            } else {
                println!("stop");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

async fn run_loop(
    project_path: &Path,
    config: &ProjectConfig,
    backend: Backend,
    consensus: bool,
    max_iterations: Option<u32>,
    sleep_secs: Option<u64>,
) -> Result<(), PrdError> {
    let mut ledger = FileLedger::load(config.prd_file(project_path))?;
    if let Some(max) = max_iterations {
        ledger.set_max_iterations(max)?;
    }

    let mode = if consensus {
        ExecutionMode::Consensus
    } else {
        ExecutionMode::Single
    };
    let dispatcher = Dispatcher::new(backend, mode, project_path)?;
    let gate = CommandGate::new(&config.gate.command, project_path, config.gate.fail_open);
    let committer = GitCommitter::new(project_path);
    let progress = ProgressLog::new(config.progress_file(project_path));
    let sleep = Duration::from_secs(sleep_secs.unwrap_or(config.sleep_secs));

    let mut runner = LoopRunner::new(
        Box::new(ledger),
        Box::new(dispatcher),
        Box::new(gate),
        Box::new(committer),
        progress,
    )
    .with_sleep(sleep)
    .with_max_task_attempts(config.max_task_attempts)
    .with_commit_on_done(!config.no_commit);

    match runner.run().await? {
        RunOutcome::AllPassed => {
            println!("{} All tasks complete", "OK".green().bold());
        }
        RunOutcome::NoEligibleTasks => {
            println!(
                "{} No more tasks to work on (check `prdloop status` for failures)",
                "OK".green().bold()
            );
        }
    }
    Ok(())
}

/// Load the ledger or exit with the error's code. Used by the read-only
/// commands where a missing ledger is a terminal condition.
fn load_ledger(project_path: &Path, config: &ProjectConfig) -> FileLedger {
    match FileLedger::load(config.prd_file(project_path)) {
        Ok(ledger) => ledger,
        Err(e) => {
            report_error(&e, config);
            std::process::exit(e.exit_code());
        }
    }
}

fn report_error(error: &PrdError, config: &ProjectConfig) {
    eprintln!("{} {}", "Error:".red().bold(), error);
    if matches!(error, PrdError::MissingFile { .. }) {
        eprintln!(
            "Run `prdloop init` first to create {}",
            config.prd_path.as_str()
        );
    }
}

fn load_tasks(path: &Path) -> Result<Vec<Task>, PrdError> {
    let content = std::fs::read_to_string(path).map_err(|_| PrdError::MissingFile {
        path: path.to_path_buf(),
    })?;
    let specs: Vec<TaskSpec> = serde_json::from_str(&content)?;
    Ok(specs
        .into_iter()
        .enumerate()
        .map(|(i, spec)| {
            Task::new(spec.id.unwrap_or(i as u64 + 1), spec.description)
                .with_success_criteria(spec.success_criteria)
                .with_files(spec.files_to_modify)
        })
        .collect())
}

fn print_status(prd: &Prd, json: bool) {
    let summary = prd.progress_summary();
    if json {
        let value = serde_json::json!({
            "project": prd.project_name,
            "summary": summary,
            "tasks": prd.tasks,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&value).unwrap_or_default()
        );
        return;
    }

    println!("Project: {}", prd.project_name);
    println!(
        "Progress: {}/{} ({}%)",
        summary.done, summary.total, summary.progress_percent
    );
    println!("Iteration: {}/{}", summary.iteration, prd.max_iterations);
    println!("Passes: {}", summary.passes);
    println!("\nTasks:");
    for task in &prd.tasks {
        let line = format!(
            "  {} [{}] {} ({})",
            task.status.icon(),
            task.id,
            task.description,
            task.status
        );
        match task.status {
            prdloop::TaskStatus::Done => println!("{}", line.green()),
            prdloop::TaskStatus::Failed => println!("{}", line.red()),
            prdloop::TaskStatus::InProgress => println!("{}", line.yellow()),
            _ => println!("{line}"),
        }
    }
}
