//! Run a scripted agent against a simulated environment.
//!
//! The decider walks through numbered pages and declares the task done
//! after `--pages` steps; every action takes `--delay-ms`, which leaves
//! time to try Ctrl+C (pause), Enter (resume) and a second Ctrl+C (exit).
//!
//! # Examples
//!
//! ```sh
//! # Ten pages, compaction every three steps
//! stepwise "Collect the page titles" --pages 10 --memory-interval 3
//!
//! # Load settings from a file and print the final history as JSON
//! stepwise "Collect the page titles" --config agent.json --json
//!
//! # More log output
//! RUST_LOG=stepwise=debug stepwise "Collect the page titles"
//! ```

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use stepwise::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Run a scripted agent with pause/resume and procedural memory.
#[derive(Parser)]
#[command(name = "stepwise")]
struct Cli {
    /// Task description handed to the agent
    task: String,

    /// JSON config file (fields not given keep their defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    // ── Overrides ──────────────────────────────────────────────
    /// Maximum number of steps
    #[arg(long)]
    max_steps: Option<u32>,

    /// Steps between procedural memory compactions
    #[arg(long)]
    memory_interval: Option<u32>,

    /// Disable procedural memory
    #[arg(long)]
    no_memory: bool,

    /// Input window of the decision model, in tokens
    #[arg(long)]
    max_input_tokens: Option<usize>,

    // ── Simulation ─────────────────────────────────────────────
    /// Pages to visit before the task counts as done
    #[arg(long, default_value_t = 5)]
    pages: u32,

    /// Simulated latency of every action, in milliseconds
    #[arg(long, default_value_t = 500)]
    delay_ms: u64,

    /// Print the final history as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn build_config(cli: &Cli) -> Result<AgentConfig, String> {
    let mut config = match &cli.config {
        Some(path) => AgentConfig::from_json_file(path).map_err(|e| e.to_string())?,
        None => AgentConfig::default(),
    };
    if let Some(max_steps) = cli.max_steps {
        config = config.with_max_steps(max_steps);
    }
    if let Some(interval) = cli.memory_interval {
        config = config.with_memory_interval(interval);
    }
    if cli.no_memory {
        config = config.without_memory();
    }
    if let Some(tokens) = cli.max_input_tokens {
        config = config.with_max_input_tokens(tokens);
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

// ── Simulated collaborators ────────────────────────────────────────

struct PageWalker {
    pages: u32,
}

impl Decider for PageWalker {
    fn decide(&self, history: HistorySnapshot, step: u32) -> DecisionFuture<'_> {
        Box::pin(async move {
            let seen = history
                .last_of_kind(MessageKind::State)
                .map(|m| m.message.text().to_string())
                .unwrap_or_default();
            if step >= self.pages {
                return Ok(StepOutput::new(
                    format!("Saw '{seen}'. All pages visited."),
                    vec![Action::new("done", serde_json::json!({ "pages": self.pages }))],
                ));
            }
            Ok(StepOutput::new(
                format!("Saw '{seen}'. Moving on."),
                vec![
                    Action::new("read_title", serde_json::json!({ "page": step })),
                    Action::new("open_page", serde_json::json!({ "page": step + 1 })),
                ],
            ))
        })
    }
}

struct SimulatedSite {
    delay: Duration,
}

impl ActionExecutor for SimulatedSite {
    fn execute(&self, action: Action) -> ActionFuture<'_> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            let page = action.params["page"].as_u64().unwrap_or(0);
            match action.name.as_str() {
                "read_title" => Ok(ActionResult::content(format!("Title of page {page}: Page {page}"))),
                "open_page" => Ok(ActionResult::content(format!("Opened page {page}"))),
                "done" => Ok(ActionResult::done("Collected all titles")),
                other => Err(format!("unknown action '{other}'")),
            }
        })
    }

    fn observe(&self, step: u32) -> ObserveFuture<'_> {
        Box::pin(async move { Ok(Some(Message::user(format!("Current page: {step}")))) })
    }
}

/// Keeps the first line of every message; a stand-in for a real memory
/// backend.
struct FirstLines;

impl Summarizer for FirstLines {
    fn summarize<'a>(&'a self, messages: &'a [Message], step: u32) -> SummaryFuture<'a> {
        let lines: Vec<String> = messages
            .iter()
            .filter_map(|m| m.text().lines().next())
            .map(|l| format!("- {l}"))
            .collect();
        let summary = format!("Progress up to step {step}:\n{}", lines.join("\n"));
        Box::pin(async move { Ok(Some(summary)) })
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let config = build_config(&cli)?;

    let controller = Arc::new(
        InterruptController::new(config.interrupt.clone())
            .with_pause_callback(|| {
                eprintln!("\nGot Ctrl+C, paused the agent.");
                Ok(())
            })
            .with_exit_callback(|| {
                eprintln!("Exiting.");
                Ok(())
            }),
    );
    let support = controller.register_handlers();
    if !support.graceful_pause {
        warn!("Running without graceful pause: Ctrl+C terminates immediately");
    }

    let runner = AgentRunner::new(
        Arc::new(PageWalker { pages: cli.pages }),
        Arc::new(SimulatedSite {
            delay: Duration::from_millis(cli.delay_ms),
        }),
        config,
    )
    .with_system_prompt("You collect page titles from a website, one page per step.")
    .with_summarizer(Arc::new(FirstLines))
    .with_interrupt_controller(controller.clone())
    .with_event_handler(Arc::new(LoggingHandler));

    let result = runner.run(&cli.task).await.map_err(|e| e.to_string())?;
    controller.unregister_handlers();

    info!(
        "{:?} after {} step(s); {} compaction(s), {} error(s)",
        result.stop_reason,
        result.steps_completed,
        result.compactions,
        result.errors.len()
    );
    if cli.json {
        let json = serde_json::to_string_pretty(&result.history).map_err(|e| e.to_string())?;
        println!("{json}");
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stepwise=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
