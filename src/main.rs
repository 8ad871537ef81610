//! Foreman CLI
//!
//! Drives one agent workflow from the terminal, including the interactive
//! review prompt for gated workflows.

use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use foreman::workflow::{WorkflowEngine, WorkflowState};
use foreman::{AgentKind, Config, Error, Executor, HttpExecutor, Result};

#[derive(Parser)]
#[command(name = "foreman")]
#[command(author, version, about = "Human-in-the-loop agent orchestration")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available agents
    Agents,

    /// Run one agent workflow to completion
    Run {
        /// Agent name (jeff, penny, adam, sue, ivan, lisa)
        agent: String,

        /// Input params as key=value pairs
        #[arg(short, long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Use the agent's legacy flow
        #[arg(long)]
        legacy: bool,

        /// Approve the draft without prompting (gated flows)
        #[arg(long, short)]
        yes: bool,
    },

    /// Initialize .foreman directory with a default config
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Agents => {
            for kind in AgentKind::all() {
                let spec = kind.spec();
                let gate = if spec.is_gated() { " (HITL)" } else { "" };
                println!("{:<8}{}{}", kind.name(), spec.description, gate);
                println!("{:<8}legacy: {}", "", kind.legacy_spec().description);
            }
        }

        Commands::Run {
            agent,
            params,
            legacy,
            yes,
        } => {
            run_workflow(&config, &agent, &params, legacy, yes).await?;
        }

        Commands::Init { force } => {
            let path = foreman::config::init(force)?;
            println!("Wrote {}", path.display());
        }

        Commands::Config => {
            let rendered =
                toml::to_string_pretty(&config).map_err(|e| Error::Config(e.to_string()))?;
            println!("{rendered}");
        }
    }

    Ok(())
}

async fn run_workflow(
    config: &Config,
    agent: &str,
    params: &[String],
    legacy: bool,
    auto_approve: bool,
) -> Result<()> {
    let kind = AgentKind::from_str(agent)?;
    let spec = if legacy {
        kind.legacy_spec()
    } else {
        kind.spec()
    };

    let executor = Arc::new(HttpExecutor::new(&config.executor)?);
    let engine = WorkflowEngine::new(executor, spec, config.orchestration.clone());

    let mut states = engine.subscribe();
    engine.start(parse_params(params)?).await?;

    loop {
        match engine.state() {
            WorkflowState::Running | WorkflowState::Applying | WorkflowState::Rejected => {
                let _ = states.changed().await;
            }
            WorkflowState::PendingApproval => {
                if auto_approve {
                    match engine.approve().await? {
                        WorkflowState::PendingApproval => {
                            // finalize refused and there is nobody to retry
                            let error = engine.snapshot().error.unwrap_or_default();
                            println!("✗ finalize failed: {error}");
                            return Ok(());
                        }
                        _ => continue,
                    }
                }
                prompt_gate(&engine).await?;
            }
            WorkflowState::Completed => {
                let snap = engine.snapshot();
                if let Some(error) = snap.error {
                    println!("✗ {agent} failed: {error}");
                } else if let Some(result) = snap.result {
                    println!("✓ {agent} completed:");
                    println!("{}", serde_json::to_string_pretty(&result)?);
                } else {
                    println!("✓ {agent} completed");
                }
                return Ok(());
            }
            WorkflowState::Idle => {
                let snap = engine.snapshot();
                if let Some(error) = snap.error {
                    println!("✗ submission failed: {error}");
                } else {
                    println!("Workflow reset to idle");
                }
                return Ok(());
            }
        }
    }
}

/// Prompt the user for a gate decision on the current draft
async fn prompt_gate<E: Executor + 'static>(engine: &WorkflowEngine<E>) -> Result<()> {
    let snap = engine.snapshot();

    println!("\n{}", "─".repeat(60));
    println!("📋 Draft ready for review");
    println!("{}", "─".repeat(60));

    if let Some(checkpoint) = &snap.checkpoint {
        if !checkpoint.reference_context.is_empty() {
            println!("\nContext:\n{}", checkpoint.reference_context);
        }
    }
    println!("\nDraft:\n{}", snap.edited_content.as_deref().unwrap_or(""));

    println!("\n[a]pprove  [e]dit  [r]eject  [?]help");
    print!("> ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    match input.trim().to_lowercase().as_str() {
        "a" | "approve" | "y" | "yes" | "" => match engine.approve().await {
            Ok(WorkflowState::PendingApproval) => {
                let error = engine.snapshot().error.unwrap_or_default();
                println!("Finalize failed: {error} (edits preserved, try again)");
            }
            Ok(_) => {}
            Err(e) => println!("Approval not accepted: {e}"),
        },
        "e" | "edit" => {
            println!("New draft (end with an empty line):");
            let mut lines = Vec::new();
            loop {
                let mut line = String::new();
                if std::io::stdin().read_line(&mut line)? == 0 {
                    break;
                }
                let line = line.trim_end_matches('\n');
                if line.is_empty() {
                    break;
                }
                lines.push(line.to_string());
            }
            if lines.is_empty() {
                println!("Draft unchanged");
            } else {
                engine.edit(lines.join("\n"))?;
            }
        }
        "r" | "reject" | "n" | "no" => {
            engine.reject().await?;
            println!("Draft rejected, resetting...");
        }
        _ => {
            println!("Commands:");
            println!("  a/approve/y/yes - Approve and finalize the draft");
            println!("  e/edit          - Replace the draft before approving");
            println!("  r/reject/n/no   - Reject and reset");
        }
    }

    Ok(())
}

/// Parse `key=value` pairs into a JSON object, keeping numbers numeric so
/// the backend's typed request models accept them.
fn parse_params(pairs: &[String]) -> Result<serde_json::Value> {
    let mut map = serde_json::Map::new();
    for pair in pairs {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            Error::Config(format!("invalid param `{pair}`, expected key=value"))
        })?;
        let value = if let Ok(n) = value.parse::<i64>() {
            json!(n)
        } else if let Ok(f) = value.parse::<f64>() {
            json!(f)
        } else {
            json!(value)
        };
        map.insert(key.to_string(), value);
    }
    Ok(serde_json::Value::Object(map))
}
