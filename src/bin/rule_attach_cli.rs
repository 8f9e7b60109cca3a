//! Rule Attach Command Line Interface
//!
//! Inspect a source's rule slots and plan or apply rule moves against the
//! source configuration API.
//!
//! # Usage
//!
//! ```bash
//! export RULE_ATTACH_BASE_URL=https://tenant.example.com/
//! export RULE_ATTACH_TOKEN=...
//!
//! # List sources and assignable rules
//! rule_attach_cli sources
//! rule_attach_cli rules
//!
//! # Show current slot assignments
//! rule_attach_cli show 2c9180835d2e5168015d32f890ca1581
//!
//! # Dry-run a move script, then apply it
//! rule_attach_cli plan 2c91... --moves moves.yaml
//! rule_attach_cli apply 2c91... --moves moves.yaml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use rule_attach::repository::http::HttpSourceRepository;
use rule_attach::{
    CommitCoordinator, MoveScript, RuleAttachConfig, RuleAttachSession, RuleCatalog,
    SessionSnapshot, SourceRepository, StepResult, StepStatus,
};

#[derive(Parser)]
#[command(name = "rule_attach_cli")]
#[command(version)]
#[command(about = "Plan and apply rule-slot assignments on source configurations")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, short = 'o', global = true, default_value = "pretty", value_enum)]
    format: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// List source configurations
    Sources,

    /// List assignable rules
    Rules,

    /// Show a source's slot assignments and the available pool
    Show {
        /// Source id
        id: String,
    },

    /// Run a move script and print the resulting patch queue without saving
    Plan {
        /// Source id
        id: String,

        /// YAML move script
        #[arg(long, short)]
        moves: PathBuf,
    },

    /// Run a move script and commit the resulting patch queue
    Apply {
        /// Source id
        id: String,

        /// YAML move script
        #[arg(long, short)]
        moves: PathBuf,
    },
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = cli.format;

    let result = match cli.command {
        Commands::Sources => cmd_sources(format).await,
        Commands::Rules => cmd_rules(format).await,
        Commands::Show { id } => cmd_show(&id, format).await,
        Commands::Plan { id, moves } => cmd_plan(&id, &moves, format).await,
        Commands::Apply { id, moves } => cmd_apply(&id, &moves, format).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if format == OutputFormat::Json {
                println!("{}", serde_json::json!({ "error": format!("{:#}", e) }));
            } else {
                eprintln!("{}: {:#}", "error".red().bold(), e);
            }
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

fn connect() -> Result<(RuleAttachConfig, Arc<HttpSourceRepository>)> {
    let config = RuleAttachConfig::from_env().context("Failed to read configuration")?;
    let repository =
        HttpSourceRepository::new(&config).context("Failed to create HTTP client")?;
    Ok((config, Arc::new(repository)))
}

async fn open_session(
    config: &RuleAttachConfig,
    repository: &HttpSourceRepository,
    id: &str,
) -> Result<RuleAttachSession> {
    let registry = Arc::new(config.registry().context("Failed to load slot registry")?);
    let catalog = repository
        .list_rules()
        .await
        .context("Failed to list rules")?;
    let source = repository
        .get_source(id)
        .await
        .with_context(|| format!("Failed to load source {id}"))?;
    RuleAttachSession::open(registry, catalog, &source)
        .with_context(|| format!("Failed to open source {id}"))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("JSON serialization failed")?
    );
    Ok(())
}

async fn cmd_sources(format: OutputFormat) -> Result<()> {
    let (_, repository) = connect()?;
    let sources = repository
        .list_sources()
        .await
        .context("Failed to list sources")?;

    match format {
        OutputFormat::Json => print_json(&sources)?,
        OutputFormat::Pretty => {
            println!("{} {} source(s)", "OK".green(), sources.len());
            for source in &sources {
                println!(
                    "  {}  {}  {}",
                    source.id.dimmed(),
                    source.name.bold(),
                    source.connector.as_deref().unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}

async fn cmd_rules(format: OutputFormat) -> Result<()> {
    let (_, repository) = connect()?;
    let mut rules = repository
        .list_rules()
        .await
        .context("Failed to list rules")?;
    rules.sort_by(|a, b| a.rule_type.cmp(&b.rule_type).then(a.name.cmp(&b.name)));

    match format {
        OutputFormat::Json => print_json(&rules)?,
        OutputFormat::Pretty => {
            println!("{} {} rule(s)", "OK".green(), rules.len());
            for rule in &rules {
                println!("  {:<32} {}", rule.rule_type.cyan(), rule.name);
            }
        }
    }
    Ok(())
}

async fn cmd_show(id: &str, format: OutputFormat) -> Result<()> {
    let (config, repository) = connect()?;
    let session = open_session(&config, &repository, id).await?;
    let snapshot = session.snapshot();

    match format {
        OutputFormat::Json => print_json(&snapshot)?,
        OutputFormat::Pretty => print_snapshot(&snapshot),
    }
    Ok(())
}

async fn cmd_plan(id: &str, moves: &Path, format: OutputFormat) -> Result<()> {
    let (config, repository) = connect()?;
    let mut session = open_session(&config, &repository, id).await?;
    let script = MoveScript::load(moves)?;
    let steps = script.apply(&mut session);

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "steps": steps,
            "operations": session.pending_operations(),
        }))?,
        OutputFormat::Pretty => {
            print_steps(&steps);
            print_queue(&session);
        }
    }
    Ok(())
}

async fn cmd_apply(id: &str, moves: &Path, format: OutputFormat) -> Result<()> {
    let (config, repository) = connect()?;
    let mut session = open_session(&config, &repository, id).await?;
    let script = MoveScript::load(moves)?;
    let steps = script.apply(&mut session);
    let operations = session.pending_operations();

    if format == OutputFormat::Pretty {
        print_steps(&steps);
        print_queue(&session);
    }

    let coordinator = CommitCoordinator::new(repository);
    let report = coordinator
        .commit(&mut session)
        .await
        .with_context(|| format!("Commit to source {id} failed"))?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "steps": steps,
            "operations": operations,
            "report": report,
            "snapshot": session.snapshot(),
        }))?,
        OutputFormat::Pretty => {
            if report.applied == 0 {
                println!("{} Nothing to save", "OK".green());
            } else {
                println!(
                    "{} Applied {} operation(s) and reloaded {}",
                    "OK".green().bold(),
                    report.applied,
                    session.source_name()
                );
                print_snapshot(&session.snapshot());
            }
        }
    }
    Ok(())
}

// =============================================================================
// OUTPUT
// =============================================================================

fn print_snapshot(snapshot: &SessionSnapshot) {
    println!(
        "{} ({})",
        snapshot.source_name.bold(),
        snapshot.source_id.dimmed()
    );
    for slot in &snapshot.slots {
        let label = if slot.available {
            slot.label.normal()
        } else {
            slot.label.dimmed()
        };
        let rules = if !slot.available {
            "n/a".dimmed().to_string()
        } else if slot.rules.is_empty() {
            "-".dimmed().to_string()
        } else {
            slot.rules
                .iter()
                .map(|r| r.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        println!("  {:<40} {}", label, rules);
    }
    println!("  {} {}", "pool:".dimmed(), snapshot.pool.len());
}

fn print_steps(steps: &[StepResult]) {
    for step in steps {
        let line = format!(
            "[{}] {}: {} -> {}",
            step.step, step.scripted.rule, step.scripted.from, step.scripted.to
        );
        match &step.status {
            StepStatus::Accepted { .. } => println!("  {} {}", "OK".green(), line),
            StepStatus::Rejected { reason } => {
                println!("  {} {} ({})", "REFUSED".yellow(), line, reason)
            }
            StepStatus::UnknownRule => println!("  {} {}", "UNKNOWN RULE".red(), line),
        }
    }
}

fn print_queue(session: &RuleAttachSession) {
    let operations = session.pending_operations();
    if operations.is_empty() {
        println!("{} No pending changes", "OK".green());
        return;
    }
    println!("{} {} pending operation(s)", "PLAN".cyan().bold(), operations.len());
    for (i, operation) in operations.iter().enumerate() {
        println!("  {}. {}", i + 1, operation);
    }
}
