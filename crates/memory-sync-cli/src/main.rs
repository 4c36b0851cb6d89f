mod logger;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use memory_sync_core::sync::ApplyAction;
use memory_sync_core::{
    ExtractReport, OpenWebUiClient, PlanReport, SyncConfig, SyncOptions, SyncReport,
    plan_from_log, run_extract, run_sync,
};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "memory-sync")]
#[command(about = "Extract ChatGPT memories from an export and sync them to Open WebUI")]
struct Cli {
    /// Print human-readable text instead of JSON.
    #[arg(long, global = true, default_value_t = false)]
    human: bool,

    /// Only log warnings and errors.
    #[arg(long, short, global = true, default_value_t = false)]
    quiet: bool,

    /// Load environment variables from this file instead of `./.env`.
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Extract memories and write them to the JSONL log.
    Extract(ExtractArgs),
    /// Compare an existing JSONL log with the server without changing it.
    Plan {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Extract, compare and apply deletions and uploads.
    Sync(SyncArgs),
}

#[derive(Debug, Clone, Default, Args)]
struct ExtractArgs {
    /// Conversation export (`conversations.json`).
    #[arg(long)]
    input: Option<PathBuf>,

    /// JSONL log to write.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Conversations processed at once.
    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Debug, Clone, Default, Args)]
struct SyncArgs {
    #[command(flatten)]
    extract: ExtractArgs,

    /// Compute the plan but do not touch the server.
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

fn sync_options(config: &SyncConfig, args: &ExtractArgs, dry_run: bool) -> SyncOptions {
    SyncOptions {
        input: args.input.clone().unwrap_or_else(|| config.input.clone()),
        output: args.output.clone().unwrap_or_else(|| config.output.clone()),
        workers: args.workers.unwrap_or(config.workers),
        dry_run,
    }
}

fn remote_client(config: &SyncConfig) -> Result<OpenWebUiClient> {
    let remote = config.remote().context("configure Open WebUI connection")?;
    OpenWebUiClient::new(&remote).context("build Open WebUI client")
}

fn render_extract(report: &ExtractReport) -> String {
    format!(
        "Extracted {} memories ({} distinct) to {}\n- messages scanned: {} of {}\n- conversations failed: {}\n- memories rejected: {}",
        report.records,
        report.distinct,
        report.output.display(),
        report.messages,
        report.total_messages,
        report.failed_conversations,
        report.rejected_records
    )
}

fn render_plan(report: &PlanReport) -> String {
    let mut lines = vec![
        format!(
            "Local memories: {}, server memories: {}",
            report.local, report.remote
        ),
        format!("Total memories to delete: {}", report.plan.deletions.len()),
        format!("Total memories to upload: {}", report.plan.uploads.len()),
    ];
    for record in &report.plan.deletions {
        lines.push(format!(
            "  - delete {} {}",
            record.server_id.as_deref().unwrap_or("?"),
            record.content
        ));
    }
    for record in &report.plan.uploads {
        lines.push(format!("  + upload {}", record.content));
    }
    lines.join("\n")
}

fn render_sync(report: &SyncReport) -> String {
    let mut lines = vec![
        render_extract(&report.extract),
        format!("Total memories to delete: {}", report.to_delete),
        format!("Total memories to upload: {}", report.to_upload),
    ];
    match &report.apply {
        None => lines.push("Dry run: nothing applied.".to_string()),
        Some(apply) => {
            lines.push(format!(
                "Deleted {}, uploaded {}, failed {}",
                apply.deleted,
                apply.uploaded,
                apply.failures.len()
            ));
            for failure in &apply.failures {
                let verb = match failure.action {
                    ApplyAction::Delete => "deleting",
                    ApplyAction::Upload => "uploading",
                };
                lines.push(format!(
                    "Error {verb} memory: {} ({})",
                    failure.content, failure.error
                ));
            }
        }
    }
    lines.join("\n")
}

fn emit<T: serde::Serialize>(human: bool, value: &T, text: impl FnOnce(&T) -> String) -> Result<()> {
    if human {
        println!("{}", text(value));
    } else {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}

/// Loads the env file before the logger so `RUST_LOG` from it takes effect.
fn load_environment(env_file: Option<&Path>, quiet: bool) -> Result<SyncConfig> {
    match env_file {
        Some(path) => {
            dotenv::from_path(path).with_context(|| format!("load {}", path.display()))?;
        }
        None => {
            dotenv::dotenv().ok();
        }
    }
    logger::init_logger(quiet);
    Ok(SyncConfig::from_env())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_environment(cli.env_file.as_deref(), cli.quiet)?;

    match cli.command.unwrap_or(Command::Sync(SyncArgs::default())) {
        Command::Extract(args) => {
            let options = sync_options(&config, &args, true);
            let (_, report) = run_extract(&options)?;
            emit(cli.human, &report, render_extract)?;
        }
        Command::Plan { output } => {
            let client = remote_client(&config)?;
            let log_path = output.unwrap_or_else(|| config.output.clone());
            let report = plan_from_log(&log_path, &client)?;
            emit(cli.human, &report, render_plan)?;
        }
        Command::Sync(args) => {
            let client = remote_client(&config)?;
            let options = sync_options(&config, &args.extract, args.dry_run);
            let report = run_sync(&options, &client)?;
            emit(cli.human, &report, render_sync)?;
            if !report.is_clean() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
