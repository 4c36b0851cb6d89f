use crate::error::{Result, SyncError};
use crate::extract::{Extraction, extract_memories, load_export};
use crate::jsonl::{read_records, write_records};
use crate::reconcile::{ReconcileSummary, SyncPlan, reconcile_sets};
use crate::remote::MemoryRemote;
use crate::types::{Record, RecordSet};
use crate::utils::preview;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub workers: usize,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyAction {
    Delete,
    Upload,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyFailure {
    pub action: ApplyAction,
    pub content: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    pub deleted: usize,
    pub uploaded: usize,
    pub failures: Vec<ApplyFailure>,
}

impl ApplyReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractReport {
    pub output: PathBuf,
    pub records: usize,
    pub distinct: usize,
    pub messages: usize,
    pub total_messages: usize,
    pub failed_conversations: usize,
    pub rejected_records: usize,
}

impl ExtractReport {
    fn new(output: &Path, extraction: &Extraction, distinct: usize) -> Self {
        Self {
            output: output.to_path_buf(),
            records: extraction.records.len(),
            distinct,
            messages: extraction.message_count,
            total_messages: extraction.total_messages,
            failed_conversations: extraction.failed_conversations,
            rejected_records: extraction.rejected_records,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub local: usize,
    pub remote: usize,
    pub summary: ReconcileSummary,
    pub plan: SyncPlan,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub extract: ExtractReport,
    pub to_delete: usize,
    pub to_upload: usize,
    pub summary: ReconcileSummary,
    pub dry_run: bool,
    pub apply: Option<ApplyReport>,
}

impl SyncReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.apply.as_ref().is_none_or(ApplyReport::is_clean)
    }
}

/// Extracts memories from the export and writes them to the JSONL log.
pub fn run_extract(options: &SyncOptions) -> Result<(Vec<Record>, ExtractReport)> {
    let conversations = load_export(&options.input)?;
    let extraction = extract_memories(conversations, options.workers)?;
    write_records(&options.output, &extraction.records)?;

    let distinct = RecordSet::from_records(extraction.records.iter().cloned()).len();
    let report = ExtractReport::new(&options.output, &extraction, distinct);
    log::info!(
        "wrote {} memories ({distinct} distinct) to {}",
        report.records,
        options.output.display()
    );
    Ok((extraction.records, report))
}

fn plan_against<R: MemoryRemote>(local: &[Record], remote: &R) -> Result<PlanReport> {
    let server = remote.fetch()?;
    let local_set = RecordSet::from_records(local.iter().cloned());
    let remote_set = RecordSet::from_records(server);
    let reconciliation = reconcile_sets(&local_set, &remote_set);

    Ok(PlanReport {
        local: local_set.len(),
        remote: remote_set.len(),
        summary: reconciliation.summary,
        plan: reconciliation.plan,
    })
}

/// Plans against the server from a previously written log, applying nothing.
pub fn plan_from_log<R: MemoryRemote>(log_path: &Path, remote: &R) -> Result<PlanReport> {
    let local = read_records(log_path)?;
    if local.is_empty() {
        log::warn!("{} holds no memories", log_path.display());
    }
    plan_against(&local, remote)
}

/// Applies deletions, then uploads, one call at a time. A failed call is
/// recorded and the rest of the plan still runs.
pub fn apply_plan<R: MemoryRemote>(plan: &SyncPlan, remote: &R) -> ApplyReport {
    let mut report = ApplyReport::default();

    if plan.deletions.is_empty() {
        log::info!("no memories to delete");
    } else {
        log::info!("deleting {} memories", plan.deletions.len());
    }
    for record in &plan.deletions {
        let outcome = match record.server_id.as_deref() {
            Some(server_id) => remote.delete(server_id),
            None => Err(SyncError::Transport(
                "memory has no server id to delete".to_string(),
            )),
        };
        match outcome {
            Ok(()) => report.deleted += 1,
            Err(error) => {
                log::warn!("failed to delete memory {:?}: {error}", preview(&record.content));
                report.failures.push(ApplyFailure {
                    action: ApplyAction::Delete,
                    content: record.content.clone(),
                    error: error.to_string(),
                });
            }
        }
    }

    if plan.uploads.is_empty() {
        log::info!("no new memories to upload");
    } else {
        log::info!("uploading {} memories", plan.uploads.len());
    }
    for record in &plan.uploads {
        match remote.create(record) {
            Ok(()) => report.uploaded += 1,
            Err(error) => {
                log::warn!("failed to upload memory {:?}: {error}", preview(&record.content));
                report.failures.push(ApplyFailure {
                    action: ApplyAction::Upload,
                    content: record.content.clone(),
                    error: error.to_string(),
                });
            }
        }
    }

    report
}

/// Extract, fetch, reconcile and apply, in that order.
pub fn run_sync<R: MemoryRemote>(options: &SyncOptions, remote: &R) -> Result<SyncReport> {
    let (local, extract) = run_extract(options)?;
    let planned = plan_against(&local, remote)?;

    log::info!(
        "plan: {} to delete, {} to upload ({} already synced, {} only on server)",
        planned.plan.deletions.len(),
        planned.plan.uploads.len(),
        planned.summary.matched,
        planned.summary.remote_only
    );

    let apply = if options.dry_run {
        log::info!("dry run; nothing applied");
        None
    } else {
        Some(apply_plan(&planned.plan, remote))
    };

    Ok(SyncReport {
        extract,
        to_delete: planned.plan.deletions.len(),
        to_upload: planned.plan.uploads.len(),
        summary: planned.summary,
        dry_run: options.dry_run,
        apply,
    })
}
