//! Sync planning between locally extracted memories and the remote store.
//!
//! Both sides are folded by content. A memory present on both sides is left
//! alone unless the local copy was created strictly earlier than the remote
//! one, in which case the remote row is deleted and the local copy uploaded
//! again. Local-only memories are uploaded. Remote-only memories are never
//! touched.

use crate::types::{Record, RecordSet};
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncPlan {
    pub uploads: Vec<Record>,
    pub deletions: Vec<Record>,
}

impl SyncPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty() && self.deletions.is_empty()
    }
}

/// How each distinct content was classified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    /// Present on both sides and left as is.
    pub matched: usize,
    /// Present on both sides, remote copy replaced.
    pub stale: usize,
    pub local_only: usize,
    pub remote_only: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Reconciliation {
    pub plan: SyncPlan,
    pub summary: ReconcileSummary,
}

#[must_use]
pub fn reconcile(local: &[Record], remote: &[Record]) -> SyncPlan {
    reconcile_sets(
        &RecordSet::from_records(local.iter().cloned()),
        &RecordSet::from_records(remote.iter().cloned()),
    )
    .plan
}

/// Plans over already folded sides. Output order follows content order.
#[must_use]
pub fn reconcile_sets(local: &RecordSet, remote: &RecordSet) -> Reconciliation {
    let mut result = Reconciliation::default();

    for (content, server) in remote {
        match local.get(content) {
            Some(mine) if mine.created_at < server.created_at => {
                result.plan.deletions.push(server.clone());
                result.plan.uploads.push(mine.clone());
                result.summary.stale += 1;
            }
            Some(_) => result.summary.matched += 1,
            None => result.summary.remote_only += 1,
        }
    }

    for (content, mine) in local {
        if !remote.contains(content) {
            result.plan.uploads.push(mine.clone());
            result.summary.local_only += 1;
        }
    }

    result
}
