pub mod config;
pub mod error;
pub mod extract;
pub mod jsonl;
pub mod reconcile;
pub mod remote;
pub mod sync;
pub mod types;
pub mod utils;

pub use config::{RemoteConfig, SyncConfig};
pub use error::{Result, SyncError, ValidationError};
pub use extract::{Extraction, extract_memories, process_conversation};
pub use reconcile::{Reconciliation, SyncPlan, reconcile, reconcile_sets};
pub use remote::{MemoryRemote, OpenWebUiClient};
pub use sync::{
    ApplyReport, ExtractReport, PlanReport, SyncOptions, SyncReport, apply_plan, plan_from_log,
    run_extract, run_sync,
};
pub use types::{Record, RecordSet};
