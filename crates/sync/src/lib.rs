//! The sync engine: plan generation, concurrent transfer execution, and the
//! push/pull flows that tie the scanner, the metadata authority and the blob
//! store together.
//!
//! Content addressing does the heavy lifting throughout: identical bytes are
//! uploaded at most once system-wide, and a pull reuses any local file that
//! already holds the right content — even at a different path — before
//! touching the network.

mod engine;
pub mod error;
mod executor;
mod marker;
mod plan;

pub use crate::engine::{PullOutcome, PushOptions, PushOutcome, SyncEngine};
pub use crate::executor::{
    DEFAULT_WORKERS, ProgressFn, TaskOutcome, TaskResult, TransferExecutor, TransferReport, UploadReport,
};
pub use crate::marker::{MARKER_FILE_NAME, WorkspaceMarker};
pub use crate::plan::{
    Acquisition, ConflictDisposition, ConflictPolicy, SyncAction, SyncPlan, SyncTask, generate_plan,
};
