pub mod importer;

pub use importer::{
    detect_due_date_changes, import_export, load_completion_field, load_mapper_config,
};

use serde::Serialize;

use crate::jira::MapperConfig;

/// Options controlling an import.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Label recorded on the sync job, usually the export file name.
    pub source: String,
    pub mapper: MapperConfig,
    /// Delete stored units of an imported epic that the export no longer lists.
    pub prune: bool,
}

/// Progress callbacks for an import. All methods default to no-ops.
pub trait ImportProgress: Send + Sync {
    fn on_epic_start(&self, _epic_key: &str, _index: usize, _total: usize) {}
    fn on_epic_complete(&self, _epic_key: &str, _imported: usize, _failed: usize) {}
}

pub struct NoopProgress;

impl ImportProgress for NoopProgress {}

/// Report returned after an import completes.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub source: String,
    pub status: SyncStatus,
    pub epics: u64,
    pub items_synced: u64,
    pub items_failed: u64,
    pub workers: u64,
    pub due_date_changes: u64,
    pub members_linked: u64,
    pub error: Option<String>,
}

impl SyncReport {
    /// Create a SyncReport with the appropriate status derived from counts.
    pub fn from_counts(source: String, epics: u64, items_synced: u64, items_failed: u64) -> Self {
        let status = if items_failed == 0 {
            SyncStatus::Success
        } else if items_synced > 0 || epics > 0 {
            SyncStatus::PartialFailure
        } else {
            SyncStatus::Failed
        };
        let error = if items_failed > 0 {
            Some(format!("{items_failed} items failed"))
        } else {
            None
        };
        Self {
            source,
            status,
            epics,
            items_synced,
            items_failed,
            workers: 0,
            due_date_changes: 0,
            members_linked: 0,
            error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncStatus {
    Success,
    PartialFailure,
    Failed,
}

impl SyncStatus {
    /// Value stored in `sync_jobs.status`.
    pub fn as_job_status(&self) -> &'static str {
        match self {
            SyncStatus::Success => "completed",
            SyncStatus::PartialFailure => "partial",
            SyncStatus::Failed => "failed",
        }
    }
}
