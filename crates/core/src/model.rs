use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Kinds of uploads the dispatcher knows how to import.
///
/// Closed on purpose: adding a kind forces every dispatch site to grow a
/// matching arm at compile time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// A Windows event-log file, ingested directly.
    EventLog,
    /// A compressed container routed through extraction first.
    Archive,
}

impl FileKind {
    /// Classify a path by its extension. `None` means the upload is
    /// unrecognized and gets rejected by the classifier.
    ///
    /// `.evtx` is a plain event-log file; `.evtx_data` is the event-log
    /// payload found inside DFIR-ORC collection results.
    pub fn from_extension(path: &Path) -> Option<Self> {
        let extension = path.extension().and_then(|ext| ext.to_str())?.to_lowercase();
        match extension.as_str() {
            "evtx" | "evtx_data" => Some(Self::EventLog),
            "zip" | "7z" => Some(Self::Archive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EventLog => "event_log",
            Self::Archive => "archive",
        }
    }
}

/// One staged file accepted by the classifier, with the digest and size
/// computed during classification. The digest is reused at registration
/// time; the registry is still re-queried there to guard against a
/// concurrent import registering the same hash in between.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StagedFile {
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: u64,
}

impl StagedFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.to_string_lossy().to_string())
    }
}

/// A same-kind group of staged files discovered in one scan. All files
/// share the staging directory as their immediate parent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportBatch {
    pub kind: FileKind,
    pub files: Vec<StagedFile>,
}

impl ImportBatch {
    /// Parent directory shared by every file in the batch.
    pub fn parent_dir(&self) -> Option<&Path> {
        self.files.first().and_then(|file| file.path.parent())
    }
}

/// One file accepted into a case. Created after successful ingestion,
/// owned thereafter by the evidence registry, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceRecord {
    pub filename: String,
    pub sha256: String,
    pub date_added: String,
    pub case_id: i64,
    pub user_id: i64,
    pub size_bytes: u64,
    pub description: String,
}

/// Counters accumulated across one import run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ImportMetrics {
    #[serde(default)]
    pub elapsed_ms: u64,
    #[serde(default)]
    pub batches: u64,
    #[serde(default)]
    pub files_considered: u64,
    #[serde(default)]
    pub files_imported: u64,
    #[serde(default)]
    pub duplicates_skipped: u64,
    #[serde(default)]
    pub rejected_files: u64,
}

impl ImportMetrics {
    fn absorb(&mut self, other: &ImportMetrics) {
        self.batches = self.batches.saturating_add(other.batches);
        self.files_considered = self.files_considered.saturating_add(other.files_considered);
        self.files_imported = self.files_imported.saturating_add(other.files_imported);
        self.duplicates_skipped = self
            .duplicates_skipped
            .saturating_add(other.duplicates_skipped);
        self.rejected_files = self.rejected_files.saturating_add(other.rejected_files);
    }
}

/// Aggregated outcome of one import run, returned to the host task runtime
/// in place of any exception. Log lines are accumulated explicitly through
/// the call chain; there is no ambient message sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportResult {
    pub run_id: String,
    pub success: bool,
    pub logs: Vec<String>,
    pub is_update: bool,
    #[serde(default)]
    pub metrics: ImportMetrics,
}

impl ImportResult {
    /// A fresh, successful result to merge batch outcomes into.
    pub fn new(run_id: impl Into<String>, is_update: bool) -> Self {
        Self {
            run_id: run_id.into(),
            success: true,
            logs: Vec::new(),
            is_update,
            metrics: ImportMetrics::default(),
        }
    }

    /// Merge a constituent outcome into this run result: overall success is
    /// the logical AND, logs concatenate in order, counters add up, and the
    /// update flag is stamped from the run's input.
    pub fn merge(&mut self, other: ImportResult, is_update: bool) {
        self.success = self.success && other.success;
        self.logs.extend(other.logs);
        self.metrics.absorb(&other.metrics);
        self.is_update = is_update;
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{FileKind, ImportResult};

    #[test]
    fn classifies_known_extensions() {
        assert_eq!(
            FileKind::from_extension(Path::new("security.evtx")),
            Some(FileKind::EventLog)
        );
        assert_eq!(
            FileKind::from_extension(Path::new("orc/system.EVTX_DATA")),
            Some(FileKind::EventLog)
        );
        assert_eq!(
            FileKind::from_extension(Path::new("upload.zip")),
            Some(FileKind::Archive)
        );
        assert_eq!(
            FileKind::from_extension(Path::new("upload.7z")),
            Some(FileKind::Archive)
        );
        assert_eq!(FileKind::from_extension(Path::new("notes.txt")), None);
        assert_eq!(FileKind::from_extension(Path::new("no_extension")), None);
    }

    #[test]
    fn merge_ands_success_and_concatenates_logs() {
        let mut base = ImportResult::new("run", false);
        base.logs.push("first".to_string());

        let mut failed = ImportResult::new("run", false);
        failed.success = false;
        failed.logs.push("second".to_string());
        failed.metrics.files_imported = 2;

        base.merge(failed, true);

        assert!(!base.success);
        assert!(base.is_update);
        assert_eq!(base.logs, vec!["first".to_string(), "second".to_string()]);
        assert_eq!(base.metrics.files_imported, 2);
    }

    #[test]
    fn merge_keeps_success_when_both_succeed() {
        let mut base = ImportResult::new("run", false);
        base.merge(ImportResult::new("run", false), false);
        assert!(base.success);
        assert!(!base.is_update);
    }
}
