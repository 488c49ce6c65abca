use std::collections::HashSet;
use std::fs;
use std::path::Path;

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::ImportError;
use crate::hash::sha256_file;
use crate::model::{FileKind, ImportBatch, ImportMetrics, StagedFile};
use crate::registry::EvidenceRegistry;

/// Walk the staging directory and bucket the files still requiring import
/// by kind.
///
/// Only direct entries are considered; sub-directories are skipped. Each
/// regular file is hashed (streamed SHA-256) and checked against the
/// registry for the case:
///
/// - already registered for the case, or carrying a hash already seen
///   earlier in this scan: the file is a duplicate upload; it is deleted
///   from staging and a warning is logged,
/// - unrecognized extension: the file is rejected, deleted from staging and
///   an informational line is logged,
/// - otherwise it joins the batch for its kind, carrying its digest.
///
/// Classification is a partition: every accepted file appears in exactly
/// one returned batch. An empty return is the caller's signal that the run
/// has nothing valid to import.
pub fn build_import_batches(
    staging_dir: &Path,
    case_id: i64,
    registry: &dyn EvidenceRegistry,
    logs: &mut Vec<String>,
    metrics: &mut ImportMetrics,
) -> Result<Vec<ImportBatch>, ImportError> {
    if !staging_dir.is_dir() {
        return Err(ImportError::InvalidInputPath(staging_dir.to_path_buf()));
    }

    logs.push(format!("checking input files under {}", staging_dir.display()));

    let mut event_logs: Vec<StagedFile> = Vec::new();
    let mut archives: Vec<StagedFile> = Vec::new();
    let mut seen_hashes: HashSet<String> = HashSet::new();

    let walker = WalkDir::new(staging_dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    for item in walker {
        let entry = match item {
            Ok(entry) => entry,
            Err(err) => {
                warn!(staging = %staging_dir.display(), error = %err, "staging walk error");
                logs.push(format!("staging walk error: {err}"));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();

        let sha256 = match sha256_file(path) {
            Ok(digest) => digest,
            Err(err) => {
                warn!(file = %path.display(), error = %err, "hash failed; file skipped");
                logs.push(format!("hash failed for {}: {err}; file skipped", path.display()));
                continue;
            }
        };

        let registered = registry
            .is_registered(&sha256, case_id)
            .map_err(|err| ImportError::Registry(err.to_string()))?;
        if registered || seen_hashes.contains(&sha256) {
            metrics.duplicates_skipped += 1;
            remove_from_staging(path, logs);
            warn!(file = %path.display(), "already imported for this case");
            logs.push(format!(
                "{} was already imported; duplicate removed from staging",
                path.display()
            ));
            continue;
        }
        seen_hashes.insert(sha256.clone());

        let size_bytes = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
        let staged = StagedFile {
            path: path.to_path_buf(),
            sha256,
            size_bytes,
        };

        match FileKind::from_extension(path) {
            Some(FileKind::EventLog) => {
                metrics.files_considered += 1;
                event_logs.push(staged);
            }
            Some(FileKind::Archive) => {
                metrics.files_considered += 1;
                archives.push(staged);
            }
            None => {
                metrics.rejected_files += 1;
                remove_from_staging(path, logs);
                info!(file = %path.display(), "unrecognized file type rejected");
                logs.push(format!(
                    "{} has an unsupported file type and was removed from staging",
                    path.display()
                ));
            }
        }
    }

    let mut batches = Vec::new();
    if !event_logs.is_empty() {
        batches.push(ImportBatch {
            kind: FileKind::EventLog,
            files: event_logs,
        });
    }
    if !archives.is_empty() {
        batches.push(ImportBatch {
            kind: FileKind::Archive,
            files: archives,
        });
    }
    Ok(batches)
}

fn remove_from_staging(path: &Path, logs: &mut Vec<String>) {
    if let Err(err) = fs::remove_file(path) {
        warn!(file = %path.display(), error = %err, "failed to remove file from staging");
        logs.push(format!(
            "failed to remove {} from staging: {err}",
            path.display()
        ));
    }
}
