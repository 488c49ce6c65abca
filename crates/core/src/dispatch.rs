use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use tempfile::TempDir;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::classify::build_import_batches;
use crate::error::ImportError;
use crate::extract::ArchiveExtractor;
use crate::ingest::{IngestorConfig, LogIngestor};
use crate::model::{EvidenceRecord, FileKind, ImportBatch, ImportResult};
use crate::registry::EvidenceRegistry;
use crate::settings::IngestorSettings;

/// Task arguments supplied by the host runtime for one import run.
#[derive(Debug, Clone)]
pub struct ImportTaskArgs {
    pub case_id: i64,
    pub case_name: String,
    pub user: String,
    pub user_id: i64,
    pub staging_path: PathBuf,
    pub is_update: bool,
    /// Destination index name in the log-indexing backend.
    pub index: String,
    /// Optional hostname tag forwarded to the ingestor.
    pub hostname: Option<String>,
}

/// Collaborators one import run works against.
pub struct ImportDeps<'a> {
    pub registry: &'a mut dyn EvidenceRegistry,
    pub extractor: &'a dyn ArchiveExtractor,
    pub ingestor: &'a mut dyn LogIngestor,
    pub settings: &'a IngestorSettings,
}

/// Drive one import run end to end and fold every outcome into a single
/// [`ImportResult`]. Nothing here returns an error to the caller: run-fatal
/// and batch-fatal conditions alike surface as a failed result with logged
/// lines.
///
/// Batches are independent: a failed batch is recorded and the run moves on
/// to the next one, so partial failure is visible in the aggregated log
/// rather than aborting the whole run.
pub fn run_import(args: &ImportTaskArgs, deps: &mut ImportDeps<'_>) -> ImportResult {
    let started = Instant::now();
    let run_id = Uuid::new_v4().to_string();
    let mut result = ImportResult::new(run_id.clone(), args.is_update);

    info!(run_id = %run_id, case = %args.case_name, "received new evidence import");
    result.logs.push(format!(
        "received new import for case {} on behalf of {}",
        args.case_name, args.user
    ));

    // The staging directory is moved into a private location first so a
    // concurrent upload into the same staging path cannot collide with this
    // run.
    let mut staging = isolate_staging(&args.staging_path, &mut result.logs);

    match build_import_batches(
        &staging.dir,
        args.case_id,
        deps.registry,
        &mut result.logs,
        &mut result.metrics,
    ) {
        Ok(batches) if batches.is_empty() => {
            let err = ImportError::NoValidFiles;
            error!(run_id = %run_id, "{err}");
            result.logs.push(err.to_string());
            result
                .logs
                .push("either an internal error occurred or the files could not be uploaded".to_string());
            result.success = false;
        }
        Ok(batches) => {
            result.metrics.batches = batches.len() as u64;
            for batch in &batches {
                let outcome = import_batch(batch, args, deps);
                result.merge(outcome, args.is_update);
            }
        }
        Err(err) => {
            error!(run_id = %run_id, error = %err, "classification failed");
            result.logs.push(err.to_string());
            result.success = false;
        }
    }

    if !result.success {
        // Keep the private staging area (extraction outputs included) around
        // whenever anything went wrong, so accepted uploads that were never
        // ingested stay inspectable instead of vanishing with the temp dir.
        if let Some(kept) = staging.persist() {
            result.logs.push(format!(
                "staging area preserved for diagnosis at {}",
                kept.display()
            ));
        }
    }

    finalize(result, started)
}

fn finalize(mut result: ImportResult, started: Instant) -> ImportResult {
    result.metrics.elapsed_ms = started.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
    result.logs.push(format!(
        "import run finished in {} ms (success: {})",
        result.metrics.elapsed_ms, result.success
    ));
    result
}

/// Import one same-kind batch: establish the input directory (extracting
/// archives first), configure and run the ingestor, then register the
/// original batch files.
fn import_batch(
    batch: &ImportBatch,
    args: &ImportTaskArgs,
    deps: &mut ImportDeps<'_>,
) -> ImportResult {
    let mut outcome = ImportResult::new("batch", args.is_update);
    outcome.logs.push(format!(
        "{} file(s) of kind {} to import into {}",
        batch.files.len(),
        batch.kind.as_str(),
        args.index
    ));

    let Some(parent) = batch.parent_dir() else {
        outcome
            .logs
            .push("batch has no resolvable parent directory; batch failed".to_string());
        outcome.success = false;
        return outcome;
    };

    let mut extraction_dir: Option<PathBuf> = None;
    let input_dir = match batch.kind {
        FileKind::EventLog => parent.to_path_buf(),
        FileKind::Archive => {
            // Extraction output goes to a sibling `out` directory rather
            // than the shared temp partition, which archives could exhaust.
            let out_dir = parent
                .parent()
                .unwrap_or(parent)
                .join("out");

            for file in &batch.files {
                let stem = file
                    .path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().to_string())
                    .unwrap_or_else(|| file.file_name());
                let dest = out_dir.join(stem);

                if let Err(err) = deps.extractor.extract(&file.path, &dest) {
                    // Best-effort per archive: log and keep going.
                    let failure = ImportError::ExtractionFailure {
                        archive: file.path.clone(),
                        reason: err.to_string(),
                    };
                    warn!("{failure}");
                    outcome.logs.push(failure.to_string());
                }
            }

            extraction_dir = Some(out_dir.clone());
            out_dir
        }
    };

    let config = IngestorConfig::new(
        deps.settings.clone(),
        args.index.clone(),
        args.hostname.clone(),
    );
    if let Err(err) = deps.ingestor.configure(&config) {
        let failure = ImportError::IngestorConfiguration(err.to_string());
        error!("{failure}");
        outcome.logs.push(failure.to_string());
        outcome.success = false;
        return outcome;
    }

    let ingest_started = Instant::now();
    if let Err(err) = deps.ingestor.ingest(&input_dir, false, false) {
        let failure = ImportError::Ingestion {
            input_dir: input_dir.clone(),
            reason: err.to_string(),
        };
        error!("{failure}");
        outcome.logs.push(failure.to_string());
        if let Some(out_dir) = &extraction_dir {
            outcome.logs.push(format!(
                "extraction output left at {} for diagnosis",
                out_dir.display()
            ));
        }
        outcome.success = false;
        return outcome;
    }
    outcome.logs.push(format!(
        "ingestion finished in {} ms",
        ingest_started.elapsed().as_millis()
    ));

    // Extracted contents are intermediate; only the original uploads are
    // evidence. Cleanup failures are swallowed.
    if let Some(out_dir) = extraction_dir {
        let _ = fs::remove_dir_all(&out_dir);
    }

    register_batch(batch, args, deps, &mut outcome);
    outcome
}

/// Register every original file of the batch, re-checking the registry per
/// file in case a concurrent import of the same case registered the hash
/// since classification.
fn register_batch(
    batch: &ImportBatch,
    args: &ImportTaskArgs,
    deps: &mut ImportDeps<'_>,
    outcome: &mut ImportResult,
) {
    for file in &batch.files {
        let registered = match deps.registry.is_registered(&file.sha256, args.case_id) {
            Ok(registered) => registered,
            Err(err) => {
                let failure = ImportError::Registry(err.to_string());
                error!("{failure}");
                outcome.logs.push(failure.to_string());
                outcome.success = false;
                continue;
            }
        };
        if registered {
            continue;
        }

        let record = EvidenceRecord {
            filename: file.file_name(),
            sha256: file.sha256.clone(),
            date_added: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            case_id: args.case_id,
            user_id: args.user_id,
            size_bytes: file.size_bytes,
            description: format!("[auto] evidence file {}", file.file_name()),
        };
        match deps.registry.register(record) {
            Ok(()) => {
                outcome.metrics.files_imported += 1;
                outcome
                    .logs
                    .push(format!("registered {} as case evidence", file.file_name()));
            }
            Err(err) => {
                let failure = ImportError::Registry(err.to_string());
                error!("{failure}");
                outcome.logs.push(failure.to_string());
                outcome.success = false;
            }
        }
    }
}

struct PrivateStaging {
    dir: PathBuf,
    guard: Option<TempDir>,
}

impl PrivateStaging {
    /// Disarm the temp-dir cleanup and return the preserved staging
    /// directory, when the run actually owns a private area.
    fn persist(&mut self) -> Option<PathBuf> {
        let _root = self.guard.take()?.into_path();
        Some(self.dir.clone())
    }
}

/// Move the staging directory into a fresh private temp directory. When the
/// move cannot be performed (cross-device staging, or a staging path that
/// is not a directory) the run falls back to processing in place; the
/// classifier still validates the path.
fn isolate_staging(staging_path: &Path, logs: &mut Vec<String>) -> PrivateStaging {
    let in_place = PrivateStaging {
        dir: staging_path.to_path_buf(),
        guard: None,
    };
    if !staging_path.is_dir() {
        return in_place;
    }

    let temp = match TempDir::new() {
        Ok(temp) => temp,
        Err(err) => {
            warn!(error = %err, "could not create private staging area");
            logs.push(format!(
                "could not create private staging area: {err}; processing in place"
            ));
            return in_place;
        }
    };

    let name = match staging_path.file_name() {
        Some(name) => name.to_os_string(),
        None => return in_place,
    };
    let target = temp.path().join(name);

    match fs::rename(staging_path, &target) {
        Ok(()) => PrivateStaging {
            dir: target,
            guard: Some(temp),
        },
        Err(err) => {
            warn!(error = %err, "could not move staging into private area");
            logs.push(format!(
                "could not move staging into private area: {err}; processing in place"
            ));
            in_place
        }
    }
}
