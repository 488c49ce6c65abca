use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Mutex;
use std::thread;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use evtx_dispatch_core::{
    run_import, DryRunIngestor, ImportDeps, ImportResult, ImportTaskArgs, IngestorSettings,
    JsonRegistry, ZipExtractor,
};

/// Arguments handed over by the host task runtime for one import or update
/// invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskArgs {
    #[serde(default)]
    pub task_id: Option<String>,
    pub case_id: i64,
    pub case_name: String,
    pub user: String,
    pub user_id: i64,
    pub staging_path: PathBuf,
    #[serde(default)]
    pub is_update: bool,
    /// Destination index name (required pipeline argument).
    pub index: String,
    /// Optional hostname tag forwarded to the ingestor.
    #[serde(default)]
    pub hostname: Option<String>,
}

impl TaskArgs {
    fn to_import_args(&self) -> ImportTaskArgs {
        ImportTaskArgs {
            case_id: self.case_id,
            case_name: self.case_name.clone(),
            user: self.user.clone(),
            user_id: self.user_id,
            staging_path: self.staging_path.clone(),
            is_update: self.is_update,
            index: self.index.clone(),
            hostname: self.hostname.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImportSessionStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSessionSnapshot {
    pub task_id: String,
    pub status: ImportSessionStatus,
    pub success: Option<bool>,
    pub log_lines: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
struct ImportSession {
    status: ImportSessionStatus,
    result: Option<ImportResult>,
    error: Option<String>,
}

static SESSIONS: Lazy<Mutex<HashMap<String, ImportSession>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Synchronous module-interface entry point: forwards host task arguments
/// to the import orchestrator and contains any unexpected panic, so the
/// host runtime only ever observes a result object.
pub fn run_import_task(args: &TaskArgs, deps: &mut ImportDeps<'_>) -> ImportResult {
    let import_args = args.to_import_args();
    match catch_unwind(AssertUnwindSafe(|| run_import(&import_args, deps))) {
        Ok(result) => result,
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            error!(case = %args.case_name, reason, "import task panicked");
            let mut result = ImportResult::new(Uuid::new_v4().to_string(), args.is_update);
            result.success = false;
            result
                .logs
                .push(format!("internal error during import: {reason}"));
            result
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

/// Start an import run on a worker thread. Returns the task id to poll with
/// [`get_import_session`] / [`get_import_result`].
pub fn start_import(
    args: TaskArgs,
    settings: IngestorSettings,
    registry_path: PathBuf,
) -> Result<String> {
    let task_id = args
        .task_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    {
        let mut sessions = lock_sessions()?;
        sessions.insert(
            task_id.clone(),
            ImportSession {
                status: ImportSessionStatus::Running,
                result: None,
                error: None,
            },
        );
    }

    let thread_task_id = task_id.clone();
    thread::spawn(move || {
        let mut registry = match JsonRegistry::load(&registry_path) {
            Ok(registry) => registry,
            Err(err) => {
                if let Ok(mut sessions) = lock_sessions() {
                    if let Some(session) = sessions.get_mut(&thread_task_id) {
                        session.status = ImportSessionStatus::Failed;
                        session.error = Some(err.to_string());
                    }
                }
                return;
            }
        };

        let mut ingestor = DryRunIngestor::new();
        let mut deps = ImportDeps {
            registry: &mut registry,
            extractor: &ZipExtractor,
            ingestor: &mut ingestor,
            settings: &settings,
        };

        let result = run_import_task(&args, &mut deps);

        if let Ok(mut sessions) = lock_sessions() {
            if let Some(session) = sessions.get_mut(&thread_task_id) {
                session.status = ImportSessionStatus::Completed;
                session.result = Some(result);
                session.error = None;
            }
        }
    });

    Ok(task_id)
}

pub fn get_import_session(task_id: &str) -> Result<ImportSessionSnapshot> {
    let sessions = lock_sessions()?;
    let session = sessions
        .get(task_id)
        .ok_or_else(|| anyhow!("import session not found: {task_id}"))?;

    Ok(ImportSessionSnapshot {
        task_id: task_id.to_string(),
        status: session.status.clone(),
        success: session.result.as_ref().map(|result| result.success),
        log_lines: session
            .result
            .as_ref()
            .map(|result| result.logs.len() as u64)
            .unwrap_or(0),
        error: session.error.clone(),
    })
}

/// Full result of a finished run, if any.
pub fn get_import_result(task_id: &str) -> Result<Option<ImportResult>> {
    let sessions = lock_sessions()?;
    let session = sessions
        .get(task_id)
        .ok_or_else(|| anyhow!("import session not found: {task_id}"))?;
    Ok(session.result.clone())
}

fn lock_sessions() -> Result<std::sync::MutexGuard<'static, HashMap<String, ImportSession>>> {
    SESSIONS
        .lock()
        .map_err(|_| anyhow!("import session registry lock poisoned"))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::{Duration, Instant};

    use anyhow::Result;
    use tempfile::TempDir;

    use evtx_dispatch_core::{
        ImportDeps, IngestorConfig, IngestorSettings, LogIngestor, MemoryRegistry, ZipExtractor,
    };

    use super::{
        get_import_result, get_import_session, run_import_task, start_import, ImportSessionStatus,
        TaskArgs,
    };

    fn settings() -> IngestorSettings {
        IngestorSettings {
            indexer_url: "indexer.example.internal".to_string(),
            indexer_user: "ingest".to_string(),
            indexer_pass: "secret".to_string(),
            hec_name: None,
            management_port: 8089,
            use_ssl: true,
            verify_ssl: false,
            http_proxy: None,
            https_proxy: None,
            parser_config_file: PathBuf::from("/etc/evtxdump/config.toml"),
        }
    }

    fn task_args(staging: &Path) -> TaskArgs {
        TaskArgs {
            task_id: None,
            case_id: 1,
            case_name: "case-one".to_string(),
            user: "analyst".to_string(),
            user_id: 7,
            staging_path: staging.to_path_buf(),
            is_update: false,
            index: "case_one_idx".to_string(),
            hostname: None,
        }
    }

    struct PanickingIngestor;

    impl LogIngestor for PanickingIngestor {
        fn configure(&mut self, _config: &IngestorConfig) -> Result<()> {
            Ok(())
        }

        fn ingest(&mut self, _input_dir: &Path, _use_cache: bool, _keep_cache: bool) -> Result<()> {
            panic!("ingestor blew up");
        }
    }

    #[test]
    fn start_import_completes_and_exposes_result() {
        let temp = TempDir::new().expect("tempdir");
        let staging = temp.path().join("uploads");
        fs::create_dir_all(&staging).expect("mkdir");
        fs::write(staging.join("security.evtx"), b"payload").expect("write");
        let registry_path = temp.path().join("registry.json");

        let task_id =
            start_import(task_args(&staging), settings(), registry_path).expect("start import");

        let started = Instant::now();
        let snapshot = loop {
            let snapshot = get_import_session(&task_id).expect("session exists");
            if snapshot.status != ImportSessionStatus::Running {
                break snapshot;
            }
            assert!(started.elapsed() < Duration::from_secs(30));
            std::thread::sleep(Duration::from_millis(25));
        };

        assert_eq!(snapshot.status, ImportSessionStatus::Completed);
        assert_eq!(snapshot.success, Some(true));
        assert!(snapshot.log_lines >= 1);

        let result = get_import_result(&task_id)
            .expect("result lookup")
            .expect("result present");
        assert!(result.success);
        assert_eq!(result.metrics.files_imported, 1);
    }

    #[test]
    fn panics_are_contained_as_failed_results() {
        let temp = TempDir::new().expect("tempdir");
        let staging = temp.path().join("uploads");
        fs::create_dir_all(&staging).expect("mkdir");
        fs::write(staging.join("security.evtx"), b"payload").expect("write");

        let mut registry = MemoryRegistry::new();
        let mut ingestor = PanickingIngestor;
        let settings = settings();
        let mut deps = ImportDeps {
            registry: &mut registry,
            extractor: &ZipExtractor,
            ingestor: &mut ingestor,
            settings: &settings,
        };

        let result = run_import_task(&task_args(&staging), &mut deps);

        assert!(!result.success);
        assert!(result
            .logs
            .iter()
            .any(|line| line.contains("internal error during import")));
        assert!(result.logs.iter().any(|line| line.contains("blew up")));
    }

    #[test]
    fn unknown_session_is_an_error() {
        assert!(get_import_session("no-such-task").is_err());
    }
}
