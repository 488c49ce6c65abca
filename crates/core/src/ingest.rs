use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{anyhow, Result};
use tracing::info;
use walkdir::WalkDir;

use crate::model::FileKind;
use crate::settings::{IngestorSettings, ProxySettings};

/// Full configuration handed to the ingestor for one batch: platform-level
/// settings plus the destination index and desired parallelism.
#[derive(Debug, Clone)]
pub struct IngestorConfig {
    pub settings: IngestorSettings,
    pub index: String,
    pub worker_count: usize,
    pub proxies: ProxySettings,
    pub hostname: Option<String>,
}

impl IngestorConfig {
    pub fn new(settings: IngestorSettings, index: impl Into<String>, hostname: Option<String>) -> Self {
        let proxies = settings.proxies();
        Self {
            settings,
            index: index.into(),
            worker_count: default_worker_count(),
            proxies,
            hostname,
        }
    }
}

/// One ingestion worker per available processing core.
pub fn default_worker_count() -> usize {
    thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
}

/// Parses decoded log files under a directory and streams the resulting
/// events to the indexing backend. The real implementation lives in an
/// external library; from the dispatcher's perspective both calls are
/// opaque and blocking.
pub trait LogIngestor {
    fn configure(&mut self, config: &IngestorConfig) -> Result<()>;
    fn ingest(&mut self, input_dir: &Path, use_cache: bool, keep_cache: bool) -> Result<()>;
}

/// Stand-in ingestor wired up when no indexing backend is available. It
/// walks the input directory, counts event-log files, and succeeds only if
/// at least one is present, mirroring how the real ingestor fails on an
/// input directory with nothing to parse.
#[derive(Debug, Default)]
pub struct DryRunIngestor {
    config: Option<IngestorConfig>,
    pub ingested_files: u64,
}

impl DryRunIngestor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogIngestor for DryRunIngestor {
    fn configure(&mut self, config: &IngestorConfig) -> Result<()> {
        config.settings.validate()?;
        if config.index.trim().is_empty() {
            return Err(anyhow!("destination index name must not be empty"));
        }
        if config.worker_count == 0 {
            return Err(anyhow!("worker count must be greater than zero"));
        }
        info!(
            index = %config.index,
            workers = config.worker_count,
            "dry-run ingestor configured"
        );
        self.config = Some(config.clone());
        Ok(())
    }

    fn ingest(&mut self, input_dir: &Path, _use_cache: bool, _keep_cache: bool) -> Result<()> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| anyhow!("ingestor used before configuration"))?;

        let eligible = count_event_log_files(input_dir);
        if eligible == 0 {
            return Err(anyhow!(
                "no event-log files found under {}",
                input_dir.display()
            ));
        }

        self.ingested_files = self.ingested_files.saturating_add(eligible);
        info!(
            index = %config.index,
            input_dir = %input_dir.display(),
            files = eligible,
            "dry-run ingestion complete"
        );
        Ok(())
    }
}

fn count_event_log_files(input_dir: &Path) -> u64 {
    WalkDir::new(input_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            FileKind::from_extension(entry.path()) == Some(FileKind::EventLog)
        })
        .count() as u64
}

/// Test double with scripted outcomes, shared by the core and service tests.
#[derive(Debug, Default)]
pub struct ScriptedIngestor {
    pub fail_configure: bool,
    pub fail_ingest: bool,
    pub configure_calls: u64,
    pub ingest_calls: u64,
    pub inputs: Vec<PathBuf>,
}

impl LogIngestor for ScriptedIngestor {
    fn configure(&mut self, _config: &IngestorConfig) -> Result<()> {
        self.configure_calls += 1;
        if self.fail_configure {
            return Err(anyhow!("scripted configuration failure"));
        }
        Ok(())
    }

    fn ingest(&mut self, input_dir: &Path, _use_cache: bool, _keep_cache: bool) -> Result<()> {
        self.ingest_calls += 1;
        self.inputs.push(input_dir.to_path_buf());
        if self.fail_ingest {
            return Err(anyhow!("scripted ingestion failure"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::{default_worker_count, DryRunIngestor, IngestorConfig, LogIngestor};
    use crate::settings::IngestorSettings;

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

    #[test]
    fn worker_count_defaults_to_at_least_one() {
        assert!(default_worker_count() >= 1);
    }

    #[test]
    fn ingest_before_configure_fails() {
        let temp = TempDir::new().expect("tempdir");
        let mut ingestor = DryRunIngestor::new();
        assert!(ingestor.ingest(temp.path(), false, false).is_err());
    }

    #[test]
    fn empty_index_rejected_at_configure() {
        let mut ingestor = DryRunIngestor::new();
        let config = IngestorConfig::new(settings(), "", None);
        assert!(ingestor.configure(&config).is_err());
    }

    #[test]
    fn counts_event_logs_recursively() {
        let temp = TempDir::new().expect("tempdir");
        fs::write(temp.path().join("a.evtx"), b"x").expect("write");
        fs::create_dir_all(temp.path().join("nested")).expect("mkdir");
        fs::write(temp.path().join("nested/b.evtx_data"), b"y").expect("write");
        fs::write(temp.path().join("readme.txt"), b"z").expect("write");

        let mut ingestor = DryRunIngestor::new();
        ingestor
            .configure(&IngestorConfig::new(settings(), "case_idx", None))
            .expect("configure");
        ingestor.ingest(temp.path(), false, false).expect("ingest");
        assert_eq!(ingestor.ingested_files, 2);
    }

    #[test]
    fn empty_directory_fails_ingestion() {
        let temp = TempDir::new().expect("tempdir");
        let mut ingestor = DryRunIngestor::new();
        ingestor
            .configure(&IngestorConfig::new(settings(), "case_idx", None))
            .expect("configure");
        assert!(ingestor.ingest(temp.path(), false, false).is_err());
    }
}
