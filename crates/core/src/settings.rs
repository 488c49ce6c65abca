use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ImportError;

/// Typed configuration for the log-ingestion collaborator. Every recognized
/// option is enumerated here; mandatory fields have no serde default and are
/// validated at load time rather than at first use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestorSettings {
    /// Domain or IP of the indexing system. Mandatory.
    pub indexer_url: String,
    /// Indexing-system account. Mandatory.
    pub indexer_user: String,
    /// Indexing-system account password. Mandatory.
    pub indexer_pass: String,
    /// Named event-collector endpoint, when the backend uses one.
    #[serde(default)]
    pub hec_name: Option<String>,
    /// Indexing-system management port.
    #[serde(default = "default_management_port")]
    pub management_port: u16,
    /// Contact the indexing system over TLS.
    #[serde(default = "default_use_ssl")]
    pub use_ssl: bool,
    /// Verify the indexing system's TLS certificate.
    #[serde(default)]
    pub verify_ssl: bool,
    #[serde(default)]
    pub http_proxy: Option<String>,
    #[serde(default)]
    pub https_proxy: Option<String>,
    /// Full path of the parser-binary configuration file. Mandatory.
    pub parser_config_file: PathBuf,
}

fn default_management_port() -> u16 {
    8089
}

fn default_use_ssl() -> bool {
    true
}

/// Proxy endpoints forwarded to the ingestor as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProxySettings {
    pub http: Option<String>,
    pub https: Option<String>,
}

impl IngestorSettings {
    pub fn validate(&self) -> Result<(), ImportError> {
        if self.indexer_url.trim().is_empty() {
            return Err(ImportError::IngestorConfiguration(
                "indexer_url must not be empty".to_string(),
            ));
        }
        if self.indexer_user.trim().is_empty() {
            return Err(ImportError::IngestorConfiguration(
                "indexer_user must not be empty".to_string(),
            ));
        }
        if self.indexer_pass.is_empty() {
            return Err(ImportError::IngestorConfiguration(
                "indexer_pass must not be empty".to_string(),
            ));
        }
        if self.management_port == 0 {
            return Err(ImportError::IngestorConfiguration(
                "management_port must be greater than zero".to_string(),
            ));
        }
        if self.parser_config_file.as_os_str().is_empty() {
            return Err(ImportError::IngestorConfiguration(
                "parser_config_file must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn proxies(&self) -> ProxySettings {
        ProxySettings {
            http: self.http_proxy.clone(),
            https: self.https_proxy.clone(),
        }
    }
}

/// Load and validate settings from a JSON file. Any missing mandatory field
/// or invalid value surfaces here, before batch work starts.
pub fn load_settings(path: impl AsRef<Path>) -> Result<IngestorSettings, ImportError> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).map_err(|err| {
        ImportError::IngestorConfiguration(format!(
            "failed to read settings file {}: {err}",
            path.display()
        ))
    })?;
    let settings: IngestorSettings = serde_json::from_str(&data).map_err(|err| {
        ImportError::IngestorConfiguration(format!(
            "failed to parse settings file {}: {err}",
            path.display()
        ))
    })?;
    settings.validate()?;
    Ok(settings)
}
