use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::EvidenceRecord;

/// Persistent store mapping (case, content hash) to an evidence record.
/// The host platform owns the real store; it is assumed to provide its own
/// concurrency safety for the check-then-register sequence.
pub trait EvidenceRegistry {
    fn is_registered(&self, sha256: &str, case_id: i64) -> Result<bool>;
    fn register(&mut self, record: EvidenceRecord) -> Result<()>;
}

/// In-process registry used by tests and as a reference implementation.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    records: Vec<EvidenceRecord>,
    index: HashSet<(i64, String)>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[EvidenceRecord] {
        &self.records
    }
}

impl EvidenceRegistry for MemoryRegistry {
    fn is_registered(&self, sha256: &str, case_id: i64) -> Result<bool> {
        Ok(self.index.contains(&(case_id, sha256.to_string())))
    }

    fn register(&mut self, record: EvidenceRecord) -> Result<()> {
        if self.index.insert((record.case_id, record.sha256.clone())) {
            self.records.push(record);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct RegistryFile {
    #[serde(default)]
    records: Vec<EvidenceRecord>,
}

/// File-backed registry persisting records as pretty JSON. Keeps the CLI
/// usable end-to-end without the host platform's database.
#[derive(Debug)]
pub struct JsonRegistry {
    path: PathBuf,
    records: Vec<EvidenceRecord>,
    index: HashSet<(i64, String)>,
}

impl JsonRegistry {
    /// Open a registry file, creating an empty registry if the file does
    /// not exist yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = if path.exists() {
            let data = fs::read_to_string(&path)
                .with_context(|| format!("failed to read registry {}", path.display()))?;
            let file: RegistryFile = serde_json::from_str(&data)
                .with_context(|| format!("failed to parse registry {}", path.display()))?;
            file.records
        } else {
            Vec::new()
        };

        let index = records
            .iter()
            .map(|record| (record.case_id, record.sha256.clone()))
            .collect();

        Ok(Self {
            path,
            records,
            index,
        })
    }

    pub fn records(&self) -> &[EvidenceRecord] {
        &self.records
    }

    fn persist(&self) -> Result<()> {
        let file = RegistryFile {
            records: self.records.clone(),
        };
        let payload =
            serde_json::to_string_pretty(&file).context("failed to serialize registry")?;
        fs::write(&self.path, payload)
            .with_context(|| format!("failed to write registry {}", self.path.display()))?;
        Ok(())
    }
}

impl EvidenceRegistry for JsonRegistry {
    fn is_registered(&self, sha256: &str, case_id: i64) -> Result<bool> {
        Ok(self.index.contains(&(case_id, sha256.to_string())))
    }

    fn register(&mut self, record: EvidenceRecord) -> Result<()> {
        if self.index.insert((record.case_id, record.sha256.clone())) {
            self.records.push(record);
            self.persist()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::{EvidenceRegistry, JsonRegistry, MemoryRegistry};
    use crate::model::EvidenceRecord;

    fn record(case_id: i64, sha256: &str) -> EvidenceRecord {
        EvidenceRecord {
            filename: "security.evtx".to_string(),
            sha256: sha256.to_string(),
            date_added: "2026-01-01T00:00:00Z".to_string(),
            case_id,
            user_id: 7,
            size_bytes: 1024,
            description: "[auto] evidence file security.evtx".to_string(),
        }
    }

    #[test]
    fn hash_is_unique_per_case() {
        let mut registry = MemoryRegistry::new();
        registry.register(record(1, "aa")).expect("register");
        registry.register(record(1, "aa")).expect("re-register");
        registry.register(record(2, "aa")).expect("other case");

        assert_eq!(registry.records().len(), 2);
        assert!(registry.is_registered("aa", 1).expect("lookup"));
        assert!(registry.is_registered("aa", 2).expect("lookup"));
        assert!(!registry.is_registered("bb", 1).expect("lookup"));
    }

    #[test]
    fn json_registry_round_trips_through_disk() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("registry.json");

        {
            let mut registry = JsonRegistry::load(&path).expect("fresh registry");
            assert!(!registry.is_registered("aa", 1).expect("lookup"));
            registry.register(record(1, "aa")).expect("register");
        }

        let reopened = JsonRegistry::load(&path).expect("reopen");
        assert!(reopened.is_registered("aa", 1).expect("lookup"));
        assert_eq!(reopened.records().len(), 1);
        assert_eq!(reopened.records()[0].filename, "security.evtx");
    }

    #[test]
    fn missing_registry_file_starts_empty() {
        let temp = TempDir::new().expect("tempdir");
        let registry = JsonRegistry::load(temp.path().join("new.json")).expect("load");
        assert!(registry.records().is_empty());
    }
}
