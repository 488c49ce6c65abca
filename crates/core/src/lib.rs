pub mod classify;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod hash;
pub mod ingest;
pub mod model;
pub mod registry;
pub mod settings;

pub use classify::build_import_batches;
pub use dispatch::{run_import, ImportDeps, ImportTaskArgs};
pub use error::ImportError;
pub use extract::{ArchiveExtractor, ZipExtractor};
pub use hash::sha256_file;
pub use ingest::{
    default_worker_count, DryRunIngestor, IngestorConfig, LogIngestor, ScriptedIngestor,
};
pub use model::{
    EvidenceRecord, FileKind, ImportBatch, ImportMetrics, ImportResult, StagedFile,
};
pub use registry::{EvidenceRegistry, JsonRegistry, MemoryRegistry};
pub use settings::{load_settings, IngestorSettings, ProxySettings};
