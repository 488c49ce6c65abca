use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use sysinfo::System;
use tracing_subscriber::EnvFilter;

use evtx_dispatch_core::{
    default_worker_count, load_settings, run_import, sha256_file, DryRunIngestor, ImportDeps,
    ImportResult, ImportTaskArgs, IngestorSettings, JsonRegistry, ZipExtractor,
};
use evtx_dispatch_service::{
    get_import_result, get_import_session, start_import, ImportSessionStatus, TaskArgs,
};

#[derive(Debug, Parser)]
#[command(
    name = "evtx-dispatch",
    version,
    about = "Import Windows event log evidence into a case: classify, deduplicate, extract, ingest."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a full import over a staging directory.
    Import(ImportArgs),
    /// Validate an ingestor settings file.
    Check(CheckArgs),
    /// Print the SHA-256 content hash of a file.
    Hash(HashArgs),
    /// Show environment information and worker defaults.
    Doctor,
}

#[derive(Debug, Args)]
struct ImportArgs {
    /// Staging directory holding the uploaded files.
    #[arg(long, value_name = "DIR")]
    staging: PathBuf,

    /// Case identifier the evidence belongs to.
    #[arg(long)]
    case_id: i64,

    /// Case name used in log lines.
    #[arg(long)]
    case_name: String,

    /// Acting user name.
    #[arg(long)]
    user: String,

    /// Acting user identifier.
    #[arg(long)]
    user_id: i64,

    /// Destination index for ingested events.
    #[arg(long)]
    index: String,

    /// Ingestor settings JSON file.
    #[arg(long, value_name = "FILE")]
    settings: PathBuf,

    /// Evidence registry JSON file (created if missing).
    #[arg(long, value_name = "FILE", default_value = "evidence-registry.json")]
    registry: PathBuf,

    /// Mark this run as an update of existing case evidence.
    #[arg(long)]
    update: bool,

    /// Run the import on a background worker and poll until it finishes.
    #[arg(long)]
    background: bool,

    /// Optional hostname tag forwarded to the ingestor.
    #[arg(long)]
    hostname: Option<String>,

    /// Optional JSON output file for the import result.
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// Ingestor settings JSON file.
    #[arg(long, value_name = "FILE")]
    settings: PathBuf,
}

#[derive(Debug, Args)]
struct HashArgs {
    /// File to hash.
    #[arg(value_name = "FILE")]
    file: PathBuf,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Import(args) => run_import_command(args),
        Commands::Check(args) => run_check_command(args),
        Commands::Hash(args) => run_hash_command(args),
        Commands::Doctor => {
            run_doctor_command();
            Ok(())
        }
    }
}

fn run_import_command(args: ImportArgs) -> Result<()> {
    let settings = load_settings(&args.settings)?;

    let result = if args.background {
        run_background_import(&args, settings)?
    } else {
        run_foreground_import(&args, &settings)?
    };

    for line in &result.logs {
        println!("{line}");
    }
    println!(
        "Run {}: {} | {} batch(es), {} file(s) imported, {} duplicate(s) skipped, {} rejected, {} ms.",
        result.run_id,
        if result.success { "success" } else { "FAILED" },
        result.metrics.batches,
        result.metrics.files_imported,
        result.metrics.duplicates_skipped,
        result.metrics.rejected_files,
        result.metrics.elapsed_ms
    );
    let registry = JsonRegistry::load(&args.registry)?;
    println!(
        "Registry {} now holds {} record(s).",
        args.registry.display(),
        registry.records().len()
    );

    if let Some(output) = args.output {
        let payload =
            serde_json::to_string_pretty(&result).context("failed to serialize import result")?;
        fs::write(&output, payload)
            .with_context(|| format!("failed to write import result to {}", output.display()))?;
        println!("Import result JSON written to {}", output.display());
    }

    if !result.success {
        bail!("import run {} failed", result.run_id);
    }

    Ok(())
}

fn run_foreground_import(args: &ImportArgs, settings: &IngestorSettings) -> Result<ImportResult> {
    let mut registry = JsonRegistry::load(&args.registry)?;
    let mut ingestor = DryRunIngestor::new();

    let task = ImportTaskArgs {
        case_id: args.case_id,
        case_name: args.case_name.clone(),
        user: args.user.clone(),
        user_id: args.user_id,
        staging_path: args.staging.clone(),
        is_update: args.update,
        index: args.index.clone(),
        hostname: args.hostname.clone(),
    };

    let mut deps = ImportDeps {
        registry: &mut registry,
        extractor: &ZipExtractor,
        ingestor: &mut ingestor,
        settings,
    };

    Ok(run_import(&task, &mut deps))
}

fn run_background_import(args: &ImportArgs, settings: IngestorSettings) -> Result<ImportResult> {
    let task = TaskArgs {
        task_id: None,
        case_id: args.case_id,
        case_name: args.case_name.clone(),
        user: args.user.clone(),
        user_id: args.user_id,
        staging_path: args.staging.clone(),
        is_update: args.update,
        index: args.index.clone(),
        hostname: args.hostname.clone(),
    };

    let task_id = start_import(task, settings, args.registry.clone())?;
    println!("Started background import task {task_id}.");

    loop {
        let snapshot = get_import_session(&task_id)?;
        match snapshot.status {
            ImportSessionStatus::Running => thread::sleep(Duration::from_millis(200)),
            ImportSessionStatus::Completed => {
                break get_import_result(&task_id)?
                    .with_context(|| format!("import task {task_id} finished without a result"));
            }
            ImportSessionStatus::Failed => {
                bail!(
                    "import task {task_id} failed: {}",
                    snapshot
                        .error
                        .unwrap_or_else(|| "unknown error".to_string())
                );
            }
        }
    }
}

fn run_check_command(args: CheckArgs) -> Result<()> {
    let settings = load_settings(&args.settings)?;
    let proxies = settings.proxies();

    println!("Settings file {} is valid.", args.settings.display());
    println!(
        "Indexer: {}:{} (ssl={}, verify={})",
        settings.indexer_url, settings.management_port, settings.use_ssl, settings.verify_ssl
    );
    println!("User: {}", settings.indexer_user);
    if let Some(hec_name) = &settings.hec_name {
        println!("HEC token name: {hec_name}");
    }
    println!(
        "Parser config: {}",
        settings.parser_config_file.display()
    );
    match (&proxies.http, &proxies.https) {
        (None, None) => println!("Proxies: none"),
        (http, https) => {
            if let Some(http) = http {
                println!("HTTP proxy: {http}");
            }
            if let Some(https) = https {
                println!("HTTPS proxy: {https}");
            }
        }
    }

    Ok(())
}

fn run_hash_command(args: HashArgs) -> Result<()> {
    let digest = sha256_file(&args.file)?;
    println!("{digest}  {}", args.file.display());
    Ok(())
}

fn run_doctor_command() {
    let mut system = System::new_all();
    system.refresh_all();

    println!(
        "OS: {} {} ({})",
        System::name().unwrap_or_else(|| "unknown".to_string()),
        System::os_version().unwrap_or_else(|| "unknown".to_string()),
        std::env::consts::ARCH
    );
    if let Some(host) = System::host_name() {
        println!("Host: {host}");
    }
    println!("CPUs: {}", system.cpus().len());
    println!("Total memory: {} MiB", system.total_memory() / (1024 * 1024));
    println!("Default ingestor workers: {}", default_worker_count());
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
