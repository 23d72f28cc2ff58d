use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use layer_sync::reporter::ReportError;
use layer_sync::{ConsistencyEngine, Report, ReportFormat, Reporter, SchemaLayer, SyncConfig};

/// Looked up in the root when `--config` is not given
const DEFAULT_CONFIG_FILE: &str = "layer-sync.yaml";

#[derive(Parser, Debug)]
#[command(name = "layer-sync", version)]
#[command(about = "Check that DTO, Model and Presenter declarations of a domain stay in sync")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Config file (default: layer-sync.yaml in the root, if present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Project root the discovery conventions are globbed under
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Output format: console, json, yaml or mermaid
    #[arg(long, global = true, default_value = "console", value_parser = parse_format)]
    format: ReportFormat,

    /// Also write the rendered report to this file
    #[arg(long, global = true, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Report fields that exist only in the target layer as warnings
    #[arg(long, global = true)]
    strict: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compare DTO → Model and Model → Presenter, and audit the Mapper
    Validate { domain: String },

    /// List every artifact a field change touches, with the change order
    Impact { domain: String },

    /// Mermaid dependency and change-order diagrams
    Diagram {
        domain: String,
        /// Field to annotate the diagram with
        field: Option<String>,
    },

    /// Files a request for the domain passes through, frontend to backend
    Trace { domain: String },

    /// List the fields extracted from one layer
    Fields {
        domain: String,
        #[arg(long, default_value = "model", value_parser = parse_layer)]
        layer: SchemaLayer,
    },

    /// Compare a baseline copy of the Model file against the current one
    Changes {
        domain: String,
        #[arg(long, value_name = "FILE")]
        baseline: PathBuf,
    },
}

fn parse_format(s: &str) -> Result<ReportFormat, ReportError> {
    s.parse()
}

fn parse_layer(s: &str) -> Result<SchemaLayer, layer_sync::layer::LayerError> {
    s.parse()
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            debug!(error = ?e, "command failed");
            eprintln!("\n❌ Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

/// Run the command; `Ok(false)` means it completed but found problems
async fn run(args: Args) -> anyhow::Result<bool> {
    let config = load_config(&args)?;
    let engine = ConsistencyEngine::from_config(config).context("invalid field mappings")?;
    let reporter = Reporter::new().with_format(args.format);

    let (rendered, passed) = match &args.command {
        Command::Validate { domain } => {
            let report = engine
                .validate(domain)
                .with_context(|| format!("validating domain '{}'", domain))?;
            (reporter.render(Report::Domain(&report))?, report.passed())
        }
        Command::Impact { domain } => {
            let graph = engine
                .impact_concurrently(domain)
                .await
                .with_context(|| format!("discovering artifacts for '{}'", domain))?;
            (reporter.render(Report::Graph(&graph))?, !graph.has_missing_critical())
        }
        Command::Diagram { domain, field } => {
            let graph = engine
                .impact_concurrently(domain)
                .await
                .with_context(|| format!("discovering artifacts for '{}'", domain))?;
            let mut diagram = Reporter::new().with_format(ReportFormat::Mermaid);
            if let Some(field) = field {
                diagram = diagram.with_field(field.clone());
            }
            (diagram.render(Report::Graph(&graph))?, !graph.has_missing_critical())
        }
        Command::Trace { domain } => {
            let flow = engine
                .trace(domain)
                .with_context(|| format!("tracing api flow of '{}'", domain))?;
            (reporter.render(Report::Flow(&flow))?, flow.found())
        }
        Command::Fields { domain, layer } => {
            let schema = engine
                .fields(domain, *layer)
                .with_context(|| format!("reading {} fields of '{}'", layer, domain))?;
            (reporter.render(Report::Fields(&schema))?, true)
        }
        Command::Changes { domain, baseline } => {
            let baseline_text = fs_err::read_to_string(baseline).context("reading baseline")?;
            let analysis = engine
                .changes(domain, &baseline_text)
                .with_context(|| format!("analysing changes of '{}'", domain))?;
            (reporter.render(Report::Changes(&analysis))?, !analysis.has_breaking_changes())
        }
    };

    println!("{}", rendered);

    if let Some(output) = &args.output {
        let path = unique_output_path(output);
        fs_err::write(&path, &rendered)?;
        info!(path = %path.display(), "report written");
        eprintln!("💾 Report saved to: {}", path.display());
    }

    Ok(passed)
}

fn load_config(args: &Args) -> anyhow::Result<SyncConfig> {
    let mut config = match &args.config {
        Some(path) => SyncConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => {
            let root = args.root.clone().unwrap_or_else(|| PathBuf::from("."));
            let candidate = root.join(DEFAULT_CONFIG_FILE);
            if candidate.is_file() {
                SyncConfig::load(&candidate).with_context(|| format!("loading config {}", candidate.display()))?
            } else {
                debug!("no config file, using defaults");
                SyncConfig::default()
            }
        }
    };

    if let Some(root) = &args.root {
        config = config.with_root(root.clone());
    }
    if args.strict {
        config = config.with_strict_extra_fields(true);
    }
    Ok(config)
}

/// `report.md`, or `report-1.md`, `report-2.md`, ... when it already exists
fn unique_output_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());

    let mut count = 0;
    loop {
        count += 1;
        let name = match &extension {
            Some(ext) => format!("{}-{}.{}", stem, count, ext),
            None => format!("{}-{}", stem, count),
        };
        let candidate = path.with_file_name(name);
        if !candidate.exists() {
            return candidate;
        }
    }
}
