//! `provenance` - audit derivations for empirical contamination.
//!
//! Exit status is 0 when clean, 2 when the audit is falsified or a dataset
//! fails verification, 1 on error or bad usage.

mod script;

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context as _, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use provenance_config::AuditConfig;
use provenance_monitor::{FalsificationRecord, SystemState};
use provenance_report::{generate, write_report, write_report_json};
use provenance_scanner::{FindingLog, Scanner, blocks_validity};
use provenance_seal::{DataSeal, Prediction, digest_offloaded};
use provenance_store::NodeStore;
use provenance_types::{EmptyStringError, NodeId, NonEmptyString, ReviewStatus};
use provenance_utils::AppendLog;

use crate::script::DerivationScript;

const NODES_LOG: &str = "nodes.jsonl";
const FINDINGS_LOG: &str = "findings.jsonl";
const SEALS_LOG: &str = "seals.jsonl";
const FALSIFICATION_LOG: &str = "falsification.jsonl";

const EXIT_FLAGGED: u8 = 2;

#[derive(Parser)]
#[command(name = "provenance", version)]
#[command(about = "Audit derivations for empirical contamination")]
struct Cli {
    /// Config file (default: $PROVENANCE_CONFIG, else ~/.provenance/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding the logs and reports
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a derivation script, scan it and write the audit report
    Audit {
        /// Derivation script (JSON)
        script: PathBuf,
        /// Re-audit the stored tree ending at this node instead of building
        /// the script's steps
        #[arg(long, value_name = "N<id>")]
        node: Option<NodeId>,
        /// Markdown report path (default: <data-dir>/reports/<output>.md)
        #[arg(long)]
        report: Option<PathBuf>,
        /// Also write the report as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Scan a source file line by line
    ScanSource {
        file: PathBuf,
    },
    /// Seal a dataset file under a name
    Seal {
        dataset: String,
        file: PathBuf,
    },
    /// Check a dataset file against its seal
    Verify {
        dataset: String,
        file: PathBuf,
    },
    /// Commit a prediction before comparing it with data
    Predict {
        name: String,
        #[arg(allow_negative_numbers = true)]
        value: f64,
        /// Node that derives the prediction
        #[arg(long, value_name = "N<id>")]
        node: Option<NodeId>,
    },
    /// Record a comparison and check temporal ordering
    Compare {
        prediction: String,
        dataset: String,
    },
    /// Resolve an open integrity event
    Resolve {
        #[arg(value_parser = parse_event_id)]
        event_id: u64,
        #[arg(long, value_parser = non_empty)]
        actor: NonEmptyString,
        #[arg(long, value_parser = non_empty)]
        reason: NonEmptyString,
    },
    /// Reset a failed falsification criterion
    Reset {
        script: PathBuf,
        criterion: String,
        #[arg(long, value_parser = non_empty)]
        actor: NonEmptyString,
        #[arg(long, value_parser = non_empty)]
        reason: NonEmptyString,
    },
    /// Move a node through its review lifecycle
    Review {
        node: NodeId,
        status: ReviewArg,
        #[arg(long, value_parser = non_empty)]
        actor: NonEmptyString,
    },
    /// Permit a node to use one of its empirical inputs
    Except {
        node: NodeId,
        input: String,
        #[arg(long, value_parser = non_empty)]
        actor: NonEmptyString,
        #[arg(long, value_parser = non_empty)]
        reason: NonEmptyString,
    },
    /// Verify the hash chain of every log
    VerifyLogs,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReviewArg {
    Accepted,
    Flagged,
    Rejected,
}

impl From<ReviewArg> for ReviewStatus {
    fn from(arg: ReviewArg) -> Self {
        match arg {
            ReviewArg::Accepted => Self::Accepted,
            ReviewArg::Flagged => Self::Flagged,
            ReviewArg::Rejected => Self::Rejected,
        }
    }
}

fn non_empty(value: &str) -> Result<NonEmptyString, EmptyStringError> {
    NonEmptyString::new(value)
}

fn parse_event_id(value: &str) -> Result<u64, std::num::ParseIntError> {
    value.trim_start_matches('#').parse()
}

fn init_tracing(data_dir: &Path) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let log_path = data_dir.join("logs").join("provenance.log");
    let opened = log_path
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|()| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
        });

    match opened {
        Ok(file) => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .with(env_filter)
                .init();
            tracing::info!(path = %log_path.display(), "Logging initialized");
        }
        Err(err) => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(env_filter)
                .init();
            tracing::warn!(path = %log_path.display(), "Failed to open log file: {err}");
        }
    }
}

/// Loaded configuration plus the resolved data directory.
struct Workspace {
    config: AuditConfig,
    data_dir: PathBuf,
}

impl Workspace {
    fn log(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    fn node_store(&self) -> Result<NodeStore> {
        let catalog = self.config.axiom_catalog().with_context(|| match self.config.source() {
            Some(path) => format!("axiom catalog in {}", path.display()),
            None => "no config file found; add [[axioms]] to ~/.provenance/config.toml".to_string(),
        })?;
        NodeStore::open(self.log(NODES_LOG), Arc::new(catalog)).context("failed to open node store")
    }

    fn data_seal(&self) -> Result<DataSeal> {
        DataSeal::open(self.log(SEALS_LOG)).context("failed to open seal ledger")
    }

    fn scanner(&self) -> Result<Scanner> {
        Scanner::new(self.config.scan_config()).context("invalid scanner configuration")
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // clap exits with 2 on bad usage, which would read as "flagged".
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return Ok(if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            });
        }
    };

    let config = AuditConfig::load(cli.config.as_deref())?;
    let data_dir = cli
        .data_dir
        .or_else(|| config.data_dir())
        .context("cannot resolve a data directory; pass --data-dir")?;
    init_tracing(&data_dir);
    tracing::debug!(
        config = ?config.source(),
        data_dir = %data_dir.display(),
        "Starting"
    );
    let ws = Workspace { config, data_dir };

    match cli.command {
        Command::Audit {
            script,
            node,
            report,
            json,
        } => audit(&ws, &script, node, report, json.as_deref()),
        Command::ScanSource { file } => scan_source(&ws, &file),
        Command::Seal { dataset, file } => seal(&ws, &dataset, &file).await,
        Command::Verify { dataset, file } => verify(&ws, &dataset, &file).await,
        Command::Predict { name, value, node } => predict(&ws, &name, value, node),
        Command::Compare {
            prediction,
            dataset,
        } => compare(&ws, &prediction, &dataset),
        Command::Resolve {
            event_id,
            actor,
            reason,
        } => resolve(&ws, event_id, actor, reason),
        Command::Reset {
            script,
            criterion,
            actor,
            reason,
        } => reset(&ws, &script, &criterion, actor, reason),
        Command::Review {
            node,
            status,
            actor,
        } => review(&ws, node, status.into(), actor),
        Command::Except {
            node,
            input,
            actor,
            reason,
        } => declare_exception(&ws, node, &input, actor, reason),
        Command::VerifyLogs => verify_logs(&ws),
    }
}

fn read_script(path: &Path) -> Result<DerivationScript> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    DerivationScript::parse(&json).with_context(|| format!("in {}", path.display()))
}

fn audit(
    ws: &Workspace,
    script_path: &Path,
    node: Option<NodeId>,
    report_path: Option<PathBuf>,
    json: Option<&Path>,
) -> Result<ExitCode> {
    let script = read_script(script_path)?;
    let store = ws.node_store()?;
    let tree = match node {
        Some(output) => {
            let tree = store.get_tree(output)?;
            if tree.output_name != script.output {
                bail!(
                    "{output} derives '{}' but {} describes '{}'",
                    tree.output_name,
                    script_path.display(),
                    script.output
                );
            }
            tree
        }
        None => script.build(&store)?,
    };

    let findings = ws.scanner()?.scan(&tree);
    FindingLog::open(ws.log(FINDINGS_LOG))?.record_tree(&tree, &findings)?;

    let snapshot = ws.data_seal()?.snapshot();
    let mut state = SystemState::new().with_findings(findings.iter().cloned());
    if let Some(value) = tree.output_node().and_then(|node| node.numeric_value) {
        state = state
            .with_derived(tree.output_name.as_str(), value)
            .with_prediction(tree.output_name.as_str(), value);
    }
    for (name, measurement) in &script.measurements {
        state = state.with_measurement(name.as_str(), measurement.value, measurement.uncertainty);
    }
    state = state.with_integrity(&snapshot);

    let monitor = script.registry()?.build_at(ws.log(FALSIFICATION_LOG))?;
    let summary = monitor.evaluate_all(&state)?;

    // Predictions derived by other trees are not part of this report.
    let mut scoped = snapshot;
    scoped
        .predictions
        .retain(|p| p.node_id.is_none_or(|node| tree.contains(node)));
    let report = generate(&tree, &findings, &summary, &scoped)?;

    let report_path = report_path.unwrap_or_else(|| {
        ws.data_dir
            .join("reports")
            .join(format!("{}.md", file_stem(&tree.output_name)))
    });
    write_report(&report_path, &report)?;
    if let Some(json) = json {
        write_report_json(json, &report)?;
    }

    println!("{} ({}): {}", tree.output_name, tree.output, report.status.label());
    println!(
        "  nodes: {}  findings: {} ({} critical)",
        report.nodes.len(),
        report.findings.len(),
        report.critical_findings().count()
    );
    for reason in report.status.reasons() {
        println!("  - {reason}");
    }
    println!("  report: {}", report_path.display());

    Ok(if report.status.is_valid() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FLAGGED)
    })
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

fn scan_source(ws: &Workspace, path: &Path) -> Result<ExitCode> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let source = path.display().to_string();
    let findings = ws.scanner()?.scan_source(&source, &text);
    FindingLog::open(ws.log(FINDINGS_LOG))?.record_source(&source, &findings)?;

    for finding in &findings {
        println!(
            "{:8} {:11} {}  {}",
            finding.severity, finding.layer, finding.location, finding.evidence
        );
    }
    println!("{} finding(s)", findings.len());
    Ok(if blocks_validity(&findings) {
        ExitCode::from(EXIT_FLAGGED)
    } else {
        ExitCode::SUCCESS
    })
}

async fn seal(ws: &Workspace, name: &str, path: &Path) -> Result<ExitCode> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let byte_len = bytes.len() as u64;
    let digest = digest_offloaded(bytes).await?;
    let sealed = ws.data_seal()?.seal_digest(name, &digest, byte_len, Utc::now())?;
    println!(
        "sealed {} sha256:{} ({} bytes)",
        sealed.dataset_name, sealed.digest, sealed.byte_len
    );
    Ok(ExitCode::SUCCESS)
}

async fn verify(ws: &Workspace, name: &str, path: &Path) -> Result<ExitCode> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let digest = digest_offloaded(bytes).await?;
    let outcome = ws.data_seal()?.verify_digest(name, &digest)?;
    if outcome.matched {
        println!("{name}: intact");
        return Ok(ExitCode::SUCCESS);
    }
    if let Some(event) = outcome.tamper_event {
        println!(
            "{name}: TAMPERED (event #{}, expected {}, observed {})",
            event.id, event.expected_digest, event.observed_digest
        );
    }
    Ok(ExitCode::from(EXIT_FLAGGED))
}

fn predict(ws: &Workspace, name: &str, value: f64, node: Option<NodeId>) -> Result<ExitCode> {
    let mut prediction = Prediction::new(name, value, Utc::now());
    if let Some(node) = node {
        ws.node_store()?.get(node)?;
        prediction = prediction.derived_by(node);
    }
    ws.data_seal()?.register_prediction(prediction)?;
    println!("registered prediction {name} = {value}");
    Ok(ExitCode::SUCCESS)
}

fn compare(ws: &Workspace, prediction: &str, dataset: &str) -> Result<ExitCode> {
    match ws.data_seal()?.compare(prediction, dataset, Utc::now())? {
        None => {
            println!("{prediction} vs {dataset}: ordering ok");
            Ok(ExitCode::SUCCESS)
        }
        Some(violation) => {
            println!(
                "{prediction} vs {dataset}: TEMPORAL ORDERING VIOLATION (event #{})",
                violation.id
            );
            Ok(ExitCode::from(EXIT_FLAGGED))
        }
    }
}

fn resolve(
    ws: &Workspace,
    id: u64,
    actor: NonEmptyString,
    reason: NonEmptyString,
) -> Result<ExitCode> {
    let event = ws.data_seal()?.resolve(id, reason, actor)?;
    println!("resolved event #{}: {}", event.id(), event.describe());
    Ok(ExitCode::SUCCESS)
}

fn reset(
    ws: &Workspace,
    script: &Path,
    criterion: &str,
    actor: NonEmptyString,
    reason: NonEmptyString,
) -> Result<ExitCode> {
    let script = read_script(script)?;
    let monitor = script.registry()?.build_at(ws.log(FALSIFICATION_LOG))?;
    monitor.reset(criterion, reason, actor)?;
    println!("criterion {criterion} reset to viable");
    Ok(ExitCode::SUCCESS)
}

fn review(
    ws: &Workspace,
    node: NodeId,
    status: ReviewStatus,
    actor: NonEmptyString,
) -> Result<ExitCode> {
    let next = ws.node_store()?.set_review_status(node, status, actor)?;
    println!("{node}: {next}");
    Ok(ExitCode::SUCCESS)
}

fn declare_exception(
    ws: &Workspace,
    node: NodeId,
    input: &str,
    actor: NonEmptyString,
    reason: NonEmptyString,
) -> Result<ExitCode> {
    let exception = ws
        .node_store()?
        .declare_exception(node, input, reason, actor)?;
    println!(
        "{}: empirical input '{}' permitted by {}",
        exception.node_id, exception.input_name, exception.actor
    );
    Ok(ExitCode::SUCCESS)
}

/// Verify every log that exists. Missing logs are reported, not created.
fn verify_logs(ws: &Workspace) -> Result<ExitCode> {
    for name in [NODES_LOG, FINDINGS_LOG, SEALS_LOG, FALSIFICATION_LOG] {
        let path = ws.log(name);
        if !path.exists() {
            println!("{name}: absent");
            continue;
        }
        let count = match name {
            NODES_LOG => ws.node_store()?.verify_log()?,
            FINDINGS_LOG => FindingLog::open(&path)?.verify()?,
            SEALS_LOG => ws.data_seal()?.verify_log()?,
            _ => AppendLog::<FalsificationRecord>::open_read_only(&path)?.verify()?,
        };
        println!("{name}: {count} records intact");
    }
    Ok(ExitCode::SUCCESS)
}
