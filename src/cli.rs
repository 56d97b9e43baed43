use crate::{
    config::Config,
    engine::{Engine, system::SystemEngine},
    jobs::{JobRunner, JobStatus},
    pipeline::Pipeline,
    policy, probe,
    util::ensure_dir,
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pdf2word")]
#[command(about = "Convert PDFs to Word documents (layout conversion, OCR fallback, table recovery)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./pdf2word.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Report which external tools are reachable.
    Doctor {},
    /// Show the text-layer probe and the route it leads to.
    Classify {
        #[arg(long)]
        input: PathBuf,
    },
    /// Convert one PDF.
    Convert {
        #[arg(long)]
        input: PathBuf,
        /// Defaults to `<paths.out_dir>/<stem>.docx`.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Convert every PDF in a directory.
    Batch {
        #[arg(long)]
        input_dir: PathBuf,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

/// Runs the command and returns the process exit code.
pub fn dispatch(args: Args) -> Result<i32> {
    let cfg = match resolve_config_path(args.config.as_deref()) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };
    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;

    match &args.cmd {
        Command::Doctor {} => doctor(&cfg),
        Command::Classify { input } => classify(&cfg, input),
        Command::Convert { input, output } => convert(&cfg, input, output.as_deref()),
        Command::Batch { input_dir, out_dir } => batch(&cfg, input_dir, out_dir.as_deref()),
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    ["pdf2word.toml", "pdf2word.example.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output, so log lines go to stderr.
    let console_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    Some(PathBuf::from(&cfg.paths.out_dir).join("pdf2word.log"))
}

fn doctor(cfg: &Config) -> Result<i32> {
    let engine = SystemEngine::new(cfg);
    let diag = engine.doctor()?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "tools": engine.tools(),
            "diagnostics": diag,
        }))?
    );
    Ok(0)
}

fn classify(cfg: &Config, input: &Path) -> Result<i32> {
    crate::input::validate_input(cfg, input)?;
    let engine = SystemEngine::new(cfg);
    let probe = probe::probe_pdf(cfg, &engine, input);
    let decision = policy::decide(cfg, &probe);
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "input": input,
            "probe": probe,
            "decision": decision,
        }))?
    );
    Ok(0)
}

fn default_output(out_dir: &Path, input: &Path) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .ok_or_else(|| anyhow!("input has no file name: {}", input.display()))?;
    let mut name = stem.to_os_string();
    name.push(".docx");
    Ok(out_dir.join(name))
}

/// Output paths for a batch, one per input. Inputs whose stems differ only in
/// case or extension get `-2`, `-3`, ... so no two jobs share a destination.
fn batch_outputs(out_dir: &Path, inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut taken = HashSet::new();
    let mut outputs = Vec::with_capacity(inputs.len());
    for input in inputs {
        let base = default_output(out_dir, input)?;
        let mut candidate = base.clone();
        let mut n = 1;
        while !taken.insert(candidate.to_string_lossy().to_lowercase()) {
            n += 1;
            let mut name = input.file_stem().unwrap_or_default().to_os_string();
            name.push(format!("-{n}.docx"));
            candidate = out_dir.join(name);
        }
        if candidate != base {
            warn!(
                "{} collides with another input; writing {}",
                input.display(),
                candidate.display()
            );
        }
        outputs.push(candidate);
    }
    Ok(outputs)
}

fn convert(cfg: &Config, input: &Path, output: Option<&Path>) -> Result<i32> {
    let output = match output {
        Some(p) => p.to_path_buf(),
        None => default_output(Path::new(&cfg.paths.out_dir), input)?,
    };

    let pipeline = Pipeline::new(cfg, SystemEngine::new(cfg));
    let outcome = pipeline.convert(input, &output);

    if cfg.global.print_summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "input": input,
                "output": outcome.output,
                "status": outcome.state,
                "error": outcome.failure.as_ref().map(|f| f.to_string()),
                "route": outcome.report.decision.as_ref().map(|d| d.route),
                "tables_appended": outcome.report.tables.as_ref().map(|t| t.tables_appended),
                "output_bytes": outcome.report.output_bytes,
            }))?
        );
    }
    Ok(if outcome.succeeded() { 0 } else { 1 })
}

fn list_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pdfs = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("read_dir {}", dir.display()))? {
        let path = entry?.path();
        let is_pdf = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if path.is_file() && is_pdf {
            pdfs.push(path);
        }
    }
    pdfs.sort();
    Ok(pdfs)
}

fn batch(cfg: &Config, input_dir: &Path, out_dir: Option<&Path>) -> Result<i32> {
    let inputs = list_pdfs(input_dir)?;
    if inputs.is_empty() {
        warn!("no PDF files found in {}", input_dir.display());
        return Ok(0);
    }

    let out_dir = out_dir
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.out_dir));
    ensure_dir(&out_dir)?;

    let runner = JobRunner::new(Pipeline::new(cfg, SystemEngine::new(cfg)));
    let poll = Duration::from_millis(cfg.global.poll_interval_ms.max(10));
    let max_parallel = cfg.global.max_parallel_jobs.max(1);

    let outputs = batch_outputs(&out_dir, &inputs)?;
    let mut ids = Vec::new();
    let mut rejected = Vec::new();
    for (input, output) in inputs.iter().zip(&outputs) {
        while runner.active_count() >= max_parallel {
            std::thread::sleep(poll);
        }
        match runner.submit(input, output) {
            Ok(id) => ids.push(id),
            Err(err) => {
                warn!("skipping {}: {err:#}", input.display());
                rejected.push(serde_json::json!({
                    "input": input,
                    "error": format!("{err:#}"),
                }));
            }
        }
    }

    let views = runner.wait(&ids, poll);
    let failed = views
        .iter()
        .filter(|v| v.status == JobStatus::Failed)
        .count();
    info!(
        "batch finished: {} jobs, {} failed, {} rejected",
        views.len(),
        failed,
        rejected.len()
    );

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "jobs": views,
            "rejected": rejected,
        }))?
    );
    Ok(if failed == 0 && rejected.is_empty() { 0 } else { 1 })
}
