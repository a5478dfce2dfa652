use crate::{
    config::Config,
    converter::{CommandConverter, DocumentConverter},
    dispatcher::Dispatcher,
    util::ensure_dir,
};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::MakeWriter, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt,
    EnvFilter, Layer,
};

const DEFAULT_CONFIG: &str = "pdfify.toml";

#[derive(Parser, Debug)]
#[command(name = "pdfify")]
#[command(about = "Convert every text, image and word-processor file in a directory to PDF")]
pub struct Args {
    /// Defaults to `run`.
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// Path to config TOML. If omitted, uses ./pdfify.toml if present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Directory to convert (default: current directory).
    #[arg(long, global = true)]
    pub input_dir: Option<PathBuf>,

    /// Where PDFs are written (default: <input-dir>/pdf_output).
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Print the summary as JSON.
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum Command {
    /// Convert all supported files.
    Run {},
    /// Show how each file would be handled, without converting.
    Classify {},
    /// Check that the document converter is installed.
    Doctor {},
}

pub fn dispatch(args: Args) -> Result<()> {
    let mut cfg = load_config(args.config.as_deref())?;
    apply_overrides(&args, &mut cfg);

    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;

    let dispatcher = Dispatcher::new(
        &cfg,
        cfg.input_dir(),
        cfg.output_dir(),
        CommandConverter::new(&cfg),
    );

    match args.cmd.unwrap_or(Command::Run {}) {
        Command::Run {} => run(&cfg, &dispatcher),
        Command::Classify {} => classify(&dispatcher),
        Command::Doctor {} => doctor(&dispatcher),
    }
}

fn load_config(user: Option<&Path>) -> Result<Config> {
    if let Some(p) = user {
        return Config::load(p);
    }
    let default = PathBuf::from(DEFAULT_CONFIG);
    if default.exists() {
        Config::load(&default)
    } else {
        Ok(Config::default())
    }
}

fn apply_overrides(args: &Args, cfg: &mut Config) {
    if let Some(dir) = &args.input_dir {
        cfg.paths.input_dir = dir.display().to_string();
    }
    if let Some(dir) = &args.output_dir {
        cfg.paths.output_dir = dir.display().to_string();
    }
    if args.json {
        cfg.output.summary_json = true;
    }
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout is reserved for summaries and listings.
    let stderr_layer = fmt_layer(cfg.logging.json, true, std::io::stderr);

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        (
            Some(fmt_layer(cfg.logging.json, false, non_blocking)),
            Some(guard),
        )
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

/// One event format for every sink; `logging.json` applies to the file too.
fn fmt_layer<S, W>(json: bool, ansi: bool, writer: W) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true);
    if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

/// A relative `logging.file_path` lands in the output directory next to the PDFs.
/// When the input directory is missing the run fails at setup, so the path is
/// left relative to the working directory rather than creating directories.
fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file || cfg.logging.file_path.is_empty() {
        return None;
    }
    let path = PathBuf::from(&cfg.logging.file_path);
    if path.is_absolute() || !cfg.input_dir().is_dir() {
        return Some(path);
    }
    Some(cfg.output_dir().join(path))
}

fn run<C: DocumentConverter>(cfg: &Config, dispatcher: &Dispatcher<C>) -> Result<()> {
    info!(
        "input={} output={}",
        dispatcher.input_dir().display(),
        dispatcher.output_dir().display()
    );
    let report = dispatcher.run()?;

    if cfg.output.write_report_json {
        let path = dispatcher.output_dir().join(&cfg.output.report_filename);
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("writing report: {}", path.display()))?;
    }

    if cfg.output.print_summary {
        if cfg.output.summary_json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print!("{}", report.render_text());
        }
    }

    Ok(())
}

fn classify<C: DocumentConverter>(dispatcher: &Dispatcher<C>) -> Result<()> {
    let files = dispatcher.classify()?;
    let listing: Vec<_> = files
        .iter()
        .map(|f| {
            serde_json::json!({
                "file": f.file_name(),
                "category": f.category(),
                "output": dispatcher.output_dir().join(f.output_name()),
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}

fn doctor<C: DocumentConverter>(dispatcher: &Dispatcher<C>) -> Result<()> {
    let diag = dispatcher.converter().diagnose();
    if !diag.ok {
        warn!(
            "document conversion will not work until `{}` is installed (e.g. sudo apt-get install {})",
            diag.program, diag.program
        );
    }
    println!("{}", serde_json::to_string_pretty(&diag)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logging_to_file(input_dir: &Path, file_path: &str) -> Config {
        let mut cfg = Config::default();
        cfg.paths.input_dir = input_dir.display().to_string();
        cfg.logging.write_to_file = true;
        cfg.logging.file_path = file_path.to_string();
        cfg
    }

    #[test]
    fn log_file_goes_to_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = logging_to_file(dir.path(), "pdfify.log");
        assert_eq!(
            resolve_log_path(&cfg).unwrap(),
            dir.path().join("pdf_output").join("pdfify.log")
        );

        let mut custom = cfg.clone();
        custom.paths.output_dir = dir.path().join("elsewhere").display().to_string();
        assert_eq!(
            resolve_log_path(&custom).unwrap(),
            dir.path().join("elsewhere").join("pdfify.log")
        );
    }

    #[test]
    fn absolute_or_disabled_log_paths() {
        let dir = tempfile::tempdir().unwrap();
        let absolute = dir.path().join("logs").join("run.log");
        let cfg = logging_to_file(dir.path(), &absolute.display().to_string());
        assert_eq!(resolve_log_path(&cfg).unwrap(), absolute);

        let mut off = cfg.clone();
        off.logging.write_to_file = false;
        assert!(resolve_log_path(&off).is_none());
    }

    #[test]
    fn missing_input_dir_keeps_log_path_as_given() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = logging_to_file(&dir.path().join("absent"), "pdfify.log");
        assert_eq!(resolve_log_path(&cfg).unwrap(), PathBuf::from("pdfify.log"));
    }
}
