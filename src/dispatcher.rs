use crate::{
    classify::{compile_excludes, scan_dir, FileCategory, InputFile},
    config::Config,
    converter::DocumentConverter,
    error::ConvertError,
    render::{render_image, render_text, Rendered},
    report::{BatchReport, ConversionResult, FileReport, FileStatus},
    util::{now_rfc3339, sha256_hex, write_atomic},
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct Dispatcher<C: DocumentConverter> {
    cfg: Config,
    input_dir: PathBuf,
    output_dir: PathBuf,
    converter: C,
}

struct Converted {
    path: PathBuf,
    pages: Option<usize>,
    sha256: String,
}

impl<C: DocumentConverter> Dispatcher<C> {
    pub fn new(
        cfg: &Config,
        input_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        converter: C,
    ) -> Self {
        Self {
            cfg: cfg.clone(),
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            converter,
        }
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn converter(&self) -> &C {
        &self.converter
    }

    /// Lists the input directory without touching the output directory.
    pub fn classify(&self) -> Result<Vec<InputFile>, ConvertError> {
        if !self.input_dir.is_dir() {
            return Err(ConvertError::Setup(format!(
                "input directory does not exist: {}",
                self.input_dir.display()
            )));
        }
        let excludes = compile_excludes(&self.cfg.scan.exclude_patterns)
            .map_err(|e| ConvertError::Setup(format!("invalid scan.exclude_patterns: {e}")))?;
        scan_dir(&self.input_dir, &excludes).map_err(|e| {
            ConvertError::Setup(format!(
                "listing input directory {}: {e}",
                self.input_dir.display()
            ))
        })
    }

    pub fn run(&self) -> Result<BatchReport, ConvertError> {
        let files = self.classify()?;

        if !self.output_dir.is_dir() {
            std::fs::create_dir_all(&self.output_dir).map_err(|e| {
                ConvertError::Setup(format!(
                    "cannot create output directory {}: {e}",
                    self.output_dir.display()
                ))
            })?;
            info!("created output directory: {}", self.output_dir.display());
        }

        let mut report = BatchReport::new(
            self.input_dir.display().to_string(),
            self.output_dir.display().to_string(),
            now_rfc3339(),
        );
        let mut claimed: HashMap<String, String> = HashMap::new();

        info!(
            "found {} file(s) in {}",
            files.len(),
            self.input_dir.display()
        );

        for file in &files {
            let started = Instant::now();
            let name = file.file_name();

            if file.category() == FileCategory::Unsupported {
                let reason = unsupported(file).to_string();
                info!("skipping {name}: {reason}");
                report.push(FileReport {
                    file: name,
                    category: file.category(),
                    status: FileStatus::Skipped,
                    output: None,
                    output_sha256: None,
                    pages: None,
                    reason: Some(reason),
                    elapsed_ms: 0,
                });
                continue;
            }

            let output_name = file.output_name();
            if let Some(previous) = claimed.insert(output_name.clone(), name.clone()) {
                warn!("{name} and {previous} both map to {output_name}; {name} overwrites it");
            }

            info!("converting {name} ({:?}) -> {output_name}", file.category());
            let entry = match self.convert(file) {
                Ok(done) => {
                    info!(
                        "converted {name} pages={:?} sha256={}",
                        done.pages, done.sha256
                    );
                    FileReport {
                        file: name,
                        category: file.category(),
                        status: FileStatus::Succeeded,
                        output: Some(done.path.display().to_string()),
                        output_sha256: Some(done.sha256),
                        pages: done.pages,
                        reason: None,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    }
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!("failed to convert {name}: {err}");
                    FileReport {
                        file: name,
                        category: file.category(),
                        status: FileStatus::Failed,
                        output: None,
                        output_sha256: None,
                        pages: None,
                        reason: Some(err.to_string()),
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    }
                }
            };
            report.push(entry);
        }

        report.finished = now_rfc3339();
        info!(
            "done: succeeded={} failed={} skipped={}",
            report.succeeded, report.failed, report.skipped
        );
        Ok(report)
    }

    /// Converts a single classified file into the output directory.
    pub fn convert_one(&self, file: &InputFile) -> ConversionResult {
        match self.convert(file) {
            Ok(done) => ConversionResult::Success(done.path),
            Err(err) => ConversionResult::Failure(err.to_string()),
        }
    }

    fn convert(&self, file: &InputFile) -> Result<Converted, ConvertError> {
        let target = self.output_dir.join(file.output_name());
        match file.category() {
            FileCategory::Text => self.write_rendered(render_text(file.path(), &self.cfg)?, target),
            FileCategory::Image => {
                self.write_rendered(render_image(file.path(), &self.cfg)?, target)
            }
            FileCategory::Document => {
                let produced = self
                    .converter
                    .convert_document(file.path(), &self.output_dir)?;
                let bytes =
                    std::fs::read(&produced).map_err(|e| ConvertError::read(&produced, e))?;
                let pages = lopdf::Document::load_mem(&bytes)
                    .map(|doc| doc.get_pages().len())
                    .ok();
                Ok(Converted {
                    path: produced,
                    pages,
                    sha256: sha256_hex(&bytes),
                })
            }
            FileCategory::Unsupported => Err(unsupported(file)),
        }
    }

    fn write_rendered(&self, rendered: Rendered, target: PathBuf) -> Result<Converted, ConvertError> {
        debug!(
            "writing {} ({} bytes, {} page(s))",
            target.display(),
            rendered.bytes.len(),
            rendered.pages
        );
        write_atomic(&target, &rendered.bytes)
            .map_err(|e| ConvertError::Render(format!("writing {}: {e}", target.display())))?;
        Ok(Converted {
            sha256: sha256_hex(&rendered.bytes),
            pages: Some(rendered.pages),
            path: target,
        })
    }
}

fn unsupported(file: &InputFile) -> ConvertError {
    let ext = file.extension();
    if ext.is_empty() {
        ConvertError::UnsupportedFormat("no extension".into())
    } else {
        ConvertError::UnsupportedFormat(ext)
    }
}
