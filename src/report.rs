use crate::classify::FileCategory;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::PathBuf;

/// Outcome for one supported input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionResult {
    Success(PathBuf),
    Failure(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub file: String,
    pub category: FileCategory,
    pub status: FileStatus,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub output_sha256: Option<String>,
    #[serde(default)]
    pub pages: Option<usize>,
    #[serde(default)]
    pub reason: Option<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub input_dir: String,
    pub output_dir: String,
    pub started: String,
    pub finished: String,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub files: Vec<FileReport>,
}

impl BatchReport {
    pub fn new(input_dir: String, output_dir: String, started: String) -> Self {
        Self {
            input_dir,
            output_dir,
            started,
            finished: String::new(),
            succeeded: 0,
            failed: 0,
            skipped: 0,
            files: Vec::new(),
        }
    }

    pub fn push(&mut self, file: FileReport) {
        match file.status {
            FileStatus::Succeeded => self.succeeded += 1,
            FileStatus::Failed => self.failed += 1,
            FileStatus::Skipped => self.skipped += 1,
        }
        self.files.push(file);
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|f| f.status == FileStatus::Failed)
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== Conversion Summary ===");
        let _ = writeln!(out, "Output directory: {}", self.output_dir);
        let _ = writeln!(out, "Succeeded: {}", self.succeeded);
        let _ = writeln!(out, "Failed:    {}", self.failed);
        let _ = writeln!(out, "Skipped:   {}", self.skipped);

        let mut failures = self.failures().peekable();
        if failures.peek().is_some() {
            let _ = writeln!(out, "\nFailures:");
            for f in failures {
                let _ = writeln!(
                    out,
                    "  {}: {}",
                    f.file,
                    f.reason.as_deref().unwrap_or("unknown error")
                );
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(file: &str, status: FileStatus, reason: Option<&str>) -> FileReport {
        FileReport {
            file: file.into(),
            category: FileCategory::Text,
            status,
            output: None,
            output_sha256: None,
            pages: None,
            reason: reason.map(String::from),
            elapsed_ms: 0,
        }
    }

    #[test]
    fn counts_and_lists_failures() {
        let mut report = BatchReport::new("in".into(), "out".into(), "t0".into());
        report.push(entry("a.txt", FileStatus::Succeeded, None));
        report.push(entry("b.doc", FileStatus::Failed, Some("boom")));
        report.push(entry("c.xyz", FileStatus::Skipped, Some("unsupported")));

        assert_eq!((report.succeeded, report.failed, report.skipped), (1, 1, 1));
        let text = report.render_text();
        assert!(text.contains("b.doc: boom"));
        assert!(!text.contains("c.xyz"));
    }
}
