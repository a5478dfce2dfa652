use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileCategory {
    Text,
    Image,
    Document,
    Unsupported,
}

impl FileCategory {
    /// Matches an extension (without the dot) against the fixed table, ignoring case.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "txt" | "md" | "csv" => FileCategory::Text,
            "jpg" | "jpeg" | "png" | "bmp" | "gif" => FileCategory::Image,
            "docx" | "doc" => FileCategory::Document,
            _ => FileCategory::Unsupported,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some(ext) => Self::from_extension(ext),
            None => FileCategory::Unsupported,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    path: PathBuf,
    category: FileCategory,
}

impl InputFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let category = FileCategory::from_path(&path);
        Self { path, category }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn category(&self) -> FileCategory {
        self.category
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Lower-cased extension with a leading dot, or empty.
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
            .unwrap_or_default()
    }

    pub fn output_name(&self) -> String {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{stem}.pdf")
    }
}

/// Regular files directly inside `dir`, sorted by file name. Symlinks are followed;
/// anything whose name matches one of `exclude` is left out.
pub fn scan_dir(dir: &Path, exclude: &[Regex]) -> std::io::Result<Vec<InputFile>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_file = std::fs::metadata(&path).map(|m| m.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if exclude.iter().any(|re| re.is_match(&name)) {
            continue;
        }
        files.push(InputFile::new(path));
    }
    files.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    Ok(files)
}

pub fn compile_excludes(patterns: &[String]) -> Result<Vec<Regex>, regex::Error> {
    patterns.iter().map(|p| Regex::new(p)).collect()
}
