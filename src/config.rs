use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_OUTPUT_DIR_NAME: &str = "pdf_output";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub scan: Scan,
    #[serde(default)]
    pub page: Page,
    #[serde(default)]
    pub text: Text,
    #[serde(default)]
    pub image: Image,
    #[serde(default)]
    pub document: Document,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    pub fn input_dir(&self) -> PathBuf {
        PathBuf::from(&self.paths.input_dir)
    }

    /// An empty `paths.output_dir` means `<input_dir>/pdf_output`.
    pub fn output_dir(&self) -> PathBuf {
        if self.paths.output_dir.is_empty() {
            self.input_dir().join(DEFAULT_OUTPUT_DIR_NAME)
        } else {
            PathBuf::from(&self.paths.output_dir)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub input_dir: String,
    pub output_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            input_dir: ".".into(),
            output_dir: "".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Scan {
    /// Regexes matched against the bare file name; matches are ignored entirely.
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Page {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
}
impl Default for Page {
    fn default() -> Self {
        // A4 in points.
        Self {
            width: 595.28,
            height: 841.89,
            margin: 36.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Overflow {
    Wrap,
    Clip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Text {
    pub font_size: f32,
    pub line_height: f32,
    pub tab_width: usize,
    pub overflow: Overflow,
}
impl Default for Text {
    fn default() -> Self {
        Self {
            font_size: 11.0,
            line_height: 14.0,
            tab_width: 4,
            overflow: Overflow::Wrap,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageMode {
    /// Use the `[page]` size and fit the image into its printable area.
    Fixed,
    /// Size the page to the image, one point per pixel.
    Image,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    Center,
    TopLeft,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Image {
    pub page_mode: PageMode,
    pub anchor: Anchor,
}
impl Default for Image {
    fn default() -> Self {
        Self {
            page_mode: PageMode::Fixed,
            anchor: Anchor::Center,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    /// `abiword`, `soffice`, or any other executable when `args` is set.
    pub program: String,
    /// Argument template; empty selects the preset for `program`.
    /// Placeholders: `{input}`, `{output}`, `{outdir}`, `{stem}`.
    pub args: Vec<String>,
    pub timeout_seconds: u64,
}
impl Default for Document {
    fn default() -> Self {
        Self {
            program: "abiword".into(),
            args: Vec::new(),
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    pub print_summary: bool,
    pub summary_json: bool,
    pub write_report_json: bool,
    pub report_filename: String,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            print_summary: true,
            summary_json: false,
            write_report_json: false,
            report_filename: "pdfify-report.json".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "pdfify.log".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_dir_defaults_under_input_dir() {
        let mut cfg = Config::default();
        cfg.paths.input_dir = "/data/in".into();
        assert_eq!(cfg.output_dir(), PathBuf::from("/data/in/pdf_output"));

        cfg.paths.output_dir = "/data/out".into();
        assert_eq!(cfg.output_dir(), PathBuf::from("/data/out"));
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let cfg: Config = toml::from_str("[text]\nfont_size = 9.0\n").unwrap();
        assert_eq!(cfg.text.font_size, 9.0);
        assert_eq!(cfg.text.tab_width, 4);
        assert_eq!(cfg.document.program, "abiword");
    }
}
