pub mod command;
pub mod types;

use crate::error::ConvertError;
use std::path::{Path, PathBuf};

pub use command::CommandConverter;
pub use types::ToolDiag;

/// Turns a word-processor file into `<output_dir>/<stem>.pdf`. The format itself is
/// never inspected here.
pub trait DocumentConverter {
    fn diagnose(&self) -> ToolDiag;
    fn convert_document(&self, input: &Path, output_dir: &Path) -> Result<PathBuf, ConvertError>;
}
