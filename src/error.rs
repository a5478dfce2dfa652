use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("render failed: {0}")]
    Render(String),

    #[error("document converter failed: {0}")]
    ExternalTool(String),

    #[error("setup failed: {0}")]
    Setup(String),
}

impl ConvertError {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConvertError::Read {
            path: path.into(),
            source,
        }
    }

    /// Only setup problems stop a batch; everything else is reported per file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConvertError::Setup(_))
    }
}

impl From<lopdf::Error> for ConvertError {
    fn from(err: lopdf::Error) -> Self {
        ConvertError::Render(format!("pdf: {err}"))
    }
}

impl From<image::ImageError> for ConvertError {
    fn from(err: image::ImageError) -> Self {
        ConvertError::Render(format!("image: {err}"))
    }
}
