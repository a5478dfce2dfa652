pub mod classify;
pub mod cli;
pub mod config;
pub mod converter;
pub mod dispatcher;
pub mod error;
pub mod render;
pub mod report;
pub mod util;

pub use classify::{FileCategory, InputFile};
pub use config::Config;
pub use converter::{CommandConverter, DocumentConverter};
pub use dispatcher::Dispatcher;
pub use error::ConvertError;
pub use report::{BatchReport, ConversionResult};
