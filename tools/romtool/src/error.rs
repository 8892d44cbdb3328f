//! Error taxonomy shared by every stage of a build.

use std::path::PathBuf;

pub type Result<T, E = RomToolError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum RomToolError {
    /// Bad input catalog: slot out of range, missing key, malformed entry.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Input bytes that don't have the expected shape.
    #[error("format error: {0}")]
    Format(String),

    /// A value that does not fit the field it is written to.
    #[error("encoding error: {0}")]
    Encoding(String),
}

impl RomToolError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
