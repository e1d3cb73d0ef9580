use std::path::PathBuf;

use crate::gosrc::SourceError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read code generator request: {0}")]
    ReadRequest(#[source] std::io::Error),

    #[error("failed to read descriptor set {}: {source}", path.display())]
    ReadDescriptorSet {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {what}: {source}")]
    DecodeRequest {
        what: &'static str,
        #[source]
        source: prost::DecodeError,
    },

    #[error("no services declared in {file} -- nothing to intercept")]
    NoServices { file: String },

    #[error("failed to parse {}: {source}", path.display())]
    ParseError {
        path: PathBuf,
        #[source]
        source: SourceError,
    },

    #[error("failed to read gateway file {}: {source}", path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write gateway file {}: {source}", path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{failed} of {total} gateway file(s) could not be rewritten")]
    Incomplete { failed: usize, total: usize },

    #[error("{0}")]
    Io(#[from] std::io::Error),
}
