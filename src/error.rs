use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Clone, Error, Diagnostic)]
pub enum KiraError {
    #[error("invalid GEO accession: {0}")]
    InvalidAccession(String),

    #[error("malformed metadata record {id}: {reason}")]
    MalformedRecord { id: String, reason: String },

    #[error("cannot compute statistics: file tree contains no series")]
    EmptyTree,

    #[error("transfer of {url} failed: {message}")]
    Transfer { url: String, message: String },

    #[error("metadata fetch for {id} failed: {message}")]
    Fetch { id: String, message: String },

    #[error("invalid supplementary file URL: {0}")]
    InvalidUrl(String),

    #[error("parallelism must be at least 1, got {0}")]
    InvalidParallelism(usize),

    #[error("worker pool setup failed: {0}")]
    WorkerPool(String),

    #[error("missing config file kira-geo.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("GEO request failed: {0}")]
    GeoHttp(String),

    #[error("GEO returned status {status}: {message}")]
    GeoStatus { status: u16, message: String },

    #[error("failed to parse SOFT text: {0}")]
    SoftParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
