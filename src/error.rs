use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum FirmsError {
    #[error("unknown region: {0}")]
    #[diagnostic(help("pass a known country name (see `firms-incidents regions`) or --bbox"))]
    UnknownRegion(String),

    #[error("unknown dataset: {0}")]
    #[diagnostic(help("see `firms-incidents datasets` for registered dataset identifiers"))]
    UnknownDataset(String),

    #[error("invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("invalid clustering parameters: {0}")]
    InvalidClusterParams(String),

    #[error("FIRMS request failed: {0}")]
    FirmsHttp(String),

    #[error("FIRMS returned status {status}: {message}")]
    FirmsStatus { status: u16, message: String },

    #[error("FIRMS rejected the request: {0}")]
    FirmsRejected(String),

    #[error("missing required column in FIRMS response: {0}")]
    CsvSchema(String),

    #[error("failed to parse FIRMS response: {0}")]
    CsvParse(String),

    #[error("border geometry unavailable: {0}")]
    BorderGeometry(String),

    #[error("missing FIRMS map key (set FIRMS_MAP_KEY or map_key in the config file)")]
    MissingApiKey,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl FirmsError {
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            FirmsError::FirmsHttp(_) | FirmsError::FirmsStatus { .. } | FirmsError::FirmsRejected(_)
        )
    }

    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            FirmsError::UnknownRegion(_)
                | FirmsError::UnknownDataset(_)
                | FirmsError::InvalidBoundingBox(_)
                | FirmsError::InvalidDate(_)
                | FirmsError::InvalidClusterParams(_)
                | FirmsError::MissingApiKey
        )
    }
}

impl From<csv::Error> for FirmsError {
    fn from(err: csv::Error) -> Self {
        FirmsError::CsvParse(err.to_string())
    }
}
