use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// The five pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CaseStage {
    Ingest,
    Extract,
    CrossReference,
    Assess,
    Assemble,
}

impl fmt::Display for CaseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaseStage::Ingest => "ingest",
            CaseStage::Extract => "extract",
            CaseStage::CrossReference => "cross-reference",
            CaseStage::Assess => "assess",
            CaseStage::Assemble => "assemble",
        };
        f.write_str(name)
    }
}

/// Failure reported by an external oracle (extraction model, risk model, PDF reader).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Oracle rejected the request (status {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Oracle returned an empty response")]
    EmptyResponse,

    #[error("Oracle did not answer within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl OracleError {
    /// Whether a second attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            OracleError::Transport(_) | OracleError::EmptyResponse | OracleError::Timeout { .. } => true,
            OracleError::Rejected { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

#[derive(Error, Debug)]
pub enum CaseBuilderError {
    #[error("Failed to load document {path}: {reason}")]
    Document { path: PathBuf, reason: String },

    #[error("Structural error in {stage} stage, field '{field}': {reason}")]
    Structural {
        stage: CaseStage,
        field: String,
        reason: String,
    },

    #[error("{stage} stage failed after {attempts} attempt(s): {source}")]
    OracleFailed {
        stage: CaseStage,
        attempts: u32,
        #[source]
        source: OracleError,
    },

    #[error("Stage {found} cannot run yet: expected {expected} next")]
    OutOfOrder { expected: CaseStage, found: CaseStage },

    #[error("{stage} stage attempted to overwrite '{field}', which is already set")]
    SlotAlreadyFilled { stage: CaseStage, field: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CaseBuilderError {
    pub fn structural(stage: CaseStage, field: impl Into<String>, reason: impl Into<String>) -> Self {
        CaseBuilderError::Structural {
            stage,
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// The stage that failed, when the error is attributable to one.
    pub fn stage(&self) -> Option<CaseStage> {
        match self {
            CaseBuilderError::Document { .. } => Some(CaseStage::Ingest),
            CaseBuilderError::Structural { stage, .. }
            | CaseBuilderError::OracleFailed { stage, .. }
            | CaseBuilderError::SlotAlreadyFilled { stage, .. } => Some(*stage),
            CaseBuilderError::OutOfOrder { found, .. } => Some(*found),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CaseBuilderError>;
