//! Error taxonomy for parsing, validation, repair and analysis.

use std::fmt;
use std::path::PathBuf;

use oncolit_llm::LlmError;
use thiserror::Error;

/// The raw reply could not be decoded as a JSON object, even after fence stripping.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid JSON response: {source} (reply starts with {snippet:?})")]
    InvalidJson {
        snippet: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Expected a JSON object, got {found} (reply starts with {snippet:?})")]
    NotAnObject { snippet: String, found: &'static str },
}

impl ParseError {
    pub fn snippet(&self) -> &str {
        match self {
            ParseError::InvalidJson { snippet, .. } | ParseError::NotAnObject { snippet, .. } => snippet,
        }
    }
}

/// A loosely-typed record failed strict schema construction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl From<serde_json::Error> for ValidationError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(e.to_string())
    }
}

/// The repaired record still failed strict construction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid analysis format even after adding defaults: {second}")]
pub struct UnrecoverableResponseError {
    /// The failure that triggered the repair attempt.
    pub first: ValidationError,
    /// The failure on the repaired record.
    #[source]
    pub second: ValidationError,
}

/// The reply did not follow the requested format.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Unrecoverable(#[from] UnrecoverableResponseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisErrorKind {
    /// Permanent: the model reply could not be turned into a valid analysis.
    InvalidFormat,
    /// The model call itself failed; possibly transient.
    Failed,
}

impl fmt::Display for AnalysisErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AnalysisErrorKind::InvalidFormat => "invalid_format",
            AnalysisErrorKind::Failed => "failed",
        })
    }
}

/// Failure of one single-item analysis.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Invalid analysis format: {0}")]
    InvalidFormat(#[from] FormatError),
    #[error("Analysis failed: {0}")]
    Failed(#[from] LlmError),
}

impl AnalysisError {
    pub fn kind(&self) -> AnalysisErrorKind {
        match self {
            AnalysisError::InvalidFormat(_) => AnalysisErrorKind::InvalidFormat,
            AnalysisError::Failed(_) => AnalysisErrorKind::Failed,
        }
    }

    /// Only model-call failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.kind() == AnalysisErrorKind::Failed
    }
}

impl From<ParseError> for AnalysisError {
    fn from(e: ParseError) -> Self {
        AnalysisError::InvalidFormat(FormatError::Parse(e))
    }
}

impl From<UnrecoverableResponseError> for AnalysisError {
    fn from(e: UnrecoverableResponseError) -> Self {
        AnalysisError::InvalidFormat(FormatError::Unrecoverable(e))
    }
}

/// Failure of a whole gene-literature run. Per-item failures never surface here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Literature search failed: {0:#}")]
    Search(#[source] anyhow::Error),
    #[error("Literature fetch failed: {0:#}")]
    Fetch(#[source] anyhow::Error),
    #[error("Cannot write results to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot serialize results: {0}")]
    Serialize(#[from] serde_json::Error),
}
