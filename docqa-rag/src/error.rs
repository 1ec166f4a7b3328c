//! Error types for the `docqa-rag` crate.

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while ingesting a source or answering a query.
#[derive(Debug, Error)]
pub enum RagError {
    /// The ingestion request or a chunking parameter was malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Extraction succeeded mechanically but produced no usable text.
    #[error("No text extracted: {0}")]
    NoTextExtracted(String),

    /// A vector did not have the dimension the index expects.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The dimension of the index (or of the first vector).
        expected: usize,
        /// The offending dimension.
        actual: usize,
    },

    /// A query arrived before any source was ingested.
    #[error("No corpus loaded; ingest a document or URL first")]
    EmptyCorpus,

    /// An index was built from an empty set of vectors.
    #[error("Cannot build an index from zero vectors")]
    EmptyInput,

    /// An index was searched before it was built.
    #[error("Index has not been built")]
    NotBuilt,

    /// The number of segments and the number of indexed vectors disagree.
    #[error("Corpus mismatch: {segments} segments but {vectors} vectors")]
    CorpusMismatch {
        /// Number of segments in the corpus.
        segments: usize,
        /// Number of vectors in the index.
        vectors: usize,
    },

    /// The language model call failed.
    #[error("Generation error ({provider}): {message}")]
    Generation {
        /// The generator that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The extractor failed to decode the source.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// An index file was truncated, corrupt, or written by something else.
    #[error("Invalid index file: {0}")]
    IndexFormat(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A filesystem operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Stable, machine-readable classification of a [`RagError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    NoTextExtracted,
    DimensionMismatch,
    EmptyCorpus,
    EmptyInput,
    NotBuilt,
    CorpusMismatch,
    Generation,
    Embedding,
    Extraction,
    IndexFormat,
    Config,
    Io,
}

impl ErrorKind {
    /// The snake_case name used in serialized reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::NoTextExtracted => "no_text_extracted",
            Self::DimensionMismatch => "dimension_mismatch",
            Self::EmptyCorpus => "empty_corpus",
            Self::EmptyInput => "empty_input",
            Self::NotBuilt => "not_built",
            Self::CorpusMismatch => "corpus_mismatch",
            Self::Generation => "generation",
            Self::Embedding => "embedding",
            Self::Extraction => "extraction",
            Self::IndexFormat => "index_format",
            Self::Config => "config",
            Self::Io => "io",
        }
    }
}

impl RagError {
    /// Classify this error for transport-level translation.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::NoTextExtracted(_) => ErrorKind::NoTextExtracted,
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Self::EmptyCorpus => ErrorKind::EmptyCorpus,
            Self::EmptyInput => ErrorKind::EmptyInput,
            Self::NotBuilt => ErrorKind::NotBuilt,
            Self::CorpusMismatch { .. } => ErrorKind::CorpusMismatch,
            Self::Generation { .. } => ErrorKind::Generation,
            Self::Embedding { .. } => ErrorKind::Embedding,
            Self::Extraction(_) => ErrorKind::Extraction,
            Self::IndexFormat(_) => ErrorKind::IndexFormat,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether the failure was caused by the caller rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidInput | ErrorKind::NoTextExtracted | ErrorKind::EmptyCorpus
        )
    }
}

/// A structured failure (kind + message) handed to the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&RagError> for ErrorReport {
    fn from(err: &RagError) -> Self {
        Self { kind: err.kind(), message: err.to_string() }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
