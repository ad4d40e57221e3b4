use serde::Serialize;

use crate::archive::CompressionStrategy;

/// Error classification, used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorClass {
    /// Caller supplied something the format cannot represent (bad path, bad date).
    Input,
    /// A format field width was exceeded (16-bit path length, 32-bit sizes).
    Limits,
    /// A produced buffer does not decode back to its inputs.
    Integrity,
    /// Two builds that must be byte-identical were not.
    Determinism,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Stable error codes. These are part of the report/exit contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    // Input
    InputInvalidTimestamp,
    InputInvalidPath,
    InputDuplicatePath,
    InputEmptyArchive,
    InputInvalidConfig,
    // Limits
    LimitPathLength,
    LimitEntrySize,
    LimitEntryCount,
    LimitArchiveSize,
    // Integrity
    IntegrityContentMismatch,
    IntegrityMalformed,
    IntegrityIo,
    // Determinism
    DeterminismDivergence,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Every failure an archive build or verification can surface.
///
/// All variants are construction-time failures: nothing is retried and no
/// partial buffer is ever handed back.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid entry path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("path is {len} bytes, the format allows at most {max}: {path:?}")]
    PathTooLong { path: String, len: usize, max: usize },

    #[error("duplicate entry path: {0:?}")]
    DuplicatePath(String),

    #[error("archive has no entries and the build policy requires at least one")]
    EmptyArchive,

    #[error("invalid verify config: {0}")]
    InvalidConfig(String),

    #[error("entry {path:?} is {size} bytes, larger than a 32-bit size field")]
    EntryTooLarge { path: String, size: u64 },

    #[error("{count} entries exceed the format limit of {max}")]
    TooManyEntries { count: usize, max: usize },

    #[error("archive grew past the 32-bit offset limit ({bytes} bytes)")]
    ArchiveTooLarge { bytes: u64 },

    #[error("divergence between {strategy_a} and {strategy_b}: {fingerprint_a} != {fingerprint_b}")]
    Divergence {
        strategy_a: String,
        strategy_b: String,
        fingerprint_a: String,
        fingerprint_b: String,
    },

    #[error("{strategy} archive does not reproduce entry {path:?}")]
    ContentMismatch {
        strategy: CompressionStrategy,
        path: String,
    },

    #[error("malformed archive at offset {offset}: {reason}")]
    MalformedArchive { offset: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BuildError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidTimestamp(_) => ErrorCode::InputInvalidTimestamp,
            Self::InvalidPath { .. } => ErrorCode::InputInvalidPath,
            Self::DuplicatePath(_) => ErrorCode::InputDuplicatePath,
            Self::EmptyArchive => ErrorCode::InputEmptyArchive,
            Self::InvalidConfig(_) => ErrorCode::InputInvalidConfig,
            Self::PathTooLong { .. } => ErrorCode::LimitPathLength,
            Self::EntryTooLarge { .. } => ErrorCode::LimitEntrySize,
            Self::TooManyEntries { .. } => ErrorCode::LimitEntryCount,
            Self::ArchiveTooLarge { .. } => ErrorCode::LimitArchiveSize,
            Self::ContentMismatch { .. } => ErrorCode::IntegrityContentMismatch,
            Self::MalformedArchive { .. } => ErrorCode::IntegrityMalformed,
            Self::Io(_) => ErrorCode::IntegrityIo,
            Self::Divergence { .. } => ErrorCode::DeterminismDivergence,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self.code() {
            ErrorCode::InputInvalidTimestamp
            | ErrorCode::InputInvalidPath
            | ErrorCode::InputDuplicatePath
            | ErrorCode::InputEmptyArchive
            | ErrorCode::InputInvalidConfig => ErrorClass::Input,
            ErrorCode::LimitPathLength
            | ErrorCode::LimitEntrySize
            | ErrorCode::LimitEntryCount
            | ErrorCode::LimitArchiveSize => ErrorClass::Limits,
            ErrorCode::IntegrityContentMismatch
            | ErrorCode::IntegrityMalformed
            | ErrorCode::IntegrityIo => ErrorClass::Integrity,
            ErrorCode::DeterminismDivergence => ErrorClass::Determinism,
        }
    }

    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Self::MalformedArchive {
            offset,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = BuildError> = std::result::Result<T, E>;
