//! Byte-reproducible ZIP archives and cross-strategy equivalence checks.
//!
//! The crate is pure: callers hand in `(path, bytes)` pairs and a resolved
//! timestamp and get back archive buffers and a `VerificationReport`. Reading
//! and writing files is left to the caller.

pub mod archive;
pub mod checksum;
pub mod config;
pub mod error;
pub mod timestamp;
pub mod verify;

// Convenience re-exports
pub use archive::{
    assemble, sorted_entries, ArchiveBuffer, AssembleOptions, Assembler, CompressionStrategy,
    EncodedEntry, EntryEncoder, InputEntry,
};
pub use checksum::{crc32, Fingerprint};
pub use config::{ConfigError, DivergencePolicy, VerifyConfig, VerifyConfigOverrides};
pub use error::{BuildError, ErrorClass, ErrorCode};
pub use timestamp::{ArchiveTimestamp, PackedDateTime};
pub use verify::{
    verify, EquivalenceVerifier, MatchStatus, OutputArtifact, StrategyRecord, VerificationReport,
};
