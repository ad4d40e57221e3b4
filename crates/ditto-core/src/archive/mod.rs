//! Deterministic ZIP encoding.
//!
//! An archive is the standard ZIP layout, written with no host-dependent
//! fields:
//! - one local record (30-byte header + path + data) per entry, in input order
//! - one central directory record (46-byte header + path) per entry
//! - a 22-byte end-of-central-directory record
//!
//! # Modules
//!
//! - [`entry`]: encode a single entry (`EntryEncoder`)
//! - [`assemble`]: order-preserving archive assembly (`Assembler`)
//! - [`layout`]: signatures, record sizes, field limits
//!
//! # Example
//!
//! ```
//! use ditto_core::archive::{assemble, CompressionStrategy, InputEntry};
//! use ditto_core::timestamp::ArchiveTimestamp;
//!
//! let entries = vec![
//!     InputEntry::new("a.txt", b"AAA".to_vec()).unwrap(),
//!     InputEntry::new("b.txt", b"BB".to_vec()).unwrap(),
//! ];
//! let ts: ArchiveTimestamp = "1986-01-01T03:00:00".parse().unwrap();
//! let buf = assemble(&entries, &ts, CompressionStrategy::Store).unwrap();
//! assert_eq!(buf.entry_count(), 2);
//! ```

pub mod assemble;
pub mod entry;
pub(crate) mod inspect;
pub mod layout;

// Re-exports for convenience
pub use assemble::{assemble, sorted_entries, ArchiveBuffer, AssembleOptions, Assembler};
pub use entry::{
    encode_entry, CompressionStrategy, EncodedEntry, EntryEncoder, EntryFields, InputEntry,
    LocalRecord, DEFAULT_DEFLATE_LEVEL,
};
