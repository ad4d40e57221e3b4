use byteorder::{LittleEndian, WriteBytesExt};
use rayon::prelude::*;
use std::collections::HashSet;

use super::entry::{
    CompressionStrategy, EncodedEntry, EntryEncoder, InputEntry, LocalRecord,
    DEFAULT_DEFLATE_LEVEL,
};
use super::layout::{EOCD_LEN, EOCD_SIGNATURE, MAX_ENTRIES, MAX_FIELD_U32};
use crate::checksum::Fingerprint;
use crate::error::{BuildError, Result};
use crate::timestamp::ArchiveTimestamp;

/// Build policy for a single archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssembleOptions {
    /// Deflate level for `CompressionStrategy::Deflate` (0..=9).
    pub deflate_level: u32,
    /// Encode entries on the rayon pool. Output bytes are unaffected.
    pub parallel: bool,
    /// Fail with `EmptyArchive` instead of producing an EOCD-only archive.
    pub require_entries: bool,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            deflate_level: DEFAULT_DEFLATE_LEVEL,
            parallel: false,
            require_entries: false,
        }
    }
}

/// A finished archive. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveBuffer {
    bytes: Vec<u8>,
    entries: Vec<EncodedEntry>,
    strategy: CompressionStrategy,
}

impl ArchiveBuffer {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when the archive holds no entries. The byte buffer itself is
    /// never empty: it always ends in the 22-byte EOCD record.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Central directory entries, in archive order.
    pub fn entries(&self) -> &[EncodedEntry] {
        &self.entries
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn strategy(&self) -> CompressionStrategy {
        self.strategy
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.bytes)
    }
}

impl AsRef<[u8]> for ArchiveBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Deterministic ZIP assembler.
///
/// Entries are written in exactly the order given. Ordering is the caller's
/// responsibility (see [`sorted_entries`]); the assembler never reorders.
///
/// # Layout
///
/// 1. One local record (header, path, data) per entry, in input order
/// 2. One central directory record per entry, pointing back at (1)
/// 3. The end-of-central-directory record
///
/// No field depends on the host: no clock, no uid/gid, no mode bits, no
/// extra fields, no comment.
#[derive(Debug, Clone, Copy, Default)]
pub struct Assembler {
    options: AssembleOptions,
}

impl Assembler {
    pub fn new(options: AssembleOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &AssembleOptions {
        &self.options
    }

    /// Build one archive.
    ///
    /// # Errors
    ///
    /// - `EmptyArchive` if there are no entries and the policy requires some
    /// - `TooManyEntries` past 65535 entries
    /// - `DuplicatePath` if two entries share a path (checked before encoding)
    /// - `PathTooLong` / `EntryTooLarge` from the entry encoder
    /// - `ArchiveTooLarge` if an offset no longer fits in 32 bits
    pub fn assemble(
        &self,
        entries: &[InputEntry],
        timestamp: &ArchiveTimestamp,
        strategy: CompressionStrategy,
    ) -> Result<ArchiveBuffer> {
        if entries.is_empty() && self.options.require_entries {
            return Err(BuildError::EmptyArchive);
        }
        if entries.len() > MAX_ENTRIES {
            return Err(BuildError::TooManyEntries {
                count: entries.len(),
                max: MAX_ENTRIES,
            });
        }
        ensure_unique_paths(entries)?;

        let packed = timestamp.pack();
        let encoder = EntryEncoder::new(self.options.deflate_level);

        // Compression is the expensive, order-independent part. Offsets are
        // assigned afterwards, sequentially, in caller order.
        let records: Vec<LocalRecord> = if self.options.parallel {
            entries
                .par_iter()
                .map(|e| encoder.encode(e, packed, strategy))
                .collect::<Result<_>>()?
        } else {
            entries
                .iter()
                .map(|e| encoder.encode(e, packed, strategy))
                .collect::<Result<_>>()?
        };

        let local_len: usize = records.iter().map(|r| r.bytes.len()).sum();
        let central_len: usize = records
            .iter()
            .map(|r| super::layout::CENTRAL_HEADER_LEN + r.fields.path.len())
            .sum();
        let mut buf = Vec::with_capacity(local_len + central_len + EOCD_LEN);

        let mut placed = Vec::with_capacity(records.len());
        for record in records {
            let offset = offset_field(buf.len())?;
            buf.extend_from_slice(&record.bytes);
            placed.push(record.fields.placed_at(offset));
        }

        let cd_offset = offset_field(buf.len())?;
        for entry in &placed {
            entry.write_central_record(&mut buf)?;
        }
        let cd_size = offset_field(buf.len() - cd_offset as usize)?;

        write_eocd(&mut buf, placed.len() as u16, cd_size, cd_offset)?;

        tracing::info!(
            strategy = %strategy,
            entries = placed.len(),
            bytes = buf.len(),
            timestamp = %timestamp,
            "assembled archive"
        );

        Ok(ArchiveBuffer {
            bytes: buf,
            entries: placed,
            strategy,
        })
    }
}

/// Build one archive with default options.
pub fn assemble(
    entries: &[InputEntry],
    timestamp: &ArchiveTimestamp,
    strategy: CompressionStrategy,
) -> Result<ArchiveBuffer> {
    Assembler::default().assemble(entries, timestamp, strategy)
}

/// Stable lexicographic (byte-wise) ordering by path.
pub fn sorted_entries(mut entries: Vec<InputEntry>) -> Vec<InputEntry> {
    entries.sort_by(|a, b| a.path().as_bytes().cmp(b.path().as_bytes()));
    entries
}

fn ensure_unique_paths(entries: &[InputEntry]) -> Result<()> {
    let mut seen = HashSet::with_capacity(entries.len());
    for entry in entries {
        if !seen.insert(entry.path()) {
            return Err(BuildError::DuplicatePath(entry.path().to_string()));
        }
    }
    Ok(())
}

fn offset_field(len: usize) -> Result<u32> {
    let len = len as u64;
    if len > MAX_FIELD_U32 {
        return Err(BuildError::ArchiveTooLarge { bytes: len });
    }
    Ok(len as u32)
}

fn write_eocd(out: &mut Vec<u8>, count: u16, cd_size: u32, cd_offset: u32) -> std::io::Result<()> {
    out.write_u32::<LittleEndian>(EOCD_SIGNATURE)?;
    out.write_u16::<LittleEndian>(0)?; // this disk
    out.write_u16::<LittleEndian>(0)?; // disk with central directory
    out.write_u16::<LittleEndian>(count)?; // entries on this disk
    out.write_u16::<LittleEndian>(count)?; // entries total
    out.write_u32::<LittleEndian>(cd_size)?;
    out.write_u32::<LittleEndian>(cd_offset)?;
    out.write_u16::<LittleEndian>(0)?; // comment length
    Ok(())
}
