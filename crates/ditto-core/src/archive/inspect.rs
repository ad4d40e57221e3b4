//! Structural inspection of archives this crate produced.
//!
//! Used by the verifier to prove a buffer decodes back to its inputs. This is
//! not a general ZIP reader: it accepts only the exact layout the assembler
//! writes (no comment, no extra fields, no data descriptors, contiguous
//! local records) and rejects anything else as malformed.

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::DeflateDecoder;
use std::io::Read;

use super::layout::{
    CENTRAL_HEADER_LEN, CENTRAL_HEADER_SIGNATURE, EOCD_LEN, EOCD_SIGNATURE, LOCAL_HEADER_LEN,
    LOCAL_HEADER_SIGNATURE, METHOD_DEFLATE, METHOD_STORE,
};
use crate::checksum::crc32;
use crate::error::{BuildError, Result};
use crate::timestamp::PackedDateTime;

/// One decoded entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InspectedEntry {
    pub path: String,
    pub method: u16,
    pub packed_date_time: PackedDateTime,
    pub crc32: u32,
    pub content: Vec<u8>,
}

#[derive(Debug)]
struct Eocd {
    count: u16,
    cd_size: u32,
    cd_offset: u32,
}

#[derive(Debug)]
struct CentralRecord {
    version_needed: u16,
    flags: u16,
    method: u16,
    packed: PackedDateTime,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    path: Vec<u8>,
    local_offset: u32,
}

pub(crate) fn inspect(bytes: &[u8]) -> Result<Vec<InspectedEntry>> {
    let eocd_pos = bytes
        .len()
        .checked_sub(EOCD_LEN)
        .ok_or_else(|| BuildError::malformed(0, "shorter than an end-of-central-directory record"))?;
    let eocd = read_eocd(bytes, eocd_pos)?;

    let cd_start = eocd.cd_offset as usize;
    if cd_start + eocd.cd_size as usize != eocd_pos {
        return Err(BuildError::malformed(
            eocd_pos,
            format!(
                "central directory [{}, +{}) does not end at EOCD",
                eocd.cd_offset, eocd.cd_size
            ),
        ));
    }

    let mut pos = cd_start;
    let mut central = Vec::with_capacity(eocd.count as usize);
    for _ in 0..eocd.count {
        let (record, next) = read_central(bytes, pos)?;
        central.push(record);
        pos = next;
    }
    if pos != eocd_pos {
        return Err(BuildError::malformed(
            pos,
            "trailing bytes after central directory",
        ));
    }

    let mut expected_local = 0usize;
    let mut out = Vec::with_capacity(central.len());
    for record in central {
        let local = record.local_offset as usize;
        if local != expected_local {
            return Err(BuildError::malformed(
                local,
                format!("local record expected at offset {}", expected_local),
            ));
        }
        let (entry, next) = read_local(bytes, &record)?;
        out.push(entry);
        expected_local = next;
    }
    if expected_local != cd_start {
        return Err(BuildError::malformed(
            expected_local,
            "gap between last local record and central directory",
        ));
    }

    Ok(out)
}

fn read_eocd(bytes: &[u8], pos: usize) -> Result<Eocd> {
    let mut r = slice(bytes, pos, EOCD_LEN)?;
    let malformed = |reason: &str| BuildError::malformed(pos, reason.to_string());

    if r.read_u32::<LittleEndian>()? != EOCD_SIGNATURE {
        return Err(malformed("missing end-of-central-directory signature"));
    }
    let disk = r.read_u16::<LittleEndian>()?;
    let cd_disk = r.read_u16::<LittleEndian>()?;
    let count_disk = r.read_u16::<LittleEndian>()?;
    let count = r.read_u16::<LittleEndian>()?;
    let cd_size = r.read_u32::<LittleEndian>()?;
    let cd_offset = r.read_u32::<LittleEndian>()?;
    let comment_len = r.read_u16::<LittleEndian>()?;

    if disk != 0 || cd_disk != 0 {
        return Err(malformed("multi-disk archive"));
    }
    if count_disk != count {
        return Err(malformed("per-disk and total entry counts differ"));
    }
    if comment_len != 0 {
        return Err(malformed("archive comment present"));
    }
    Ok(Eocd {
        count,
        cd_size,
        cd_offset,
    })
}

fn read_central(bytes: &[u8], pos: usize) -> Result<(CentralRecord, usize)> {
    let mut r = slice(bytes, pos, CENTRAL_HEADER_LEN)?;
    let malformed = |reason: &str| BuildError::malformed(pos, reason.to_string());

    if r.read_u32::<LittleEndian>()? != CENTRAL_HEADER_SIGNATURE {
        return Err(malformed("missing central directory signature"));
    }
    let _made_by = r.read_u16::<LittleEndian>()?;
    let version_needed = r.read_u16::<LittleEndian>()?;
    let flags = r.read_u16::<LittleEndian>()?;
    let method = r.read_u16::<LittleEndian>()?;
    let time = r.read_u16::<LittleEndian>()?;
    let date = r.read_u16::<LittleEndian>()?;
    let crc = r.read_u32::<LittleEndian>()?;
    let compressed_size = r.read_u32::<LittleEndian>()?;
    let uncompressed_size = r.read_u32::<LittleEndian>()?;
    let path_len = r.read_u16::<LittleEndian>()? as usize;
    let extra_len = r.read_u16::<LittleEndian>()?;
    let comment_len = r.read_u16::<LittleEndian>()?;
    let _disk_start = r.read_u16::<LittleEndian>()?;
    let _internal_attrs = r.read_u16::<LittleEndian>()?;
    let _external_attrs = r.read_u32::<LittleEndian>()?;
    let local_offset = r.read_u32::<LittleEndian>()?;

    if extra_len != 0 || comment_len != 0 {
        return Err(malformed("central record carries extra field or comment"));
    }
    let path = slice(bytes, pos + CENTRAL_HEADER_LEN, path_len)?.to_vec();

    Ok((
        CentralRecord {
            version_needed,
            flags,
            method,
            packed: PackedDateTime { date, time },
            crc32: crc,
            compressed_size,
            uncompressed_size,
            path,
            local_offset,
        },
        pos + CENTRAL_HEADER_LEN + path_len,
    ))
}

fn read_local(bytes: &[u8], central: &CentralRecord) -> Result<(InspectedEntry, usize)> {
    let pos = central.local_offset as usize;
    let mut r = slice(bytes, pos, LOCAL_HEADER_LEN)?;
    let malformed = |reason: &str| BuildError::malformed(pos, reason.to_string());

    if r.read_u32::<LittleEndian>()? != LOCAL_HEADER_SIGNATURE {
        return Err(malformed("missing local header signature"));
    }
    let version_needed = r.read_u16::<LittleEndian>()?;
    let flags = r.read_u16::<LittleEndian>()?;
    let method = r.read_u16::<LittleEndian>()?;
    let time = r.read_u16::<LittleEndian>()?;
    let date = r.read_u16::<LittleEndian>()?;
    let crc = r.read_u32::<LittleEndian>()?;
    let compressed_size = r.read_u32::<LittleEndian>()?;
    let uncompressed_size = r.read_u32::<LittleEndian>()?;
    let path_len = r.read_u16::<LittleEndian>()? as usize;
    let extra_len = r.read_u16::<LittleEndian>()?;

    let header_matches = version_needed == central.version_needed
        && flags == central.flags
        && method == central.method
        && PackedDateTime { date, time } == central.packed
        && crc == central.crc32
        && compressed_size == central.compressed_size
        && uncompressed_size == central.uncompressed_size;
    if !header_matches {
        return Err(malformed("local header disagrees with central directory"));
    }
    if extra_len != 0 {
        return Err(malformed("local header carries extra field"));
    }

    let path_start = pos + LOCAL_HEADER_LEN;
    let path = slice(bytes, path_start, path_len)?;
    if path != central.path.as_slice() {
        return Err(malformed("local path disagrees with central directory"));
    }
    let path = String::from_utf8(path.to_vec()).map_err(|_| malformed("path is not UTF-8"))?;

    let data_start = path_start + path_len;
    let data = slice(bytes, data_start, compressed_size as usize)?;
    let content = match method {
        METHOD_STORE => {
            if compressed_size != uncompressed_size {
                return Err(malformed("stored entry with differing sizes"));
            }
            data.to_vec()
        }
        METHOD_DEFLATE => inflate(data, uncompressed_size)
            .map_err(|e| BuildError::malformed(data_start, format!("inflate failed: {}", e)))?,
        other => {
            return Err(malformed(&format!("unsupported compression method {}", other)));
        }
    };

    if content.len() != uncompressed_size as usize {
        return Err(malformed("decoded size disagrees with header"));
    }
    if crc32(&content) != crc {
        return Err(malformed("CRC-32 mismatch"));
    }

    Ok((
        InspectedEntry {
            path,
            method,
            packed_date_time: PackedDateTime { date, time },
            crc32: crc,
            content,
        },
        data_start + compressed_size as usize,
    ))
}

fn inflate(data: &[u8], expected: u32) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected as usize);
    // Read one byte past the declared size so overlong streams are caught.
    DeflateDecoder::new(data)
        .take(u64::from(expected) + 1)
        .read_to_end(&mut out)?;
    Ok(out)
}

fn slice(bytes: &[u8], pos: usize, len: usize) -> Result<&[u8]> {
    pos.checked_add(len)
        .and_then(|end| bytes.get(pos..end))
        .ok_or_else(|| {
            BuildError::malformed(
                pos,
                format!("truncated: need {} bytes, have {}", len, bytes.len().saturating_sub(pos)),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{assemble, CompressionStrategy, InputEntry};
    use crate::timestamp::ArchiveTimestamp;

    fn sample(strategy: CompressionStrategy) -> Vec<u8> {
        let entries = vec![
            InputEntry::new("a.txt", b"AAA".to_vec()).unwrap(),
            InputEntry::new("docs/b.md", b"# heading\n".repeat(50)).unwrap(),
        ];
        assemble(&entries, &ArchiveTimestamp::DOS_EPOCH, strategy)
            .unwrap()
            .into_bytes()
    }

    #[test]
    fn inspects_both_strategies() {
        for strategy in CompressionStrategy::ALL {
            let entries = inspect(&sample(strategy)).unwrap();
            assert_eq!(entries.len(), 2);
            assert_eq!(entries[0].path, "a.txt");
            assert_eq!(entries[0].content, b"AAA");
            assert_eq!(entries[1].content, b"# heading\n".repeat(50));
            assert_eq!(entries[1].method, strategy.method_code());
            assert_eq!(entries[0].packed_date_time.date, 0x0021);
        }
    }

    #[test]
    fn empty_archive_inspects_to_nothing() {
        let bytes = assemble(&[], &ArchiveTimestamp::DOS_EPOCH, CompressionStrategy::Store)
            .unwrap()
            .into_bytes();
        assert!(inspect(&bytes).unwrap().is_empty());
    }

    #[test]
    fn detects_flipped_content_byte() {
        let mut bytes = sample(CompressionStrategy::Store);
        // first content byte of a.txt: 30-byte header + 5-byte path
        bytes[35] ^= 0xff;
        let err = inspect(&bytes).unwrap_err();
        assert!(matches!(err, BuildError::MalformedArchive { .. }), "{err}");
    }

    #[test]
    fn detects_truncation() {
        let bytes = sample(CompressionStrategy::Deflate);
        assert!(inspect(&bytes[..bytes.len() - 1]).is_err());
        assert!(inspect(&bytes[..10]).is_err());
        assert!(inspect(&[]).is_err());
    }

    #[test]
    fn detects_central_local_disagreement() {
        let mut bytes = sample(CompressionStrategy::Store);
        // method field of the first local header
        bytes[8] = 8;
        assert!(inspect(&bytes).is_err());
    }
}
