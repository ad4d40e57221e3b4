//! Per-entry encoding: one input file becomes a local record (header + data)
//! plus the fields its central directory record needs.

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::str::FromStr;

use super::layout::{
    CENTRAL_HEADER_LEN, CENTRAL_HEADER_SIGNATURE, FLAG_UTF8, LOCAL_HEADER_LEN,
    LOCAL_HEADER_SIGNATURE, MAX_FIELD_U32, MAX_PATH_LEN, METHOD_DEFLATE, METHOD_STORE,
    VERSION_MADE_BY, VERSION_NEEDED_DEFLATE, VERSION_NEEDED_STORE,
};
use crate::checksum::crc32;
use crate::error::{BuildError, Result};
use crate::timestamp::PackedDateTime;

/// Default deflate level (zlib's default).
pub const DEFAULT_DEFLATE_LEVEL: u32 = 6;

/// One file to archive: a flat, forward-slash relative path and its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEntry {
    path: String,
    content: Vec<u8>,
}

impl InputEntry {
    /// Capture a file. The path must be a normalized relative path:
    /// forward slashes, no leading or trailing `/`, no empty, `.` or `..`
    /// segments, no backslashes or NUL bytes.
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Result<Self> {
        let path = path.into();
        validate_path(&path)?;
        Ok(Self {
            path,
            content: content.into(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn into_parts(self) -> (String, Vec<u8>) {
        (self.path, self.content)
    }
}

fn validate_path(path: &str) -> Result<()> {
    let reason = if path.is_empty() {
        Some("empty path")
    } else if path.contains('\\') {
        Some("backslash separator")
    } else if path.contains('\0') {
        Some("NUL byte")
    } else if path.starts_with('/') {
        Some("absolute path")
    } else if path.ends_with('/') {
        Some("directory path")
    } else if path
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        Some("empty, '.' or '..' segment")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(BuildError::InvalidPath {
            path: path.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// How entry content is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionStrategy {
    /// Content verbatim, method 0.
    Store,
    /// Raw deflate stream, method 8. Always method 8, even when the stream
    /// is larger than the content; there is no fallback to `Store`.
    Deflate,
}

impl CompressionStrategy {
    pub const ALL: [CompressionStrategy; 2] = [Self::Store, Self::Deflate];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::Deflate => "deflate",
        }
    }

    pub fn method_code(&self) -> u16 {
        match self {
            Self::Store => METHOD_STORE,
            Self::Deflate => METHOD_DEFLATE,
        }
    }

    pub fn version_needed(&self) -> u16 {
        match self {
            Self::Store => VERSION_NEEDED_STORE,
            Self::Deflate => VERSION_NEEDED_DEFLATE,
        }
    }

    /// Whether two builds with identical inputs must be byte-identical.
    ///
    /// Deflate streams are only required to decode identically; a different
    /// but conformant deflate implementation may emit other bytes.
    pub fn is_byte_deterministic(&self) -> bool {
        matches!(self, Self::Store)
    }
}

impl std::fmt::Display for CompressionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CompressionStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "store" | "stored" => Ok(Self::Store),
            "deflate" | "deflated" => Ok(Self::Deflate),
            other => Err(format!(
                "unknown compression strategy '{}' (expected store or deflate)",
                other
            )),
        }
    }
}

/// Header fields of an encoded entry whose position is not yet known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFields {
    pub path: String,
    pub packed_date_time: PackedDateTime,
    pub crc32: u32,
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    pub compression_method: u16,
    pub version_needed: u16,
    pub flags: u16,
}

impl EntryFields {
    /// Pin the entry to the offset of its local header.
    pub fn placed_at(self, local_header_offset: u32) -> EncodedEntry {
        EncodedEntry {
            path: self.path,
            packed_date_time: self.packed_date_time,
            crc32: self.crc32,
            uncompressed_size: self.uncompressed_size,
            compressed_size: self.compressed_size,
            compression_method: self.compression_method,
            version_needed: self.version_needed,
            flags: self.flags,
            local_header_offset,
        }
    }
}

/// A fully placed entry, as recorded in the central directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedEntry {
    pub path: String,
    pub packed_date_time: PackedDateTime,
    pub crc32: u32,
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    pub compression_method: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub local_header_offset: u32,
}

impl EncodedEntry {
    /// Size of this entry's central directory record.
    pub fn central_record_len(&self) -> usize {
        CENTRAL_HEADER_LEN + self.path.len()
    }

    /// Append the central directory record for this entry.
    pub fn write_central_record(&self, out: &mut Vec<u8>) -> std::io::Result<()> {
        out.write_u32::<LittleEndian>(CENTRAL_HEADER_SIGNATURE)?;
        out.write_u16::<LittleEndian>(VERSION_MADE_BY)?;
        out.write_u16::<LittleEndian>(self.version_needed)?;
        out.write_u16::<LittleEndian>(self.flags)?;
        out.write_u16::<LittleEndian>(self.compression_method)?;
        out.write_u16::<LittleEndian>(self.packed_date_time.time)?;
        out.write_u16::<LittleEndian>(self.packed_date_time.date)?;
        out.write_u32::<LittleEndian>(self.crc32)?;
        out.write_u32::<LittleEndian>(self.compressed_size)?;
        out.write_u32::<LittleEndian>(self.uncompressed_size)?;
        out.write_u16::<LittleEndian>(self.path.len() as u16)?;
        out.write_u16::<LittleEndian>(0)?; // extra field length
        out.write_u16::<LittleEndian>(0)?; // comment length
        out.write_u16::<LittleEndian>(0)?; // disk number start
        out.write_u16::<LittleEndian>(0)?; // internal attributes
        out.write_u32::<LittleEndian>(0)?; // external attributes
        out.write_u32::<LittleEndian>(self.local_header_offset)?;
        out.extend_from_slice(self.path.as_bytes());
        Ok(())
    }
}

/// Output of encoding one entry.
#[derive(Debug, Clone)]
pub struct LocalRecord {
    /// Local header, path and (possibly compressed) content.
    pub bytes: Vec<u8>,
    /// Fields for the central directory record.
    pub fields: EntryFields,
}

/// Encodes single entries. Holds no mutable state, so one encoder can be
/// shared across worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryEncoder {
    deflate_level: u32,
}

impl Default for EntryEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_DEFLATE_LEVEL)
    }
}

impl EntryEncoder {
    /// `deflate_level` is clamped to 0..=9.
    pub fn new(deflate_level: u32) -> Self {
        Self {
            deflate_level: deflate_level.min(9),
        }
    }

    pub fn deflate_level(&self) -> u32 {
        self.deflate_level
    }

    pub fn encode(
        &self,
        entry: &InputEntry,
        packed_date_time: PackedDateTime,
        strategy: CompressionStrategy,
    ) -> Result<LocalRecord> {
        let path = entry.path();
        if path.len() > MAX_PATH_LEN {
            return Err(BuildError::PathTooLong {
                path: truncate_for_display(path),
                len: path.len(),
                max: MAX_PATH_LEN,
            });
        }

        let content = entry.content();
        let uncompressed_size = size_field(path, content.len())?;
        let data = match strategy {
            CompressionStrategy::Store => std::borrow::Cow::Borrowed(content),
            CompressionStrategy::Deflate => std::borrow::Cow::Owned(self.deflate(content)?),
        };
        let compressed_size = size_field(path, data.len())?;

        let flags = if path.is_ascii() { 0 } else { FLAG_UTF8 };
        let fields = EntryFields {
            path: path.to_string(),
            packed_date_time,
            crc32: crc32(content),
            uncompressed_size,
            compressed_size,
            compression_method: strategy.method_code(),
            version_needed: strategy.version_needed(),
            flags,
        };

        let mut bytes = Vec::with_capacity(LOCAL_HEADER_LEN + path.len() + data.len());
        write_local_header(&mut bytes, &fields)?;
        bytes.extend_from_slice(&data);

        tracing::debug!(
            path = %fields.path,
            strategy = %strategy,
            uncompressed = fields.uncompressed_size,
            compressed = fields.compressed_size,
            crc32 = fields.crc32,
            "encoded entry"
        );

        Ok(LocalRecord { bytes, fields })
    }

    fn deflate(&self, content: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = DeflateEncoder::new(
            Vec::with_capacity(content.len() / 2 + 64),
            Compression::new(self.deflate_level),
        );
        encoder.write_all(content)?;
        Ok(encoder.finish()?)
    }
}

/// Encode with the default deflate level.
pub fn encode_entry(
    entry: &InputEntry,
    packed_date_time: PackedDateTime,
    strategy: CompressionStrategy,
) -> Result<LocalRecord> {
    EntryEncoder::default().encode(entry, packed_date_time, strategy)
}

fn write_local_header(out: &mut Vec<u8>, fields: &EntryFields) -> std::io::Result<()> {
    out.write_u32::<LittleEndian>(LOCAL_HEADER_SIGNATURE)?;
    out.write_u16::<LittleEndian>(fields.version_needed)?;
    out.write_u16::<LittleEndian>(fields.flags)?;
    out.write_u16::<LittleEndian>(fields.compression_method)?;
    out.write_u16::<LittleEndian>(fields.packed_date_time.time)?;
    out.write_u16::<LittleEndian>(fields.packed_date_time.date)?;
    out.write_u32::<LittleEndian>(fields.crc32)?;
    out.write_u32::<LittleEndian>(fields.compressed_size)?;
    out.write_u32::<LittleEndian>(fields.uncompressed_size)?;
    out.write_u16::<LittleEndian>(fields.path.len() as u16)?;
    out.write_u16::<LittleEndian>(0)?; // extra field length
    out.extend_from_slice(fields.path.as_bytes());
    Ok(())
}

fn size_field(path: &str, len: usize) -> Result<u32> {
    let len = len as u64;
    if len > MAX_FIELD_U32 {
        return Err(BuildError::EntryTooLarge {
            path: path.to_string(),
            size: len,
        });
    }
    Ok(len as u32)
}

fn truncate_for_display(path: &str) -> String {
    const KEEP: usize = 64;
    if path.len() <= KEEP {
        return path.to_string();
    }
    let mut end = KEEP;
    while !path.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &path[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::encode;
    use flate2::read::DeflateDecoder;
    use std::io::Read;

    fn le16(b: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([b[at], b[at + 1]])
    }

    fn le32(b: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
    }

    #[test]
    fn stored_local_record_layout() {
        let packed = encode(1986, 1, 1, 3, 0, 0).unwrap();
        let entry = InputEntry::new("a.txt", b"AAA".to_vec()).unwrap();
        let rec = encode_entry(&entry, packed, CompressionStrategy::Store).unwrap();
        let b = &rec.bytes;

        assert_eq!(b.len(), LOCAL_HEADER_LEN + 5 + 3);
        assert_eq!(&b[0..4], b"PK\x03\x04");
        assert_eq!(le16(b, 4), VERSION_NEEDED_STORE);
        assert_eq!(le16(b, 6), 0);
        assert_eq!(le16(b, 8), METHOD_STORE);
        assert_eq!(le16(b, 10), 0x1800);
        assert_eq!(le16(b, 12), 0x0C21);
        assert_eq!(le32(b, 14), crc32(b"AAA"));
        assert_eq!(le32(b, 18), 3);
        assert_eq!(le32(b, 22), 3);
        assert_eq!(le16(b, 26), 5);
        assert_eq!(le16(b, 28), 0);
        assert_eq!(&b[30..35], b"a.txt");
        assert_eq!(&b[35..], b"AAA");

        assert_eq!(rec.fields.compressed_size, rec.fields.uncompressed_size);
    }

    #[test]
    fn deflated_record_inflates_to_content() {
        let content = b"abcabcabcabcabcabcabcabcabcabcabcabc".repeat(20);
        let entry = InputEntry::new("dir/file.bin", content.clone()).unwrap();
        let rec = encode_entry(
            &entry,
            encode(2020, 6, 1, 12, 0, 0).unwrap(),
            CompressionStrategy::Deflate,
        )
        .unwrap();

        assert_eq!(rec.fields.compression_method, METHOD_DEFLATE);
        assert_eq!(rec.fields.version_needed, VERSION_NEEDED_DEFLATE);
        assert_eq!(rec.fields.uncompressed_size as usize, content.len());
        assert!((rec.fields.compressed_size as usize) < content.len());

        let data_start = LOCAL_HEADER_LEN + "dir/file.bin".len();
        assert_eq!(
            rec.bytes.len() - data_start,
            rec.fields.compressed_size as usize
        );
        let mut out = Vec::new();
        DeflateDecoder::new(&rec.bytes[data_start..])
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, content);
    }

    #[test]
    fn empty_content_is_encodable_both_ways() {
        let entry = InputEntry::new("empty", Vec::new()).unwrap();
        let packed = encode(1980, 1, 1, 0, 0, 0).unwrap();
        for strategy in CompressionStrategy::ALL {
            let rec = encode_entry(&entry, packed, strategy).unwrap();
            assert_eq!(rec.fields.crc32, 0);
            assert_eq!(rec.fields.uncompressed_size, 0);
        }
    }

    #[test]
    fn utf8_flag_only_for_non_ascii_paths() {
        let packed = encode(1980, 1, 1, 0, 0, 0).unwrap();
        let ascii = InputEntry::new("plain.txt", b"x".to_vec()).unwrap();
        let utf8 = InputEntry::new("caf\u{e9}.txt", b"x".to_vec()).unwrap();
        let a = encode_entry(&ascii, packed, CompressionStrategy::Store).unwrap();
        let u = encode_entry(&utf8, packed, CompressionStrategy::Store).unwrap();
        assert_eq!(a.fields.flags, 0);
        assert_eq!(u.fields.flags, FLAG_UTF8);
        assert_eq!(le16(&u.bytes, 6), FLAG_UTF8);
        assert_eq!(le16(&u.bytes, 26) as usize, "caf\u{e9}.txt".len());
    }

    #[test]
    fn path_length_limit_is_in_bytes() {
        let packed = encode(1980, 1, 1, 0, 0, 0).unwrap();
        let at_limit = InputEntry::new("a".repeat(MAX_PATH_LEN), Vec::new()).unwrap();
        assert!(encode_entry(&at_limit, packed, CompressionStrategy::Store).is_ok());

        let over = InputEntry::new("a".repeat(MAX_PATH_LEN + 1), Vec::new()).unwrap();
        let err = encode_entry(&over, packed, CompressionStrategy::Store).unwrap_err();
        match err {
            BuildError::PathTooLong { len, max, path } => {
                assert_eq!(len, MAX_PATH_LEN + 1);
                assert_eq!(max, MAX_PATH_LEN);
                assert!(path.ends_with("..."));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // 2-byte chars: 32768 * 2 = 65536 bytes
        let wide = InputEntry::new("\u{e9}".repeat(32_768), Vec::new()).unwrap();
        assert!(matches!(
            encode_entry(&wide, packed, CompressionStrategy::Store),
            Err(BuildError::PathTooLong { .. })
        ));
    }

    #[test]
    fn incompressible_content_stays_deflated() {
        let noise: Vec<u8> = (0..512u32)
            .map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8)
            .collect();
        let entry = InputEntry::new("noise.bin", noise.clone()).unwrap();
        let rec = encode_entry(
            &entry,
            encode(1980, 1, 1, 0, 0, 0).unwrap(),
            CompressionStrategy::Deflate,
        )
        .unwrap();
        assert_eq!(rec.fields.compression_method, METHOD_DEFLATE);
        assert_eq!(rec.fields.uncompressed_size as usize, noise.len());
    }

    #[test]
    fn sizes_past_32_bits_are_rejected() {
        assert_eq!(size_field("big.bin", u32::MAX as usize).unwrap(), u32::MAX);
        #[cfg(target_pointer_width = "64")]
        {
            let err = size_field("big.bin", u32::MAX as usize + 1).unwrap_err();
            match err {
                BuildError::EntryTooLarge { path, size } => {
                    assert_eq!(path, "big.bin");
                    assert_eq!(size, 1 << 32);
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_unnormalized_paths() {
        for bad in [
            "", "/abs", "dir/", "a//b", "./a", "a/../b", "..", "win\\path", "nul\0",
        ] {
            let err = InputEntry::new(bad, Vec::new()).unwrap_err();
            assert!(matches!(err, BuildError::InvalidPath { .. }), "{bad:?}");
        }
        assert!(InputEntry::new("nested/dir/file.txt", Vec::new()).is_ok());
        assert!(InputEntry::new(".hidden", Vec::new()).is_ok());
    }

    #[test]
    fn central_record_layout() {
        let entry = EntryFields {
            path: "b.txt".into(),
            packed_date_time: encode(1986, 1, 1, 3, 0, 0).unwrap(),
            crc32: 0xdead_beef,
            uncompressed_size: 2,
            compressed_size: 2,
            compression_method: METHOD_STORE,
            version_needed: VERSION_NEEDED_STORE,
            flags: 0,
        }
        .placed_at(38);

        let mut out = Vec::new();
        entry.write_central_record(&mut out).unwrap();
        assert_eq!(out.len(), entry.central_record_len());
        assert_eq!(out.len(), CENTRAL_HEADER_LEN + 5);
        assert_eq!(&out[0..4], b"PK\x01\x02");
        assert_eq!(le16(&out, 4), VERSION_MADE_BY);
        assert_eq!(le16(&out, 6), VERSION_NEEDED_STORE);
        assert_eq!(le32(&out, 16), 0xdead_beef);
        assert_eq!(le16(&out, 28), 5);
        assert_eq!(le32(&out, 42), 38);
        assert_eq!(&out[46..], b"b.txt");
    }

    #[test]
    fn strategy_names_parse_back() {
        for s in CompressionStrategy::ALL {
            assert_eq!(s.name().parse::<CompressionStrategy>().unwrap(), s);
        }
        assert_eq!(
            "DEFLATED".parse::<CompressionStrategy>().unwrap(),
            CompressionStrategy::Deflate
        );
        assert!("zstd".parse::<CompressionStrategy>().is_err());
        assert!(CompressionStrategy::Store.is_byte_deterministic());
        assert!(!CompressionStrategy::Deflate.is_byte_deterministic());
    }

    #[test]
    fn level_is_clamped() {
        assert_eq!(EntryEncoder::new(42).deflate_level(), 9);
        assert_eq!(EntryEncoder::default().deflate_level(), DEFAULT_DEFLATE_LEVEL);
    }
}
