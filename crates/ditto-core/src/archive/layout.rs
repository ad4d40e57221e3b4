//! Fixed ZIP record layout: signatures, sizes and field widths.
//!
//! Only the classic (non-ZIP64) layout is produced. All integers are
//! little-endian.

/// Local file header signature (`PK\x03\x04`).
pub const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;
/// Central directory file header signature (`PK\x01\x02`).
pub const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;
/// End of central directory signature (`PK\x05\x06`).
pub const EOCD_SIGNATURE: u32 = 0x0605_4b50;

/// Local file header size without the variable path.
pub const LOCAL_HEADER_LEN: usize = 30;
/// Central directory record size without the variable path.
pub const CENTRAL_HEADER_LEN: usize = 46;
/// End of central directory record size (no comment).
pub const EOCD_LEN: usize = 22;

/// "Version made by": spec 2.0, MS-DOS host, so no Unix mode bits are implied.
pub const VERSION_MADE_BY: u16 = 20;
/// Minimum version to extract a stored entry.
pub const VERSION_NEEDED_STORE: u16 = 10;
/// Minimum version to extract a deflated entry.
pub const VERSION_NEEDED_DEFLATE: u16 = 20;

/// General purpose bit 11: file name is UTF-8.
pub const FLAG_UTF8: u16 = 1 << 11;

pub const METHOD_STORE: u16 = 0;
pub const METHOD_DEFLATE: u16 = 8;

/// Path length is a 16-bit field.
pub const MAX_PATH_LEN: usize = u16::MAX as usize;
/// Entry counts in the EOCD are 16-bit fields.
pub const MAX_ENTRIES: usize = u16::MAX as usize;
/// Sizes and offsets are 32-bit fields.
pub const MAX_FIELD_U32: u64 = u32::MAX as u64;
