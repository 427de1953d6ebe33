//! Versioned IES file header.
//!
//! Three layouts share a 92-byte prefix; v2 appends `module_space` and v3
//! appends `module_prefix` on top of that. Offsets follow the packing of the
//! original client structs, padding included:
//!
//! | Offset | Size | Field |
//! |-------:|-----:|-------|
//! | 0   | 64 | idspace |
//! | 64  | 2  | version (i16) |
//! | 66  | 2  | padding |
//! | 68  | 4  | info_size |
//! | 72  | 4  | data_size |
//! | 76  | 4  | total_size |
//! | 80  | 1  | has_class_id |
//! | 81  | 1  | padding |
//! | 82  | 2  | row_count |
//! | 84  | 2  | col_count_total |
//! | 86  | 2  | col_count_number |
//! | 88  | 2  | col_count_strings |
//! | 90  | 2  | padding |
//! | 92  | 64 | module_space (v2, v3) |
//! | 156 | 64 | module_prefix (v3) |

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::column::COLUMN_RECORD_SIZE;
use crate::error::{IesError, Result};

/// Width of every fixed text field in the format.
pub const FIXED_TEXT_LEN: usize = 64;

pub const HEADER_V1_SIZE: usize = 92;
pub const HEADER_V2_SIZE: usize = 156;
pub const HEADER_V3_SIZE: usize = 220;

const VERSION_OFFSET: usize = 64;

/// NUL-padded fixed-width text, stored exactly as on disk.
pub type FixedText = [u8; FIXED_TEXT_LEN];

/// Build a fixed field from raw bytes, truncating to 64 bytes.
pub fn fixed_text(bytes: &[u8]) -> FixedText {
    let mut out = [0u8; FIXED_TEXT_LEN];
    let n = bytes.len().min(FIXED_TEXT_LEN);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

/// The meaningful bytes of a fixed field: everything before the first NUL.
pub fn fixed_text_bytes(field: &FixedText) -> &[u8] {
    let end = field.iter().position(|&b| b == 0).unwrap_or(FIXED_TEXT_LEN);
    &field[..end]
}

pub(crate) fn read_fixed<R: Read>(reader: &mut R) -> io::Result<FixedText> {
    let mut field = [0u8; FIXED_TEXT_LEN];
    reader.read_exact(&mut field)?;
    Ok(field)
}

pub(crate) fn skip<R: Read>(reader: &mut R, n: usize) -> io::Result<()> {
    let mut pad = [0u8; 4];
    reader.read_exact(&mut pad[..n])
}

// ── HeaderVersion ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HeaderVersion {
    V1 = 1,
    V2 = 2,
    V3 = 3,
}

impl HeaderVersion {
    pub fn from_raw(raw: i16) -> Result<Self> {
        match raw {
            1 => Ok(HeaderVersion::V1),
            2 => Ok(HeaderVersion::V2),
            3 => Ok(HeaderVersion::V3),
            _ => Err(IesError::UnsupportedVersion(raw)),
        }
    }

    /// On-disk header size for this layout.
    pub fn header_size(self) -> usize {
        match self {
            HeaderVersion::V1 => HEADER_V1_SIZE,
            HeaderVersion::V2 => HEADER_V2_SIZE,
            HeaderVersion::V3 => HEADER_V3_SIZE,
        }
    }

    /// Smallest layout able to carry the given module fields.
    pub fn for_modules(has_module: bool, has_module_prefix: bool) -> Self {
        if has_module_prefix {
            HeaderVersion::V3
        } else if has_module {
            HeaderVersion::V2
        } else {
            HeaderVersion::V1
        }
    }
}

// ── IesHeader ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct IesHeader {
    pub idspace:           FixedText,
    pub version:           HeaderVersion,
    pub info_size:         u32,
    pub data_size:         u32,
    pub total_size:        u32,
    pub has_class_id:      bool,
    pub row_count:         u16,
    pub col_count_total:   u16,
    pub col_count_number:  u16,
    pub col_count_strings: u16,
    /// Present from v2 on; all zero otherwise.
    pub module_space:      FixedText,
    /// Present in v3 only; all zero otherwise.
    pub module_prefix:     FixedText,
}

impl IesHeader {
    pub fn new(version: HeaderVersion) -> Self {
        Self {
            idspace:           [0u8; FIXED_TEXT_LEN],
            version,
            info_size:         0,
            data_size:         0,
            total_size:        0,
            has_class_id:      false,
            row_count:         0,
            col_count_total:   0,
            col_count_number:  0,
            col_count_strings: 0,
            module_space:      [0u8; FIXED_TEXT_LEN],
            module_prefix:     [0u8; FIXED_TEXT_LEN],
        }
    }

    pub fn header_size(&self) -> usize {
        self.version.header_size()
    }

    /// Read the header from the start of `reader`.
    ///
    /// The v1 prefix is read first to learn the version, then the full layout
    /// for that version is re-read from offset 0.
    pub fn read<R: Read + Seek>(mut reader: R) -> Result<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let mut prefix = [0u8; HEADER_V1_SIZE];
        read_or_corrupt(&mut reader, &mut prefix)?;
        let raw_version = i16::from_le_bytes([prefix[VERSION_OFFSET], prefix[VERSION_OFFSET + 1]]);
        let version = HeaderVersion::from_raw(raw_version)?;

        reader.seek(SeekFrom::Start(0))?;
        let mut buf = vec![0u8; version.header_size()];
        read_or_corrupt(&mut reader, &mut buf)?;
        Ok(Self::parse(&buf, version)?)
    }

    fn parse(buf: &[u8], version: HeaderVersion) -> io::Result<Self> {
        let mut r = buf;
        let idspace = read_fixed(&mut r)?;
        let _version = r.read_i16::<LittleEndian>()?;
        skip(&mut r, 2)?;
        let info_size = r.read_u32::<LittleEndian>()?;
        let data_size = r.read_u32::<LittleEndian>()?;
        let total_size = r.read_u32::<LittleEndian>()?;
        let has_class_id = r.read_u8()? != 0;
        skip(&mut r, 1)?;
        let row_count = r.read_u16::<LittleEndian>()?;
        let col_count_total = r.read_u16::<LittleEndian>()?;
        let col_count_number = r.read_u16::<LittleEndian>()?;
        let col_count_strings = r.read_u16::<LittleEndian>()?;
        skip(&mut r, 2)?;

        let module_space = if version >= HeaderVersion::V2 {
            read_fixed(&mut r)?
        } else {
            [0u8; FIXED_TEXT_LEN]
        };
        let module_prefix = if version >= HeaderVersion::V3 {
            read_fixed(&mut r)?
        } else {
            [0u8; FIXED_TEXT_LEN]
        };

        Ok(Self {
            idspace,
            version,
            info_size,
            data_size,
            total_size,
            has_class_id,
            row_count,
            col_count_total,
            col_count_number,
            col_count_strings,
            module_space,
            module_prefix,
        })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.idspace)?;
        writer.write_i16::<LittleEndian>(self.version as i16)?;
        writer.write_all(&[0u8; 2])?;
        writer.write_u32::<LittleEndian>(self.info_size)?;
        writer.write_u32::<LittleEndian>(self.data_size)?;
        writer.write_u32::<LittleEndian>(self.total_size)?;
        writer.write_u8(self.has_class_id as u8)?;
        writer.write_all(&[0u8; 1])?;
        writer.write_u16::<LittleEndian>(self.row_count)?;
        writer.write_u16::<LittleEndian>(self.col_count_total)?;
        writer.write_u16::<LittleEndian>(self.col_count_number)?;
        writer.write_u16::<LittleEndian>(self.col_count_strings)?;
        writer.write_all(&[0u8; 2])?;
        if self.version >= HeaderVersion::V2 {
            writer.write_all(&self.module_space)?;
        }
        if self.version >= HeaderVersion::V3 {
            writer.write_all(&self.module_prefix)?;
        }
        Ok(())
    }

    /// Check the size invariants against the physical file length.
    pub fn validate(&self, file_size: u64) -> Result<()> {
        let expected_info = COLUMN_RECORD_SIZE as u64 * self.col_count_total as u64;
        if self.info_size as u64 != expected_info {
            return Err(IesError::CorruptHeader(format!(
                "info_size {} does not match {} columns ({} expected)",
                self.info_size, self.col_count_total, expected_info
            )));
        }
        if self.col_count_total as u32 != self.col_count_number as u32 + self.col_count_strings as u32 {
            return Err(IesError::CorruptHeader(format!(
                "col_count_total {} != {} numbers + {} strings",
                self.col_count_total, self.col_count_number, self.col_count_strings
            )));
        }
        let expected_total =
            self.header_size() as u64 + self.info_size as u64 + self.data_size as u64;
        if self.total_size as u64 != expected_total {
            return Err(IesError::CorruptHeader(format!(
                "total_size {} != header + info_size + data_size ({})",
                self.total_size, expected_total
            )));
        }
        if self.total_size as u64 != file_size {
            return Err(IesError::CorruptHeader(format!(
                "total_size {} does not match file size {}",
                self.total_size, file_size
            )));
        }
        Ok(())
    }
}

fn read_or_corrupt<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            IesError::CorruptHeader(format!("file is shorter than the {}-byte header", buf.len()))
        }
        _ => IesError::Io(e),
    })
}
