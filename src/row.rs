//! Row records: identity fields, numeric array, string array, flag bytes.
//!
//! ```text
//! [class_id: u32]            only when the table has class ids
//! [class_len: u16][class_name bytes]
//! number_count × f64 (or f32 in single-precision mode)
//! string_count × ([len: u16][XOR-obfuscated bytes])
//! string_count × u8          is_script_ref flags
//! ```
//!
//! Decoding is tolerant of a truncated tail: fields that run past the end
//! of the data come back empty instead of failing the file.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use crate::encoding::{EncodingResolver, FallbackChains};
use crate::error::{IesError, Result};
use crate::obfuscation::{deobfuscate, obfuscate_in_place};

/// String values starting with one of these are flagged as script references.
pub const SCRIPT_REF_PREFIXES: [&str; 2] = ["SCP_", "SCR_"];

/// Width of the numeric array entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FloatMode {
    #[default]
    Double,
    Single,
}

impl FloatMode {
    pub fn width(self) -> usize {
        match self {
            FloatMode::Double => 8,
            FloatMode::Single => 4,
        }
    }
}

/// One decoded class record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub class_id:      Option<u32>,
    pub class_name:    Option<String>,
    /// Empty when the row was truncated before its numbers.
    pub numbers:       Vec<f64>,
    /// `None` marks an absent (zero-length) string.
    pub strings:       Vec<Option<String>>,
    pub is_script_ref: Vec<bool>,
}

pub fn is_script_ref(value: &str) -> bool {
    SCRIPT_REF_PREFIXES.iter().any(|p| value.starts_with(p))
}

/// Render a number the way the XML side expects: fixed six decimals with
/// trailing zeros and a trailing point removed (`1.50` → `1.5`, `2.00` → `2`).
pub fn format_number(value: f64) -> String {
    let fixed = format!("{value:.6}");
    if !fixed.contains('.') {
        return fixed;
    }
    fixed.trim_end_matches('0').trim_end_matches('.').to_owned()
}

// ── RowCodec ─────────────────────────────────────────────────────────────────

/// Table-wide parameters needed to read or write a row.
#[derive(Debug, Clone, Copy)]
pub struct RowCodec<'a> {
    pub resolver:     &'a EncodingResolver,
    pub chains:       &'a FallbackChains,
    pub has_class_id: bool,
    pub float_mode:   FloatMode,
    pub number_count: u16,
    pub string_count: u16,
}

impl RowCodec<'_> {
    pub fn read<R: Read>(&self, reader: &mut R) -> Result<Row> {
        let class_id = if self.has_class_id {
            reader.read_u32::<LittleEndian>().ok()
        } else {
            None
        };
        let class_len = reader.read_u16::<LittleEndian>().ok().unwrap_or(0);
        let class_name = if class_len > 0 {
            let raw = read_up_to(reader, class_len as usize)?;
            Some(self.resolver.decode(&raw, &self.chains.class_name, "class name")?)
        } else {
            None
        };

        let width = self.float_mode.width();
        let raw_numbers = read_up_to(reader, width * self.number_count as usize)?;
        let numbers = if raw_numbers.len() == width * self.number_count as usize {
            raw_numbers
                .chunks_exact(width)
                .map(|c| match self.float_mode {
                    FloatMode::Double => f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]),
                    FloatMode::Single => f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64,
                })
                .collect()
        } else {
            Vec::new()
        };

        let mut strings = Vec::with_capacity(self.string_count as usize);
        for slot in 0..self.string_count {
            let len = reader.read_u16::<LittleEndian>().ok().unwrap_or(0);
            if len == 0 {
                strings.push(None);
                continue;
            }
            let raw = deobfuscate(&read_up_to(reader, len as usize)?);
            let field = format!("string slot {slot}");
            strings.push(Some(self.resolver.decode(&raw, &self.chains.string_value, &field)?));
        }

        let mut flags = read_up_to(reader, self.string_count as usize)?;
        flags.resize(self.string_count as usize, 0);
        let is_script_ref = flags.into_iter().map(|b| b != 0).collect();

        Ok(Row { class_id, class_name, numbers, strings, is_script_ref })
    }

    /// Write `row`; missing numbers become `0.0` and missing strings empty.
    pub fn write<W: Write>(&self, writer: &mut W, row: &Row) -> Result<()> {
        if self.has_class_id {
            writer.write_u32::<LittleEndian>(row.class_id.unwrap_or(0))?;
        }
        let class_name = match &row.class_name {
            Some(name) => self.resolver.encode(name, &self.chains.class_name, "class name")?,
            None => Vec::new(),
        };
        writer.write_u16::<LittleEndian>(length_prefix(&class_name, "ClassName")?)?;
        writer.write_all(&class_name)?;

        for i in 0..self.number_count as usize {
            let value = row.numbers.get(i).copied().unwrap_or(0.0);
            match self.float_mode {
                FloatMode::Double => writer.write_f64::<LittleEndian>(value)?,
                FloatMode::Single => writer.write_f32::<LittleEndian>(value as f32)?,
            }
        }

        for i in 0..self.string_count as usize {
            let mut bytes = match row.strings.get(i).and_then(Option::as_deref) {
                Some(s) => self.resolver.encode(s, &self.chains.string_value, "string value")?,
                None => Vec::new(),
            };
            writer.write_u16::<LittleEndian>(length_prefix(&bytes, "string value")?)?;
            obfuscate_in_place(&mut bytes);
            writer.write_all(&bytes)?;
        }

        for i in 0..self.string_count as usize {
            writer.write_u8(row.is_script_ref.get(i).copied().unwrap_or(false) as u8)?;
        }
        Ok(())
    }
}

/// Read `n` bytes, or fewer if the input ends first.
fn read_up_to<R: Read>(reader: &mut R, n: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(n);
    reader.by_ref().take(n as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

fn length_prefix(bytes: &[u8], field: &str) -> Result<u16> {
    u16::try_from(bytes.len()).map_err(|_| IesError::FieldTooLong {
        field: field.to_owned(),
        len:   bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::TextCodec;
    use crate::obfuscation::obfuscate;

    fn codec<'a>(resolver: &'a EncodingResolver, chains: &'a FallbackChains, mode: FloatMode) -> RowCodec<'a> {
        RowCodec {
            resolver,
            chains,
            has_class_id: true,
            float_mode: mode,
            number_count: 2,
            string_count: 2,
        }
    }

    fn sample() -> Row {
        Row {
            class_id:      Some(7),
            class_name:    Some("Sword".into()),
            numbers:       vec![12.5, -3.0],
            strings:       vec![Some("SCR_Attack".into()), None],
            is_script_ref: vec![true, false],
        }
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(2.0), "2");
        assert_eq!(format_number(10.0), "10");
        assert_eq!(format_number(100.0), "100");
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(-0.25), "-0.25");
        assert_eq!(format_number(1.0 / 3.0), "0.333333");
        assert_eq!(format_number(0.0000001), "0");
    }

    #[test]
    fn byte_layout() {
        let resolver = EncodingResolver::new(TextCodec::Utf8);
        let chains = FallbackChains::default();
        let mut buf = Vec::new();
        codec(&resolver, &chains, FloatMode::Double).write(&mut buf, &sample()).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(&7u32.to_le_bytes());
        expected.extend_from_slice(&5u16.to_le_bytes());
        expected.extend_from_slice(b"Sword");
        expected.extend_from_slice(&12.5f64.to_le_bytes());
        expected.extend_from_slice(&(-3.0f64).to_le_bytes());
        expected.extend_from_slice(&10u16.to_le_bytes());
        expected.extend_from_slice(&obfuscate(b"SCR_Attack"));
        expected.extend_from_slice(&0u16.to_le_bytes());
        expected.extend_from_slice(&[1, 0]);
        assert_eq!(buf, expected);
    }

    #[test]
    fn read_back_both_float_modes() {
        let resolver = EncodingResolver::new(TextCodec::Utf8);
        let chains = FallbackChains::default();
        for mode in [FloatMode::Double, FloatMode::Single] {
            let c = codec(&resolver, &chains, mode);
            let mut buf = Vec::new();
            c.write(&mut buf, &sample()).unwrap();
            let row = c.read(&mut &buf[..]).unwrap();
            assert_eq!(row, sample());
        }
    }

    #[test]
    fn truncated_row_degrades() {
        let resolver = EncodingResolver::new(TextCodec::Utf8);
        let chains = FallbackChains::default();
        let c = codec(&resolver, &chains, FloatMode::Double);
        let mut buf = Vec::new();
        c.write(&mut buf, &sample()).unwrap();
        // Cut in the middle of the second double.
        let cut = 4 + 2 + 5 + 12;
        let row = c.read(&mut &buf[..cut]).unwrap();
        assert_eq!(row.class_id, Some(7));
        assert_eq!(row.class_name.as_deref(), Some("Sword"));
        assert!(row.numbers.is_empty());
        assert_eq!(row.strings, vec![None, None]);
        assert_eq!(row.is_script_ref, vec![false, false]);

        let empty = c.read(&mut &[0u8; 0][..]).unwrap();
        assert_eq!(empty.class_id, None);
        assert!(empty.numbers.is_empty());
    }

    #[test]
    fn without_class_id() {
        let resolver = EncodingResolver::new(TextCodec::Utf8);
        let chains = FallbackChains::default();
        let mut c = codec(&resolver, &chains, FloatMode::Double);
        c.has_class_id = false;
        let mut row = sample();
        row.class_id = None;
        let mut buf = Vec::new();
        c.write(&mut buf, &row).unwrap();
        assert_eq!(&buf[..2], &5u16.to_le_bytes());
        assert_eq!(c.read(&mut &buf[..]).unwrap(), row);
    }

    #[test]
    fn script_ref_prefixes() {
        assert!(is_script_ref("SCP_Foo"));
        assert!(is_script_ref("SCR_Bar"));
        assert!(!is_script_ref("scr_bar"));
        assert!(!is_script_ref("Iron Sword"));
    }
}
