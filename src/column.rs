//! Column descriptor records and per-type index assignment.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::io::{Read, Write};

use crate::encoding::{EncodingResolver, FallbackChain};
use crate::error::{IesError, Result};
use crate::header::{fixed_text, fixed_text_bytes, read_fixed, skip, FIXED_TEXT_LEN};
use crate::obfuscation::{deobfuscate, obfuscate};

/// On-disk size of one column record, trailing padding included.
pub const COLUMN_RECORD_SIZE: usize = 134;

/// Attribute-name prefix marking a static column.
pub const STATIC_PREFIX: &str = "SP_";
/// Attribute-name prefix forcing a CALCULATED column.
pub const CALCULATED_PREFIX: &str = "CP_";

// ── ColumnType ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Number     = 0,
    String     = 1,
    Calculated = 2,
}

impl ColumnType {
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(ColumnType::Number),
            1 => Some(ColumnType::String),
            2 => Some(ColumnType::Calculated),
            _ => None,
        }
    }

    /// Keyword used in `<ClassSchema>`.
    pub fn keyword(self) -> &'static str {
        match self {
            ColumnType::Number     => "NUMBER",
            ColumnType::String     => "STRING",
            ColumnType::Calculated => "CALCULATED",
        }
    }

    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "NUMBER"     => Some(ColumnType::Number),
            "STRING"     => Some(ColumnType::String),
            "CALCULATED" => Some(ColumnType::Calculated),
            _            => None,
        }
    }

    /// STRING and CALCULATED values both live in the string array.
    pub fn is_string(self) -> bool {
        !matches!(self, ColumnType::Number)
    }
}

// ── Column ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Stored name, without the `SP_`/`CP_` marker.
    pub column_name: String,
    /// Attribute name as it appears in XML.
    pub full_name:   String,
    pub col_type:    ColumnType,
    pub is_static:   bool,
    /// Position inside the numeric or the string array of every row.
    pub index:       u16,
}

impl Column {
    /// Describe a column discovered from an XML attribute name.
    pub fn from_attribute(full_name: &str, col_type: ColumnType, index: u16) -> Self {
        let column_name = full_name
            .strip_prefix(STATIC_PREFIX)
            .or_else(|| full_name.strip_prefix(CALCULATED_PREFIX))
            .unwrap_or(full_name);
        Self {
            column_name: column_name.to_owned(),
            full_name:   full_name.to_owned(),
            col_type,
            is_static:   full_name.starts_with(STATIC_PREFIX),
            index,
        }
    }

    pub fn read<R: Read>(
        mut reader: R,
        resolver:   &EncodingResolver,
        chain:      &FallbackChain,
    ) -> Result<Self> {
        let raw_name = read_fixed(&mut reader)?;
        let raw_full = read_fixed(&mut reader)?;
        let raw_type = reader.read_u16::<LittleEndian>()?;
        let is_static = reader.read_u8()? != 0;
        skip(&mut reader, 1)?;
        let index = reader.read_u16::<LittleEndian>()?;

        let column_name = resolver.decode(&deobfuscate(fixed_text_bytes(&raw_name)), chain, "column name")?;
        let full_name = resolver.decode(&deobfuscate(fixed_text_bytes(&raw_full)), chain, "column name")?;
        let col_type = ColumnType::from_raw(raw_type).ok_or_else(|| {
            IesError::CorruptHeader(format!("unknown col_type {raw_type} for column {full_name}"))
        })?;

        Ok(Self { column_name, full_name, col_type, is_static, index })
    }

    pub fn write<W: Write>(
        &self,
        mut writer: W,
        resolver:   &EncodingResolver,
        chain:      &FallbackChain,
    ) -> Result<()> {
        let name = encode_fixed(resolver, chain, &self.column_name)?;
        let full = encode_fixed(resolver, chain, &self.full_name)?;
        writer.write_all(&fixed_text(&obfuscate(&name)))?;
        writer.write_all(&fixed_text(&obfuscate(&full)))?;
        writer.write_u16::<LittleEndian>(self.col_type as u16)?;
        writer.write_u8(self.is_static as u8)?;
        writer.write_all(&[0u8; 1])?;
        writer.write_u16::<LittleEndian>(self.index)?;
        Ok(())
    }
}

/// Encode text for a 64-byte field, rejecting values that would be cut.
pub(crate) fn encode_fixed(resolver: &EncodingResolver, chain: &FallbackChain, text: &str) -> Result<Vec<u8>> {
    let bytes = resolver.encode(text, chain, text)?;
    if bytes.len() > FIXED_TEXT_LEN {
        return Err(IesError::FieldTooLong { field: text.to_owned(), len: bytes.len() });
    }
    Ok(bytes)
}

// ── ColumnTable ──────────────────────────────────────────────────────────────

/// Ordered column set with dense per-group indices.
#[derive(Debug, Clone, Default)]
pub struct ColumnTable {
    columns:      Vec<Column>,
    by_name:      HashMap<String, usize>,
    number_count: u16,
    string_count: u16,
}

impl ColumnTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt columns read from a file, checking that each type group uses
    /// exactly the indices `0..count`.
    pub fn from_columns(columns: Vec<Column>, numbers: u16, strings: u16) -> Result<Self> {
        let mut seen_numbers = vec![false; numbers as usize];
        let mut seen_strings = vec![false; strings as usize];
        for col in &columns {
            let slots = if col.col_type.is_string() { &mut seen_strings } else { &mut seen_numbers };
            match slots.get_mut(col.index as usize) {
                Some(slot) if !*slot => *slot = true,
                _ => {
                    return Err(IesError::CorruptHeader(format!(
                        "column {} has duplicate or out-of-range index {}",
                        col.full_name, col.index
                    )))
                }
            }
        }
        if seen_numbers.contains(&false) || seen_strings.contains(&false) {
            return Err(IesError::CorruptHeader(
                "column indices do not cover every number/string slot".to_owned(),
            ));
        }

        let by_name = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.full_name.clone(), i))
            .collect();
        Ok(Self { columns, by_name, number_count: numbers, string_count: strings })
    }

    /// Record one attribute occurrence. The first sighting creates the column
    /// with the next free index of its group; later sightings must agree on
    /// the type. `row` identifies the class in the conflict error.
    pub fn observe(&mut self, full_name: &str, col_type: ColumnType, row: &str) -> Result<&Column> {
        if let Some(&i) = self.by_name.get(full_name) {
            let existing = &self.columns[i];
            if existing.col_type != col_type {
                return Err(IesError::ColumnTypeConflict {
                    column: full_name.to_owned(),
                    row:    row.to_owned(),
                });
            }
            return Ok(existing);
        }

        let counter = if col_type.is_string() { &mut self.string_count } else { &mut self.number_count };
        let index = *counter;
        *counter = counter.checked_add(1).ok_or_else(|| IesError::FieldTooLong {
            field: "column count".to_owned(),
            len:   index as usize + 1,
        })?;

        self.by_name.insert(full_name.to_owned(), self.columns.len());
        self.columns.push(Column::from_attribute(full_name, col_type, index));
        Ok(&self.columns[self.columns.len() - 1])
    }

    /// Columns in declaration (first-seen) order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn get(&self, full_name: &str) -> Option<&Column> {
        self.by_name.get(full_name).map(|&i| &self.columns[i])
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn number_count(&self) -> u16 {
        self.number_count
    }

    pub fn string_count(&self) -> u16 {
        self.string_count
    }

    /// NUMBER columns sorted by array index.
    pub fn number_columns(&self) -> Vec<&Column> {
        self.group(false)
    }

    /// STRING and CALCULATED columns sorted by array index.
    pub fn string_columns(&self) -> Vec<&Column> {
        self.group(true)
    }

    fn group(&self, strings: bool) -> Vec<&Column> {
        let mut cols: Vec<&Column> = self
            .columns
            .iter()
            .filter(|c| c.col_type.is_string() == strings)
            .collect();
        cols.sort_by_key(|c| c.index);
        cols
    }
}
