//! A whole IES table and its conversion to and from an [`XmlDocument`].
//!
//! File layout:
//!
//! ```text
//! [header: 92 / 156 / 220 bytes]
//! [col_count_total × 134-byte column records]   info_size bytes
//! [row_count rows]                              data_size bytes
//! ```

use std::io::{Read, Seek, SeekFrom, Write};
use tracing::debug;

use crate::attributes::{attributes_to_row, row_to_attributes, Dictionary, CLASS_ID};
use crate::column::{encode_fixed, Column, ColumnTable, COLUMN_RECORD_SIZE};
use crate::encoding::{EncodingResolver, FallbackChains};
use crate::error::{IesError, Result};
use crate::header::{fixed_text, fixed_text_bytes, FixedText, HeaderVersion, IesHeader};
use crate::row::{FloatMode, Row, RowCodec};
use crate::schema::{required_overrides, TypeInferencer};
use crate::xml::XmlDocument;

/// Row id reported in type conflicts for classes without a `ClassID`.
const NO_CLASS_ID: &str = "-1";

/// Text and number handling shared by every table operation.
#[derive(Debug, Clone, Copy)]
pub struct CodecSettings<'a> {
    pub resolver:   EncodingResolver,
    pub fallbacks:  &'a FallbackChains,
    pub float_mode: FloatMode,
}

#[derive(Debug, Clone)]
pub struct Table {
    pub header:  IesHeader,
    pub columns: ColumnTable,
    pub rows:    Vec<Row>,
}

impl Table {
    // ── Binary ───────────────────────────────────────────────────────────────

    /// Read and validate a complete table.
    pub fn read<R: Read + Seek>(mut reader: R, settings: &CodecSettings) -> Result<Self> {
        let file_size = reader.seek(SeekFrom::End(0))?;
        let header = IesHeader::read(&mut reader)?;
        header.validate(file_size)?;
        debug!(
            "IES v{} header: {} rows, {} columns ({} numbers, {} strings), class ids: {}",
            header.version as i16,
            header.row_count,
            header.col_count_total,
            header.col_count_number,
            header.col_count_strings,
            header.has_class_id
        );

        reader.seek(SeekFrom::Start(header.header_size() as u64))?;
        let mut columns = Vec::with_capacity(header.col_count_total as usize);
        for _ in 0..header.col_count_total {
            columns.push(Column::read(&mut reader, &settings.resolver, &settings.fallbacks.idspace)?);
        }
        let columns = ColumnTable::from_columns(columns, header.col_count_number, header.col_count_strings)?;

        let mut data = vec![0u8; header.data_size as usize];
        reader.read_exact(&mut data)?;
        let codec = row_codec(&header, settings);
        let mut cursor = &data[..];
        let rows = (0..header.row_count)
            .map(|_| codec.read(&mut cursor))
            .collect::<Result<Vec<_>>>()?;
        if !cursor.is_empty() {
            debug!("{} trailing bytes after the last row", cursor.len());
        }

        Ok(Self { header, columns, rows })
    }

    /// Write the table at the writer's current position and return the
    /// header as written, sizes filled in.
    ///
    /// The header goes out twice: once as a placeholder, and once more after
    /// the data so that `data_size` and `total_size` are exact.
    pub fn write<W: Write + Seek>(&self, mut writer: W, settings: &CodecSettings) -> Result<IesHeader> {
        let start = writer.stream_position()?;
        let mut header = self.header.clone();
        header.info_size = size_field("info_size", COLUMN_RECORD_SIZE * self.columns.len())?;
        header.write(&mut writer)?;

        for col in self.columns.columns() {
            col.write(&mut writer, &settings.resolver, &settings.fallbacks.idspace)?;
        }

        let data_start = writer.stream_position()?;
        let codec = row_codec(&header, settings);
        for row in &self.rows {
            codec.write(&mut writer, row)?;
        }
        let end = writer.stream_position()?;

        header.data_size = size_field("data_size", (end - data_start) as usize)?;
        header.total_size = size_field("total_size", (end - start) as usize)?;
        writer.seek(SeekFrom::Start(start))?;
        header.write(&mut writer)?;
        writer.seek(SeekFrom::Start(end))?;
        Ok(header)
    }

    // ── XML ──────────────────────────────────────────────────────────────────

    /// Build a table from parsed XML: infer column types, assign indices in
    /// first-seen order and pack every class into a row.
    pub fn from_document(doc: &XmlDocument, settings: &CodecSettings) -> Result<Self> {
        let with_id = doc.classes.iter().filter(|c| c.contains_key(CLASS_ID)).count();
        if with_id != 0 && with_id != doc.classes.len() {
            return Err(IesError::InconsistentClassId);
        }
        let has_class_id = with_id == doc.classes.len();

        let inferencer = doc.schema.as_ref().map(TypeInferencer::with_schema).unwrap_or_default();
        let mut columns = ColumnTable::new();
        for class in &doc.classes {
            let row_id = class.get(CLASS_ID).unwrap_or(NO_CLASS_ID);
            for (name, value) in class.iter() {
                let col_type = inferencer.infer(name, value)?;
                columns.observe(name, col_type, row_id)?;
            }
        }
        let rows = doc
            .classes
            .iter()
            .map(|class| attributes_to_row(class, &columns, has_class_id))
            .collect::<Result<Vec<_>>>()?;

        let version = HeaderVersion::for_modules(doc.module.is_some(), doc.module_prefix.is_some());
        let mut header = IesHeader::new(version);
        header.idspace = encode_field(settings, &doc.id)?;
        if let Some(module) = &doc.module {
            header.module_space = encode_field(settings, module)?;
        }
        if let Some(prefix) = &doc.module_prefix {
            header.module_prefix = encode_field(settings, prefix)?;
        }
        header.has_class_id = has_class_id;
        header.row_count = count_field("row count", rows.len())?;
        header.col_count_total = count_field("column count", columns.len())?;
        header.col_count_number = columns.number_count();
        header.col_count_strings = columns.string_count();

        Ok(Self { header, columns, rows })
    }

    /// Turn the table into its XML document.
    ///
    /// With `emit_schema`, columns whose type the heuristics would not infer
    /// back from the decoded values get a `<ClassSchema>` entry.
    pub fn to_document(
        &self,
        settings:    &CodecSettings,
        dictionary:  Option<&Dictionary>,
        emit_schema: bool,
    ) -> Result<XmlDocument> {
        let decode = |field: &FixedText, name: &str| {
            settings.resolver.decode(fixed_text_bytes(field), &settings.fallbacks.idspace, name)
        };
        let version = self.header.version;
        let mut doc = XmlDocument::new(decode(&self.header.idspace, "idspace")?);
        if version >= HeaderVersion::V2 {
            doc.module = Some(decode(&self.header.module_space, "module")?);
        }
        if version >= HeaderVersion::V3 {
            doc.module_prefix = Some(decode(&self.header.module_prefix, "module_prefix")?);
        }

        doc.classes = self
            .rows
            .iter()
            .map(|row| row_to_attributes(row, &self.columns, dictionary))
            .collect();
        if emit_schema {
            doc.schema = required_overrides(&self.columns, &doc.classes);
        }
        Ok(doc)
    }
}

fn row_codec<'a>(header: &IesHeader, settings: &'a CodecSettings) -> RowCodec<'a> {
    RowCodec {
        resolver:     &settings.resolver,
        chains:       settings.fallbacks,
        has_class_id: header.has_class_id,
        float_mode:   settings.float_mode,
        number_count: header.col_count_number,
        string_count: header.col_count_strings,
    }
}

fn encode_field(settings: &CodecSettings, text: &str) -> Result<FixedText> {
    Ok(fixed_text(&encode_fixed(&settings.resolver, &settings.fallbacks.idspace, text)?))
}

fn count_field(field: &str, len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| IesError::FieldTooLong { field: field.to_owned(), len })
}

fn size_field(field: &str, len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| IesError::FieldTooLong { field: field.to_owned(), len })
}
