//! File-level conversion between `.ies` and `.xml`, plus the helper files
//! that steer it (text dictionary, attribute order reference).
//!
//! Every conversion builds its output completely in memory and writes it
//! with a single call, so a failure never leaves a half-written file.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::attributes::{Dictionary, CLASS_ID};
use crate::encoding::{EncodingResolver, FallbackChains, TextCodec};
use crate::error::{IesError, Result};
use crate::localize::{merge_localized, LocaleLayout};
use crate::row::FloatMode;
use crate::table::{CodecSettings, Table};
use crate::xml::{collect_elements, decode_document, XmlDocument};

const IES_EXT: &str = "ies";
const XML_EXT: &str = "xml";
const DICTIONARY_ENTRY: &str = "Text";
const DICTIONARY_TEXT: &str = "Text";
const ORDER_ELEMENT: &str = "Class";

// ── ConvertOptions ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Primary text encoding of the IES strings and of the XML output.
    pub encoding:      String,
    /// Store numbers as `f32` instead of `f64`.
    pub use_float:     bool,
    /// Attribute names emitted first in every `<Class>`.
    pub order:         Option<Vec<String>>,
    /// Per-file order references, `<order_dir>/<stem>.xml`. Used when
    /// `order` is not set.
    pub order_dir:     Option<PathBuf>,
    /// Replaces `<$>N</>` placeholders when decoding.
    #[serde(skip)]
    pub dictionary:    Option<Dictionary>,
    pub locale_layout: LocaleLayout,
    pub fallbacks:     FallbackChains,
    /// Emit `<ClassSchema>` entries for columns that would not infer back.
    pub emit_schema:   bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            encoding:      TextCodec::Utf8.name().to_owned(),
            use_float:     false,
            order:         None,
            order_dir:     None,
            dictionary:    None,
            locale_layout: LocaleLayout::default(),
            fallbacks:     FallbackChains::default(),
            emit_schema:   true,
        }
    }
}

impl ConvertOptions {
    pub fn text_codec(&self) -> Result<TextCodec> {
        TextCodec::from_label(&self.encoding).ok_or_else(|| IesError::UnknownEncoding(self.encoding.clone()))
    }

    pub fn float_mode(&self) -> FloatMode {
        if self.use_float {
            FloatMode::Single
        } else {
            FloatMode::Double
        }
    }

    pub fn settings(&self) -> Result<CodecSettings<'_>> {
        Ok(CodecSettings {
            resolver:   EncodingResolver::new(self.text_codec()?),
            fallbacks:  &self.fallbacks,
            float_mode: self.float_mode(),
        })
    }
}

// ── In-memory cores ──────────────────────────────────────────────────────────

/// Decode IES bytes into a document.
pub fn decode_table(bytes: &[u8], opts: &ConvertOptions) -> Result<XmlDocument> {
    let settings = opts.settings()?;
    let table = Table::read(Cursor::new(bytes), &settings)?;
    table.to_document(&settings, opts.dictionary.as_ref(), opts.emit_schema)
}

/// Encode a document into IES bytes.
pub fn encode_document(doc: &XmlDocument, opts: &ConvertOptions) -> Result<Vec<u8>> {
    let settings = opts.settings()?;
    let table = Table::from_document(doc, &settings)?;
    let mut out = Cursor::new(Vec::new());
    let header = table.write(&mut out, &settings)?;
    debug!(
        "encoded {}: v{}, {} rows, {} columns, {} bytes",
        doc.id,
        header.version as i16,
        header.row_count,
        header.col_count_total,
        header.total_size
    );
    Ok(out.into_inner())
}

/// Render a document in `codec`, or in UTF-8 when `codec` cannot represent
/// it.
pub fn render_document(doc: &XmlDocument, codec: TextCodec, order: Option<&[String]>) -> Vec<u8> {
    if let Some(bytes) = codec.encode(&doc.render(order, codec.name())) {
        return bytes;
    }
    warn!("{codec} cannot represent every character of {}, writing UTF-8 instead", doc.id);
    doc.render(order, TextCodec::Utf8.name()).into_bytes()
}

/// Parse XML bytes with the configured encoding and document fallbacks.
pub fn parse_document(bytes: &[u8], opts: &ConvertOptions) -> Result<XmlDocument> {
    let resolver = EncodingResolver::new(opts.text_codec()?);
    XmlDocument::from_bytes(bytes, &resolver, &opts.fallbacks.document)
}

// ── Files ────────────────────────────────────────────────────────────────────

pub fn ies_to_xml(input: &Path, output: &Path, opts: &ConvertOptions) -> Result<()> {
    let doc = decode_table(&fs::read(input)?, opts)?;
    let from_dir;
    let order = match (&opts.order, &opts.order_dir) {
        (Some(order), _) => Some(order.as_slice()),
        (None, Some(dir)) => {
            from_dir = order_from_dir(dir, input);
            from_dir.as_deref()
        }
        (None, None) => None,
    };
    let xml = render_document(&doc, opts.text_codec()?, order);
    fs::write(output, xml)?;
    debug!("{} -> {} ({} classes)", input.display(), output.display(), doc.classes.len());
    Ok(())
}

/// Encode an XML file. A file inside a locale directory is first completed
/// from its base file when that exists.
pub fn xml_to_ies(input: &Path, output: &Path, opts: &ConvertOptions) -> Result<()> {
    let mut doc = parse_document(&fs::read(input)?, opts)?;
    if let Some(base_path) = opts.locale_layout.base_path(input) {
        if base_path.is_file() {
            let base = parse_document(&fs::read(&base_path)?, opts)?;
            merge_localized(&mut doc, &base);
            debug!("merged {} with base {}", input.display(), base_path.display());
        } else {
            debug!("no base file {} for {}, encoding as is", base_path.display(), input.display());
        }
    }
    let bytes = encode_document(&doc, opts)?;
    fs::write(output, bytes)?;
    debug!("{} -> {} ({} classes)", input.display(), output.display(), doc.classes.len());
    Ok(())
}

/// Convert according to the extensions: `.ies` → `.xml` or `.xml` → `.ies`.
pub fn convert_file(input: &Path, output: &Path, opts: &ConvertOptions) -> Result<()> {
    match (extension(input).as_deref(), extension(output).as_deref()) {
        (Some(IES_EXT), Some(XML_EXT)) => ies_to_xml(input, output, opts),
        (Some(XML_EXT), Some(IES_EXT)) => xml_to_ies(input, output, opts),
        _ => Err(IesError::UnsupportedConversion(input.to_path_buf())),
    }
}

/// `x.ies` → `x.xml`, `x.xml` → `x.ies`, anything else gets `.xml` appended.
pub fn autodetect_output(input: &Path) -> PathBuf {
    match extension(input).as_deref() {
        Some(IES_EXT) => input.with_extension(XML_EXT),
        Some(XML_EXT) => input.with_extension(IES_EXT),
        _ => {
            let mut name = OsString::from(input.as_os_str());
            name.push(".");
            name.push(XML_EXT);
            PathBuf::from(name)
        }
    }
}

pub(crate) fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

// ── Helper files ─────────────────────────────────────────────────────────────

fn read_helper(path: &Path) -> Result<String> {
    let fallbacks = FallbackChains::default();
    decode_document(&fs::read(path)?, &EncodingResolver::new(TextCodec::Utf8), &fallbacks.document)
}

/// Read `<Text ClassID=".." Text=".."/>` entries of a `dictionary_local.xml`.
pub fn load_dictionary(path: &Path) -> Result<Dictionary> {
    let mut dictionary = Dictionary::new();
    for entry in collect_elements(&read_helper(path)?, DICTIONARY_ENTRY)? {
        match (entry.get(CLASS_ID), entry.get(DICTIONARY_TEXT)) {
            (Some(id), Some(text)) => {
                dictionary.insert(id.to_owned(), text.to_owned());
            }
            _ => debug!("skipping dictionary entry without ClassID or Text"),
        }
    }
    debug!("loaded {} dictionary entries from {}", dictionary.len(), path.display());
    Ok(dictionary)
}

/// Attribute order learned from a reference XML file.
///
/// Every name scores the sum of its positions over all `<Class>` elements;
/// names come back by ascending score, ties in first-seen order.
pub fn parse_order(path: &Path) -> Result<Vec<String>> {
    let mut scores: IndexMap<String, usize> = IndexMap::new();
    for class in collect_elements(&read_helper(path)?, ORDER_ELEMENT)? {
        for (position, name) in class.keys().enumerate() {
            *scores.entry(name.to_owned()).or_default() += position;
        }
    }
    let mut ranked: Vec<(String, usize)> = scores.into_iter().collect();
    ranked.sort_by_key(|(_, score)| *score);
    Ok(ranked.into_iter().map(|(name, _)| name).collect())
}

/// Order for `input` taken from `<order_dir>/<stem>.xml`. A missing or
/// unreadable reference only costs the ordering.
pub fn order_from_dir(order_dir: &Path, input: &Path) -> Option<Vec<String>> {
    let stem = input.file_stem()?;
    let mut reference = order_dir.join(stem);
    reference.set_extension(XML_EXT);
    if !reference.is_file() {
        warn!("Order not parsed, file {} missing", reference.display());
        return None;
    }
    match parse_order(&reference) {
        Ok(order) => Some(order),
        Err(e) => {
            warn!("Order not parsed from {}: {e}", reference.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn output_names() {
        assert_eq!(autodetect_output(Path::new("a/Item.ies")), PathBuf::from("a/Item.xml"));
        assert_eq!(autodetect_output(Path::new("a/Item.XML")), PathBuf::from("a/Item.ies"));
        assert_eq!(autodetect_output(Path::new("a/Item.dat")), PathBuf::from("a/Item.dat.xml"));
        assert_eq!(autodetect_output(Path::new("Item")), PathBuf::from("Item.xml"));
    }

    #[test]
    fn unsupported_pair_is_rejected() {
        let opts = ConvertOptions::default();
        let err = convert_file(Path::new("a.ies"), Path::new("b.ies"), &opts).unwrap_err();
        assert!(matches!(err, IesError::UnsupportedConversion(p) if p == Path::new("a.ies")));
    }

    #[test]
    fn unknown_encoding_is_reported() {
        let opts = ConvertOptions { encoding: "klingon".into(), ..ConvertOptions::default() };
        assert!(matches!(opts.settings(), Err(IesError::UnknownEncoding(_))));
    }

    #[test]
    fn options_from_partial_json() {
        let opts: ConvertOptions = serde_json::from_str(r#"{"encoding":"EUC-KR","use_float":true}"#).unwrap();
        assert_eq!(opts.text_codec().unwrap().name(), "EUC-KR");
        assert_eq!(opts.float_mode(), FloatMode::Single);
        assert!(opts.emit_schema);
        assert_eq!(opts.locale_layout, LocaleLayout::DirectoryNameLength(3));
    }

    #[test]
    fn order_scores_positions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Item.xml");
        fs::write(
            &path,
            r#"<idspace id="Item">
	<Class ClassID="1" ClassName="A" Price="1" />
	<Class ClassName="B" ClassID="2" Name="x" Price="2" />
</idspace>"#,
        )
        .unwrap();
        // ClassID 0+1, ClassName 1+0, Price 2+3, Name 2.
        assert_eq!(parse_order(&path).unwrap(), vec!["ClassID", "ClassName", "Name", "Price"]);
        assert_eq!(order_from_dir(dir.path(), Path::new("in/Item.ies")).unwrap().len(), 4);
        assert!(order_from_dir(dir.path(), Path::new("in/Other.ies")).is_none());
    }

    #[test]
    fn dictionary_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dictionary_local.xml");
        fs::write(
            &path,
            r#"<?xml version="1.0" encoding="UTF-8"?>
<dictionary>
	<Text ClassID="42" Text="Hello &amp; welcome" />
	<Text ClassID="43" />
</dictionary>"#,
        )
        .unwrap();
        let dict = load_dictionary(&path).unwrap();
        assert_eq!(dict.len(), 1);
        assert_eq!(dict["42"], "Hello & welcome");
    }

    #[test]
    fn unrepresentable_text_falls_back_to_utf8() {
        let mut doc = XmlDocument::new("Item");
        doc.classes.push([("Name", "검")].into_iter().collect());
        let bytes = render_document(&doc, TextCodec::Latin1, None);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(text.contains("Name=\"검\""));
    }
}
