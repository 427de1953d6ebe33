//! The XML side of a table: an `<idspace>` root holding `<Class>` elements.
//!
//! ```text
//! <?xml version="1.0" encoding="UTF-8"?>
//! <idspace id="Item" module="..." module_prefix="...">
//!     <Schema><ClassSchema Rank="STRING" /></Schema>
//!     <Class ClassID="1" ClassName="Sword" Price="12.5" />
//! </idspace>
//! ```

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::attributes::{escape_value, ordered_entries, Attributes};
use crate::encoding::{EncodingResolver, TextCodec};
use crate::error::{IesError, Result};

const ROOT_ID: &str = "id";
const ROOT_MODULE: &str = "module";
const ROOT_MODULE_PREFIX: &str = "module_prefix";
const CLASS_TAG: &[u8] = b"Class";
const SCHEMA_TAG: &[u8] = b"Schema";
const CLASS_SCHEMA_TAG: &[u8] = b"ClassSchema";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlDocument {
    pub id:            String,
    /// Present for v2 and v3 tables.
    pub module:        Option<String>,
    /// Present for v3 tables.
    pub module_prefix: Option<String>,
    pub classes:       Vec<Attributes>,
    /// Column type overrides from `<Schema><ClassSchema>`.
    pub schema:        Option<Attributes>,
}

impl XmlDocument {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Self::default() }
    }

    /// Decode raw file bytes and parse them.
    ///
    /// An encoding named in the XML declaration wins over `resolver`'s
    /// primary encoding; `chain` is tried after either.
    pub fn from_bytes(bytes: &[u8], resolver: &EncodingResolver, chain: &[TextCodec]) -> Result<Self> {
        Self::parse(&decode_document(bytes, resolver, chain)?)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut reader = Reader::from_str(text);
        let mut buf = Vec::new();
        let mut stack: Vec<Vec<u8>> = Vec::new();
        let mut doc: Option<XmlDocument> = None;

        loop {
            let (e, is_empty) = match reader.read_event_into(&mut buf)? {
                Event::Start(e) => (e.into_owned(), false),
                Event::Empty(e) => (e.into_owned(), true),
                Event::End(_) => {
                    stack.pop();
                    buf.clear();
                    continue;
                }
                Event::Eof => break,
                _ => {
                    buf.clear();
                    continue;
                }
            };
            let name = e.name().as_ref().to_vec();

            match doc.as_mut() {
                None => doc = Some(Self::from_root(&e)?),
                Some(doc) if name.eq_ignore_ascii_case(CLASS_TAG) => {
                    doc.classes.push(read_attributes(&e)?);
                }
                Some(doc)
                    if doc.schema.is_none()
                        && name == CLASS_SCHEMA_TAG
                        && stack.len() == 2
                        && stack[1] == SCHEMA_TAG =>
                {
                    doc.schema = Some(read_attributes(&e)?);
                }
                Some(_) => {}
            }
            if !is_empty {
                stack.push(name);
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(IesError::InvalidDocument("unexpected end of document".to_owned()));
        }
        doc.ok_or_else(|| IesError::InvalidDocument("no root element".to_owned()))
    }

    fn from_root(root: &BytesStart) -> Result<Self> {
        let mut attrs = read_attributes(root)?;
        let id = attrs.remove(ROOT_ID).ok_or_else(|| {
            IesError::InvalidDocument(format!(
                "root element <{}> has no id attribute",
                String::from_utf8_lossy(root.name().as_ref())
            ))
        })?;
        Ok(Self {
            id,
            module: attrs.remove(ROOT_MODULE),
            module_prefix: attrs.remove(ROOT_MODULE_PREFIX),
            ..Self::default()
        })
    }

    /// Render the document text, declaring `encoding_label` in the prolog.
    /// `order` puts the named attributes first in every `<Class>`.
    pub fn render(&self, order: Option<&[String]>, encoding_label: &str) -> String {
        let mut out = format!("<?xml version=\"1.0\" encoding=\"{encoding_label}\"?>\n");
        out.push_str(&format!("<idspace id=\"{}\"", escape_value(&self.id)));
        if let Some(module) = &self.module {
            out.push_str(&format!(" {ROOT_MODULE}=\"{}\"", escape_value(module)));
        }
        if let Some(prefix) = &self.module_prefix {
            out.push_str(&format!(" {ROOT_MODULE_PREFIX}=\"{}\"", escape_value(prefix)));
        }
        out.push('>');

        if let Some(schema) = self.schema.as_ref().filter(|s| !s.is_empty()) {
            out.push_str("\n\t<Schema>\n\t\t<ClassSchema ");
            for (k, v) in schema.iter() {
                out.push_str(&format!("{k}=\"{}\" ", escape_value(v)));
            }
            out.push_str("/>\n\t</Schema>");
        }

        for class in &self.classes {
            out.push_str("\n\t<Class ");
            for (k, v) in ordered_entries(class.clone(), order) {
                out.push_str(&format!("{k}=\"{}\" ", escape_value(&v)));
            }
            out.push_str("/>");
        }
        out.push_str("\n</idspace>\n");
        out
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn read_attributes(element: &BytesStart) -> Result<Attributes> {
    element
        .attributes()
        .map(|attr| {
            let attr = attr.map_err(|e| IesError::InvalidDocument(format!("bad attribute: {e}")))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            Ok((key, value))
        })
        .collect::<Result<Vec<_>>>()
        .map(|pairs| pairs.into_iter().collect())
}

/// Collect the attributes of every element called `tag`, at any depth.
pub fn collect_elements(text: &str, tag: &str) -> Result<Vec<Attributes>> {
    let mut reader = Reader::from_str(text);
    let mut buf = Vec::new();
    let mut found = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref().eq_ignore_ascii_case(tag.as_bytes()) => {
                found.push(read_attributes(&e)?);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(found)
}

/// Codec named by the `<?xml ... encoding="..."?>` prolog, if recognized.
pub fn declared_encoding(bytes: &[u8]) -> Option<TextCodec> {
    let mut reader = Reader::from_reader(strip_bom(bytes));
    let mut buf = Vec::new();
    match reader.read_event_into(&mut buf) {
        Ok(Event::Decl(decl)) => {
            let label = decl.encoding()?.ok()?;
            TextCodec::from_label(&String::from_utf8_lossy(&label))
        }
        _ => None,
    }
}

/// Turn document bytes into text, preferring the declared encoding.
pub fn decode_document(bytes: &[u8], resolver: &EncodingResolver, chain: &[TextCodec]) -> Result<String> {
    let resolver = declared_encoding(bytes).map(EncodingResolver::new).unwrap_or(*resolver);
    resolver.decode(strip_bom(bytes), chain, "XML document")
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}
