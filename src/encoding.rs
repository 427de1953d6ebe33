//! Text codec cascade for the strings stored in IES files.
//!
//! IES files carry no encoding marker. Depending on the client build a string
//! may be UTF-8, EUC-KR, ISO-8859-5 or plain Latin-1, and the same file can
//! mix them. Every text field is therefore decoded with a primary codec first
//! and then with an ordered fallback chain; the first codec that accepts the
//! bytes wins. Encoding runs the same cascade in the other direction.
//!
//! Fallback chains are configuration, not logic: each call-site (header id,
//! class name, string column, whole XML document) owns its own chain in
//! [`FallbackChains`].

use std::borrow::Cow;
use std::fmt;

use encoding_rs::{Encoding, EUC_KR, ISO_8859_5, UTF_8};
use serde::{Deserialize, Serialize};

use crate::error::{IesError, Result};

// ── TextCodec ────────────────────────────────────────────────────────────────

/// One concrete text encoding.
///
/// `Latin1` is the real ISO-8859-1 mapping (byte == code point). WHATWG labels
/// resolve "iso-8859-1" to windows-1252, which is not what the legacy files
/// use, so it gets its own variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TextCodec {
    Utf8,
    Latin1,
    Labelled(&'static Encoding),
}

impl TextCodec {
    /// Resolve a user-facing encoding name (case-insensitive).
    pub fn from_label(label: &str) -> Option<Self> {
        let lower = label.trim().to_ascii_lowercase();
        match lower.as_str() {
            "iso-8859-1" | "iso8859-1" | "iso_8859-1" | "latin1" | "latin-1" | "l1" | "cp819" => {
                return Some(TextCodec::Latin1)
            }
            "ksc5601" | "ksc-5601" | "cp949" | "uhc" => return Some(TextCodec::Labelled(EUC_KR)),
            _ => {}
        }
        match Encoding::for_label(lower.as_bytes()) {
            Some(enc) if enc == UTF_8 => Some(TextCodec::Utf8),
            Some(enc)                 => Some(TextCodec::Labelled(enc)),
            None                      => None,
        }
    }

    /// Canonical name, used in diagnostics and in the XML declaration.
    pub fn name(self) -> &'static str {
        match self {
            TextCodec::Utf8         => "UTF-8",
            TextCodec::Latin1       => "ISO-8859-1",
            TextCodec::Labelled(e)  => e.name(),
        }
    }

    /// Strict decode. `None` when the bytes are not valid in this encoding.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            TextCodec::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_owned),
            TextCodec::Latin1 => Some(encoding_rs::mem::decode_latin1(bytes).into_owned()),
            TextCodec::Labelled(enc) => enc
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(Cow::into_owned),
        }
    }

    /// Strict encode. `None` when some character has no mapping.
    pub fn encode(self, text: &str) -> Option<Vec<u8>> {
        match self {
            TextCodec::Utf8 => Some(text.as_bytes().to_vec()),
            TextCodec::Latin1 => {
                if encoding_rs::mem::is_str_latin1(text) {
                    Some(encoding_rs::mem::encode_latin1_lossy(text).into_owned())
                } else {
                    None
                }
            }
            TextCodec::Labelled(enc) => {
                let (bytes, used, had_errors) = enc.encode(text);
                // encode() silently switches UTF-16 targets to UTF-8.
                if had_errors || used != enc {
                    None
                } else {
                    Some(bytes.into_owned())
                }
            }
        }
    }
}

impl Default for TextCodec {
    fn default() -> Self {
        TextCodec::Utf8
    }
}

impl fmt::Display for TextCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<String> for TextCodec {
    type Error = String;

    fn try_from(label: String) -> std::result::Result<Self, Self::Error> {
        TextCodec::from_label(&label).ok_or_else(|| format!("unknown encoding {label:?}"))
    }
}

impl From<TextCodec> for String {
    fn from(codec: TextCodec) -> String {
        codec.name().to_owned()
    }
}

// ── Fallback chains ──────────────────────────────────────────────────────────

/// Ordered list of codecs tried after the primary one.
pub type FallbackChain = Vec<TextCodec>;

/// Per-field fallback chains.
///
/// The defaults reproduce what the game data needs: header ids are either the
/// primary encoding or Latin-1, class names are sometimes Cyrillic, and
/// string values additionally show up in EUC-KR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackChains {
    pub idspace:      FallbackChain,
    pub class_name:   FallbackChain,
    pub string_value: FallbackChain,
    /// Used when reading a whole XML document back from disk.
    pub document:     FallbackChain,
}

impl Default for FallbackChains {
    fn default() -> Self {
        Self {
            idspace:      vec![TextCodec::Latin1],
            class_name:   vec![TextCodec::Labelled(ISO_8859_5), TextCodec::Latin1],
            string_value: vec![
                TextCodec::Labelled(EUC_KR),
                TextCodec::Labelled(ISO_8859_5),
                TextCodec::Latin1,
            ],
            document:     vec![TextCodec::Labelled(ISO_8859_5)],
        }
    }
}

// ── Resolver ─────────────────────────────────────────────────────────────────

/// Runs the primary codec, then the given chain, returning the first success.
#[derive(Debug, Clone, Copy)]
pub struct EncodingResolver {
    primary: TextCodec,
}

impl EncodingResolver {
    pub fn new(primary: TextCodec) -> Self {
        Self { primary }
    }

    pub fn primary(&self) -> TextCodec {
        self.primary
    }

    /// Decode `bytes`; `field` names the value in the error if every codec fails.
    pub fn decode(&self, bytes: &[u8], chain: &[TextCodec], field: &str) -> Result<String> {
        std::iter::once(self.primary)
            .chain(chain.iter().copied())
            .find_map(|codec| codec.decode(bytes))
            .ok_or_else(|| IesError::Encoding {
                field:    format!("decode {field}"),
                encoding: self.primary.name().to_owned(),
            })
    }

    /// Encode `text`; `field` names the value in the error if every codec fails.
    pub fn encode(&self, text: &str, chain: &[TextCodec], field: &str) -> Result<Vec<u8>> {
        std::iter::once(self.primary)
            .chain(chain.iter().copied())
            .find_map(|codec| codec.encode(text))
            .ok_or_else(|| IesError::Encoding {
                field:    format!("encode {field}"),
                encoding: self.primary.name().to_owned(),
            })
    }
}
