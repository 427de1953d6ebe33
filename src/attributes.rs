//! Row ⇄ attribute-map mapping, placeholder localization and emission order.

use indexmap::IndexMap;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::warn;

use crate::column::{ColumnTable, ColumnType};
use crate::error::{IesError, Result};
use crate::row::{format_number, is_script_ref, Row};

pub const CLASS_ID: &str = "ClassID";
pub const CLASS_NAME: &str = "ClassName";
/// Attribute value standing for an absent string.
pub const NONE_VALUE: &str = "None";

/// Text id → translated text, loaded from `dictionary_local.xml`.
pub type Dictionary = HashMap<String, String>;

// ── Attributes ───────────────────────────────────────────────────────────────

/// Insertion-ordered attribute map. Re-inserting a key keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    entries: IndexMap<String, String>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove a key, preserving the order of the others.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl IntoIterator for Attributes {
    type Item = (String, String);
    type IntoIter = indexmap::map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

// ── Localization placeholders ────────────────────────────────────────────────

static PLACEHOLDER_PATTERN: OnceLock<Regex> = OnceLock::new();

fn placeholder_regex() -> &'static Regex {
    PLACEHOLDER_PATTERN.get_or_init(|| {
        Regex::new(r"<\$>([0-9]+)</>").expect("placeholder pattern is valid")
    })
}

/// Replace every `<$>N</>` token with `dictionary[N]`. Tokens without a
/// translation are kept verbatim and reported.
pub fn localize<'a>(text: &'a str, dictionary: &Dictionary) -> Cow<'a, str> {
    placeholder_regex().replace_all(text, |caps: &Captures| match dictionary.get(&caps[1]) {
        Some(translated) => translated.clone(),
        None => {
            warn!("Missing translation for text id {}", &caps[1]);
            caps[0].to_owned()
        }
    })
}

// ── Binary → XML ─────────────────────────────────────────────────────────────

/// Build the attribute map of one decoded row.
///
/// `ClassID`/`ClassName` come first, then one entry per column in
/// declaration order. A column named like an identity field overwrites it in
/// place. Numeric columns are left out when the row carried no numbers.
pub fn row_to_attributes(row: &Row, columns: &ColumnTable, dictionary: Option<&Dictionary>) -> Attributes {
    let mut attrs = Attributes::new();
    if let Some(id) = row.class_id {
        attrs.insert(CLASS_ID, id.to_string());
    }
    if let Some(name) = &row.class_name {
        attrs.insert(CLASS_NAME, name.as_str());
    }

    for col in columns.columns() {
        let value = match col.col_type {
            ColumnType::Number => match row.numbers.get(col.index as usize) {
                Some(&n) => format_number(n),
                None => continue,
            },
            ColumnType::String | ColumnType::Calculated => {
                match row.strings.get(col.index as usize).and_then(Option::as_deref) {
                    Some(s) => match dictionary {
                        Some(dict) => localize(s, dict).into_owned(),
                        None => s.to_owned(),
                    },
                    None => NONE_VALUE.to_owned(),
                }
            }
        };
        attrs.insert(col.full_name.as_str(), value);
    }
    attrs
}

/// Emission order for one `<Class>` element.
///
/// Keys named in `order` come first, in that order; they are skipped when
/// missing or empty. Every other key follows in map order, again skipping
/// empty values.
pub fn ordered_entries(mut attrs: Attributes, order: Option<&[String]>) -> Vec<(String, String)> {
    let mut out = Vec::with_capacity(attrs.len());
    for key in order.unwrap_or_default() {
        if let Some(value) = attrs.remove(key) {
            if !value.is_empty() {
                out.push((key.clone(), value));
            }
        }
    }
    out.extend(attrs.into_iter().filter(|(_, v)| !v.is_empty()));
    out
}

// ── XML → Binary ─────────────────────────────────────────────────────────────

/// Turn the raw attributes of one `<Class>` into a row for `columns`.
///
/// Numbers must parse as floats; absent ones become `0.0`. Absent strings,
/// empty strings and the literal `None` are written as empty.
pub fn attributes_to_row(attrs: &Attributes, columns: &ColumnTable, has_class_id: bool) -> Result<Row> {
    let class_id = if has_class_id {
        let raw = attrs.get(CLASS_ID).unwrap_or("0");
        Some(raw.trim().parse::<u32>().map_err(|_| IesError::InvalidNumber {
            column: CLASS_ID.to_owned(),
            value:  raw.to_owned(),
        })?)
    } else {
        None
    };
    let class_name = attrs
        .get(CLASS_NAME)
        .filter(|s| !s.is_empty() && *s != NONE_VALUE)
        .map(str::to_owned);

    let mut numbers = vec![0.0; columns.number_count() as usize];
    for col in columns.number_columns() {
        if let Some(raw) = attrs.get(&col.full_name) {
            numbers[col.index as usize] = raw.trim().parse::<f64>().map_err(|_| IesError::InvalidNumber {
                column: col.full_name.clone(),
                value:  raw.to_owned(),
            })?;
        }
    }

    let mut strings = vec![None; columns.string_count() as usize];
    let mut flags = vec![false; columns.string_count() as usize];
    for col in columns.string_columns() {
        match attrs.get(&col.full_name) {
            Some(value) if !value.is_empty() && value != NONE_VALUE => {
                flags[col.index as usize] = is_script_ref(value);
                strings[col.index as usize] = Some(value.to_owned());
            }
            _ => {}
        }
    }

    Ok(Row { class_id, class_name, numbers, strings, is_script_ref: flags })
}

/// Escape an attribute value: `&`, `<`, `>` and `"`.
pub fn escape_value(value: &str) -> Cow<'_, str> {
    let partial = quick_xml::escape::partial_escape(value);
    if partial.contains('"') {
        Cow::Owned(partial.replace('"', "&quot;"))
    } else {
        partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnTable;

    fn dict(pairs: &[(&str, &str)]) -> Dictionary {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn placeholder_substitution() {
        let d = dict(&[("42", "Hello")]);
        assert_eq!(localize("<$>42</>", &d), "Hello");
        assert_eq!(localize("a <$>42</> b <$>42</>", &d), "a Hello b Hello");
        assert_eq!(localize("<$>7</>", &d), "<$>7</>");
        assert!(matches!(localize("plain", &d), Cow::Borrowed("plain")));
    }

    #[test]
    fn attributes_keep_position_on_overwrite() {
        let mut a = Attributes::new();
        a.insert("ClassID", "1");
        a.insert("ClassName", "Sword");
        a.insert("Price", "3");
        a.insert("ClassID", "2");
        let keys: Vec<_> = a.keys().collect();
        assert_eq!(keys, vec!["ClassID", "ClassName", "Price"]);
        assert_eq!(a.get("ClassID"), Some("2"));
        assert_eq!(a.remove("ClassName").as_deref(), Some("Sword"));
        assert_eq!(a.keys().collect::<Vec<_>>(), vec!["ClassID", "Price"]);
    }

    #[test]
    fn row_mapping_and_identity_overlap() {
        let mut cols = ColumnTable::new();
        cols.observe("ClassID", ColumnType::Number, "1").unwrap();
        cols.observe("Price", ColumnType::Number, "1").unwrap();
        cols.observe("Name", ColumnType::String, "1").unwrap();
        cols.observe("Note", ColumnType::String, "1").unwrap();

        let row = Row {
            class_id:      Some(1),
            class_name:    Some("Sword".into()),
            numbers:       vec![1.0, 12.5],
            strings:       vec![Some("<$>42</>".into()), None],
            is_script_ref: vec![false, false],
        };
        let d = dict(&[("42", "Hello")]);
        let attrs = row_to_attributes(&row, &cols, Some(&d));
        let entries: Vec<_> = attrs.iter().collect();
        assert_eq!(
            entries,
            vec![("ClassID", "1"), ("ClassName", "Sword"), ("Price", "12.5"), ("Name", "Hello"), ("Note", "None")]
        );
    }

    #[test]
    fn truncated_numbers_are_skipped() {
        let mut cols = ColumnTable::new();
        cols.observe("Price", ColumnType::Number, "1").unwrap();
        cols.observe("Name", ColumnType::String, "1").unwrap();
        let row = Row {
            class_id:      None,
            class_name:    None,
            numbers:       vec![],
            strings:       vec![Some("x".into())],
            is_script_ref: vec![false],
        };
        let attrs = row_to_attributes(&row, &cols, None);
        assert_eq!(attrs.iter().collect::<Vec<_>>(), vec![("Name", "x")]);
    }

    #[test]
    fn explicit_order_first_then_rest() {
        let attrs: Attributes = [("ClassID", "1"), ("ClassName", "Sword"), ("Price", "3"), ("Empty", "")]
            .into_iter()
            .collect();
        let order = vec!["Price".to_string(), "Missing".to_string(), "Empty".to_string()];
        let out = ordered_entries(attrs, Some(&order));
        let keys: Vec<_> = out.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["Price", "ClassID", "ClassName"]);
    }

    #[test]
    fn escaping_includes_quotes() {
        assert_eq!(escape_value(r#"a "b" <c> & d"#), "a &quot;b&quot; &lt;c&gt; &amp; d");
        assert_eq!(escape_value("it's"), "it's");
    }

    #[test]
    fn attributes_become_row() {
        let mut cols = ColumnTable::new();
        cols.observe("ClassID", ColumnType::Number, "1").unwrap();
        cols.observe("Name", ColumnType::String, "1").unwrap();
        cols.observe("Price", ColumnType::Number, "1").unwrap();
        cols.observe("Script", ColumnType::Calculated, "1").unwrap();
        cols.observe("Note", ColumnType::String, "1").unwrap();

        let attrs: Attributes = [("ClassID", "4"), ("Name", "Iron"), ("Price", "10.00"), ("Script", "SCP_Heal"), ("Note", "None")]
            .into_iter()
            .collect();
        let row = attributes_to_row(&attrs, &cols, true).unwrap();
        assert_eq!(row.class_id, Some(4));
        assert_eq!(row.class_name, None);
        assert_eq!(row.numbers, vec![4.0, 10.0]);
        assert_eq!(row.strings, vec![Some("Iron".to_string()), Some("SCP_Heal".to_string()), None]);
        assert_eq!(row.is_script_ref, vec![false, true, false]);

        let sparse: Attributes = [("ClassID", "5")].into_iter().collect();
        let row = attributes_to_row(&sparse, &cols, false).unwrap();
        assert_eq!(row.class_id, None);
        assert_eq!(row.numbers, vec![5.0, 0.0]);
        assert_eq!(row.strings, vec![None, None, None]);
    }

    #[test]
    fn bad_number_is_reported() {
        let mut cols = ColumnTable::new();
        cols.observe("Rank", ColumnType::Number, "1").unwrap();
        let attrs: Attributes = [("Rank", "Gold")].into_iter().collect();
        let err = attributes_to_row(&attrs, &cols, false).unwrap_err();
        assert!(matches!(err, IesError::InvalidNumber { ref column, .. } if column == "Rank"));
    }
}
