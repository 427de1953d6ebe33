//! Column type inference for the XML → IES direction.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::attributes::Attributes;
use crate::column::{ColumnTable, ColumnType, CALCULATED_PREFIX};
use crate::error::{IesError, Result};

static NUMBER_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Strict numeric literal: optional `-`, digits, optional `.` and digits.
fn number_regex() -> &'static Regex {
    NUMBER_PATTERN.get_or_init(|| {
        Regex::new(r"^-?[0-9]+(\.([0-9]+)?)?$").expect("numeric literal pattern is valid")
    })
}

pub fn is_number_literal(value: &str) -> bool {
    number_regex().is_match(value.trim())
}

/// Decides column types, honouring an optional `<ClassSchema>` override map.
#[derive(Debug, Clone, Default)]
pub struct TypeInferencer {
    overrides: HashMap<String, String>,
}

impl TypeInferencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the attributes of a `<ClassSchema>` element.
    pub fn with_schema(schema: &Attributes) -> Self {
        Self {
            overrides: schema.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect(),
        }
    }

    pub fn has_override(&self, column: &str) -> bool {
        self.overrides.contains_key(column)
    }

    pub fn infer(&self, column: &str, value: &str) -> Result<ColumnType> {
        if let Some(kind) = self.overrides.get(column) {
            return ColumnType::from_keyword(kind).ok_or_else(|| IesError::InvalidSchema {
                column: column.to_owned(),
                kind:   kind.clone(),
            });
        }
        if column.starts_with(CALCULATED_PREFIX) {
            Ok(ColumnType::Calculated)
        } else if is_number_literal(value) {
            Ok(ColumnType::Number)
        } else {
            Ok(ColumnType::String)
        }
    }
}

/// `<ClassSchema>` entries for the columns whose type the heuristics would
/// get wrong on at least one of `classes`, or `None` when every column
/// infers correctly.
pub fn required_overrides(columns: &ColumnTable, classes: &[Attributes]) -> Option<Attributes> {
    let heuristics = TypeInferencer::new();
    let schema: Attributes = columns
        .columns()
        .iter()
        .filter(|col| {
            classes.iter().any(|class| {
                class
                    .get(&col.full_name)
                    .is_some_and(|v| !matches!(heuristics.infer(&col.full_name, v), Ok(t) if t == col.col_type))
            })
        })
        .map(|col| (col.full_name.as_str(), col.col_type.keyword()))
        .collect();
    (!schema.is_empty()).then_some(schema)
}
