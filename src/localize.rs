//! Merging a per-locale XML file with the base file it overrides.
//!
//! A localized file lives in a short locale directory (`data/eng/Item.xml`)
//! next to its base (`data/Item.xml`) and only carries the attributes that
//! differ. Before encoding, every class is completed from the base.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::attributes::{Attributes, CLASS_ID, CLASS_NAME};
use crate::overlay::LayeredClass;
use crate::xml::XmlDocument;

/// How localized files are recognized on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocaleLayout {
    Disabled,
    /// The parent directory name has exactly this many characters.
    DirectoryNameLength(usize),
}

impl Default for LocaleLayout {
    fn default() -> Self {
        LocaleLayout::DirectoryNameLength(3)
    }
}

impl LocaleLayout {
    pub fn is_localized(&self, input: &Path) -> bool {
        match self {
            LocaleLayout::Disabled => false,
            LocaleLayout::DirectoryNameLength(len) => input
                .parent()
                .and_then(Path::file_name)
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.chars().count() == *len),
        }
    }

    /// Where the base file of a localized `input` would be.
    pub fn base_path(&self, input: &Path) -> Option<PathBuf> {
        if !self.is_localized(input) {
            return None;
        }
        let file_name = input.file_name()?;
        let locale_dir = input.parent()?;
        let base_dir = locale_dir.parent()?;
        Some(base_dir.join(file_name))
    }
}

/// Complete every class of `doc` with the attributes of its base class.
///
/// Base classes are matched by `ClassID` when the localized class has one,
/// else by `ClassName`. Root module fields come from the base, and the base
/// schema is used unless the localized file has its own.
pub fn merge_localized(doc: &mut XmlDocument, base: &XmlDocument) {
    let mut by_id: HashMap<&str, &Attributes> = HashMap::new();
    let mut by_name: HashMap<&str, &Attributes> = HashMap::new();
    for class in &base.classes {
        if let Some(id) = class.get(CLASS_ID) {
            by_id.entry(id).or_insert(class);
        }
        if let Some(name) = class.get(CLASS_NAME) {
            by_name.entry(name).or_insert(class);
        }
    }

    let mut unmatched = 0usize;
    for class in &mut doc.classes {
        let base_class = match class.get(CLASS_ID).filter(|id| !id.is_empty()) {
            Some(id) => by_id.get(id),
            None => class.get(CLASS_NAME).and_then(|name| by_name.get(name)),
        };
        match base_class {
            Some(&found) => {
                let layered = LayeredClass::new(Some(found.clone()), Some(std::mem::take(class)));
                *class = layered.merged();
            }
            None => unmatched += 1,
        }
    }
    if unmatched > 0 {
        debug!("{unmatched} localized classes have no base class in {}", base.id);
    }

    if base.module.is_some() {
        doc.module = base.module.clone();
    }
    if base.module_prefix.is_some() {
        doc.module_prefix = base.module_prefix.clone();
    }
    if doc.schema.is_none() {
        doc.schema = base.schema.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(pairs: &[(&str, &str)]) -> Attributes {
        pairs.iter().copied().collect()
    }

    #[test]
    fn locale_directory_detection() {
        let layout = LocaleLayout::default();
        assert!(layout.is_localized(Path::new("data/eng/Item.xml")));
        assert!(!layout.is_localized(Path::new("data/english/Item.xml")));
        assert!(!layout.is_localized(Path::new("Item.xml")));
        assert_eq!(layout.base_path(Path::new("data/eng/Item.xml")), Some(PathBuf::from("data/Item.xml")));
        assert_eq!(LocaleLayout::Disabled.base_path(Path::new("data/eng/Item.xml")), None);
        assert!(LocaleLayout::DirectoryNameLength(5).is_localized(Path::new("x/pt_BR/a.xml")));
    }

    #[test]
    fn merge_by_id_then_name() {
        let mut base = XmlDocument::new("Item");
        base.module = Some("Shop".into());
        base.schema = Some(class(&[("Rank", "STRING")]));
        base.classes = vec![
            class(&[("ClassID", "1"), ("ClassName", "Sword"), ("Price", "10"), ("Name", "Sword")]),
            class(&[("ClassID", "2"), ("ClassName", "Helm"), ("Price", "3"), ("Name", "Helm")]),
        ];

        let mut local = XmlDocument::new("Item");
        local.classes = vec![
            class(&[("ClassID", "1"), ("Name", "Schwert")]),
            class(&[("ClassName", "Helm"), ("Name", "Helm DE")]),
            class(&[("ClassID", "9"), ("Name", "Orphan")]),
        ];

        merge_localized(&mut local, &base);
        assert_eq!(local.module.as_deref(), Some("Shop"));
        assert_eq!(local.schema, base.schema);

        let first: Vec<_> = local.classes[0].iter().map(|(k, v)| format!("{k}={v}")).collect();
        assert_eq!(first, vec!["ClassID=1", "Name=Schwert", "ClassName=Sword", "Price=10"]);
        assert_eq!(local.classes[1].get("Price"), Some("3"));
        assert_eq!(local.classes[1].get("Name"), Some("Helm DE"));
        assert_eq!(local.classes[2].len(), 2);
    }

    #[test]
    fn local_schema_is_kept() {
        let mut base = XmlDocument::new("Item");
        base.schema = Some(class(&[("Rank", "STRING")]));
        let mut local = XmlDocument::new("Item");
        local.schema = Some(class(&[("Rank", "NUMBER")]));
        merge_localized(&mut local, &base);
        assert_eq!(local.schema.unwrap().get("Rank"), Some("NUMBER"));
    }
}
