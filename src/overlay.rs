//! Two-layer class view: a base file's attributes with a localized override.
//!
//! Reads see the override first and the base second. Writes go to the
//! override whenever one exists; writing a value equal to the base drops the
//! redundant override entry instead.

use crate::attributes::Attributes;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayeredClass {
    pub base:  Option<Attributes>,
    pub local: Option<Attributes>,
}

impl LayeredClass {
    pub fn new(base: Option<Attributes>, local: Option<Attributes>) -> Self {
        Self { base, local }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.local
            .as_ref()
            .and_then(|l| l.get(key))
            .or_else(|| self.base.as_ref().and_then(|b| b.get(key)))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set `key`, promoting the write into the override layer when present.
    pub fn set(&mut self, key: &str, value: &str) {
        if let Some(local) = self.local.as_mut() {
            if self.base.as_ref().and_then(|b| b.get(key)) == Some(value) {
                local.remove(key);
            } else {
                local.insert(key, value);
            }
            return;
        }
        self.base.get_or_insert_with(Attributes::new).insert(key, value);
    }

    /// Remove from the override if it has the key, else from the base.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        if let Some(v) = self.local.as_mut().and_then(|l| l.remove(key)) {
            return Some(v);
        }
        self.base.as_mut().and_then(|b| b.remove(key))
    }

    /// Override keys in override order with their values, then the base
    /// keys the override does not have.
    pub fn merged(&self) -> Attributes {
        let mut out = self.local.clone().unwrap_or_default();
        if let Some(base) = &self.base {
            for (k, v) in base.iter() {
                if !out.contains_key(k) {
                    out.insert(k, v);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs.iter().copied().collect()
    }

    #[test]
    fn override_wins_on_read() {
        let cls = LayeredClass::new(
            Some(attrs(&[("ClassID", "1"), ("Name", "Sword"), ("Price", "10")])),
            Some(attrs(&[("ClassID", "1"), ("Name", "Schwert"), ("Extra", "x")])),
        );
        assert_eq!(cls.get("Name"), Some("Schwert"));
        assert_eq!(cls.get("Price"), Some("10"));
        let merged: Vec<_> = cls.merged().iter().map(|(k, v)| format!("{k}={v}")).collect();
        assert_eq!(merged, vec!["ClassID=1", "Name=Schwert", "Extra=x", "Price=10"]);
    }

    #[test]
    fn writes_are_promoted_to_override() {
        let mut cls = LayeredClass::new(Some(attrs(&[("Name", "Sword")])), Some(Attributes::new()));
        cls.set("Name", "Schwert");
        assert_eq!(cls.local.as_ref().unwrap().get("Name"), Some("Schwert"));
        assert_eq!(cls.base.as_ref().unwrap().get("Name"), Some("Sword"));

        // Writing the base value back removes the redundant override.
        cls.set("Name", "Sword");
        assert!(!cls.local.as_ref().unwrap().contains_key("Name"));
        assert_eq!(cls.get("Name"), Some("Sword"));
    }

    #[test]
    fn base_only_writes_go_to_base() {
        let mut cls = LayeredClass::new(Some(Attributes::new()), None);
        cls.set("Price", "5");
        assert_eq!(cls.base.as_ref().unwrap().get("Price"), Some("5"));
        assert_eq!(cls.remove("Price").as_deref(), Some("5"));
        assert!(!cls.contains_key("Price"));
    }
}
