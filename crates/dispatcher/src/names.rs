//! Configured display names for devices

use std::collections::HashMap;

use contracts::{normalize_mac, DeviceId};

/// Display-name table keyed by normalized hardware address
///
/// Keys are stored without separators and upper-cased, so
/// `"aa:bb:cc:dd:ee:ff"`, `"AA-BB-CC-DD-EE-FF"` and `"AABBCCDDEEFF"` all
/// refer to the same device.
#[derive(Debug, Clone, Default)]
pub struct TagNames(HashMap<String, String>);

impl TagNames {
    /// Build from the raw configuration table
    pub fn new(raw: &HashMap<String, String>) -> Self {
        raw.iter().collect()
    }

    /// Display name of a device, if configured
    pub fn lookup(&self, mac: &DeviceId) -> Option<&str> {
        self.0.get(&mac.normalized()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for TagNames {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(mac, name)| (normalize_mac(mac.as_ref()), name.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_separators_and_case() {
        let names: TagNames = [("aa:bb:cc:dd:ee:ff", "Fridge")].into_iter().collect();

        assert_eq!(names.lookup(&"AA:BB:CC:DD:EE:FF".into()), Some("Fridge"));
        assert_eq!(names.lookup(&"aa-bb-cc-dd-ee-ff".into()), Some("Fridge"));
        assert_eq!(names.lookup(&"aabbccddeeff".into()), Some("Fridge"));
        assert_eq!(names.lookup(&"aa:bb:cc:dd:ee:00".into()), None);
    }

    #[test]
    fn test_new_from_config_table() {
        let raw = HashMap::from([
            ("AABBCCDDEE01".to_string(), "Sauna".to_string()),
            ("aa:bb:cc:dd:ee:02".to_string(), "Balcony".to_string()),
        ]);
        let names = TagNames::new(&raw);

        assert_eq!(names.len(), 2);
        assert_eq!(names.lookup(&"aa:bb:cc:dd:ee:01".into()), Some("Sauna"));
        assert!(!names.is_empty());
    }
}
