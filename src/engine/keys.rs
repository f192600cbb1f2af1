//! Global keys - stable identity for components within one tree.
//!
//! A global key is the parent's global key, a separator, and either the
//! manual key or the component type id. Siblings that collide get a
//! `!n` suffix in encounter order:
//!
//! ```text
//! root            "1"
//! ├── Text        "1,77"
//! ├── Text        "1,77!1"
//! └── Text key=a  "1,a"
//! ```

use std::collections::HashMap;

use super::ComponentTypeId;

/// Separator between the parent key and the child segment.
pub const KEY_SEPARATOR: char = ',';

/// Marker preceding the collision counter.
pub const DUPLICATE_MARKER: char = '!';

/// Generates global keys for one resolve pass.
///
/// Counters are scoped per parent so that inserting a child under one parent
/// never perturbs keys under another. The generator is part of a resumable
/// resolve and therefore `Clone`.
#[derive(Debug, Clone, Default)]
pub struct KeyGenerator {
    type_counts: HashMap<(String, ComponentTypeId), u32>,
    manual_counts: HashMap<(String, String), u32>,
}

impl KeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the global key for a child of `parent_key`.
    pub fn global_key(
        &mut self,
        parent_key: Option<&str>,
        type_id: ComponentTypeId,
        manual_key: Option<&str>,
    ) -> String {
        let parent = parent_key.unwrap_or_default().to_string();

        let (segment, occurrence) = match manual_key {
            Some(key) => {
                let count = self
                    .manual_counts
                    .entry((parent.clone(), key.to_string()))
                    .or_insert(0);
                let occurrence = *count;
                *count += 1;
                if occurrence > 0 {
                    log::warn!(
                        "duplicate manual key '{key}' under '{parent}', disambiguating as #{occurrence}"
                    );
                }
                (key.to_string(), occurrence)
            }
            None => {
                let count = self.type_counts.entry((parent.clone(), type_id)).or_insert(0);
                let occurrence = *count;
                *count += 1;
                (type_id.value().to_string(), occurrence)
            }
        };

        let mut key = match parent_key {
            Some(parent) => format!("{parent}{KEY_SEPARATOR}{segment}"),
            None => segment,
        };
        if occurrence > 0 {
            key.push(DUPLICATE_MARKER);
            key.push_str(&occurrence.to_string());
        }
        key
    }
}

/// Parent portion of a global key, `None` for a root key.
pub fn parent_global_key(global_key: &str) -> Option<&str> {
    global_key.rfind(KEY_SEPARATOR).map(|idx| &global_key[..idx])
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: ComponentTypeId = ComponentTypeId::new(77);
    const IMAGE: ComponentTypeId = ComponentTypeId::new(78);

    #[test]
    fn test_root_key_is_type_id() {
        let mut keys = KeyGenerator::new();
        assert_eq!(keys.global_key(None, TEXT, None), "77");
    }

    #[test]
    fn test_type_collisions_get_counters() {
        let mut keys = KeyGenerator::new();
        assert_eq!(keys.global_key(Some("1"), TEXT, None), "1,77");
        assert_eq!(keys.global_key(Some("1"), TEXT, None), "1,77!1");
        assert_eq!(keys.global_key(Some("1"), IMAGE, None), "1,78");
        assert_eq!(keys.global_key(Some("1"), TEXT, None), "1,77!2");
    }

    #[test]
    fn test_manual_keys_are_independent_of_type() {
        let mut keys = KeyGenerator::new();
        assert_eq!(keys.global_key(Some("1"), TEXT, Some("a")), "1,a");
        assert_eq!(keys.global_key(Some("1"), IMAGE, Some("b")), "1,b");
        assert_eq!(keys.global_key(Some("1"), IMAGE, Some("a")), "1,a!1");
        // Manual keys do not consume the type counter.
        assert_eq!(keys.global_key(Some("1"), TEXT, None), "1,77");
    }

    #[test]
    fn test_counters_scoped_per_parent() {
        let mut keys = KeyGenerator::new();
        assert_eq!(keys.global_key(Some("1,5"), TEXT, None), "1,5,77");
        assert_eq!(keys.global_key(Some("1,6"), TEXT, None), "1,6,77");
    }

    #[test]
    fn test_parent_global_key() {
        assert_eq!(parent_global_key("1,5,77"), Some("1,5"));
        assert_eq!(parent_global_key("1"), None);
    }
}
