//! Shader Macro Definitions
//!
//! [`ShaderDefines`] stores `(name, value)` pairs sorted by name, so two sets
//! built in different orders compare equal and serialize to the same bytes.
//! The serialized form feeds the shader cache key.
//!
//! ```rust,ignore
//! let mut defines = ShaderDefines::new();
//! defines.set("SHARPNESS", "0.4");
//! defines.set("USE_DITHER", "1");
//! ```

use loupe_core::ContentHasher;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ShaderDefines {
    defines: Vec<(String, String)>,
}

impl ShaderDefines {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            defines: Vec::new(),
        }
    }

    /// Set a define, replacing any previous value.
    pub fn set(&mut self, key: &str, value: &str) {
        match self.position(key) {
            Ok(idx) => value.clone_into(&mut self.defines[idx].1),
            Err(idx) => self.defines.insert(idx, (key.to_string(), value.to_string())),
        }
    }

    /// Builder form of [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> bool {
        if let Ok(idx) = self.position(key) {
            self.defines.remove(idx);
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_ok()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.position(key)
            .ok()
            .map(|idx| self.defines[idx].1.as_str())
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.defines.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defines.is_empty()
    }

    /// Iterate defines in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.defines.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Merge `other` into `self`; values from `other` win on conflict.
    pub fn merge(&mut self, other: &ShaderDefines) {
        for (key, value) in other.iter() {
            self.set(key, value);
        }
    }

    /// Append every define to a cache-key hasher.
    pub fn hash_into(&self, hasher: &mut ContentHasher) {
        hasher.write_field(&(self.defines.len() as u64).to_le_bytes());
        for (key, value) in self.iter() {
            hasher.write_str(key).write_str(value);
        }
    }

    fn position(&self, key: &str) -> Result<usize, usize> {
        self.defines
            .binary_search_by(|(k, _)| k.as_str().cmp(key))
    }
}

impl From<&[(&str, &str)]> for ShaderDefines {
    fn from(defines: &[(&str, &str)]) -> Self {
        let mut result = Self::new();
        for (k, v) in defines {
            result.set(k, v);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut defines = ShaderDefines::new();
        defines.set("USE_DITHER", "1");
        defines.set("SHARPNESS", "0.4");

        assert!(defines.contains("USE_DITHER"));
        assert!(!defines.contains("USE_HDR"));
        assert_eq!(defines.get("SHARPNESS"), Some("0.4"));

        defines.set("SHARPNESS", "0.8");
        assert_eq!(defines.get("SHARPNESS"), Some("0.8"));
        assert_eq!(defines.len(), 2);
    }

    #[test]
    fn test_sorted_by_name() {
        let defines = ShaderDefines::new().with("C", "1").with("A", "1").with("B", "1");
        let keys: Vec<_> = defines.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_merge() {
        let mut d1 = ShaderDefines::new().with("A", "1").with("B", "2");
        let d2 = ShaderDefines::new().with("B", "3").with("C", "4");
        d1.merge(&d2);

        assert_eq!(d1.get("A"), Some("1"));
        assert_eq!(d1.get("B"), Some("3"));
        assert_eq!(d1.get("C"), Some("4"));
    }

    #[test]
    fn test_insertion_order_does_not_change_hash() {
        let d1 = ShaderDefines::new().with("A", "1").with("B", "2");
        let d2 = ShaderDefines::new().with("B", "2").with("A", "1");

        let mut h1 = ContentHasher::new();
        d1.hash_into(&mut h1);
        let mut h2 = ContentHasher::new();
        d2.hash_into(&mut h2);
        assert_eq!(h1.finish(), h2.finish());
    }

    #[test]
    fn test_remove() {
        let mut defines = ShaderDefines::new().with("A", "1");
        assert!(defines.remove("A"));
        assert!(!defines.remove("A"));
        assert!(defines.is_empty());
    }
}
