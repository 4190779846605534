//! Blake3 hashing utilities for content fingerprints.
//!
//! Fingerprints identify unit content independently of where it was loaded
//! from, so two copies of the same (id, version) can be compared cheaply.

/// Incremental hasher over a sequence of length-prefixed fields.
///
/// Length prefixes keep `("ab", "c")` and `("a", "bc")` from colliding.
pub struct ContentHasher {
    hasher: blake3::Hasher,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self {
            hasher: blake3::Hasher::new(),
        }
    }

    /// Feed one field
    pub fn field(&mut self, value: &str) -> &mut Self {
        self.hasher.update(&(value.len() as u64).to_le_bytes());
        self.hasher.update(value.as_bytes());
        self
    }

    /// Feed an optional field, distinguishing `None` from `Some("")`
    pub fn optional(&mut self, value: Option<&str>) -> &mut Self {
        match value {
            Some(value) => {
                self.hasher.update(&[1]);
                self.field(value)
            },
            None => {
                self.hasher.update(&[0]);
                self
            },
        }
    }

    /// Hex digest of everything fed so far
    pub fn finish(&self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable_hex() {
        let hash = ContentHasher::new().field("hello world").finish();

        assert_eq!(hash.len(), 64); // 32 bytes = 64 hex chars
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, ContentHasher::new().field("hello world").finish());
    }

    #[test]
    fn test_field_boundaries_matter() {
        let a = ContentHasher::new().field("ab").field("c").finish();
        let b = ContentHasher::new().field("a").field("bc").finish();
        assert_ne!(a, b);
    }

    #[test]
    fn test_optional_none_differs_from_empty() {
        let none = ContentHasher::new().optional(None).finish();
        let empty = ContentHasher::new().optional(Some("")).finish();
        assert_ne!(none, empty);
    }
}
