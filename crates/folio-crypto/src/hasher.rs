use folio_types::ObjectId;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g., `"folio-object-v1"`) that is
/// prepended to every hash computation. This prevents cross-type hash
/// collisions: an object and a commit with identical bytes will produce
/// different ids.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for object store content (references).
    pub const OBJECT: Self = Self {
        domain: "folio-object-v1",
    };
    /// Hasher for commit content.
    pub const COMMIT: Self = Self {
        domain: "folio-commit-v1",
    };
    /// Hasher for user identities (storage directory names).
    pub const USER: Self = Self {
        domain: "folio-user-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> ObjectId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        ObjectId::from_hash(*hasher.finalize().as_bytes())
    }

    /// Hash the canonical bincode encoding of a value with domain separation.
    ///
    /// Bincode is deterministic for the ordered types used in commit content
    /// (`Vec`, `BTreeMap`), so equal values always hash equally.
    pub fn hash_encoded<T: serde::Serialize>(&self, value: &T) -> Result<ObjectId, HasherError> {
        let data =
            bincode::serialize(value).map_err(|e| HasherError::Serialization(e.to_string()))?;
        Ok(self.hash(&data))
    }

    /// Verify that data produces the expected object ID.
    pub fn verify(&self, data: &[u8], expected: &ObjectId) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let data = b"hello world";
        assert_eq!(ContentHasher::OBJECT.hash(data), ContentHasher::OBJECT.hash(data));
    }

    #[test]
    fn different_domains_produce_different_hashes() {
        let data = b"same content";
        assert_ne!(
            ContentHasher::OBJECT.hash(data),
            ContentHasher::COMMIT.hash(data)
        );
    }

    #[test]
    fn verify_correct_and_tampered_data() {
        let id = ContentHasher::OBJECT.hash(b"original");
        assert!(ContentHasher::OBJECT.verify(b"original", &id));
        assert!(!ContentHasher::OBJECT.verify(b"tampered", &id));
    }

    #[test]
    fn encoded_hash_ignores_insertion_order() {
        let mut a = BTreeMap::new();
        a.insert(b"x".to_vec(), 1u32);
        a.insert(b"y".to_vec(), 2u32);
        let mut b = BTreeMap::new();
        b.insert(b"y".to_vec(), 2u32);
        b.insert(b"x".to_vec(), 1u32);
        assert_eq!(
            ContentHasher::COMMIT.hash_encoded(&a).unwrap(),
            ContentHasher::COMMIT.hash_encoded(&b).unwrap()
        );
    }

    #[test]
    fn custom_domain() {
        let hasher = ContentHasher::new("my-custom-domain-v1");
        assert_eq!(hasher.domain(), "my-custom-domain-v1");
        assert_ne!(hasher.hash(b"data"), ContentHasher::OBJECT.hash(b"data"));
    }
}
