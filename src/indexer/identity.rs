//! Deterministic point identity.
//!
//! Re-indexing overwrites instead of duplicating only because the same file
//! always maps to the same id. There is no second uniqueness check against
//! the vector store.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Key field holding the project identifier
pub const PROJECT_FIELD: &str = "project";
/// Key field holding the absolute file path
pub const ABSOLUTE_PATH_FIELD: &str = "absolute_path";
/// Key field holding the bare file name
pub const FILE_NAME_FIELD: &str = "file_name";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Insufficient metadata to derive a deterministic id")]
    InsufficientIdentity,
}

/// Metadata fields used as the sole input to id derivation.
///
/// Backed by a `BTreeMap` so fallback fields are always visited in sorted
/// key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityKey {
    fields: BTreeMap<String, String>,
}

impl IdentityKey {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for the common case of a file inside a project
    pub fn for_file(project: &str, absolute_path: &str) -> Self {
        Self::new()
            .with(PROJECT_FIELD, project)
            .with(ABSOLUTE_PATH_FIELD, absolute_path)
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// The string that gets hashed.
    ///
    /// `project:absolute_path` when both are non-empty. Otherwise
    /// `file:<name>;` (when a file-name field exists) followed by `key:value;`
    /// for every other non-empty field in sorted order.
    pub fn canonical_string(&self) -> String {
        let project = self.get(PROJECT_FIELD).unwrap_or_default();
        let absolute_path = self.get(ABSOLUTE_PATH_FIELD).unwrap_or_default();

        if !project.is_empty() && !absolute_path.is_empty() {
            return format!("{}:{}", project, absolute_path);
        }

        let mut canonical = String::new();
        if let Some(name) = self.get(FILE_NAME_FIELD) {
            canonical.push_str(&format!("file:{};", name));
        }

        for (field, value) in &self.fields {
            if matches!(
                field.as_str(),
                PROJECT_FIELD | ABSOLUTE_PATH_FIELD | FILE_NAME_FIELD
            ) || value.is_empty()
            {
                continue;
            }
            canonical.push_str(&format!("{}:{};", field, value));
        }

        canonical
    }
}

/// 128-bit digest of an [`IdentityKey`], rendered as lowercase hex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeterministicId([u8; 16]);

impl DeterministicId {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Lowercase hex, 32 characters
    pub fn to_hex(&self) -> String {
        self.to_string()
    }

    /// The same 16 bytes as a UUID, for stores that only accept UUID ids
    pub fn to_uuid(&self) -> Uuid {
        Uuid::from_bytes(self.0)
    }
}

impl fmt::Display for DeterministicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Derives stable ids from identifying metadata
pub trait IdentityGenerator: Send + Sync {
    fn generate(&self, key: &IdentityKey) -> Result<DeterministicId, IdentityError>;
}

/// MD5 over the canonical key string
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5IdentityGenerator;

impl IdentityGenerator for Md5IdentityGenerator {
    fn generate(&self, key: &IdentityKey) -> Result<DeterministicId, IdentityError> {
        let canonical = key.canonical_string();
        if canonical.is_empty() {
            return Err(IdentityError::InsufficientIdentity);
        }
        Ok(DeterministicId(md5::compute(canonical.as_bytes()).0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_project_and_path_canonical_form() {
        let key = IdentityKey::for_file("demo", "/srv/demo/a.txt").with("size_bytes", "5");
        assert_eq!(key.canonical_string(), "demo:/srv/demo/a.txt");
    }

    #[test]
    fn test_known_digest() {
        // md5("demo:/srv/demo/a.txt")
        let id = Md5IdentityGenerator
            .generate(&IdentityKey::for_file("demo", "/srv/demo/a.txt"))
            .unwrap();
        let expected = format!("{:x}", md5::compute("demo:/srv/demo/a.txt"));

        assert_eq!(id.to_hex(), expected);
        assert_eq!(id.to_hex().len(), 32);
        assert!(id.to_hex().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_fallback_fields_sorted() {
        let key = IdentityKey::new()
            .with("zeta", "last")
            .with(FILE_NAME_FIELD, "a.txt")
            .with("alpha", "first")
            .with("empty", "")
            .with(PROJECT_FIELD, "demo");

        assert_eq!(
            key.canonical_string(),
            "file:a.txt;alpha:first;zeta:last;"
        );
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let a = IdentityKey::new().with("b", "2").with("a", "1");
        let b = IdentityKey::new().with("a", "1").with("b", "2");

        let generator = Md5IdentityGenerator;
        assert_eq!(generator.generate(&a).unwrap(), generator.generate(&b).unwrap());
    }

    #[test]
    fn test_empty_key_is_insufficient() {
        let generator = Md5IdentityGenerator;

        assert_eq!(
            generator.generate(&IdentityKey::new()),
            Err(IdentityError::InsufficientIdentity)
        );
        assert_eq!(
            generator.generate(&IdentityKey::new().with("only_empty", "")),
            Err(IdentityError::InsufficientIdentity)
        );
    }

    #[test]
    fn test_repeated_generation_is_identical() {
        let generator = Md5IdentityGenerator;
        let key = IdentityKey::for_file("demo", "/srv/demo/src/lib.rs");

        let first = generator.generate(&key).unwrap();
        for _ in 0..10 {
            assert_eq!(generator.generate(&key).unwrap(), first);
        }
    }

    #[test]
    fn test_no_collisions_across_corpus() {
        let generator = Md5IdentityGenerator;
        let mut seen = HashSet::new();

        for project in ["alpha", "beta"] {
            for i in 0..150 {
                let path = format!("/srv/{}/src/module_{}/file_{}.rs", project, i % 7, i);
                let id = generator.generate(&IdentityKey::for_file(project, &path)).unwrap();
                assert!(seen.insert(id), "collision for {}", path);
            }
        }

        assert_eq!(seen.len(), 300);
    }

    #[test]
    fn test_uuid_rendering_shares_bytes() {
        let id = Md5IdentityGenerator
            .generate(&IdentityKey::for_file("demo", "/a"))
            .unwrap();

        assert_eq!(id.to_uuid().simple().to_string(), id.to_hex());
    }
}
