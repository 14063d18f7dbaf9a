use crate::error::{invalid_argument, BridgeResult};
use crate::model::ResourcePath;

/// Validated path to a single document.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DocumentKey {
    path: ResourcePath,
}

impl DocumentKey {
    pub fn from_path(path: ResourcePath) -> BridgeResult<Self> {
        if path.len() < 2 || path.len() % 2 != 0 {
            return Err(invalid_argument(
                "Document paths must contain an even number of segments",
            ));
        }
        Ok(Self { path })
    }

    pub fn from_string(path: &str) -> BridgeResult<Self> {
        Self::from_path(ResourcePath::from_string(path)?)
    }

    /// Path of the collection containing this document.
    pub fn collection_path(&self) -> ResourcePath {
        self.path.without_last()
    }

    /// Identifier of the containing collection (its final path segment).
    pub fn collection_id(&self) -> &str {
        self.path
            .segment(self.path.len() - 2)
            .unwrap_or_default()
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    pub fn id(&self) -> &str {
        self.path.last_segment().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_collection_paths() {
        let err = DocumentKey::from_string("users").unwrap_err();
        assert_eq!(err.code_str(), "invalid-argument");
    }

    #[test]
    fn exposes_collection_and_id() {
        let key = DocumentKey::from_string("users/ada").unwrap();
        assert_eq!(key.id(), "ada");
        assert_eq!(key.collection_id(), "users");
        assert_eq!(key.collection_path().canonical_string(), "users");
    }

    #[test]
    fn nested_documents_parse() {
        let key = DocumentKey::from_string("users/ada/repos/engine").unwrap();
        assert_eq!(key.collection_id(), "repos");
    }
}
