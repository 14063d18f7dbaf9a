use std::collections::BTreeMap;

use crate::model::DocumentKey;
use crate::value::{MapValue, StoreValue};

/// Cache/mutation state attached to a snapshot.
///
/// The bridge has no offline cache and no pending-write tracking, so both
/// flags are always reported as `false` across the boundary; the type keeps
/// the engine seam honest about where those flags would come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SnapshotMetadata {
    from_cache: bool,
    has_pending_writes: bool,
}

impl SnapshotMetadata {
    pub fn new(from_cache: bool, has_pending_writes: bool) -> Self {
        Self {
            from_cache,
            has_pending_writes,
        }
    }

    pub fn from_cache(&self) -> bool {
        self.from_cache
    }

    pub fn has_pending_writes(&self) -> bool {
        self.has_pending_writes
    }
}

/// Point-in-time view of a single document.
#[derive(Clone, Debug)]
pub struct DocumentSnapshot {
    key: DocumentKey,
    data: Option<MapValue>,
    metadata: SnapshotMetadata,
}

impl DocumentSnapshot {
    pub fn new(key: DocumentKey, data: Option<MapValue>, metadata: SnapshotMetadata) -> Self {
        Self {
            key,
            data,
            metadata,
        }
    }

    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    pub fn data(&self) -> Option<&BTreeMap<String, StoreValue>> {
        self.data.as_ref().map(|map| map.fields())
    }

    pub fn map_value(&self) -> Option<&MapValue> {
        self.data.as_ref()
    }

    pub fn metadata(&self) -> &SnapshotMetadata {
        &self.metadata
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn id(&self) -> &str {
        self.key.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_presence_tracks_existence() {
        let key = DocumentKey::from_string("users/ada").unwrap();
        let missing = DocumentSnapshot::new(key.clone(), None, SnapshotMetadata::default());
        assert!(!missing.exists());
        assert!(missing.data().is_none());

        let present = DocumentSnapshot::new(
            key,
            Some(MapValue::default()),
            SnapshotMetadata::default(),
        );
        assert!(present.exists());
        assert!(present.data().is_some());
    }
}
