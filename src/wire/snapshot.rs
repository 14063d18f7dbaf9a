use serde_json::{json, Value as JsonValue};

use crate::error::BridgeResult;
use crate::store::DocumentSnapshot;
use crate::wire::value::encode_fields;

/// Transport shape of a single document read: `{path, exists, data?}` with
/// `data` present exactly when the document exists.
pub fn document_result(snapshot: &DocumentSnapshot) -> BridgeResult<JsonValue> {
    let mut result = json!({
        "path": snapshot.key().path().canonical_string(),
        "exists": snapshot.exists(),
    });
    if let Some(map) = snapshot.map_value() {
        result["data"] = encode_fields(map)?;
    }
    Ok(result)
}

/// Transport shape of a query read.
///
/// The change list is always empty and both metadata flags are always false:
/// the bridge offers no live-update channel, so there is never a baseline to
/// diff against nor a cache to have served from.
pub fn query_result(snapshots: &[DocumentSnapshot]) -> BridgeResult<JsonValue> {
    let mut documents = Vec::with_capacity(snapshots.len());
    for snapshot in snapshots {
        documents.push(document_result(snapshot)?);
    }
    Ok(json!({
        "source": "server",
        "changes": [],
        "metadata": {
            "fromCache": false,
            "hasPendingWrites": false,
        },
        "documents": documents,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DocumentKey;
    use crate::store::SnapshotMetadata;
    use crate::value::{MapValue, StoreValue};
    use std::collections::BTreeMap;

    #[test]
    fn missing_documents_omit_data() {
        let key = DocumentKey::from_string("users/ada").unwrap();
        let snapshot = DocumentSnapshot::new(key, None, SnapshotMetadata::default());
        let result = document_result(&snapshot).unwrap();
        assert_eq!(result["exists"], json!(false));
        assert!(result.get("data").is_none());
    }

    #[test]
    fn present_documents_carry_data() {
        let key = DocumentKey::from_string("users/ada").unwrap();
        let fields = BTreeMap::from([("name".to_string(), StoreValue::from_string("Ada"))]);
        let snapshot = DocumentSnapshot::new(
            key,
            Some(MapValue::new(fields)),
            SnapshotMetadata::default(),
        );
        let result = document_result(&snapshot).unwrap();
        assert_eq!(result["exists"], json!(true));
        assert_eq!(result["data"]["name"], json!({ "stringValue": "Ada" }));
    }

    #[test]
    fn query_results_pin_metadata_and_changes() {
        let result = query_result(&[]).unwrap();
        assert_eq!(result["source"], json!("server"));
        assert_eq!(result["changes"], json!([]));
        assert_eq!(result["metadata"]["fromCache"], json!(false));
        assert_eq!(result["metadata"]["hasPendingWrites"], json!(false));
        assert_eq!(result["documents"], json!([]));
    }
}
