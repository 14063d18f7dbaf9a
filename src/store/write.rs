use std::collections::{BTreeMap, HashSet};

use crate::error::{invalid_argument, BridgeResult};
use crate::model::{DocumentKey, FieldPath};
use crate::value::{MapValue, SentinelValue, StoreValue, ValueKind};

/// Options controlling how a `set` write treats fields absent from its data.
///
/// The merge flag and an explicit field mask are mutually exclusive; the
/// constructors make it impossible to hold both. Neither means overwrite.
#[derive(Clone, Debug, Default)]
pub struct SetOptions {
    merge: bool,
    merge_fields: Option<Vec<FieldPath>>,
}

impl SetOptions {
    /// Plain overwrite semantics.
    pub fn overwrite() -> Self {
        Self::default()
    }

    /// Merges every field present in the provided data.
    pub fn merge_all() -> Self {
        Self {
            merge: true,
            merge_fields: None,
        }
    }

    /// Merges only the named field paths.
    pub fn merge_fields<I>(fields: I) -> BridgeResult<Self>
    where
        I: IntoIterator<Item = FieldPath>,
    {
        let mut unique = Vec::new();
        let mut seen = HashSet::new();
        for field in fields {
            if seen.insert(field.canonical_string()) {
                unique.push(field);
            }
        }
        if unique.is_empty() {
            return Err(invalid_argument(
                "mergeFields requires at least one field path",
            ));
        }
        Ok(Self {
            merge: false,
            merge_fields: Some(unique),
        })
    }

    pub fn is_merge(&self) -> bool {
        self.merge || self.merge_fields.is_some()
    }

    pub fn field_mask(&self) -> Option<&[FieldPath]> {
        self.merge_fields.as_deref()
    }
}

/// Pre-encoded data for `set` style writes.
#[derive(Clone, Debug)]
pub struct EncodedSetData {
    pub map: MapValue,
    pub mask: Option<Vec<FieldPath>>,
    pub transforms: Vec<FieldTransform>,
}

/// Pre-encoded data for `update` style writes.
#[derive(Clone, Debug)]
pub struct EncodedUpdateData {
    pub map: MapValue,
    pub field_paths: Vec<FieldPath>,
    pub transforms: Vec<FieldTransform>,
}

/// A single field transform applied at commit time.
#[derive(Clone, Debug)]
pub struct FieldTransform {
    field_path: FieldPath,
    operation: TransformOperation,
}

impl FieldTransform {
    pub fn new(field_path: FieldPath, operation: TransformOperation) -> Self {
        Self {
            field_path,
            operation,
        }
    }

    pub fn field_path(&self) -> &FieldPath {
        &self.field_path
    }

    pub fn operation(&self) -> &TransformOperation {
        &self.operation
    }
}

#[derive(Clone, Debug)]
pub enum TransformOperation {
    ServerTimestamp,
    ArrayUnion(Vec<StoreValue>),
    ArrayRemove(Vec<StoreValue>),
    NumericIncrement(StoreValue),
}

pub fn validate_document_path(path: &str) -> BridgeResult<DocumentKey> {
    DocumentKey::from_string(path)
}

/// Splits set data into plain fields, transforms and the effective mask.
pub fn encode_set_data(
    data: BTreeMap<String, StoreValue>,
    options: &SetOptions,
) -> BridgeResult<EncodedSetData> {
    let (sanitized, transforms, sentinel_paths) = sanitize_for_write(data)?;

    let mut available_paths = collect_update_paths(&sanitized)?;
    available_paths.extend(sentinel_paths.iter().cloned());

    let mut available_set = HashSet::new();
    let mut deduped_paths = Vec::new();
    for path in available_paths {
        if available_set.insert(path.canonical_string()) {
            deduped_paths.push(path);
        }
    }

    let mask = if let Some(mask) = options.field_mask() {
        validate_mask_against_available(mask, &available_set)?;
        Some(mask.to_vec())
    } else if options.is_merge() {
        if deduped_paths.is_empty() {
            return Err(invalid_argument(
                "A merge set requires the data to contain at least one field",
            ));
        }
        Some(deduped_paths)
    } else {
        None
    };

    Ok(EncodedSetData {
        map: MapValue::new(sanitized),
        mask,
        transforms,
    })
}

pub fn encode_update_data(
    data: BTreeMap<String, StoreValue>,
) -> BridgeResult<EncodedUpdateData> {
    let (sanitized, transforms, _sentinel_paths) = sanitize_for_write(data)?;
    if sanitized.is_empty() && transforms.is_empty() {
        return Err(invalid_argument(
            "Updates require at least one field/value pair",
        ));
    }
    let field_paths = collect_update_paths(&sanitized)?;
    Ok(EncodedUpdateData {
        map: MapValue::new(sanitized),
        field_paths,
        transforms,
    })
}

fn sanitize_for_write(
    data: BTreeMap<String, StoreValue>,
) -> BridgeResult<(
    BTreeMap<String, StoreValue>,
    Vec<FieldTransform>,
    Vec<FieldPath>,
)> {
    let mut transforms = Vec::new();
    let mut sentinel_paths = Vec::new();
    let sanitized = sanitize_map(&data, &[], &mut transforms, &mut sentinel_paths)?;
    Ok((sanitized, transforms, sentinel_paths))
}

fn sanitize_map(
    data: &BTreeMap<String, StoreValue>,
    parent_segments: &[String],
    transforms: &mut Vec<FieldTransform>,
    sentinel_paths: &mut Vec<FieldPath>,
) -> BridgeResult<BTreeMap<String, StoreValue>> {
    let mut cleaned = BTreeMap::new();
    for (key, value) in data {
        let mut segments = parent_segments.to_vec();
        segments.push(key.clone());
        let field_path = FieldPath::new(segments.clone())?;
        match value.kind().clone() {
            ValueKind::Sentinel(sentinel) => {
                validate_sentinel_usage(&sentinel, &field_path)?;
                transforms.push(transform_from_sentinel(field_path.clone(), sentinel));
                sentinel_paths.push(field_path);
            }
            ValueKind::Map(map) => {
                let nested = sanitize_map(map.fields(), &segments, transforms, sentinel_paths)?;
                if !nested.is_empty() {
                    cleaned.insert(key.clone(), StoreValue::from_map(nested));
                }
            }
            ValueKind::Array(_) => {
                assert_no_sentinel_in_value(value, &field_path)?;
                cleaned.insert(key.clone(), value.clone());
            }
            _ => {
                cleaned.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(cleaned)
}

fn validate_sentinel_usage(sentinel: &SentinelValue, field_path: &FieldPath) -> BridgeResult<()> {
    match sentinel {
        SentinelValue::ServerTimestamp => Ok(()),
        SentinelValue::ArrayUnion(elements) | SentinelValue::ArrayRemove(elements) => {
            for element in elements {
                assert_no_sentinel_in_value(element, field_path)?;
            }
            Ok(())
        }
        SentinelValue::NumericIncrement(operand) => match operand.as_ref().kind() {
            ValueKind::Integer(_) | ValueKind::Double(_) => Ok(()),
            _ => Err(invalid_argument(
                "Numeric increments require an integer or double operand",
            )),
        },
    }
}

fn transform_from_sentinel(field_path: FieldPath, sentinel: SentinelValue) -> FieldTransform {
    let operation = match sentinel {
        SentinelValue::ServerTimestamp => TransformOperation::ServerTimestamp,
        SentinelValue::ArrayUnion(elements) => TransformOperation::ArrayUnion(elements),
        SentinelValue::ArrayRemove(elements) => TransformOperation::ArrayRemove(elements),
        SentinelValue::NumericIncrement(operand) => TransformOperation::NumericIncrement(*operand),
    };
    FieldTransform::new(field_path, operation)
}

fn assert_no_sentinel_in_value(value: &StoreValue, context: &FieldPath) -> BridgeResult<()> {
    match value.kind() {
        ValueKind::Sentinel(_) => Err(invalid_argument(format!(
            "Invalid data. Sentinel values cannot be used inside arrays (field '{}').",
            context.canonical_string()
        ))),
        ValueKind::Array(array) => {
            for element in array.values() {
                assert_no_sentinel_in_value(element, context)?;
            }
            Ok(())
        }
        ValueKind::Map(map) => {
            for element in map.fields().values() {
                assert_no_sentinel_in_value(element, context)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn validate_mask_against_available(
    mask: &[FieldPath],
    available: &HashSet<String>,
) -> BridgeResult<()> {
    for field in mask {
        if !available.contains(field.canonical_string().as_str()) {
            return Err(invalid_argument(format!(
                "Field '{}' is named in mergeFields but missing from the provided data",
                field.canonical_string()
            )));
        }
    }
    Ok(())
}

fn collect_update_paths(data: &BTreeMap<String, StoreValue>) -> BridgeResult<Vec<FieldPath>> {
    let mut paths = Vec::new();
    for (key, value) in data {
        collect_paths_from_value(&mut paths, vec![key.clone()], value)?;
    }
    Ok(paths)
}

fn collect_paths_from_value(
    acc: &mut Vec<FieldPath>,
    segments: Vec<String>,
    value: &StoreValue,
) -> BridgeResult<()> {
    match value.kind() {
        ValueKind::Map(map) if !map.fields().is_empty() => {
            for (child_key, child_value) in map.fields() {
                let mut child_segments = segments.clone();
                child_segments.push(child_key.clone());
                collect_paths_from_value(acc, child_segments, child_value)?;
            }
            Ok(())
        }
        _ => {
            acc.push(FieldPath::new(segments)?);
            Ok(())
        }
    }
}

pub(crate) fn value_at_field_path(
    fields: &BTreeMap<String, StoreValue>,
    path: &FieldPath,
) -> Option<StoreValue> {
    value_at_segments(fields, path.segments())
}

fn value_at_segments(
    fields: &BTreeMap<String, StoreValue>,
    segments: &[String],
) -> Option<StoreValue> {
    let (first, rest) = segments.split_first()?;
    let value = fields.get(first)?;
    if rest.is_empty() {
        Some(value.clone())
    } else if let ValueKind::Map(child) = value.kind() {
        value_at_segments(child.fields(), rest)
    } else {
        None
    }
}

pub(crate) fn set_value_at_field_path(
    fields: &mut BTreeMap<String, StoreValue>,
    path: &FieldPath,
    value: StoreValue,
) {
    set_value_at_segments(fields, path.segments(), value);
}

fn set_value_at_segments(
    fields: &mut BTreeMap<String, StoreValue>,
    segments: &[String],
    value: StoreValue,
) {
    if segments.is_empty() {
        return;
    }

    if segments.len() == 1 {
        fields.insert(segments[0].clone(), value);
        return;
    }

    let entry = fields
        .entry(segments[0].clone())
        .or_insert_with(|| StoreValue::from_map(BTreeMap::new()));

    let mut child_fields = match entry.kind() {
        ValueKind::Map(map) => map.fields().clone(),
        _ => BTreeMap::new(),
    };

    set_value_at_segments(&mut child_fields, &segments[1..], value);
    *entry = StoreValue::from_map(child_fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_collects_sentinel_paths() {
        let mut data = BTreeMap::new();
        data.insert("updated_at".to_string(), StoreValue::server_timestamp());
        let encoded = encode_set_data(data, &SetOptions::merge_all()).unwrap();
        let mask = encoded.mask.expect("mask");
        assert_eq!(mask.len(), 1);
        assert_eq!(mask[0].canonical_string(), "updated_at");
        assert_eq!(encoded.transforms.len(), 1);
    }

    #[test]
    fn overwrite_set_has_no_mask() {
        let mut data = BTreeMap::new();
        data.insert("name".to_string(), StoreValue::from_string("Ada"));
        let encoded = encode_set_data(data, &SetOptions::overwrite()).unwrap();
        assert!(encoded.mask.is_none());
        assert!(encoded.transforms.is_empty());
    }

    #[test]
    fn merge_fields_rejects_unknown_path() {
        let mut data = BTreeMap::new();
        data.insert("name".to_string(), StoreValue::from_string("Ada"));
        let options =
            SetOptions::merge_fields(vec![FieldPath::from_dot_separated("missing").unwrap()])
                .unwrap();
        let err = encode_set_data(data, &options).unwrap_err();
        assert_eq!(err.code_str(), "invalid-argument");
    }

    #[test]
    fn update_requires_some_field() {
        let err = encode_update_data(BTreeMap::new()).unwrap_err();
        assert_eq!(err.code_str(), "invalid-argument");
    }

    #[test]
    fn update_with_only_transform_is_allowed() {
        let mut data = BTreeMap::new();
        data.insert(
            "counter".to_string(),
            StoreValue::numeric_increment(StoreValue::from_integer(1)),
        );
        let encoded = encode_update_data(data).unwrap();
        assert!(encoded.map.is_empty());
        assert!(encoded.field_paths.is_empty());
        assert_eq!(encoded.transforms.len(), 1);
    }

    #[test]
    fn arrays_reject_nested_sentinels() {
        let mut data = BTreeMap::new();
        data.insert(
            "values".to_string(),
            StoreValue::from_array(vec![StoreValue::server_timestamp()]),
        );
        let err = encode_set_data(data, &SetOptions::overwrite()).unwrap_err();
        assert_eq!(err.code_str(), "invalid-argument");
    }

    #[test]
    fn increment_requires_numeric_operand() {
        let mut data = BTreeMap::new();
        data.insert(
            "total".to_string(),
            StoreValue::numeric_increment(StoreValue::from_string("five")),
        );
        let err = encode_update_data(data).unwrap_err();
        assert_eq!(err.code_str(), "invalid-argument");
    }

    #[test]
    fn nested_values_resolve_by_field_path() {
        let mut inner = BTreeMap::new();
        inner.insert("population".to_string(), StoreValue::from_integer(42));
        let mut fields = BTreeMap::new();
        fields.insert("stats".to_string(), StoreValue::from_map(inner));

        let path = FieldPath::from_dot_separated("stats.population").unwrap();
        assert_eq!(
            value_at_field_path(&fields, &path),
            Some(StoreValue::from_integer(42))
        );

        set_value_at_field_path(&mut fields, &path, StoreValue::from_integer(43));
        assert_eq!(
            value_at_field_path(&fields, &path),
            Some(StoreValue::from_integer(43))
        );
    }
}
