use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{internal_error, not_found, BridgeResult};
use crate::model::{DocumentKey, FieldPath, Timestamp};
use crate::store::aggregate::{AggregateDefinition, AggregateOperation};
use crate::store::datastore::{AttemptOutcome, Datastore, TransactionAttempt, WriteOperation};
use crate::store::query::{
    Bound, FieldFilter, FilterOperator, LimitType, OrderBy, OrderDirection, QueryDefinition,
};
use crate::store::snapshot::{DocumentSnapshot, SnapshotMetadata};
use crate::store::write::{
    set_value_at_field_path, value_at_field_path, FieldTransform, TransformOperation,
};
use crate::value::{ArrayValue, MapValue, StoreValue, ValueKind};

/// In-memory engine with versioned documents and optimistic transactions.
///
/// Each committed write stamps the touched documents with a fresh revision;
/// a transaction attempt records the revision of every document it reads and
/// refuses to commit if any of them moved.
#[derive(Clone, Default)]
pub struct MemoryDatastore {
    state: Arc<Mutex<StoreState>>,
}

#[derive(Default)]
struct StoreState {
    documents: BTreeMap<String, VersionedDocument>,
    revision: u64,
}

#[derive(Clone)]
struct VersionedDocument {
    fields: MapValue,
    version: u64,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state_guard(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

impl StoreState {
    fn version_of(&self, canonical: &str) -> u64 {
        self.documents
            .get(canonical)
            .map(|doc| doc.version)
            .unwrap_or(0)
    }
}

/// Applies `writes` in order onto `documents`, stamping touched entries with
/// `version`. Callers pass a scratch copy so a failing write leaves the real
/// table untouched.
fn apply_writes(
    documents: &mut BTreeMap<String, VersionedDocument>,
    writes: &[WriteOperation],
    version: u64,
) -> BridgeResult<()> {
    for write in writes {
        match write {
            WriteOperation::Set {
                key,
                data,
                mask,
                transforms,
            } => {
                let canonical = key.path().canonical_string();
                let mut fields = match mask {
                    Some(mask) => {
                        let mut existing = documents
                            .get(&canonical)
                            .map(|doc| doc.fields.fields().clone())
                            .unwrap_or_default();
                        for field in mask {
                            if let Some(value) = value_at_field_path(data.fields(), field) {
                                set_value_at_field_path(&mut existing, field, value);
                            }
                        }
                        existing
                    }
                    None => data.fields().clone(),
                };
                apply_transforms(&mut fields, transforms)?;
                documents.insert(
                    canonical,
                    VersionedDocument {
                        fields: MapValue::new(fields),
                        version,
                    },
                );
            }
            WriteOperation::Update {
                key,
                data,
                field_paths,
                transforms,
            } => {
                let canonical = key.path().canonical_string();
                let current = documents.get(&canonical).ok_or_else(|| {
                    not_found(format!("Document {canonical} does not exist"))
                })?;

                let mut fields = current.fields.fields().clone();
                for path in field_paths {
                    let value = value_at_field_path(data.fields(), path).ok_or_else(|| {
                        internal_error(format!(
                            "Failed to resolve value for update path {}",
                            path.canonical_string()
                        ))
                    })?;
                    set_value_at_field_path(&mut fields, path, value);
                }
                apply_transforms(&mut fields, transforms)?;
                documents.insert(
                    canonical,
                    VersionedDocument {
                        fields: MapValue::new(fields),
                        version,
                    },
                );
            }
            WriteOperation::Delete { key } => {
                documents.remove(&key.path().canonical_string());
            }
        }
    }
    Ok(())
}

fn apply_transforms(
    fields: &mut BTreeMap<String, StoreValue>,
    transforms: &[FieldTransform],
) -> BridgeResult<()> {
    for transform in transforms {
        let path = transform.field_path();
        let current = value_at_field_path(fields, path);
        let next = match transform.operation() {
            TransformOperation::ServerTimestamp => StoreValue::from_timestamp(Timestamp::now()),
            TransformOperation::NumericIncrement(operand) => {
                increment_value(current.as_ref(), operand)
            }
            TransformOperation::ArrayUnion(elements) => {
                let mut values = existing_array(current.as_ref());
                for element in elements {
                    if !values.contains(element) {
                        values.push(element.clone());
                    }
                }
                StoreValue::from_array(values)
            }
            TransformOperation::ArrayRemove(elements) => {
                let mut values = existing_array(current.as_ref());
                values.retain(|value| !elements.contains(value));
                StoreValue::from_array(values)
            }
        };
        set_value_at_field_path(fields, path, next);
    }
    Ok(())
}

fn existing_array(current: Option<&StoreValue>) -> Vec<StoreValue> {
    match current.map(StoreValue::kind) {
        Some(ValueKind::Array(array)) => array.values().to_vec(),
        _ => Vec::new(),
    }
}

fn increment_value(current: Option<&StoreValue>, operand: &StoreValue) -> StoreValue {
    let base = match current.map(StoreValue::kind) {
        Some(ValueKind::Integer(value)) => Numeric::Integer(*value),
        Some(ValueKind::Double(value)) => Numeric::Double(*value),
        _ => Numeric::Integer(0),
    };
    let delta = match operand.kind() {
        ValueKind::Integer(value) => Numeric::Integer(*value),
        ValueKind::Double(value) => Numeric::Double(*value),
        _ => Numeric::Integer(0),
    };
    match (base, delta) {
        (Numeric::Integer(a), Numeric::Integer(b)) => StoreValue::from_integer(a.wrapping_add(b)),
        (a, b) => StoreValue::from_double(a.as_f64() + b.as_f64()),
    }
}

#[derive(Clone, Copy)]
enum Numeric {
    Integer(i64),
    Double(f64),
}

impl Numeric {
    fn as_f64(self) -> f64 {
        match self {
            Numeric::Integer(value) => value as f64,
            Numeric::Double(value) => value,
        }
    }
}

fn snapshot_metadata() -> SnapshotMetadata {
    SnapshotMetadata::new(false, false)
}

fn evaluate_query(
    documents: &BTreeMap<String, VersionedDocument>,
    query: &QueryDefinition,
) -> BridgeResult<Vec<DocumentSnapshot>> {
    let mut matches = Vec::new();

    for (path, document) in documents {
        let key = DocumentKey::from_string(path)?;
        if !query.matches_collection(&key) {
            continue;
        }

        let snapshot =
            DocumentSnapshot::new(key, Some(document.fields.clone()), snapshot_metadata());

        if document_satisfies_filters(&snapshot, query.filters()) {
            matches.push(snapshot);
        }
    }

    matches.sort_by(|left, right| compare_snapshots(left, right, query.order_by()));

    if let Some(bound) = query.start_at() {
        matches.retain(|snapshot| !is_before_start_bound(snapshot, bound, query.order_by()));
    }

    if let Some(bound) = query.end_at() {
        matches.retain(|snapshot| !is_after_end_bound(snapshot, bound, query.order_by()));
    }

    if let Some(limit) = query.limit() {
        let limit = limit.max(0) as usize;
        match query.limit_type() {
            LimitType::First => {
                if matches.len() > limit {
                    matches.truncate(limit);
                }
            }
            LimitType::Last => {
                if matches.len() > limit {
                    let start = matches.len() - limit;
                    matches.drain(0..start);
                }
            }
        }
    }

    Ok(matches)
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn get_document(&self, key: &DocumentKey) -> BridgeResult<DocumentSnapshot> {
        let state = self.state_guard();
        let data = state
            .documents
            .get(&key.path().canonical_string())
            .map(|doc| doc.fields.clone());
        Ok(DocumentSnapshot::new(key.clone(), data, snapshot_metadata()))
    }

    async fn run_query(&self, query: &QueryDefinition) -> BridgeResult<Vec<DocumentSnapshot>> {
        let state = self.state_guard();
        evaluate_query(&state.documents, query)
    }

    async fn run_aggregate(
        &self,
        query: &QueryDefinition,
        aggregates: &[AggregateDefinition],
    ) -> BridgeResult<BTreeMap<String, StoreValue>> {
        let documents = {
            let state = self.state_guard();
            evaluate_query(&state.documents, query)?
        };

        let mut results = BTreeMap::new();
        for aggregate in aggregates {
            let value = match aggregate.operation() {
                AggregateOperation::Count => StoreValue::from_integer(documents.len() as i64),
                AggregateOperation::Sum(field) => sum_field(&documents, field),
                AggregateOperation::Average(field) => average_field(&documents, field),
            };
            results.insert(aggregate.alias().to_string(), value);
        }
        Ok(results)
    }

    async fn commit(&self, writes: Vec<WriteOperation>) -> BridgeResult<()> {
        let mut state = self.state_guard();
        let version = state.revision + 1;
        let mut scratch = state.documents.clone();
        apply_writes(&mut scratch, &writes, version)?;
        state.documents = scratch;
        state.revision = version;
        Ok(())
    }

    fn begin_attempt(&self) -> Arc<dyn TransactionAttempt> {
        Arc::new(MemoryAttempt {
            state: Arc::clone(&self.state),
            reads: Mutex::new(HashMap::new()),
            staged: Mutex::new(Vec::new()),
        })
    }
}

/// One optimistic attempt against a [`MemoryDatastore`].
struct MemoryAttempt {
    state: Arc<Mutex<StoreState>>,
    reads: Mutex<HashMap<String, u64>>,
    staged: Mutex<Vec<WriteOperation>>,
}

impl MemoryAttempt {
    fn state_guard(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn staged_clone(&self) -> Vec<WriteOperation> {
        self.staged
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }
}

#[async_trait]
impl TransactionAttempt for MemoryAttempt {
    async fn get_document(&self, key: &DocumentKey) -> BridgeResult<DocumentSnapshot> {
        let canonical = key.path().canonical_string();
        let staged = self.staged_clone();

        let state = self.state_guard();
        self.reads
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .entry(canonical.clone())
            .or_insert_with(|| state.version_of(&canonical));

        // Overlay this attempt's staged writes so reads observe them.
        let mut scratch = state.documents.clone();
        apply_writes(&mut scratch, &staged, state.revision)?;

        let data = scratch.get(&canonical).map(|doc| doc.fields.clone());
        Ok(DocumentSnapshot::new(key.clone(), data, snapshot_metadata()))
    }

    fn stage(&self, write: WriteOperation) -> BridgeResult<()> {
        self.staged
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push(write);
        Ok(())
    }

    async fn commit(&self) -> BridgeResult<AttemptOutcome> {
        let staged = self.staged_clone();
        let mut state = self.state_guard();

        {
            let reads = self.reads.lock().unwrap_or_else(|poison| poison.into_inner());
            for (canonical, observed) in reads.iter() {
                if state.version_of(canonical) != *observed {
                    return Ok(AttemptOutcome::Contended);
                }
            }
        }

        let version = state.revision + 1;
        let mut scratch = state.documents.clone();
        apply_writes(&mut scratch, &staged, version)?;
        state.documents = scratch;
        state.revision = version;
        Ok(AttemptOutcome::Committed)
    }
}

fn document_satisfies_filters(snapshot: &DocumentSnapshot, filters: &[FieldFilter]) -> bool {
    filters
        .iter()
        .all(|filter| match get_field_value(snapshot, filter.field()) {
            Some(value) => evaluate_filter(filter, &value),
            None => match filter.operator() {
                FilterOperator::NotEqual => evaluate_filter(filter, &StoreValue::null()),
                _ => false,
            },
        })
}

fn evaluate_filter(filter: &FieldFilter, value: &StoreValue) -> bool {
    match filter.operator() {
        FilterOperator::Equal => value == filter.value(),
        FilterOperator::NotEqual => value != filter.value(),
        FilterOperator::LessThan => compare_values(value, filter.value()) == Some(Ordering::Less),
        FilterOperator::LessThanOrEqual => matches!(
            compare_values(value, filter.value()),
            Some(Ordering::Less) | Some(Ordering::Equal)
        ),
        FilterOperator::GreaterThan => {
            compare_values(value, filter.value()) == Some(Ordering::Greater)
        }
        FilterOperator::GreaterThanOrEqual => matches!(
            compare_values(value, filter.value()),
            Some(Ordering::Greater) | Some(Ordering::Equal)
        ),
        FilterOperator::ArrayContains => match value.kind() {
            ValueKind::Array(array) => array_contains(array, filter.value()),
            _ => false,
        },
        FilterOperator::ArrayContainsAny => match (value.kind(), filter.value().kind()) {
            (ValueKind::Array(array), ValueKind::Array(needles)) => needles
                .values()
                .iter()
                .any(|needle| array_contains(array, needle)),
            _ => false,
        },
        FilterOperator::In => match filter.value().kind() {
            ValueKind::Array(values) => values.values().iter().any(|needle| needle == value),
            _ => false,
        },
        FilterOperator::NotIn => match filter.value().kind() {
            ValueKind::Array(values) => {
                !matches!(value.kind(), ValueKind::Null)
                    && values.values().iter().all(|needle| needle != value)
            }
            _ => false,
        },
    }
}

fn get_field_value(snapshot: &DocumentSnapshot, field: &FieldPath) -> Option<StoreValue> {
    if field == &FieldPath::document_id() {
        return Some(StoreValue::from_string(
            snapshot.key().path().canonical_string(),
        ));
    }

    let map = snapshot.map_value()?;
    value_at_field_path(map.fields(), field)
}

fn compare_snapshots(
    left: &DocumentSnapshot,
    right: &DocumentSnapshot,
    order_by: &[OrderBy],
) -> Ordering {
    for order in order_by {
        let left_value = get_field_value(left, order.field()).unwrap_or_else(StoreValue::null);
        let right_value = get_field_value(right, order.field()).unwrap_or_else(StoreValue::null);

        let mut ordering = compare_values(&left_value, &right_value).unwrap_or(Ordering::Equal);
        if order.direction() == OrderDirection::Descending {
            ordering = ordering.reverse();
        }
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn compare_values(left: &StoreValue, right: &StoreValue) -> Option<Ordering> {
    match (left.kind(), right.kind()) {
        (ValueKind::Null, ValueKind::Null) => Some(Ordering::Equal),
        (ValueKind::Boolean(a), ValueKind::Boolean(b)) => Some(a.cmp(b)),
        (ValueKind::Integer(a), ValueKind::Integer(b)) => Some(a.cmp(b)),
        (ValueKind::Double(a), ValueKind::Double(b)) => a.partial_cmp(b),
        (ValueKind::Integer(a), ValueKind::Double(b)) => (*a as f64).partial_cmp(b),
        (ValueKind::Double(a), ValueKind::Integer(b)) => a.partial_cmp(&(*b as f64)),
        (ValueKind::Timestamp(a), ValueKind::Timestamp(b)) => Some(a.cmp(b)),
        (ValueKind::String(a), ValueKind::String(b)) => Some(a.cmp(b)),
        (ValueKind::Reference(a), ValueKind::Reference(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn array_contains(array: &ArrayValue, needle: &StoreValue) -> bool {
    array.values().iter().any(|candidate| candidate == needle)
}

fn is_before_start_bound(snapshot: &DocumentSnapshot, bound: &Bound, order_by: &[OrderBy]) -> bool {
    let ordering = compare_snapshot_to_bound(snapshot, bound, order_by);
    if bound.inclusive() {
        ordering == Ordering::Less
    } else {
        ordering != Ordering::Greater
    }
}

fn is_after_end_bound(snapshot: &DocumentSnapshot, bound: &Bound, order_by: &[OrderBy]) -> bool {
    let ordering = compare_snapshot_to_bound(snapshot, bound, order_by);
    if bound.inclusive() {
        ordering == Ordering::Greater
    } else {
        ordering != Ordering::Less
    }
}

fn compare_snapshot_to_bound(
    snapshot: &DocumentSnapshot,
    bound: &Bound,
    order_by: &[OrderBy],
) -> Ordering {
    for (index, order) in order_by.iter().enumerate() {
        if index >= bound.values().len() {
            break;
        }

        let bound_value = &bound.values()[index];
        let snapshot_value =
            get_field_value(snapshot, order.field()).unwrap_or_else(StoreValue::null);

        let mut ordering = compare_values(&snapshot_value, bound_value).unwrap_or(Ordering::Equal);
        if order.direction() == OrderDirection::Descending {
            ordering = ordering.reverse();
        }

        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}


fn sum_field(documents: &[DocumentSnapshot], field: &FieldPath) -> StoreValue {
    let mut integer_total: i64 = 0;
    let mut double_total: f64 = 0.0;
    let mut saw_double = false;

    for snapshot in documents {
        match get_field_value(snapshot, field).as_ref().map(StoreValue::kind) {
            Some(ValueKind::Integer(value)) => {
                integer_total = integer_total.wrapping_add(*value);
                double_total += *value as f64;
            }
            Some(ValueKind::Double(value)) => {
                saw_double = true;
                double_total += *value;
            }
            _ => {}
        }
    }

    if saw_double {
        StoreValue::from_double(double_total)
    } else {
        StoreValue::from_integer(integer_total)
    }
}

fn average_field(documents: &[DocumentSnapshot], field: &FieldPath) -> StoreValue {
    let mut total: f64 = 0.0;
    let mut count: u64 = 0;

    for snapshot in documents {
        match get_field_value(snapshot, field).as_ref().map(StoreValue::kind) {
            Some(ValueKind::Integer(value)) => {
                total += *value as f64;
                count += 1;
            }
            Some(ValueKind::Double(value)) => {
                total += *value;
                count += 1;
            }
            _ => {}
        }
    }

    if count == 0 {
        StoreValue::null()
    } else {
        StoreValue::from_double(total / count as f64)
    }
}
