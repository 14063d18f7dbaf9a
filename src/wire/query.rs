use serde_json::Value as JsonValue;

use crate::error::{invalid_argument, unsupported, BridgeResult};
use crate::model::{FieldPath, ResourcePath};
use crate::store::aggregate::{AggregateDefinition, AggregateOperation};
use crate::store::query::{
    Bound, FieldFilter, FilterOperator, LimitType, OrderBy, OrderDirection, QueryDefinition,
    QueryScope,
};
use crate::wire::value::decode_value;

/// Builds a [`QueryDefinition`] from the boundary's path/type/filters/orders/
/// options arguments.
pub fn decode_query(
    path: &str,
    query_type: &str,
    filters: &JsonValue,
    orders: &JsonValue,
    options: &JsonValue,
) -> BridgeResult<QueryDefinition> {
    let scope = decode_scope(path, query_type)?;
    let mut query = QueryDefinition::new(scope);

    for filter in decode_filters(filters)? {
        query.add_filter(filter);
    }
    for order in decode_orders(orders)? {
        query.add_order_by(order);
    }
    apply_options(&mut query, options)?;
    Ok(query)
}

fn decode_scope(path: &str, query_type: &str) -> BridgeResult<QueryScope> {
    match query_type {
        "collection" => {
            let resource = ResourcePath::from_string(path)?;
            if resource.is_empty() || resource.len() % 2 == 0 {
                return Err(invalid_argument(
                    "Collection paths must contain an odd number of segments",
                ));
            }
            Ok(QueryScope::Collection(resource))
        }
        "collectionGroup" => {
            if path.is_empty() || path.contains('/') {
                return Err(invalid_argument(
                    "Collection group queries take a bare collection identifier",
                ));
            }
            Ok(QueryScope::CollectionGroup(path.to_string()))
        }
        other => Err(invalid_argument(format!(
            "Unknown query type '{other}' (expected 'collection' or 'collectionGroup')"
        ))),
    }
}

fn decode_filters(raw: &JsonValue) -> BridgeResult<Vec<FieldFilter>> {
    let entries = match raw {
        JsonValue::Null => return Ok(Vec::new()),
        JsonValue::Array(entries) => entries,
        _ => return Err(invalid_argument("Filters must be an array")),
    };

    let mut filters = Vec::with_capacity(entries.len());
    for entry in entries {
        let field = required_string(entry, "fieldPath")?;
        let operator = required_string(entry, "operator")?;
        let value = entry
            .get("value")
            .ok_or_else(|| invalid_argument("Filters require a 'value'"))?;
        filters.push(FieldFilter::new(
            FieldPath::from_dot_separated(&field)?,
            decode_operator(&operator)?,
            decode_value(value)?,
        ));
    }
    Ok(filters)
}

fn decode_operator(raw: &str) -> BridgeResult<FilterOperator> {
    Ok(match raw {
        "==" => FilterOperator::Equal,
        "!=" => FilterOperator::NotEqual,
        "<" => FilterOperator::LessThan,
        "<=" => FilterOperator::LessThanOrEqual,
        ">" => FilterOperator::GreaterThan,
        ">=" => FilterOperator::GreaterThanOrEqual,
        "array-contains" => FilterOperator::ArrayContains,
        "array-contains-any" => FilterOperator::ArrayContainsAny,
        "in" => FilterOperator::In,
        "not-in" => FilterOperator::NotIn,
        other => {
            return Err(invalid_argument(format!(
                "Unknown filter operator '{other}'"
            )))
        }
    })
}

fn decode_orders(raw: &JsonValue) -> BridgeResult<Vec<OrderBy>> {
    let entries = match raw {
        JsonValue::Null => return Ok(Vec::new()),
        JsonValue::Array(entries) => entries,
        _ => return Err(invalid_argument("Orders must be an array")),
    };

    let mut orders = Vec::with_capacity(entries.len());
    for entry in entries {
        let field = required_string(entry, "fieldPath")?;
        let direction = match entry.get("direction").and_then(JsonValue::as_str) {
            None | Some("asc") => OrderDirection::Ascending,
            Some("desc") => OrderDirection::Descending,
            Some(other) => {
                return Err(invalid_argument(format!(
                    "Unknown order direction '{other}' (expected 'asc' or 'desc')"
                )))
            }
        };
        orders.push(OrderBy::new(
            FieldPath::from_dot_separated(&field)?,
            direction,
        ));
    }
    Ok(orders)
}

fn apply_options(query: &mut QueryDefinition, raw: &JsonValue) -> BridgeResult<()> {
    let options = match raw {
        JsonValue::Null => return Ok(()),
        JsonValue::Object(map) => map,
        _ => return Err(invalid_argument("Query options must be an object")),
    };

    match (options.get("limit"), options.get("limitToLast")) {
        (Some(_), Some(_)) => {
            return Err(invalid_argument(
                "limit and limitToLast are mutually exclusive",
            ));
        }
        (Some(limit), None) => {
            query.set_limit(positive_limit(limit, "limit")?, LimitType::First);
        }
        (None, Some(limit)) => {
            if query.order_by().is_empty() {
                return Err(invalid_argument(
                    "limitToLast queries require at least one ordering",
                ));
            }
            query.set_limit(positive_limit(limit, "limitToLast")?, LimitType::Last);
        }
        (None, None) => {}
    }

    match (options.get("startAt"), options.get("startAfter")) {
        (Some(_), Some(_)) => {
            return Err(invalid_argument(
                "startAt and startAfter are mutually exclusive",
            ));
        }
        (Some(values), None) => query.set_start_at(decode_bound(values, true)?),
        (None, Some(values)) => query.set_start_at(decode_bound(values, false)?),
        (None, None) => {}
    }

    match (options.get("endAt"), options.get("endBefore")) {
        (Some(_), Some(_)) => {
            return Err(invalid_argument(
                "endAt and endBefore are mutually exclusive",
            ));
        }
        (Some(values), None) => query.set_end_at(decode_bound(values, true)?),
        (None, Some(values)) => query.set_end_at(decode_bound(values, false)?),
        (None, None) => {}
    }

    Ok(())
}

fn positive_limit(raw: &JsonValue, name: &str) -> BridgeResult<i64> {
    let limit = raw
        .as_i64()
        .ok_or_else(|| invalid_argument(format!("{name} must be an integer")))?;
    if limit <= 0 {
        return Err(invalid_argument(format!("{name} must be positive")));
    }
    Ok(limit)
}

fn decode_bound(raw: &JsonValue, inclusive: bool) -> BridgeResult<Bound> {
    let entries = raw
        .as_array()
        .ok_or_else(|| invalid_argument("Cursor bounds must be arrays of wire values"))?;
    let values = entries
        .iter()
        .map(decode_value)
        .collect::<BridgeResult<Vec<_>>>()?;
    Ok(Bound::new(values, inclusive))
}

/// Validates read options for a one-shot get.
///
/// Only server reads are available: there is no offline cache behind this
/// bridge, so `source: "cache"` is rejected before the engine is contacted.
pub fn ensure_supported_source(raw: &JsonValue) -> BridgeResult<()> {
    let source = match raw {
        JsonValue::Null => return Ok(()),
        JsonValue::Object(map) => match map.get("source").and_then(JsonValue::as_str) {
            None => return Ok(()),
            Some(source) => source,
        },
        _ => return Err(invalid_argument("Get options must be an object")),
    };

    match source {
        "default" | "server" => Ok(()),
        "cache" => Err(unsupported(
            "Reads from the local cache are not available through this bridge",
        )),
        other => Err(invalid_argument(format!(
            "Unknown read source '{other}'"
        ))),
    }
}

/// Decodes aggregate specs `[{aggregateType, key, fieldPath?}]`.
pub fn decode_aggregates(raw: &JsonValue) -> BridgeResult<Vec<AggregateDefinition>> {
    let entries = raw
        .as_array()
        .ok_or_else(|| invalid_argument("Aggregate specs must be an array"))?;

    let mut aggregates = Vec::with_capacity(entries.len());
    for entry in entries {
        let kind = required_string(entry, "aggregateType")?;
        let alias = required_string(entry, "key")?;
        let operation = match kind.as_str() {
            "count" => AggregateOperation::Count,
            "sum" => AggregateOperation::Sum(aggregate_field(entry)?),
            "average" => AggregateOperation::Average(aggregate_field(entry)?),
            other => {
                return Err(invalid_argument(format!(
                    "Unknown aggregate type '{other}'"
                )))
            }
        };
        aggregates.push(AggregateDefinition::new(alias, operation)?);
    }
    Ok(aggregates)
}

fn aggregate_field(entry: &JsonValue) -> BridgeResult<FieldPath> {
    FieldPath::from_dot_separated(&required_string(entry, "fieldPath")?)
}

fn required_string(entry: &JsonValue, key: &str) -> BridgeResult<String> {
    entry
        .get(key)
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| invalid_argument(format!("Missing or non-string '{key}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_filters_orders_and_limit() {
        let query = decode_query(
            "users",
            "collection",
            &json!([{ "fieldPath": "age", "operator": ">=", "value": { "integerValue": "21" } }]),
            &json!([{ "fieldPath": "age", "direction": "desc" }]),
            &json!({ "limit": 10 }),
        )
        .unwrap();

        assert_eq!(query.filters().len(), 1);
        assert_eq!(query.order_by().len(), 1);
        assert_eq!(query.limit(), Some(10));
        assert_eq!(query.limit_type(), LimitType::First);
    }

    #[test]
    fn rejects_unknown_operator() {
        let err = decode_query(
            "users",
            "collection",
            &json!([{ "fieldPath": "age", "operator": "~", "value": { "integerValue": "1" } }]),
            &JsonValue::Null,
            &JsonValue::Null,
        )
        .unwrap_err();
        assert_eq!(err.code_str(), "invalid-argument");
    }

    #[test]
    fn limit_to_last_requires_ordering() {
        let err = decode_query(
            "users",
            "collection",
            &JsonValue::Null,
            &JsonValue::Null,
            &json!({ "limitToLast": 3 }),
        )
        .unwrap_err();
        assert_eq!(err.code_str(), "invalid-argument");
    }

    #[test]
    fn conflicting_cursors_are_rejected() {
        let err = decode_query(
            "users",
            "collection",
            &JsonValue::Null,
            &json!([{ "fieldPath": "age" }]),
            &json!({
                "startAt": [{ "integerValue": "1" }],
                "startAfter": [{ "integerValue": "2" }],
            }),
        )
        .unwrap_err();
        assert_eq!(err.code_str(), "invalid-argument");
    }

    #[test]
    fn collection_group_takes_bare_identifier() {
        let query = decode_query(
            "repos",
            "collectionGroup",
            &JsonValue::Null,
            &JsonValue::Null,
            &JsonValue::Null,
        )
        .unwrap();
        assert!(matches!(query.scope(), QueryScope::CollectionGroup(id) if id == "repos"));

        let err = decode_query(
            "users/ada/repos",
            "collectionGroup",
            &JsonValue::Null,
            &JsonValue::Null,
            &JsonValue::Null,
        )
        .unwrap_err();
        assert_eq!(err.code_str(), "invalid-argument");
    }

    #[test]
    fn decodes_aggregate_specs() {
        let aggregates = decode_aggregates(&json!([
            { "aggregateType": "count", "key": "n" },
            { "aggregateType": "sum", "key": "total", "fieldPath": "population" },
        ]))
        .unwrap();
        assert_eq!(aggregates.len(), 2);
        assert_eq!(aggregates[0].alias(), "n");

        let err = decode_aggregates(&json!([{ "aggregateType": "median", "key": "m" }]))
            .unwrap_err();
        assert_eq!(err.code_str(), "invalid-argument");
    }

    #[test]
    fn cache_source_is_unsupported() {
        let err = ensure_supported_source(&json!({ "source": "cache" })).unwrap_err();
        assert_eq!(err.code_str(), "unsupported");
        assert!(ensure_supported_source(&json!({ "source": "server" })).is_ok());
        assert!(ensure_supported_source(&JsonValue::Null).is_ok());
    }
}
