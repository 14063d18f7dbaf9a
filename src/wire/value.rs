use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{json, Map as JsonMap, Value as JsonValue};

use crate::error::{internal_error, invalid_argument, BridgeResult};
use crate::model::{GeoPoint, Timestamp};
use crate::value::{BytesValue, MapValue, StoreValue, ValueKind};

/// Encodes a document's fields as a plain object of tagged wire values.
pub fn encode_fields(map: &MapValue) -> BridgeResult<JsonValue> {
    let mut fields = JsonMap::new();
    for (key, value) in map.fields() {
        fields.insert(key.clone(), encode_value(value)?);
    }
    Ok(JsonValue::Object(fields))
}

/// Encodes a single engine value into its tagged wire representation.
pub fn encode_value(value: &StoreValue) -> BridgeResult<JsonValue> {
    let encoded = match value.kind() {
        ValueKind::Null => json!({ "nullValue": JsonValue::Null }),
        ValueKind::Boolean(boolean) => json!({ "booleanValue": boolean }),
        ValueKind::Integer(integer) => json!({ "integerValue": integer.to_string() }),
        ValueKind::Double(double) => json!({ "doubleValue": double }),
        ValueKind::Timestamp(timestamp) => {
            json!({ "timestampValue": encode_timestamp(timestamp) })
        }
        ValueKind::String(string) => json!({ "stringValue": string }),
        ValueKind::Bytes(bytes) => {
            json!({ "bytesValue": BASE64_STANDARD.encode(bytes.as_slice()) })
        }
        ValueKind::Reference(reference) => json!({ "referenceValue": reference }),
        ValueKind::GeoPoint(point) => json!({
            "geoPointValue": {
                "latitude": point.latitude(),
                "longitude": point.longitude(),
            }
        }),
        ValueKind::Array(array) => {
            let mut values = Vec::with_capacity(array.values().len());
            for element in array.values() {
                values.push(encode_value(element)?);
            }
            json!({ "arrayValue": { "values": values } })
        }
        ValueKind::Map(map) => json!({
            "mapValue": {
                "fields": encode_fields(map)?
            }
        }),
        ValueKind::Sentinel(_) => {
            return Err(internal_error(
                "Sentinel values cannot appear in snapshot data",
            ));
        }
    };
    Ok(encoded)
}

/// Decodes an object of tagged wire values into document fields.
pub fn decode_fields(raw: &JsonValue) -> BridgeResult<BTreeMap<String, StoreValue>> {
    let object = raw
        .as_object()
        .ok_or_else(|| invalid_argument("Document data must be an object"))?;

    let mut fields = BTreeMap::new();
    for (key, value) in object {
        fields.insert(key.clone(), decode_value(value)?);
    }
    Ok(fields)
}

/// Decodes one tagged wire value.
///
/// Unknown type tags are rejected rather than passed through, so a caller
/// speaking a newer wire dialect fails loudly instead of corrupting data.
pub fn decode_value(raw: &JsonValue) -> BridgeResult<StoreValue> {
    let object = raw
        .as_object()
        .ok_or_else(|| invalid_argument("Expected a tagged wire value object"))?;

    if let Some(null_value) = object.get("nullValue") {
        if null_value.is_null() {
            return Ok(StoreValue::null());
        }
    }
    if let Some(bool_value) = object.get("booleanValue") {
        let value = bool_value
            .as_bool()
            .ok_or_else(|| invalid_argument("booleanValue must be a boolean"))?;
        return Ok(StoreValue::from_bool(value));
    }
    if let Some(integer_value) = object.get("integerValue") {
        let parsed = match integer_value {
            JsonValue::String(value) => value
                .parse::<i64>()
                .map_err(|err| invalid_argument(format!("Invalid integerValue: {err}")))?,
            JsonValue::Number(number) => number
                .as_i64()
                .ok_or_else(|| invalid_argument("Integer out of range"))?,
            _ => return Err(invalid_argument("integerValue must be a string or number")),
        };
        return Ok(StoreValue::from_integer(parsed));
    }
    if let Some(double_value) = object.get("doubleValue") {
        let parsed = match double_value {
            JsonValue::Number(number) => number
                .as_f64()
                .ok_or_else(|| invalid_argument("Invalid doubleValue"))?,
            JsonValue::String(value) => value
                .parse::<f64>()
                .map_err(|err| invalid_argument(format!("Invalid doubleValue: {err}")))?,
            _ => return Err(invalid_argument("doubleValue must be a number or string")),
        };
        return Ok(StoreValue::from_double(parsed));
    }
    if let Some(timestamp_value) = object.get("timestampValue") {
        let timestamp_str = timestamp_value
            .as_str()
            .ok_or_else(|| invalid_argument("timestampValue must be a string"))?;
        return Ok(StoreValue::from_timestamp(parse_timestamp(timestamp_str)?));
    }
    if let Some(string_value) = object.get("stringValue") {
        let value = string_value
            .as_str()
            .ok_or_else(|| invalid_argument("stringValue must be a string"))?;
        return Ok(StoreValue::from_string(value));
    }
    if let Some(bytes_value) = object.get("bytesValue") {
        let value = bytes_value
            .as_str()
            .ok_or_else(|| invalid_argument("bytesValue must be a base64 string"))?;
        let decoded = BASE64_STANDARD
            .decode(value)
            .map_err(|err| invalid_argument(format!("Invalid bytesValue: {err}")))?;
        return Ok(StoreValue::from_bytes(BytesValue::from(decoded)));
    }
    if let Some(reference_value) = object.get("referenceValue") {
        let value = reference_value
            .as_str()
            .ok_or_else(|| invalid_argument("referenceValue must be a string"))?;
        return Ok(StoreValue::from_reference(value));
    }
    if let Some(geo_point) = object.get("geoPointValue") {
        let latitude = geo_point
            .get("latitude")
            .and_then(|value| value.as_f64())
            .ok_or_else(|| invalid_argument("geoPointValue.latitude must be a number"))?;
        let longitude = geo_point
            .get("longitude")
            .and_then(|value| value.as_f64())
            .ok_or_else(|| invalid_argument("geoPointValue.longitude must be a number"))?;
        return Ok(StoreValue::from_geo_point(GeoPoint::new(
            latitude, longitude,
        )?));
    }
    if let Some(array_value) = object.get("arrayValue") {
        return Ok(StoreValue::from_array(decode_value_list(array_value)?));
    }
    if let Some(map_value) = object.get("mapValue") {
        let fields = match map_value.get("fields") {
            Some(fields) => decode_fields(fields)?,
            None => BTreeMap::new(),
        };
        return Ok(StoreValue::from_map(fields));
    }

    // Write-only sentinel tags.
    if object.contains_key("serverTimestampValue") {
        return Ok(StoreValue::server_timestamp());
    }
    if let Some(operand) = object.get("incrementValue") {
        return Ok(StoreValue::numeric_increment(decode_value(operand)?));
    }
    if let Some(elements) = object.get("arrayUnionValue") {
        return Ok(StoreValue::array_union(decode_value_list(elements)?));
    }
    if let Some(elements) = object.get("arrayRemoveValue") {
        return Ok(StoreValue::array_remove(decode_value_list(elements)?));
    }

    let tags: Vec<&str> = object.keys().map(String::as_str).collect();
    Err(invalid_argument(format!(
        "Unknown wire value type (tags: {})",
        tags.join(", ")
    )))
}

fn decode_value_list(raw: &JsonValue) -> BridgeResult<Vec<StoreValue>> {
    let entries: &[JsonValue] = match raw.get("values") {
        Some(values) => values
            .as_array()
            .ok_or_else(|| invalid_argument("'values' must be an array"))?,
        None => &[],
    };
    entries.iter().map(decode_value).collect()
}

pub(crate) fn encode_timestamp(timestamp: &Timestamp) -> String {
    Utc.timestamp_opt(timestamp.seconds, timestamp.nanos as u32)
        .single()
        .unwrap_or_else(|| DateTime::<Utc>::UNIX_EPOCH)
        .to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(value: &str) -> BridgeResult<Timestamp> {
    let datetime = DateTime::parse_from_rfc3339(value)
        .map_err(|err| invalid_argument(format!("Invalid timestamp: {err}")))?;
    let datetime_utc = datetime.with_timezone(&Utc);
    Ok(Timestamp::new(
        datetime_utc.timestamp(),
        datetime_utc.timestamp_subsec_nanos() as i32,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_scalars_and_nesting() {
        let mut inner = BTreeMap::new();
        inner.insert("flag".to_string(), StoreValue::from_bool(true));
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), StoreValue::from_string("Ada"));
        fields.insert("age".to_string(), StoreValue::from_integer(42));
        fields.insert("nested".to_string(), StoreValue::from_map(inner));

        let encoded = encode_fields(&MapValue::new(fields.clone())).unwrap();
        let decoded = decode_fields(&encoded).unwrap();
        assert_eq!(decoded, fields);
    }

    #[test]
    fn rejects_unknown_tags() {
        let err = decode_value(&json!({ "quaternionValue": [1, 2, 3, 4] })).unwrap_err();
        assert_eq!(err.code_str(), "invalid-argument");
        assert!(err.message().contains("quaternionValue"));
    }

    #[test]
    fn rejects_untagged_values() {
        let err = decode_value(&json!("plain string")).unwrap_err();
        assert_eq!(err.code_str(), "invalid-argument");
    }

    #[test]
    fn decodes_sentinel_tags() {
        let value = decode_value(&json!({ "serverTimestampValue": null })).unwrap();
        assert!(matches!(value.kind(), ValueKind::Sentinel(_)));

        let increment =
            decode_value(&json!({ "incrementValue": { "integerValue": "2" } })).unwrap();
        assert!(matches!(increment.kind(), ValueKind::Sentinel(_)));
    }

    #[test]
    fn sentinels_cannot_be_encoded() {
        let err = encode_value(&StoreValue::server_timestamp()).unwrap_err();
        assert_eq!(err.code_str(), "internal-error");
    }

    #[test]
    fn timestamps_roundtrip_through_rfc3339() {
        let timestamp = Timestamp::new(1_700_000_000, 250_000_000);
        let rendered = encode_timestamp(&timestamp);
        assert_eq!(parse_timestamp(&rendered).unwrap(), timestamp);
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = decode_value(&json!({ "bytesValue": "!!not base64!!" })).unwrap_err();
        assert_eq!(err.code_str(), "invalid-argument");
    }
}
