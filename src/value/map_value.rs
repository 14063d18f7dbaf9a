use std::collections::BTreeMap;

use crate::value::StoreValue;

/// Ordered field map backing documents and nested map values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MapValue {
    fields: BTreeMap<String, StoreValue>,
}

impl MapValue {
    pub fn new(fields: BTreeMap<String, StoreValue>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &BTreeMap<String, StoreValue> {
        &self.fields
    }

    pub fn into_fields(self) -> BTreeMap<String, StoreValue> {
        self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_field_order() {
        let mut fields = BTreeMap::new();
        fields.insert("b".to_string(), StoreValue::from_integer(2));
        fields.insert("a".to_string(), StoreValue::from_integer(1));
        let map = MapValue::new(fields);
        let keys: Vec<_> = map.fields().keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
