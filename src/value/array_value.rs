use crate::value::StoreValue;

/// Ordered list of values stored under a single field.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArrayValue {
    values: Vec<StoreValue>,
}

impl ArrayValue {
    pub fn new(values: Vec<StoreValue>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[StoreValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<StoreValue> {
        self.values
    }
}
