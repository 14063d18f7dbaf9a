use crate::error::{invalid_argument, BridgeResult};
use crate::model::FieldPath;

/// Aggregation applied to the documents matched by a query.
#[derive(Clone, Debug)]
pub enum AggregateOperation {
    Count,
    Sum(FieldPath),
    Average(FieldPath),
}

/// A single aggregation keyed by the alias used in the result map.
#[derive(Clone, Debug)]
pub struct AggregateDefinition {
    alias: String,
    operation: AggregateOperation,
}

impl AggregateDefinition {
    pub fn new(alias: impl Into<String>, operation: AggregateOperation) -> BridgeResult<Self> {
        let alias = alias.into();
        if alias.trim().is_empty() {
            return Err(invalid_argument(
                "Aggregate aliases must contain at least one non-whitespace character",
            ));
        }
        Ok(Self { alias, operation })
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn operation(&self) -> &AggregateOperation {
        &self.operation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_alias() {
        let err = AggregateDefinition::new("  ", AggregateOperation::Count).unwrap_err();
        assert_eq!(err.code_str(), "invalid-argument");
    }

    #[test]
    fn keeps_alias_and_operation() {
        let field = FieldPath::from_dot_separated("population").unwrap();
        let def = AggregateDefinition::new("total", AggregateOperation::Sum(field)).unwrap();
        assert_eq!(def.alias(), "total");
        assert!(matches!(def.operation(), AggregateOperation::Sum(_)));
    }
}
