use crate::model::{DocumentKey, FieldPath, ResourcePath};
use crate::value::StoreValue;

/// Which documents a query ranges over.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryScope {
    /// A single collection addressed by its full path.
    Collection(ResourcePath),
    /// Every collection with the given identifier, regardless of parent.
    CollectionGroup(String),
}

/// Fully resolved query: scope, filters, ordering, bounds and limit.
#[derive(Clone, Debug)]
pub struct QueryDefinition {
    scope: QueryScope,
    filters: Vec<FieldFilter>,
    order_by: Vec<OrderBy>,
    start_at: Option<Bound>,
    end_at: Option<Bound>,
    limit: Option<i64>,
    limit_type: LimitType,
}

impl QueryDefinition {
    pub fn new(scope: QueryScope) -> Self {
        Self {
            scope,
            filters: Vec::new(),
            order_by: Vec::new(),
            start_at: None,
            end_at: None,
            limit: None,
            limit_type: LimitType::First,
        }
    }

    pub fn scope(&self) -> &QueryScope {
        &self.scope
    }

    pub fn add_filter(&mut self, filter: FieldFilter) {
        self.filters.push(filter);
    }

    pub fn add_order_by(&mut self, order: OrderBy) {
        self.order_by.push(order);
    }

    pub fn set_start_at(&mut self, bound: Bound) {
        self.start_at = Some(bound);
    }

    pub fn set_end_at(&mut self, bound: Bound) {
        self.end_at = Some(bound);
    }

    pub fn set_limit(&mut self, limit: i64, limit_type: LimitType) {
        self.limit = Some(limit);
        self.limit_type = limit_type;
    }

    pub fn filters(&self) -> &[FieldFilter] {
        &self.filters
    }

    pub fn order_by(&self) -> &[OrderBy] {
        &self.order_by
    }

    pub fn start_at(&self) -> Option<&Bound> {
        self.start_at.as_ref()
    }

    pub fn end_at(&self) -> Option<&Bound> {
        self.end_at.as_ref()
    }

    pub fn limit(&self) -> Option<i64> {
        self.limit
    }

    pub fn limit_type(&self) -> LimitType {
        self.limit_type
    }

    /// Whether `key` falls inside this query's scope.
    pub fn matches_collection(&self, key: &DocumentKey) -> bool {
        match &self.scope {
            QueryScope::Collection(path) => key.collection_path() == *path,
            QueryScope::CollectionGroup(id) => key.collection_id() == id,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FieldFilter {
    field: FieldPath,
    operator: FilterOperator,
    value: StoreValue,
}

impl FieldFilter {
    pub fn new(field: FieldPath, operator: FilterOperator, value: StoreValue) -> Self {
        Self {
            field,
            operator,
            value,
        }
    }

    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    pub fn value(&self) -> &StoreValue {
        &self.value
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    ArrayContains,
    ArrayContainsAny,
    In,
    NotIn,
}

#[derive(Clone, Debug)]
pub struct OrderBy {
    field: FieldPath,
    direction: OrderDirection,
}

impl OrderBy {
    pub fn new(field: FieldPath, direction: OrderDirection) -> Self {
        Self { field, direction }
    }

    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    pub fn direction(&self) -> OrderDirection {
        self.direction
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderDirection {
    Ascending,
    Descending,
}

/// Cursor bound over the query's order-by values.
#[derive(Clone, Debug)]
pub struct Bound {
    values: Vec<StoreValue>,
    inclusive: bool,
}

impl Bound {
    pub fn new(values: Vec<StoreValue>, inclusive: bool) -> Self {
        Self { values, inclusive }
    }

    pub fn values(&self) -> &[StoreValue] {
        &self.values
    }

    pub fn inclusive(&self) -> bool {
        self.inclusive
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimitType {
    First,
    Last,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_scope_matches_direct_children_only() {
        let scope =
            QueryScope::Collection(ResourcePath::from_string("users/ada/repos").unwrap());
        let query = QueryDefinition::new(scope);

        let inside = DocumentKey::from_string("users/ada/repos/engine").unwrap();
        let outside = DocumentKey::from_string("users/grace/repos/compiler").unwrap();
        assert!(query.matches_collection(&inside));
        assert!(!query.matches_collection(&outside));
    }

    #[test]
    fn collection_group_matches_by_identifier() {
        let query = QueryDefinition::new(QueryScope::CollectionGroup("repos".to_string()));

        let nested = DocumentKey::from_string("users/ada/repos/engine").unwrap();
        let top_level = DocumentKey::from_string("repos/standalone").unwrap();
        let other = DocumentKey::from_string("users/ada").unwrap();
        assert!(query.matches_collection(&nested));
        assert!(query.matches_collection(&top_level));
        assert!(!query.matches_collection(&other));
    }
}
