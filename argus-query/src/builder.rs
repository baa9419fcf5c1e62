//! Fluent construction of structured queries.
//!
//! ```ignore
//! let query = QueryBuilder::new("People & Contacts")
//!     .filter("dept", QueryOperator::Eq, json!("Eng"))
//!     .sort_desc("joined")
//!     .page(1, 50)
//!     .build();
//! ```

use serde_json::Value;

use crate::model::{
    AggregationSpec, Pagination, QueryFilter, QueryOperator, RelationshipInclude, SortField,
    SortOrder, StructuredQuery,
};

/// Builder over [`StructuredQuery`].
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    query: StructuredQuery,
}

impl QueryBuilder {
    pub fn new(database: &str) -> Self {
        Self {
            query: StructuredQuery::for_database(database),
        }
    }

    /// Add a case-sensitive filter.
    pub fn filter(mut self, field: &str, operator: QueryOperator, value: Value) -> Self {
        self.query.filters.push(QueryFilter::new(field, operator, value));
        self
    }

    /// Add a case-insensitive filter.
    pub fn filter_ci(mut self, field: &str, operator: QueryOperator, value: Value) -> Self {
        self.query
            .filters
            .push(QueryFilter::new(field, operator, value).case_insensitive());
        self
    }

    pub fn sort(mut self, field: &str, order: SortOrder) -> Self {
        self.query.sort_fields.push(SortField {
            field: field.to_string(),
            order,
        });
        self
    }

    pub fn sort_asc(self, field: &str) -> Self {
        self.sort(field, SortOrder::Asc)
    }

    pub fn sort_desc(self, field: &str) -> Self {
        self.sort(field, SortOrder::Desc)
    }

    /// Inline related records reached through `relation_field`.
    pub fn include(mut self, relation_field: &str, target_database: Option<&str>, max_depth: usize) -> Self {
        self.query.includes.push(RelationshipInclude {
            relation_field: relation_field.to_string(),
            target_database: target_database.map(String::from),
            max_depth: max_depth.max(1),
        });
        self
    }

    pub fn page(mut self, page: usize, size: usize) -> Self {
        self.query.pagination = Pagination {
            page: page.max(1),
            size,
            cursor: None,
        };
        self
    }

    pub fn cursor(mut self, cursor: &str, size: usize) -> Self {
        self.query.pagination = Pagination {
            page: 1,
            size,
            cursor: Some(cursor.to_string()),
        };
        self
    }

    pub fn distinct(mut self) -> Self {
        self.query.distinct = true;
        self
    }

    /// Free-text relevance scoring over the filtered set.
    pub fn search(mut self, text: &str) -> Self {
        self.query.source_query = Some(text.to_string());
        self
    }

    pub fn aggregate(mut self, op: &str, field: Option<&str>) -> Self {
        self.query.aggregations.push(AggregationSpec {
            op: op.to_string(),
            field: field.map(String::from),
        });
        self
    }

    pub fn build(self) -> StructuredQuery {
        self.query
    }
}
