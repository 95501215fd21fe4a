//! Query building and execution.
//!
//! A [`QueryBuilder`] is an ordered set of [`Operation`]s against one model.
//! Executing it clones the builder, drives the operations through their hooks,
//! builds a SeaQuery statement, runs it on a [`LifeExecutor`](crate::LifeExecutor)
//! and hands the rows back through the result hooks.
//!
//! # Examples
//!
//! ```
//! use lifeguard_graph::test_helpers::fixture_registry;
//! use sea_query::Order;
//!
//! let registry = fixture_registry();
//! let mut query = registry.query("Person").unwrap();
//! query.where_eq("age", 40).order_by("name", Order::Asc).limit(10);
//!
//! let sql = query.to_sql().unwrap();
//! assert!(sql.starts_with(r#"SELECT "persons".* FROM "persons""#));
//! ```

pub mod builder;
pub mod graph;
pub mod operation;
pub mod operations;
pub mod selector;
pub mod value_conversion;

pub use builder::{AfterCallback, BeforeCallback, OperationParent, QueryBuilder};
pub use graph::{AllowGraphOperation, JoinEagerOperation};
pub use operation::{Hook, HookSet, Operation};
pub use operations::{
    DelegateOperation, FirstOperation, JoinOperation, JoinTarget, LimitOperation, OffsetOperation,
    OrderByOperation, SelectOperation, Selection, WhereOperation,
};
pub use selector::Selector;

use crate::error::GraphError;
use crate::executor::FlatRow;
use crate::model::{Model, ModelDef};
use serde_json::Value as JsonValue;

/// What a query resolves to as it moves through the result hooks
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Flat rows straight from the executor
    Rows(Vec<FlatRow>),
    Models(Vec<Model>),
    /// Result of `first()`
    Single(Option<Model>),
    /// Anything a hook or `resolve` replaced the result with
    Value(JsonValue),
}

impl QueryResult {
    /// Number of rows or models; a `Value` counts as one
    pub fn len(&self) -> usize {
        match self {
            QueryResult::Rows(rows) => rows.len(),
            QueryResult::Models(models) => models.len(),
            QueryResult::Single(model) => usize::from(model.is_some()),
            QueryResult::Value(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The result as models; rows are instantiated as `model`
    ///
    /// # Errors
    ///
    /// Returns `GraphError::Pipeline` for a `Value` result.
    pub fn into_models(self, model: &ModelDef) -> Result<Vec<Model>, GraphError> {
        match self {
            QueryResult::Rows(rows) => Ok(rows.into_iter().map(|row| model.instantiate(row)).collect()),
            QueryResult::Models(models) => Ok(models),
            QueryResult::Single(model) => Ok(model.into_iter().collect()),
            QueryResult::Value(value) => Err(GraphError::Pipeline(format!(
                "query on {} resolved to a value, not models: {}",
                model.name(),
                value
            ))),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            QueryResult::Rows(rows) => JsonValue::Array(rows.iter().cloned().map(JsonValue::Object).collect()),
            QueryResult::Models(models) => JsonValue::Array(models.iter().map(Model::to_json).collect()),
            QueryResult::Single(Some(model)) => model.to_json(),
            QueryResult::Single(None) => JsonValue::Null,
            QueryResult::Value(value) => value.clone(),
        }
    }
}
