//! Test fixtures: an in-memory executor and a small person/animal/movie schema.
//!
//! Used by the unit tests, the integration tests under `tests/integration/` and
//! the doc examples. Nothing here talks to a database.

use crate::executor::{FlatRow, LifeError, LifeExecutor};
use crate::model::{ModelDef, ModelRegistry};
use crate::relation::def::{RelationDef, ThroughDef};
use sea_query::Values;
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

enum Response {
    Rows(Vec<FlatRow>),
    Fail(String),
}

/// A `LifeExecutor` that records every statement and replays queued responses
///
/// With an empty queue every statement returns no rows.
#[derive(Default)]
pub struct MockExecutor {
    responses: Mutex<VecDeque<Response>>,
    queries: Mutex<Vec<(String, Values)>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `rows` as the result of the next statement
    pub fn with_rows(self, rows: Vec<FlatRow>) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(Response::Rows(rows));
        }
        self
    }

    /// Queue a failure for the next statement
    pub fn with_error(self, message: impl Into<String>) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(Response::Fail(message.into()));
        }
        self
    }

    /// SQL of every statement executed so far
    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .map(|q| q.iter().map(|(sql, _)| sql.clone()).collect())
            .unwrap_or_default()
    }

    /// Bound values of every statement executed so far
    pub fn values(&self) -> Vec<Values> {
        self.queries
            .lock()
            .map(|q| q.iter().map(|(_, values)| values.clone()).collect())
            .unwrap_or_default()
    }
}

impl LifeExecutor for MockExecutor {
    fn query_all(&self, query: &str, values: &Values) -> Result<Vec<FlatRow>, LifeError> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push((query.to_string(), values.clone()));
        }
        let response = self
            .responses
            .lock()
            .map_err(|_| LifeError::Other("mock executor lock poisoned".to_string()))?
            .pop_front();
        match response {
            Some(Response::Rows(rows)) => Ok(rows),
            Some(Response::Fail(message)) => Err(LifeError::QueryError(message)),
            None => Ok(Vec::new()),
        }
    }
}

/// A flat row from a JSON object; anything else gives an empty row
pub fn row(value: JsonValue) -> FlatRow {
    match value {
        JsonValue::Object(map) => map,
        _ => FlatRow::new(),
    }
}

/// The fixture schema
///
/// - `Person` (`persons`, id `personID`): `children` and `parent` on `parentID`,
///   `pets` on `animals.ownerID`, `movies` through `persons_movies` with its
///   `role` column
/// - `Animal` (`animals`, id `id`): modifiers `dogs` (species = 'dog') and
///   `nameOnly`
/// - `Movie` (`movies`, id `id`)
pub fn fixture_registry() -> Arc<ModelRegistry> {
    let mut registry = ModelRegistry::new();
    registry
        .register(
            ModelDef::new("Person", "persons")
                .id_columns("personID")
                .columns(["personID", "name", "age", "parentID"])
                .relation(RelationDef::has_many("children", "Person", "personID", "parentID"))
                .relation(RelationDef::belongs_to("parent", "Person", "parentID", "personID"))
                .relation(RelationDef::has_many("pets", "Animal", "personID", "ownerID"))
                .relation(RelationDef::many_to_many(
                    "movies",
                    "Movie",
                    "personID",
                    ThroughDef::new("persons_movies", "personId", "movieId").extra("role", "role"),
                    "id",
                )),
        )
        .register(
            ModelDef::new("Animal", "animals")
                .columns(["id", "name", "species", "ownerID"])
                .modifier_fn("dogs", |query| {
                    query.where_eq("species", "dog");
                })
                .modifier_fn("nameOnly", |query| {
                    query.select(["name"]);
                }),
        )
        .register(ModelDef::new("Movie", "movies").columns(["id", "name"]));
    Arc::new(registry)
}
