//! Model metadata, the model registry and materialized models.
//!
//! A [`ModelDef`] describes one entity type: its table, id columns, column list,
//! relations and named modifiers. Definitions live in a [`ModelRegistry`], which is
//! read-only once built and is shared by every [`QueryBuilder`] created from it.
//! Query results come back as [`Model`] values with their relation properties
//! filled in by the join result parser.

use crate::config::GraphConfig;
use crate::error::GraphError;
use crate::executor::FlatRow;
use crate::query::QueryBuilder;
use crate::relation::def::RelationDef;
use crate::relation::expression::ExpressionCache;
use crate::relation::identity::Identity;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A query modifier: a reusable function applied to a query builder
pub type Modifier = Arc<dyn Fn(&mut QueryBuilder) + Send + Sync>;

/// A modifier by name or by value
///
/// Names are resolved when a query is planned: first against the modifiers passed
/// to the query, then against the modifiers declared on the model. A name may
/// resolve to another name.
#[derive(Clone)]
pub enum ModifierRef {
    Named(String),
    Func(Modifier),
}

impl ModifierRef {
    pub fn named(name: impl Into<String>) -> Self {
        ModifierRef::Named(name.into())
    }

    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&mut QueryBuilder) + Send + Sync + 'static,
    {
        ModifierRef::Func(Arc::new(f))
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            ModifierRef::Named(name) => Some(name),
            ModifierRef::Func(_) => None,
        }
    }
}

impl PartialEq for ModifierRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ModifierRef::Named(a), ModifierRef::Named(b)) => a == b,
            (ModifierRef::Func(a), ModifierRef::Func(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for ModifierRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModifierRef::Named(name) => write!(f, "Named({:?})", name),
            ModifierRef::Func(_) => f.write_str("Func(..)"),
        }
    }
}

impl From<&str> for ModifierRef {
    fn from(name: &str) -> Self {
        ModifierRef::Named(name.to_string())
    }
}

impl From<String> for ModifierRef {
    fn from(name: String) -> Self {
        ModifierRef::Named(name)
    }
}

/// Metadata for one entity type
#[derive(Debug, Clone)]
pub struct ModelDef {
    name: String,
    table: String,
    id_columns: Identity,
    columns: Vec<String>,
    relations: Vec<RelationDef>,
    modifiers: HashMap<String, ModifierRef>,
}

impl ModelDef {
    /// Create a model with a single `id` column
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            id_columns: Identity::from("id"),
            columns: Vec::new(),
            relations: Vec::new(),
            modifiers: HashMap::new(),
        }
    }

    pub fn id_columns(mut self, id_columns: impl Into<Identity>) -> Self {
        self.id_columns = id_columns.into();
        self
    }

    /// Set the full column list used when a query selects everything
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn modifier(mut self, name: impl Into<String>, modifier: impl Into<ModifierRef>) -> Self {
        self.modifiers.insert(name.into(), modifier.into());
        self
    }

    /// Declare a modifier from a closure
    pub fn modifier_fn<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut QueryBuilder) + Send + Sync + 'static,
    {
        self.modifier(name, ModifierRef::func(f))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn id_identity(&self) -> &Identity {
        &self.id_columns
    }

    pub fn id_column_names(&self) -> Vec<&str> {
        self.id_columns.iter().collect()
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn get_relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Relations in declaration order
    pub fn relations(&self) -> &[RelationDef] {
        &self.relations
    }

    pub fn get_modifier(&self, name: &str) -> Option<&ModifierRef> {
        self.modifiers.get(name)
    }

    /// Build a model instance from the columns of one table node
    pub fn instantiate(&self, fields: FlatRow) -> Model {
        Model {
            model: self.name.clone(),
            fields,
            relations: Vec::new(),
        }
    }
}

/// Registry of model definitions, shared read-only by all queries
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<ModelDef>>,
    config: Arc<GraphConfig>,
    expressions: Arc<ExpressionCache>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            config: Arc::new(config),
            ..Self::default()
        }
    }

    /// Register a model, replacing any previous definition with the same name
    pub fn register(&mut self, model: ModelDef) -> &mut Self {
        self.models.insert(model.name.clone(), Arc::new(model));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<ModelDef>> {
        self.models.get(name).cloned()
    }

    /// Same as [`get`](Self::get), with a typed error for unknown names
    pub fn model(&self, name: &str) -> Result<Arc<ModelDef>, GraphError> {
        self.get(name)
            .ok_or_else(|| GraphError::UnknownModel(name.to_string()))
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn expression_cache(&self) -> &ExpressionCache {
        &self.expressions
    }

    /// Start a query rooted at the named model
    pub fn query(self: &Arc<Self>, name: &str) -> Result<QueryBuilder, GraphError> {
        let model = self.model(name)?;
        Ok(QueryBuilder::new(Arc::clone(self), model))
    }
}

/// A relation property of a materialized model
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    One(Option<Box<Model>>),
    Many(Vec<Model>),
}

/// A materialized entity
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    model: String,
    fields: FlatRow,
    relations: Vec<(String, Related)>,
}

impl Model {
    /// Name of the [`ModelDef`] this instance was created from
    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn get(&self, column: &str) -> Option<&JsonValue> {
        self.fields.get(column)
    }

    pub fn fields(&self) -> &FlatRow {
        &self.fields
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<JsonValue>) {
        self.fields.insert(column.into(), value.into());
    }

    pub fn related(&self, property: &str) -> Option<&Related> {
        self.relations
            .iter()
            .find(|(name, _)| name == property)
            .map(|(_, related)| related)
    }

    /// The related model of a to-one property, `None` if absent or not loaded
    pub fn related_one(&self, property: &str) -> Option<&Model> {
        match self.related(property) {
            Some(Related::One(Some(model))) => Some(&**model),
            _ => None,
        }
    }

    /// The related models of a to-many property, empty if not loaded
    pub fn related_many(&self, property: &str) -> &[Model] {
        match self.related(property) {
            Some(Related::Many(models)) => models,
            _ => &[],
        }
    }

    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.relations.iter().map(|(name, _)| name.as_str())
    }

    pub fn set_related(&mut self, property: impl Into<String>, related: Related) {
        let property = property.into();
        match self.relations.iter_mut().find(|(name, _)| *name == property) {
            Some(slot) => slot.1 = related,
            None => self.relations.push((property, related)),
        }
    }

    /// Identity key from the model's id columns; `None` if any is missing or null
    pub fn identity(&self, def: &ModelDef) -> Option<String> {
        identity_key(def.id_columns.iter().map(|col| self.fields.get(col)))
    }

    /// Nested JSON: fields followed by relation properties
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

impl Serialize for Model {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + self.relations.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        for (key, related) in &self.relations {
            match related {
                Related::One(model) => map.serialize_entry(key, model)?,
                Related::Many(models) => map.serialize_entry(key, models)?,
            }
        }
        map.end()
    }
}

/// Join id values into one key string; any missing or null value yields `None`
pub(crate) fn identity_key<'a, I>(values: I) -> Option<String>
where
    I: IntoIterator<Item = Option<&'a JsonValue>>,
{
    let mut key = String::new();
    for (i, value) in values.into_iter().enumerate() {
        let part = match value {
            None | Some(JsonValue::Null) => return None,
            Some(JsonValue::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        if i > 0 {
            key.push(',');
        }
        key.push_str(&part);
    }
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person() -> ModelDef {
        ModelDef::new("Person", "persons")
            .id_columns("personID")
            .columns(["personID", "name", "parentID"])
    }

    #[test]
    fn test_identity_key_composite_and_null() {
        let a = json!(1);
        let b = json!("x");
        assert_eq!(identity_key([Some(&a), Some(&b)]), Some("1,x".to_string()));
        assert_eq!(identity_key([Some(&a), Some(&JsonValue::Null)]), None);
        assert_eq!(identity_key([Some(&a), None]), None);
    }

    #[test]
    fn test_model_identity_and_relations() {
        let def = person();
        let mut fields = FlatRow::new();
        fields.insert("personID".to_string(), json!(1));
        fields.insert("name".to_string(), json!("A"));
        let mut model = def.instantiate(fields);
        assert_eq!(model.identity(&def), Some("1".to_string()));

        model.set_related("children", Related::Many(vec![]));
        model.set_related("parent", Related::One(None));
        assert!(model.related_many("children").is_empty());
        assert!(model.related_one("parent").is_none());
        assert_eq!(
            model.to_json(),
            json!({"personID": 1, "name": "A", "children": [], "parent": null})
        );
    }

    #[test]
    fn test_registry_unknown_model() {
        let registry = Arc::new(ModelRegistry::new());
        assert!(matches!(registry.query("Nope"), Err(GraphError::UnknownModel(name)) if name == "Nope"));
    }

    #[test]
    fn test_modifier_ref_equality() {
        let f = ModifierRef::func(|_qb: &mut QueryBuilder| {});
        assert_eq!(f.clone(), f);
        assert_ne!(f, ModifierRef::func(|_qb: &mut QueryBuilder| {}));
        assert_eq!(ModifierRef::from("a"), ModifierRef::named("a"));
    }
}
