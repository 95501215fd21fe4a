//! `QueryBuilder`: an ordered set of operations and the hook driver that runs them.
//!
//! Operations live in an arena. Operations added while another operation's hook
//! is running are stored as that operation's children under the hook, and they
//! are dropped when the same hook runs again on the parent. Lookup, removal and
//! copying by [`Selector`] see nested operations as well as top-level ones.

use crate::error::GraphError;
use crate::model::{ModelDef, ModelRegistry, ModifierRef};
use crate::query::operation::{Hook, Operation};
use crate::query::operations::{
    column_expr, DelegateOperation, FirstOperation, JoinOperation, JoinTarget, LimitOperation,
    OffsetOperation, OrderByOperation, SelectOperation, Selection, WhereOperation,
};
use crate::query::selector::Selector;
use crate::query::QueryResult;
use crate::relation::expression::RelationExpression;
use crate::config::JoinKind;
use sea_query::{Alias, Condition, ExprTrait, Order, PostgresQueryBuilder, Query, SelectStatement, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Callback run between `on_before1` and `on_before2`
pub type BeforeCallback = Arc<dyn Fn(&mut QueryBuilder) -> Result<(), GraphError> + Send + Sync>;

/// Callback run between `on_after2` and `on_after3`
pub type AfterCallback =
    Arc<dyn Fn(&QueryBuilder, QueryResult) -> Result<QueryResult, GraphError> + Send + Sync>;

/// Upper bound on query-executor substitutions in one execution
pub const MAX_EXECUTOR_REPLACEMENTS: usize = 32;

/// The operation whose hook added an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationParent {
    pub id: usize,
    pub hook: Hook,
}

#[derive(Clone)]
struct OperationSlot {
    op: Option<Box<dyn Operation>>,
    parent: Option<OperationParent>,
    children: Vec<usize>,
    removed: bool,
}

#[derive(Clone, Default)]
pub(crate) struct OperationSet {
    slots: Vec<OperationSlot>,
    top: Vec<usize>,
    active: Vec<OperationParent>,
}

impl OperationSet {
    fn add(&mut self, op: Box<dyn Operation>) -> usize {
        let id = self.slots.len();
        let parent = self.active.last().copied();
        self.slots.push(OperationSlot {
            op: Some(op),
            parent,
            children: Vec::new(),
            removed: false,
        });
        match parent {
            Some(parent) => self.slots[parent.id].children.push(id),
            None => self.top.push(id),
        }
        id
    }

    /// Live operation ids, depth-first: each operation followed by its children
    fn ordered_ids(&self) -> Vec<usize> {
        fn walk(set: &OperationSet, ids: &[usize], out: &mut Vec<usize>) {
            for &id in ids {
                let slot = &set.slots[id];
                if slot.removed {
                    continue;
                }
                out.push(id);
                walk(set, &slot.children, out);
            }
        }
        let mut out = Vec::new();
        walk(self, &self.top, &mut out);
        out
    }

    fn get(&self, id: usize) -> Option<&dyn Operation> {
        self.slots
            .get(id)
            .filter(|slot| !slot.removed)
            .and_then(|slot| slot.op.as_deref())
    }

    fn get_mut(&mut self, id: usize) -> Option<&mut (dyn Operation + 'static)> {
        match self.slots.get_mut(id) {
            Some(slot) if !slot.removed => slot.op.as_deref_mut(),
            _ => None,
        }
    }

    fn declares(&self, id: usize, hook: Hook) -> bool {
        self.get(id).map(|op| op.hooks().has(hook)).unwrap_or(false)
    }

    fn is_live(&self, id: usize) -> bool {
        self.slots.get(id).map(|s| !s.removed && s.op.is_some()).unwrap_or(false)
    }

    fn take(&mut self, id: usize) -> Option<Box<dyn Operation>> {
        self.slots.get_mut(id).filter(|s| !s.removed).and_then(|s| s.op.take())
    }

    fn put_back(&mut self, id: usize, op: Box<dyn Operation>) {
        if let Some(slot) = self.slots.get_mut(id) {
            if !slot.removed {
                slot.op = Some(op);
            }
        }
    }

    fn remove(&mut self, id: usize) {
        let Some(slot) = self.slots.get_mut(id) else {
            return;
        };
        if slot.removed {
            return;
        }
        slot.removed = true;
        let children = std::mem::take(&mut slot.children);
        match slot.parent {
            Some(parent) => self.slots[parent.id].children.retain(|&c| c != id),
            None => self.top.retain(|&c| c != id),
        }
        for child in children {
            self.remove(child);
        }
    }

    fn remove_children(&mut self, id: usize, hook: Hook) {
        let children: Vec<usize> = self.slots[id]
            .children
            .iter()
            .copied()
            .filter(|&c| self.slots[c].parent.map(|p| p.hook) == Some(hook))
            .collect();
        for child in children {
            self.remove(child);
        }
    }

    fn move_to_end(&mut self, id: usize) {
        if let Some(pos) = self.top.iter().position(|&c| c == id) {
            self.top.remove(pos);
            self.top.push(id);
        }
    }

    fn parent_of(&self, id: usize) -> Option<OperationParent> {
        self.slots.get(id).and_then(|s| s.parent)
    }

    fn len(&self) -> usize {
        self.ordered_ids().len()
    }
}

/// A query against one model, built from operations
///
/// # Example
///
/// ```
/// use lifeguard_graph::test_helpers::{fixture_registry, row, MockExecutor};
/// use serde_json::json;
///
/// let registry = fixture_registry();
/// let mut query = registry.query("Person").unwrap();
/// query.where_eq("name", "A").with_graph_joined("children");
///
/// let executor = MockExecutor::new().with_rows(vec![row(json!({
///     "personID": 1, "name": "A",
///     "children:personID": 2, "children:name": "B",
/// }))]);
/// let people = query.all(&executor).unwrap();
/// assert_eq!(people[0].related_many("children").len(), 1);
/// ```
#[derive(Clone)]
pub struct QueryBuilder {
    registry: Arc<ModelRegistry>,
    model: Arc<ModelDef>,
    alias: Option<String>,
    operations: OperationSet,
    before: Vec<BeforeCallback>,
    after: Vec<AfterCallback>,
    explicit: Option<Result<QueryResult, GraphError>>,
    capture_errors: Option<bool>,
    pub(crate) graph_modifiers: HashMap<String, ModifierRef>,
    pub(crate) graph_modifiers_at_path: Vec<(RelationExpression, ModifierRef)>,
}

impl QueryBuilder {
    pub fn new(registry: Arc<ModelRegistry>, model: Arc<ModelDef>) -> Self {
        Self {
            registry,
            model,
            alias: None,
            operations: OperationSet::default(),
            before: Vec::new(),
            after: Vec::new(),
            explicit: None,
            capture_errors: None,
            graph_modifiers: HashMap::new(),
            graph_modifiers_at_path: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn model(&self) -> &Arc<ModelDef> {
        &self.model
    }

    /// Alias the root table is referenced by: the `alias_for` alias or the table name
    pub fn table_ref_alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(self.model.table_name())
    }

    pub fn alias_for(&mut self, alias: impl Into<String>) -> &mut Self {
        self.alias = Some(alias.into());
        self
    }

    // --- operations -------------------------------------------------------

    /// Add an operation, calling its `on_add` hook first
    pub fn add_operation(&mut self, op: Box<dyn Operation>) -> &mut Self {
        self.push_operation(op);
        self
    }

    /// Operations added from `on_add` become children of the added operation
    pub(crate) fn push_operation(&mut self, op: Box<dyn Operation>) -> Option<usize> {
        let wants_add = op.hooks().has(Hook::OnAdd);
        let id = self.operations.add(op);
        if !wants_add {
            return Some(id);
        }
        match self.call_hook(id, Hook::OnAdd, |op, builder| op.on_add(builder)) {
            Ok(true) => Some(id),
            Ok(false) => {
                self.operations.remove(id);
                None
            }
            Err(err) => {
                self.operations.remove(id);
                self.reject(err);
                None
            }
        }
    }

    /// First operation matching `selector`, nested operations included
    pub fn find_operation(&self, selector: &Selector) -> Option<&dyn Operation> {
        self.operations
            .ordered_ids()
            .into_iter()
            .filter_map(|id| self.operations.get(id))
            .find(|op| selector.matches(*op))
    }

    pub fn find_operations(&self, selector: &Selector) -> Vec<&dyn Operation> {
        self.operations
            .ordered_ids()
            .into_iter()
            .filter_map(|id| self.operations.get(id))
            .filter(|op| selector.matches(*op))
            .collect()
    }

    /// First operation of type `T`
    pub fn find_operation_of<T: Operation + 'static>(&self) -> Option<&T> {
        self.operations
            .ordered_ids()
            .into_iter()
            .filter_map(|id| self.operations.get(id))
            .find_map(|op| op.as_any().downcast_ref::<T>())
    }

    pub(crate) fn find_operation_mut<T: Operation + 'static>(&mut self) -> Option<&mut T> {
        let id = self.operations.ordered_ids().into_iter().find(|&id| {
            self.operations
                .get(id)
                .map(|op| op.as_any().is::<T>())
                .unwrap_or(false)
        })?;
        self.operations
            .get_mut(id)
            .and_then(|op| op.as_any_mut().downcast_mut::<T>())
    }

    /// Parent of the first operation matching `selector`, `None` for top-level ones
    pub fn operation_parent(&self, selector: &Selector) -> Option<OperationParent> {
        self.operations
            .ordered_ids()
            .into_iter()
            .find(|&id| self.operations.get(id).map(|op| selector.matches(op)).unwrap_or(false))
            .and_then(|id| self.operations.parent_of(id))
    }

    pub fn has(&self, selector: &Selector) -> bool {
        self.find_operation(selector).is_some()
    }

    /// Remove every operation matching `selector`, with its children
    pub fn clear(&mut self, selector: &Selector) -> &mut Self {
        let matching: Vec<usize> = self
            .operations
            .ordered_ids()
            .into_iter()
            .filter(|&id| self.operations.get(id).map(|op| selector.matches(op)).unwrap_or(false))
            .collect();
        for id in matching {
            self.operations.remove(id);
        }
        self
    }

    /// Append copies of `other`'s operations that match `selector`
    pub fn copy_from(&mut self, other: &QueryBuilder, selector: &Selector) -> &mut Self {
        for op in other.find_operations(selector) {
            self.operations.add(op.clone_box());
        }
        self
    }

    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    // --- query surface ----------------------------------------------------

    /// Add columns to the select list, each as `[table.]column [as alias]`
    pub fn select<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let selections = columns
            .into_iter()
            .map(|c| Selection::parse(c.as_ref()))
            .collect();
        self.add_operation(Box::new(SelectOperation { selections }))
    }

    pub(crate) fn select_items(&mut self, selections: Vec<Selection>) -> &mut Self {
        self.add_operation(Box::new(SelectOperation { selections }))
    }

    pub fn clear_select(&mut self) -> &mut Self {
        self.clear(&Selector::of_type::<SelectOperation>())
    }

    pub fn has_selects(&self) -> bool {
        self.find_operation_of::<SelectOperation>().is_some()
    }

    /// Explicit selections, in the order they were added
    pub fn selections(&self) -> Vec<Selection> {
        self.find_operations(&Selector::of_type::<SelectOperation>())
            .into_iter()
            .filter_map(|op| op.as_any().downcast_ref::<SelectOperation>())
            .flat_map(|op| op.selections.iter().cloned())
            .collect()
    }

    pub fn filter(&mut self, condition: impl Into<Condition>) -> &mut Self {
        self.add_operation(Box::new(WhereOperation {
            condition: condition.into(),
        }))
    }

    pub fn where_eq(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        let condition = Condition::all().add(column_expr(column).eq(value.into()));
        self.filter(condition)
    }

    pub fn order_by(&mut self, column: &str, order: Order) -> &mut Self {
        self.add_operation(Box::new(OrderByOperation {
            column: column.to_string(),
            order,
        }))
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.add_operation(Box::new(LimitOperation { limit }))
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.add_operation(Box::new(OffsetOperation { offset }))
    }

    pub fn join(&mut self, kind: JoinKind, table: &str, alias: &str, on: Condition) -> &mut Self {
        self.add_operation(Box::new(JoinOperation {
            kind: kind.join_type(),
            target: JoinTarget::Table {
                table: table.to_string(),
                alias: alias.to_string(),
            },
            on,
        }))
    }

    /// Resolve to the first model instead of a list
    pub fn first(&mut self) -> &mut Self {
        self.add_operation(Box::new(FirstOperation))
    }

    /// Run the builder returned by `f` instead of this one
    pub fn delegate_to<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&QueryBuilder) -> Result<QueryBuilder, GraphError> + Send + Sync + 'static,
    {
        self.add_operation(Box::new(DelegateOperation { delegate: Arc::new(f) }))
    }

    pub fn run_before<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&mut QueryBuilder) -> Result<(), GraphError> + Send + Sync + 'static,
    {
        self.before.push(Arc::new(f));
        self
    }

    pub fn run_after<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&QueryBuilder, QueryResult) -> Result<QueryResult, GraphError> + Send + Sync + 'static,
    {
        self.after.push(Arc::new(f));
        self
    }

    /// Finish with `value` without building or executing anything
    pub fn resolve(&mut self, value: QueryResult) -> &mut Self {
        self.explicit = Some(Ok(value));
        self
    }

    /// Fail with `error` without building or executing anything
    pub fn reject(&mut self, error: GraphError) -> &mut Self {
        self.explicit = Some(Err(error));
        self
    }

    pub fn is_explicitly_resolved(&self) -> bool {
        matches!(self.explicit, Some(Ok(_)))
    }

    pub fn is_explicitly_rejected(&self) -> bool {
        matches!(self.explicit, Some(Err(_)))
    }

    /// Override `GraphConfig::capture_errors` for this builder
    pub fn capture_errors(&mut self, capture: bool) -> &mut Self {
        self.capture_errors = Some(capture);
        self
    }

    // --- hook driver ------------------------------------------------------

    fn call_hook<R, F>(&mut self, id: usize, hook: Hook, f: F) -> Result<R, GraphError>
    where
        F: FnOnce(&mut dyn Operation, &mut QueryBuilder) -> Result<R, GraphError>,
    {
        self.operations.remove_children(id, hook);
        let mut op = self
            .operations
            .take(id)
            .ok_or_else(|| GraphError::Pipeline(format!("operation {} is not available", id)))?;
        self.operations.active.push(OperationParent { id, hook });
        let result = f(op.as_mut(), self);
        self.operations.active.pop();
        self.operations.put_back(id, op);
        result
    }

    /// Run `hook` on every operation declaring it, including operations added meanwhile
    fn run_hook(&mut self, hook: Hook) -> Result<(), GraphError> {
        let mut visited = HashSet::new();
        loop {
            let next = self
                .operations
                .ordered_ids()
                .into_iter()
                .find(|id| !visited.contains(id) && self.operations.declares(*id, hook));
            let Some(id) = next else {
                return Ok(());
            };
            visited.insert(id);
            self.call_hook(id, hook, |op, builder| match hook {
                Hook::OnBefore1 => op.on_before1(builder),
                Hook::OnBefore2 => op.on_before2(builder),
                Hook::OnBefore3 => op.on_before3(builder),
                Hook::OnBuild => op.on_build(builder),
                _ => Ok(()),
            })?;
        }
    }

    fn run_result_hook(&mut self, hook: Hook, mut result: QueryResult) -> Result<QueryResult, GraphError> {
        for id in self.operations.ordered_ids() {
            if !self.operations.is_live(id) || !self.operations.declares(id, hook) {
                continue;
            }
            result = self.call_hook(id, hook, move |op, builder| match hook {
                Hook::OnRawResult => op.on_raw_result(builder, result),
                Hook::OnAfter1 => op.on_after1(builder, result),
                Hook::OnAfter2 => op.on_after2(builder, result),
                Hook::OnAfter3 => op.on_after3(builder, result),
                _ => Ok(result),
            })?;
        }
        Ok(result)
    }

    /// Operations every query gets: a select-all if nothing is selected, and the
    /// eager operation last so it plans against the finished root query
    pub(crate) fn add_implicit_operations(&mut self) {
        if !self.has_selects() {
            let all = format!("{}.*", self.table_ref_alias());
            self.operations.add(Box::new(SelectOperation {
                selections: vec![Selection::parse(&all)],
            }));
        }
        let eager = self.operations.top.iter().copied().find(|&id| {
            self.operations
                .get(id)
                .map(|op| op.as_any().is::<crate::query::graph::JoinEagerOperation>())
                .unwrap_or(false)
        });
        if let Some(id) = eager {
            self.operations.move_to_end(id);
        }
    }

    /// Add implicit operations, run `on_build`, and follow query-executor substitutions
    fn prepare(&mut self) -> Result<(), GraphError> {
        let mut replacements = 0;
        loop {
            self.add_implicit_operations();
            self.run_hook(Hook::OnBuild)?;

            let executor = self
                .operations
                .ordered_ids()
                .into_iter()
                .find(|&id| self.operations.declares(id, Hook::QueryExecutor));
            let Some(id) = executor else {
                return Ok(());
            };
            if replacements == MAX_EXECUTOR_REPLACEMENTS {
                return Err(GraphError::Pipeline(format!(
                    "query executor substitution did not settle after {} replacements",
                    MAX_EXECUTOR_REPLACEMENTS
                )));
            }
            replacements += 1;

            let replacement = match self.operations.get(id) {
                Some(op) => op.query_executor(self)?,
                None => return Ok(()),
            };
            log::debug!("query on {} delegated to a query on {}", self.model.name(), replacement.model.name());
            *self = replacement;
            if self.explicit.is_some() {
                return Ok(());
            }
        }
    }

    /// Build the statement from the operations as they are, without running `on_build`
    pub(crate) fn build_statement(&self) -> Result<SelectStatement, GraphError> {
        let mut statement = Query::select();
        if self.alias.is_some() {
            statement.from_as(Alias::new(self.model.table_name()), Alias::new(self.table_ref_alias()));
        } else {
            statement.from(Alias::new(self.model.table_name()));
        }
        for id in self.operations.ordered_ids() {
            if let Some(op) = self.operations.get(id) {
                if op.hooks().has(Hook::OnBuildQuery) {
                    op.on_build_query(self, &mut statement)?;
                }
            }
        }
        Ok(statement)
    }

    /// The fully planned statement
    pub fn to_statement(&self) -> Result<SelectStatement, GraphError> {
        let mut builder = self.clone();
        if let Some(Err(err)) = &builder.explicit {
            return Err(err.clone());
        }
        builder.prepare()?;
        if let Some(Err(err)) = builder.explicit.take() {
            return Err(err);
        }
        builder.build_statement()
    }

    /// SQL text of the fully planned statement, values inlined
    pub fn to_sql(&self) -> Result<String, GraphError> {
        Ok(self.to_statement()?.to_string(PostgresQueryBuilder))
    }

    // --- execution --------------------------------------------------------

    /// Run the full hook sequence against `executor`
    ///
    /// The builder is cloned first; hooks never change `self`.
    ///
    /// # Errors
    ///
    /// Planning errors are returned before anything is executed. Errors are offered
    /// to every operation's `on_error` first; with `capture_errors` the first
    /// recovery value is returned instead.
    pub fn execute<E>(&self, executor: &E) -> Result<QueryResult, GraphError>
    where
        E: crate::executor::LifeExecutor + ?Sized,
    {
        let mut builder = self.clone();
        match builder.run(executor) {
            Ok(result) => Ok(result),
            Err(err) => {
                #[cfg(feature = "metrics")]
                {
                    if err.is_planning_error() {
                        crate::metrics::METRICS.record_planning_error();
                    }
                }
                builder.handle_error(err)
            }
        }
    }

    fn run<E>(&mut self, executor: &E) -> Result<QueryResult, GraphError>
    where
        E: crate::executor::LifeExecutor + ?Sized,
    {
        self.run_hook(Hook::OnBefore1)?;
        for callback in self.before.clone() {
            callback(self)?;
        }
        self.run_hook(Hook::OnBefore2)?;
        self.run_hook(Hook::OnBefore3)?;
        if let Some(explicit) = self.explicit.take() {
            return explicit;
        }

        self.prepare()?;
        if let Some(explicit) = self.explicit.take() {
            return explicit;
        }

        let (sql, values) = self.build_statement()?.build(PostgresQueryBuilder);
        log::debug!("executing query on {}: {}", self.model.name(), sql);
        let rows = executor.query_all(&sql, &values)?;

        let mut result = self.run_result_hook(Hook::OnRawResult, QueryResult::Rows(rows))?;
        if let QueryResult::Rows(rows) = result {
            result = QueryResult::Models(rows.into_iter().map(|row| self.model.instantiate(row)).collect());
        }

        result = self.run_result_hook(Hook::OnAfter1, result)?;
        result = self.run_result_hook(Hook::OnAfter2, result)?;
        for callback in self.after.clone() {
            result = callback(self, result)?;
        }
        self.run_result_hook(Hook::OnAfter3, result)
    }

    fn handle_error(&self, error: GraphError) -> Result<QueryResult, GraphError> {
        let mut error = error;
        let mut recovered = None;
        for id in self.operations.ordered_ids() {
            let Some(op) = self.operations.get(id) else {
                continue;
            };
            if !op.hooks().has(Hook::OnError) {
                continue;
            }
            match op.on_error(self, &error) {
                Ok(Some(value)) => {
                    if recovered.is_none() {
                        recovered = Some(value);
                    }
                }
                Ok(None) => {}
                Err(translated) => error = translated,
            }
        }

        let capture = self
            .capture_errors
            .unwrap_or(self.registry.config().capture_errors);
        match recovered {
            Some(value) if capture => {
                log::debug!("query on {} recovered from error: {}", self.model.name(), error);
                Ok(value)
            }
            _ => Err(error),
        }
    }

    /// Execute and return the result as a list of models
    pub fn all<E>(&self, executor: &E) -> Result<Vec<crate::model::Model>, GraphError>
    where
        E: crate::executor::LifeExecutor + ?Sized,
    {
        let result = self.execute(executor)?;
        result.into_models(&self.model)
    }

    /// Number of root rows the query matches, ignoring eager loading, ordering and paging
    pub fn result_size<E>(&self, executor: &E) -> Result<u64, GraphError>
    where
        E: crate::executor::LifeExecutor + ?Sized,
    {
        let mut builder = self.clone();
        builder.clear(&Selector::predicate(|op| {
            let any = op.as_any();
            any.is::<crate::query::graph::JoinEagerOperation>()
                || any.is::<OrderByOperation>()
                || any.is::<LimitOperation>()
                || any.is::<OffsetOperation>()
                || any.is::<FirstOperation>()
        }));

        if let Some(Err(err)) = builder.explicit.take() {
            return Err(err);
        }
        builder.prepare()?;
        match builder.explicit.take() {
            Some(Err(err)) => return Err(err),
            Some(Ok(value)) => return Ok(value.len() as u64),
            None => {}
        }

        let inner = builder.build_statement()?;
        let (sql, values) = Query::select()
            .expr_as(sea_query::Expr::cust("COUNT(*)"), Alias::new("count"))
            .from_subquery(inner, Alias::new("temp"))
            .build(PostgresQueryBuilder);
        let rows = executor.query_all(&sql, &values)?;

        let count = rows.first().and_then(|row| row.get("count")).cloned();
        match count {
            Some(serde_json::Value::Number(n)) => n
                .as_u64()
                .ok_or_else(|| GraphError::Pipeline(format!("invalid row count {}", n))),
            Some(serde_json::Value::String(s)) => s
                .parse()
                .map_err(|_| GraphError::Pipeline(format!("invalid row count {}", s))),
            _ => Err(GraphError::Pipeline("count query returned no count".to_string())),
        }
    }
}

impl fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let operations: Vec<&str> = self
            .operations
            .ordered_ids()
            .into_iter()
            .filter_map(|id| self.operations.get(id).map(|op| op.name()))
            .collect();
        f.debug_struct("QueryBuilder")
            .field("model", &self.model.name())
            .field("alias", &self.alias)
            .field("operations", &operations)
            .finish()
    }
}
