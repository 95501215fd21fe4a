//! Turns a [`TableTree`] into joins and a flat select list on the root query.
//!
//! Every non-root node becomes one `LEFT JOIN` (or the relation's own join kind)
//! against its parent's alias. A node whose modifiers do more than pick plain
//! columns is joined as a derived table built from its own `QueryBuilder`.
//! Through relations join their join table first, under `<alias>_join`.

use super::result_parser::JoinResultParser;
use super::table_tree::{TableNode, TableTree};
use super::GraphJoinOptions;
use crate::error::GraphError;
use crate::executor::FlatRow;
use crate::model::{Model, ModelDef, ModelRegistry, ModifierRef};
use crate::query::builder::QueryBuilder;
use crate::query::operations::{JoinOperation, JoinTarget, SelectOperation, Selection};
use crate::query::selector::Selector;
use crate::relation::def::{join_tbl_on_condition, RelationDef};
use crate::relation::expression::RelationExpression;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// Plans and parses one joined eager load
#[derive(Debug, Clone)]
pub struct RelationJoiner {
    root_model: Arc<ModelDef>,
    expression: RelationExpression,
    modifiers: HashMap<String, ModifierRef>,
    options: GraphJoinOptions,
    tree: Option<TableTree>,
    /// Declared columns per table alias
    column_info: HashMap<String, Vec<String>>,
    /// Selections the node's modifiers made, by node uuid
    internal_selections: HashMap<Uuid, Vec<Selection>>,
    subquery_nodes: HashSet<usize>,
    /// Column aliases selected only for joining and identity
    implicit_columns: HashSet<String>,
    omit_implicit_columns: bool,
}

impl RelationJoiner {
    pub fn new(root_model: Arc<ModelDef>, expression: RelationExpression, options: GraphJoinOptions) -> Self {
        Self {
            root_model,
            expression,
            modifiers: HashMap::new(),
            options,
            tree: None,
            column_info: HashMap::new(),
            internal_selections: HashMap::new(),
            subquery_nodes: HashSet::new(),
            implicit_columns: HashSet::new(),
            omit_implicit_columns: true,
        }
    }

    /// Named modifiers that take precedence over the models' own
    pub fn set_modifiers(&mut self, modifiers: HashMap<String, ModifierRef>) -> &mut Self {
        self.modifiers = modifiers;
        self
    }

    pub fn expression(&self) -> &RelationExpression {
        &self.expression
    }

    pub fn tree(&self) -> Option<&TableTree> {
        self.tree.as_ref()
    }

    pub fn implicit_columns(&self) -> &HashSet<String> {
        &self.implicit_columns
    }

    /// Build the table tree and collect the column list of every node's model
    pub fn fetch_column_info(&mut self, builder: &QueryBuilder) -> Result<(), GraphError> {
        let tree = TableTree::create(
            builder.registry(),
            &self.expression,
            Arc::clone(&self.root_model),
            builder.table_ref_alias(),
            &self.options,
        )?;

        self.column_info = tree
            .nodes()
            .iter()
            .map(|node| {
                let columns = node.model().column_names().to_vec();
                if columns.is_empty() && !node.is_root() {
                    log::warn!(
                        "model {} declares no columns; {} will only load its key columns",
                        node.model().name(),
                        node.alias()
                    );
                }
                (node.alias().to_string(), columns)
            })
            .collect();
        self.omit_implicit_columns = builder.registry().config().omit_implicit_join_columns;
        self.tree = Some(tree);
        Ok(())
    }

    /// Add the joins and the flat select list to `builder`
    ///
    /// Replaces whatever select operations `builder` has; its own selections are
    /// kept as the root node's columns.
    pub fn build(&mut self, builder: &mut QueryBuilder) -> Result<(), GraphError> {
        if self.tree.is_none() {
            self.fetch_column_info(builder)?;
        }
        let tree = self
            .tree
            .take()
            .ok_or_else(|| GraphError::Pipeline("table tree missing after fetch_column_info".to_string()))?;
        let result = self.build_with(builder, &tree);
        self.tree = Some(tree);
        result
    }

    fn build_with(&mut self, builder: &mut QueryBuilder, tree: &TableTree) -> Result<(), GraphError> {
        self.internal_selections.clear();
        self.subquery_nodes.clear();
        self.implicit_columns.clear();

        let registry = Arc::clone(builder.registry());
        for node in tree.nodes().iter().skip(1) {
            self.build_join(builder, &registry, tree, node)?;
        }
        self.build_selects(builder, tree)
    }

    fn build_join(
        &mut self,
        builder: &mut QueryBuilder,
        registry: &Arc<ModelRegistry>,
        tree: &TableTree,
        node: &TableNode,
    ) -> Result<(), GraphError> {
        let relation = node_relation(node)?;
        relation.validate()?;
        let parent = tree.node(node.parent().unwrap_or(0));

        let mut sub = QueryBuilder::new(Arc::clone(registry), Arc::clone(node.model()));
        if let Some(modifier) = &relation.modify {
            self.apply_modifier(&mut sub, node, modifier, &mut Vec::new())?;
        }
        for modifier in node.expression().modifiers() {
            self.apply_modifier(&mut sub, node, modifier, &mut Vec::new())?;
        }

        let selections = sub.selections();
        let select_all = selections.is_empty() || selections.iter().any(Selection::is_all);
        let filtered = sub.has(&Selector::predicate(|op| !op.as_any().is::<SelectOperation>()));
        let renamed = selections.iter().any(|s| s.alias.is_some());

        let target = if filtered || renamed || sub.is_explicitly_rejected() {
            let mut inner = sub.clone();
            inner.clear_select();
            if !select_all {
                let mut items = selections.clone();
                for column in required_columns(tree, node, true) {
                    if !items.iter().any(|s| s.output_name() == column) {
                        items.push(Selection::new(None, column, None));
                    }
                }
                inner.select_items(items);
            }
            self.subquery_nodes.insert(node.index());
            JoinTarget::SubQuery {
                query: Box::new(inner.to_statement()?),
                alias: node.alias().to_string(),
            }
        } else {
            JoinTarget::Table {
                table: node.model().table_name().to_string(),
                alias: node.alias().to_string(),
            }
        };
        self.internal_selections.insert(node.uuid(), selections);

        let kind = relation
            .join_type
            .unwrap_or(self.options.join_operation)
            .join_type();

        match &relation.through {
            Some(through) => {
                let join_alias = node.join_table_alias();
                self.check_identifier(&join_alias, node)?;
                let on = join_tbl_on_condition(parent.alias(), &join_alias, &relation.from_col, &through.from_col)?;
                builder.add_operation(Box::new(JoinOperation {
                    kind,
                    target: JoinTarget::Table {
                        table: through.table.clone(),
                        alias: join_alias.clone(),
                    },
                    on,
                }));
                let on = join_tbl_on_condition(&join_alias, node.alias(), &through.to_col, &relation.to_col)?;
                builder.add_operation(Box::new(JoinOperation { kind, target, on }));
            }
            None => {
                let on = join_tbl_on_condition(parent.alias(), node.alias(), &relation.from_col, &relation.to_col)?;
                builder.add_operation(Box::new(JoinOperation { kind, target, on }));
            }
        }
        Ok(())
    }

    /// Apply `modifier` to a node's query; names resolve against the caller's
    /// modifiers first, then the node model's
    fn apply_modifier(
        &self,
        sub: &mut QueryBuilder,
        node: &TableNode,
        modifier: &ModifierRef,
        seen: &mut Vec<String>,
    ) -> Result<(), GraphError> {
        match modifier {
            ModifierRef::Func(f) => {
                (**f)(sub);
                Ok(())
            }
            ModifierRef::Named(name) => {
                if seen.contains(name) {
                    return Err(GraphError::Pipeline(format!(
                        "modifier {} refers back to itself through {}",
                        name,
                        seen.join(" -> ")
                    )));
                }
                let resolved = self
                    .modifiers
                    .get(name)
                    .or_else(|| node.model().get_modifier(name))
                    .cloned()
                    .ok_or_else(|| GraphError::UnknownModifier {
                        modifier: name.clone(),
                        relation: node.property_name().to_string(),
                    })?;
                seen.push(name.clone());
                self.apply_modifier(sub, node, &resolved, seen)
            }
        }
    }

    fn build_selects(&mut self, builder: &mut QueryBuilder, tree: &TableTree) -> Result<(), GraphError> {
        let root_selections = builder.selections();
        builder.clear_select();

        let mut items = Vec::new();
        let mut aliases = HashSet::new();
        for node in tree.nodes() {
            let selections = if node.is_root() {
                root_selections.clone()
            } else {
                self.internal_selections.get(&node.uuid()).cloned().unwrap_or_default()
            };
            let select_all = selections.is_empty() || selections.iter().any(Selection::is_all);
            let in_subquery = self.subquery_nodes.contains(&node.index());
            let mut selected: Vec<String> = Vec::new();
            // A model without a column list loads its key columns as its fields
            let mut keys_are_implicit = true;

            if select_all {
                let columns = self.column_info.get(node.alias()).cloned().unwrap_or_default();
                if node.is_root() && columns.is_empty() {
                    items.push(Selection::new(Some(node.alias()), "*", None));
                    continue;
                }
                keys_are_implicit = !columns.is_empty();
                for column in columns {
                    self.push_column(&mut items, &mut aliases, node, None, &column, &column, false)?;
                    selected.push(column);
                }
            } else {
                for selection in &selections {
                    let source = if in_subquery { selection.output_name() } else { &selection.column };
                    let table = if node.is_root() { selection.table.as_deref() } else { None };
                    self.push_column(&mut items, &mut aliases, node, table, source, selection.output_name(), false)?;
                    selected.push(selection.output_name().to_string());
                }
            }

            if let Some(through) = node.relation().and_then(|r| r.through.as_ref()) {
                let join_alias = node.join_table_alias();
                for extra in &through.extras {
                    let alias = node.column_alias_for(&extra.alias);
                    self.check_identifier(&alias, node)?;
                    if aliases.insert(alias.clone()) {
                        items.push(Selection::new(Some(&join_alias), extra.column.clone(), Some(&alias)));
                    }
                }
            }

            for column in required_columns(tree, node, false) {
                if !selected.iter().any(|s| *s == column) {
                    self.push_column(&mut items, &mut aliases, node, None, &column, &column, keys_are_implicit)?;
                }
            }
        }

        builder.select_items(items);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn push_column(
        &mut self,
        items: &mut Vec<Selection>,
        aliases: &mut HashSet<String>,
        node: &TableNode,
        table: Option<&str>,
        source: &str,
        output: &str,
        implicit: bool,
    ) -> Result<(), GraphError> {
        let alias = node.column_alias_for(output);
        self.check_identifier(&alias, node)?;
        if !aliases.insert(alias.clone()) {
            return Ok(());
        }
        if implicit {
            self.implicit_columns.insert(alias.clone());
        }
        let table = table.unwrap_or(node.alias());
        let rename = if alias == source { None } else { Some(alias.as_str()) };
        items.push(Selection::new(Some(table), source, rename));
        Ok(())
    }

    fn check_identifier(&self, identifier: &str, node: &TableNode) -> Result<(), GraphError> {
        if identifier.len() > self.options.identifier_max_length {
            return Err(GraphError::IdentifierTooLong {
                identifier: identifier.to_string(),
                model: node.model().name().to_string(),
                limit: self.options.identifier_max_length,
            });
        }
        Ok(())
    }

    /// Fold flat joined rows into root models with their relations attached
    pub fn parse_result(&self, rows: &[FlatRow]) -> Result<Vec<Model>, GraphError> {
        let tree = self
            .tree
            .as_ref()
            .ok_or_else(|| GraphError::Pipeline("relation joiner was never built".to_string()))?;
        Ok(JoinResultParser::new(tree, &self.implicit_columns, self.omit_implicit_columns).parse(rows))
    }
}

fn node_relation(node: &TableNode) -> Result<&RelationDef, GraphError> {
    node.relation().ok_or_else(|| {
        GraphError::Pipeline(format!("table node {} has no relation", node.alias()))
    })
}

/// Columns a node needs for identity and for joining its children, plus its own
/// join key when `with_join_key` is set
fn required_columns(tree: &TableTree, node: &TableNode, with_join_key: bool) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    let mut add = |column: &str| {
        if !columns.iter().any(|c| c == column) {
            columns.push(column.to_string());
        }
    };

    for column in node.model().id_identity().iter() {
        add(column);
    }
    if with_join_key {
        if let Some(relation) = node.relation() {
            for column in relation.to_col.iter() {
                add(column);
            }
        }
    }
    for &child in node.children() {
        if let Some(relation) = tree.node(child).relation() {
            for column in relation.from_col.iter() {
                add(column);
            }
        }
    }
    columns
}
