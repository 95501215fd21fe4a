//! Join topology for one eager-load plan.
//!
//! The tree is an arena: node 0 is the root, every other node points at its
//! parent by index. Column aliases follow one convention shared by the joiner and
//! the result parser, see [`flatten_column_alias`] and [`split_column_alias`].

use super::GraphJoinOptions;
use crate::error::GraphError;
use crate::executor::FlatRow;
use crate::model::{identity_key, ModelDef, ModelRegistry};
use crate::relation::def::RelationDef;
use crate::relation::expression::RelationExpression;
use once_cell::sync::OnceCell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// Alias of `column` in the flat result: bare for the root, `alias<sep>column` otherwise
pub fn flatten_column_alias(table_alias: Option<&str>, separator: &str, column: &str) -> String {
    match table_alias {
        Some(alias) => format!("{}{}{}", alias, separator, column),
        None => column.to_string(),
    }
}

/// Inverse of [`flatten_column_alias`]: split on the last separator
pub fn split_column_alias<'a>(column_alias: &'a str, separator: &str) -> (Option<&'a str>, &'a str) {
    if separator.is_empty() {
        return (None, column_alias);
    }
    match column_alias.rfind(separator) {
        Some(pos) => (
            Some(&column_alias[..pos]),
            &column_alias[pos + separator.len()..],
        ),
        None => (None, column_alias),
    }
}

/// One table occurrence in the joined statement
#[derive(Debug, Clone)]
pub struct TableNode {
    index: usize,
    model: Arc<ModelDef>,
    expression: RelationExpression,
    parent: Option<usize>,
    relation: Option<RelationDef>,
    alias: String,
    separator: String,
    depth: usize,
    children: Vec<usize>,
    uuid: OnceCell<Uuid>,
}

impl TableNode {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn model(&self) -> &Arc<ModelDef> {
        &self.model
    }

    pub fn expression(&self) -> &RelationExpression {
        &self.expression
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// The relation that produced this node, `None` for the root
    pub fn relation(&self) -> Option<&RelationDef> {
        self.relation.as_ref()
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn children(&self) -> &[usize] {
        &self.children
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Relation property the node's models are attached under
    pub fn property_name(&self) -> &str {
        self.expression.name()
    }

    /// Identity of the node that does not depend on its alias
    pub fn uuid(&self) -> Uuid {
        *self.uuid.get_or_init(Uuid::new_v4)
    }

    /// Alias of the through relation's join table
    pub fn join_table_alias(&self) -> String {
        format!("{}_join", self.alias)
    }

    pub fn column_alias_for(&self, column: &str) -> String {
        let prefix = if self.is_root() { None } else { Some(self.alias.as_str()) };
        flatten_column_alias(prefix, &self.separator, column)
    }

    pub fn column_aliases_for<'a, I>(&self, columns: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        columns.into_iter().map(|c| self.column_alias_for(c)).collect()
    }

    /// Identity key of this node's row, `None` if any id column is null or missing
    pub fn get_id_from_flat_row(&self, row: &FlatRow) -> Option<String> {
        identity_key(
            self.model
                .id_identity()
                .iter()
                .map(|col| row.get(&self.column_alias_for(col))),
        )
    }
}

/// All table nodes of one eager-load plan
#[derive(Debug, Clone)]
pub struct TableTree {
    nodes: Vec<TableNode>,
    nodes_by_alias: HashMap<String, usize>,
    /// `<alias>_join` aliases of through relations' join tables
    join_table_aliases: HashSet<String>,
    options: GraphJoinOptions,
    expression: String,
    next_short_alias: usize,
}

impl TableTree {
    /// Walk `expression` from `root_model` and bind every reached relation to a table node
    ///
    /// # Errors
    ///
    /// Unknown relations or models, aliases longer than the identifier limit, alias
    /// collisions and recursion deeper than `options.max_recursion_depth`.
    pub fn create(
        registry: &ModelRegistry,
        expression: &RelationExpression,
        root_model: Arc<ModelDef>,
        root_alias: &str,
        options: &GraphJoinOptions,
    ) -> Result<Self, GraphError> {
        let mut tree = TableTree {
            nodes: Vec::new(),
            nodes_by_alias: HashMap::new(),
            join_table_aliases: HashSet::new(),
            options: options.clone(),
            expression: expression.to_string(),
            next_short_alias: 0,
        };

        let root = TableNode {
            index: 0,
            model: root_model,
            expression: expression.clone(),
            parent: None,
            relation: None,
            alias: root_alias.to_string(),
            separator: options.separator.clone(),
            depth: 0,
            children: Vec::new(),
            uuid: OnceCell::new(),
        };
        tree.register(root)?;
        tree.create_children(registry, 0)?;

        log::debug!(
            "table tree for {} \"{}\": {} nodes",
            tree.nodes[0].model.name(),
            tree.expression,
            tree.nodes.len()
        );
        Ok(tree)
    }

    fn create_children(&mut self, registry: &ModelRegistry, parent: usize) -> Result<(), GraphError> {
        let model = Arc::clone(&self.nodes[parent].model);
        let expression = self.nodes[parent].expression.clone();

        let mut discovered = Vec::new();
        expression.for_each_child_expression(&model, |child, relation| {
            discovered.push((child, relation.clone()));
            Ok(())
        })?;

        for (child_expression, relation) in discovered {
            let related = registry.model(&relation.related_model)?;
            let depth = self.nodes[parent].depth + 1;
            if depth > self.options.max_recursion_depth {
                return Err(GraphError::RecursionTooDeep {
                    expression: self.expression.clone(),
                    limit: self.options.max_recursion_depth,
                });
            }

            let alias = self.calculate_alias(parent, child_expression.name());
            if alias.len() > self.options.identifier_max_length {
                return Err(GraphError::IdentifierTooLong {
                    identifier: alias,
                    model: related.name().to_string(),
                    limit: self.options.identifier_max_length,
                });
            }

            let index = self.nodes.len();
            self.register(TableNode {
                index,
                model: related,
                expression: child_expression,
                parent: Some(parent),
                relation: Some(relation),
                alias,
                separator: self.options.separator.clone(),
                depth,
                children: Vec::new(),
                uuid: OnceCell::new(),
            })?;
            self.nodes[parent].children.push(index);
            self.create_children(registry, index)?;
        }
        Ok(())
    }

    fn calculate_alias(&mut self, parent: usize, name: &str) -> String {
        if self.options.minimize {
            self.next_short_alias += 1;
            return format!("_t{}", self.next_short_alias);
        }

        let own = self
            .options
            .aliases
            .get(name)
            .map(String::as_str)
            .unwrap_or(name);
        let parent = &self.nodes[parent];
        if parent.is_root() {
            own.to_string()
        } else {
            format!("{}{}{}", parent.alias, self.options.separator, own)
        }
    }

    /// Register a node's alias, and its join table's alias for through relations
    fn register(&mut self, node: TableNode) -> Result<(), GraphError> {
        self.claim_alias(&node.alias)?;
        if node.relation.as_ref().is_some_and(|r| r.through.is_some()) {
            let join_alias = node.join_table_alias();
            if join_alias.len() > self.options.identifier_max_length {
                return Err(GraphError::IdentifierTooLong {
                    identifier: join_alias,
                    model: node.model.name().to_string(),
                    limit: self.options.identifier_max_length,
                });
            }
            self.claim_alias(&join_alias)?;
            self.join_table_aliases.insert(join_alias);
        }
        self.nodes_by_alias.insert(node.alias.clone(), node.index);
        self.nodes.push(node);
        Ok(())
    }

    fn claim_alias(&self, alias: &str) -> Result<(), GraphError> {
        if self.nodes_by_alias.contains_key(alias) || self.join_table_aliases.contains(alias) {
            return Err(GraphError::AliasCollision {
                alias: alias.to_string(),
            });
        }
        Ok(())
    }

    pub fn root(&self) -> &TableNode {
        &self.nodes[0]
    }

    pub fn node(&self, index: usize) -> &TableNode {
        &self.nodes[index]
    }

    /// Nodes in depth-first order, root first
    pub fn nodes(&self) -> &[TableNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn separator(&self) -> &str {
        &self.options.separator
    }

    pub fn node_for_alias(&self, alias: &str) -> Option<&TableNode> {
        self.nodes_by_alias.get(alias).map(|&i| &self.nodes[i])
    }

    /// Owning node and real column name of a flat column alias
    ///
    /// Aliases without a separator belong to the root. `None` if the prefix names
    /// no node of this tree.
    pub fn get_node_for_column_alias<'a>(&self, column_alias: &'a str) -> Option<(&TableNode, &'a str)> {
        match split_column_alias(column_alias, &self.options.separator) {
            (None, column) => Some((self.root(), column)),
            (Some(prefix), column) => self.node_for_alias(prefix).map(|node| (node, column)),
        }
    }
}
