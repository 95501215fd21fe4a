//! Join-based eager loading.
//!
//! Loads a model and a relation expression's worth of related models with one
//! joined statement:
//!
//! 1. [`TableTree`] binds every relation path of the expression to one table
//!    occurrence with a unique alias.
//! 2. [`RelationJoiner`] turns the tree into join operations and a flat select
//!    list on the root query.
//! 3. [`JoinResultParser`] folds the flat rows back into nested [`Model`](crate::Model)s.

pub mod joiner;
pub mod result_parser;
pub mod table_tree;

pub use joiner::RelationJoiner;
pub use result_parser::{JoinResultColumn, JoinResultParser};
pub use table_tree::{TableNode, TableTree};

use crate::config::{GraphConfig, JoinKind};
use std::collections::HashMap;

/// Planner options for one `with_graph_joined` call
///
/// Starts from the registry's [`GraphConfig`]; `aliases` maps a relation's
/// property name to the table alias used for it instead of the name itself.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphJoinOptions {
    pub separator: String,
    pub aliases: HashMap<String, String>,
    pub minimize: bool,
    pub join_operation: JoinKind,
    pub identifier_max_length: usize,
    pub max_recursion_depth: usize,
}

impl Default for GraphJoinOptions {
    fn default() -> Self {
        Self::from_config(&GraphConfig::default())
    }
}

impl GraphJoinOptions {
    pub fn from_config(config: &GraphConfig) -> Self {
        Self {
            separator: config.separator.clone(),
            aliases: HashMap::new(),
            minimize: config.minimize,
            join_operation: config.join_operation,
            identifier_max_length: config.identifier_max_length,
            max_recursion_depth: config.max_recursion_depth,
        }
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn alias(mut self, relation: impl Into<String>, alias: impl Into<String>) -> Self {
        self.aliases.insert(relation.into(), alias.into());
        self
    }

    pub fn minimize(mut self, minimize: bool) -> Self {
        self.minimize = minimize;
        self
    }

    pub fn join_operation(mut self, join_operation: JoinKind) -> Self {
        self.join_operation = join_operation;
        self
    }
}
