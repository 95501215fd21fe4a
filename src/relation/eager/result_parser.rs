//! Folds flat joined rows back into a model graph.

use super::table_tree::TableTree;
use crate::executor::FlatRow;
use crate::model::{Model, Related};
use std::collections::{HashMap, HashSet};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// One column of the flat result, resolved to its table node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinResultColumn {
    pub column_alias: String,
    /// Index of the owning node in the table tree
    pub node: usize,
    /// Real column name
    pub name: String,
}

enum DraftRelated {
    One(Option<usize>),
    Many(Vec<usize>),
}

struct Draft {
    node: usize,
    fields: FlatRow,
    relations: Vec<(String, DraftRelated)>,
}

/// Parser for the rows of one joined statement
///
/// Rows are deduplicated per node by path: a root model is keyed by its id, a
/// related model by its parent's key, the relation property and its own id. A row
/// with a null id for some node contributes nothing at that node or below it.
pub struct JoinResultParser<'a> {
    tree: &'a TableTree,
    implicit_columns: &'a HashSet<String>,
    omit_implicit_columns: bool,
}

impl<'a> JoinResultParser<'a> {
    pub fn new(tree: &'a TableTree, implicit_columns: &'a HashSet<String>, omit_implicit_columns: bool) -> Self {
        Self {
            tree,
            implicit_columns,
            omit_implicit_columns,
        }
    }

    /// Resolve the column aliases of a row; aliases naming no node are skipped
    pub fn columns(&self, row: &FlatRow) -> Vec<JoinResultColumn> {
        row.keys()
            .filter_map(|alias| match self.tree.get_node_for_column_alias(alias) {
                Some((node, name)) => Some(JoinResultColumn {
                    column_alias: alias.clone(),
                    node: node.index(),
                    name: name.to_string(),
                }),
                None => {
                    log::debug!("ignoring column {} that belongs to no joined table", alias);
                    None
                }
            })
            .collect()
    }

    pub fn parse(&self, rows: &[FlatRow]) -> Vec<Model> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::parse_result_span(rows.len()).entered();

        let Some(first) = rows.first() else {
            return Vec::new();
        };

        let mut columns_by_node: Vec<Vec<JoinResultColumn>> = vec![Vec::new(); self.tree.len()];
        for column in self.columns(first) {
            let node = column.node;
            columns_by_node[node].push(column);
        }

        let mut state = ParseState {
            drafts: Vec::new(),
            keys: HashMap::new(),
            roots: Vec::new(),
        };
        for row in rows {
            self.parse_node(&mut state, &columns_by_node, 0, None, row);
        }

        let mut drafts: Vec<Option<Draft>> = state.drafts.into_iter().map(Some).collect();
        let models: Vec<Model> = state
            .roots
            .iter()
            .filter_map(|&root| self.materialize(&mut drafts, root))
            .collect();

        #[cfg(feature = "metrics")]
        METRICS.record_parse(rows.len(), drafts.len());
        log::debug!(
            "parsed {} rows into {} {} models ({} models in total)",
            rows.len(),
            models.len(),
            self.tree.root().model().name(),
            drafts.len()
        );
        models
    }

    fn parse_node(
        &self,
        state: &mut ParseState,
        columns_by_node: &[Vec<JoinResultColumn>],
        index: usize,
        parent: Option<(usize, &str)>,
        row: &FlatRow,
    ) {
        let node = self.tree.node(index);
        let Some(id) = node.get_id_from_flat_row(row) else {
            return;
        };
        let key = match parent {
            None => format!("/{}", id),
            Some((_, parent_key)) => format!("{}/{}/{}", parent_key, node.property_name(), id),
        };

        let draft = match state.keys.get(&key) {
            Some(&draft) => draft,
            None => {
                let fields = columns_by_node[index]
                    .iter()
                    .filter(|c| !(self.omit_implicit_columns && self.implicit_columns.contains(&c.column_alias)))
                    .map(|c| (c.name.clone(), row.get(&c.column_alias).cloned().unwrap_or_default()))
                    .collect();
                let relations = node
                    .children()
                    .iter()
                    .map(|&child| {
                        let child = self.tree.node(child);
                        let related = match child.relation() {
                            Some(relation) if relation.is_one_to_one() => DraftRelated::One(None),
                            _ => DraftRelated::Many(Vec::new()),
                        };
                        (child.property_name().to_string(), related)
                    })
                    .collect();

                let draft = state.drafts.len();
                state.drafts.push(Draft {
                    node: index,
                    fields,
                    relations,
                });
                state.keys.insert(key.clone(), draft);
                match parent {
                    None => state.roots.push(draft),
                    Some((parent_draft, _)) => state.attach(parent_draft, node.property_name(), draft),
                }
                draft
            }
        };

        for &child in node.children() {
            self.parse_node(state, columns_by_node, child, Some((draft, &key)), row);
        }
    }

    fn materialize(&self, drafts: &mut [Option<Draft>], index: usize) -> Option<Model> {
        let draft = drafts.get_mut(index)?.take()?;
        let mut model = self.tree.node(draft.node).model().instantiate(draft.fields);
        for (property, related) in draft.relations {
            let related = match related {
                DraftRelated::One(child) => {
                    Related::One(child.and_then(|c| self.materialize(drafts, c)).map(Box::new))
                }
                DraftRelated::Many(children) => Related::Many(
                    children
                        .into_iter()
                        .filter_map(|c| self.materialize(drafts, c))
                        .collect(),
                ),
            };
            model.set_related(property, related);
        }
        Some(model)
    }
}

struct ParseState {
    drafts: Vec<Draft>,
    keys: HashMap<String, usize>,
    roots: Vec<usize>,
}

impl ParseState {
    fn attach(&mut self, parent: usize, property: &str, child: usize) {
        let Some((_, related)) = self.drafts[parent]
            .relations
            .iter_mut()
            .find(|(name, _)| name == property)
        else {
            return;
        };
        match related {
            DraftRelated::One(slot) => {
                if slot.is_none() {
                    *slot = Some(child);
                }
            }
            DraftRelated::Many(children) => children.push(child),
        }
    }
}
