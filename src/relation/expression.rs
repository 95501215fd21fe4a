//! Relation expressions: which relations to eager-load, and how.
//!
//! A [`RelationExpression`] is an immutable tree parsed from strings like
//! `children.[pets, movies(onlyFavourite)]`. Every operation returns a new
//! expression; untouched subtrees are shared through `Arc`.
//!
//! Syntax:
//!
//! | Form | Meaning |
//! |---|---|
//! | `a.b` | `b` of `a` |
//! | `[a, b]` | both `a` and `b` |
//! | `a(m1, m2)` | `a`, with modifiers `m1` and `m2` applied |
//! | `a as b` | `a`, exposed as property `b` |
//! | `a.^` | `a` of `a` of `a` ..., without limit |
//! | `a.^3` | `a` three levels deep |
//! | `a.*` | every relation of `a`, recursively |

mod parser;

use crate::error::GraphError;
use crate::model::{ModelDef, ModifierRef};
use crate::relation::def::RelationDef;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};

/// Deepest `^N` recursion an expression may request
pub const MAX_RECURSION_DEPTH: usize = 64;

/// Recursion marker of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Recursion {
    #[default]
    None,
    /// `^N`: the node repeats N levels deep
    Depth(usize),
    /// `^`: the node repeats without limit
    Unbounded,
}

impl Recursion {
    /// Number of levels the node spans, 0 for a non-recursive node
    pub fn max_depth(self) -> usize {
        match self {
            Recursion::None => 0,
            Recursion::Depth(n) => n,
            Recursion::Unbounded => usize::MAX,
        }
    }

    fn merge(self, other: Recursion) -> Recursion {
        match (self, other) {
            (Recursion::Unbounded, _) | (_, Recursion::Unbounded) => Recursion::Unbounded,
            (Recursion::Depth(a), Recursion::Depth(b)) => Recursion::Depth(a.max(b)),
            (Recursion::None, r) | (r, Recursion::None) => r,
        }
    }
}

/// One node of a relation expression
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RelationNode {
    /// Property name the related models are exposed as; the relation name unless aliased
    pub name: String,
    pub relation_name: String,
    pub modifiers: Vec<ModifierRef>,
    pub recursion: Recursion,
    /// Load every relation of the node's model, recursively. Such nodes have no children.
    pub all_recursive: bool,
    pub children: Vec<Arc<RelationNode>>,
}

impl RelationNode {
    pub fn new(relation_name: impl Into<String>) -> Self {
        let relation_name = relation_name.into();
        Self {
            name: relation_name.clone(),
            relation_name,
            ..Self::default()
        }
    }

    pub fn child(&self, name: &str) -> Option<&Arc<RelationNode>> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Add a child, merging it into an existing child of the same name
    pub(crate) fn insert_child(&mut self, child: RelationNode) {
        match self.children.iter_mut().find(|c| c.name == child.name) {
            Some(existing) => *existing = Arc::new(merge_nodes(existing, &child)),
            None => self.children.push(Arc::new(child)),
        }
    }

    fn add_modifier(&mut self, modifier: &ModifierRef) {
        if !self.modifiers.contains(modifier) {
            self.modifiers.push(modifier.clone());
        }
    }
}

fn merge_nodes(a: &RelationNode, b: &RelationNode) -> RelationNode {
    let mut node = RelationNode {
        name: a.name.clone(),
        relation_name: a.relation_name.clone(),
        modifiers: a.modifiers.clone(),
        recursion: a.recursion.merge(b.recursion),
        all_recursive: a.all_recursive || b.all_recursive,
        children: a.children.clone(),
    };
    for modifier in &b.modifiers {
        node.add_modifier(modifier);
    }
    if node.all_recursive {
        node.children.clear();
        return node;
    }
    for child in &b.children {
        match node.children.iter_mut().find(|c| c.name == child.name) {
            Some(existing) => *existing = Arc::new(merge_nodes(existing, child)),
            None => node.children.push(Arc::clone(child)),
        }
    }
    node
}

/// An immutable relation expression, positioned at some recursion depth of its node
#[derive(Debug, Clone, PartialEq)]
pub struct RelationExpression {
    node: Arc<RelationNode>,
    recursion_depth: usize,
}

impl Default for RelationExpression {
    fn default() -> Self {
        Self::empty()
    }
}

impl RelationExpression {
    /// The expression that loads nothing
    pub fn empty() -> Self {
        Self::from_node(RelationNode::default())
    }

    pub fn from_node(node: RelationNode) -> Self {
        Self {
            node: Arc::new(node),
            recursion_depth: 0,
        }
    }

    /// Parse a relation expression string
    ///
    /// # Errors
    ///
    /// Returns `GraphError::Parse` naming the offending fragment, or
    /// `GraphError::RecursionTooDeep` for `^N` above [`MAX_RECURSION_DEPTH`].
    ///
    /// # Example
    ///
    /// ```
    /// use lifeguard_graph::RelationExpression;
    ///
    /// let expr = RelationExpression::parse("children.[pets, movies]").unwrap();
    /// let children = expr.child_expression("children").unwrap();
    /// assert!(children.child_expression("pets").is_some());
    /// assert!(RelationExpression::parse("children.[pets").is_err());
    /// ```
    pub fn parse(expression: &str) -> Result<Self, GraphError> {
        parser::parse(expression).map(Self::from_node)
    }

    pub fn node(&self) -> &RelationNode {
        &self.node
    }

    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn relation_name(&self) -> &str {
        &self.node.relation_name
    }

    pub fn modifiers(&self) -> &[ModifierRef] {
        &self.node.modifiers
    }

    pub fn recursion_depth(&self) -> usize {
        self.recursion_depth
    }

    pub fn max_recursion_depth(&self) -> usize {
        self.node.recursion.max_depth()
    }

    pub fn is_all_recursive(&self) -> bool {
        self.node.all_recursive
    }

    pub fn is_empty(&self) -> bool {
        !self.node.all_recursive && self.node.children.is_empty()
    }

    /// Union of two expressions
    ///
    /// Nodes present on both sides are merged: children recursively, modifier
    /// lists unioned in order, recursion markers combined.
    pub fn merge(&self, other: &RelationExpression) -> RelationExpression {
        Self::from_node(merge_nodes(&self.node, &other.node))
    }

    /// True if every relation path reachable from `other` is reachable from `self`
    pub fn is_sub_expression(&self, other: &RelationExpression) -> bool {
        if self.node.all_recursive {
            return true;
        }
        if other.node.all_recursive {
            return false;
        }
        if self.node.relation_name != other.node.relation_name {
            return false;
        }

        // A merged node can carry a recursion marker and explicit children at once
        if self.max_recursion_depth() < other.max_recursion_depth() {
            return false;
        }

        other.node.children.iter().all(|child| {
            let sub = RelationExpression {
                node: Arc::clone(child),
                recursion_depth: 0,
            };
            match self.child_expression(&child.name) {
                Some(own) => own.is_sub_expression(&sub),
                None => false,
            }
        })
    }

    /// The sub-expression for the child named `name`
    ///
    /// Recursive and all-recursive nodes answer with themselves, one level deeper.
    pub fn child_expression(&self, name: &str) -> Option<RelationExpression> {
        if self.node.all_recursive {
            let mut node = RelationNode::new(name);
            node.all_recursive = true;
            return Some(RelationExpression {
                node: Arc::new(node),
                recursion_depth: self.recursion_depth + 1,
            });
        }

        let recursing = name == self.node.name
            && self.recursion_depth.saturating_add(1) < self.max_recursion_depth();

        if recursing {
            return Some(RelationExpression {
                node: Arc::clone(&self.node),
                recursion_depth: self.recursion_depth + 1,
            });
        }

        self.node.child(name).map(|child| RelationExpression {
            node: Arc::clone(child),
            recursion_depth: 0,
        })
    }

    /// Invoke `f` for every child expression, with the relation it refers to on `model`
    ///
    /// For an all-recursive node this is every relation `model` declares. For a
    /// recursive node below its depth limit it is the node itself, one level deeper.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::UnknownRelation` if a child names a relation `model`
    /// does not declare, or whatever `f` returns.
    pub fn for_each_child_expression<F>(&self, model: &ModelDef, mut f: F) -> Result<(), GraphError>
    where
        F: FnMut(RelationExpression, &RelationDef) -> Result<(), GraphError>,
    {
        let unknown = |relation: &str| GraphError::UnknownRelation {
            model: model.name().to_string(),
            relation: relation.to_string(),
        };

        if self.node.all_recursive {
            for relation in model.relations() {
                if let Some(child) = self.child_expression(&relation.name) {
                    f(child, relation)?;
                }
            }
            return Ok(());
        }

        let recursing = self.recursion_depth.saturating_add(1) < self.max_recursion_depth();
        if recursing {
            let relation = model
                .get_relation(&self.node.relation_name)
                .ok_or_else(|| unknown(&self.node.relation_name))?;
            if let Some(child) = self.child_expression(&self.node.name) {
                f(child, relation)?;
            }
        }
        for child in &self.node.children {
            // Already visited as the recursion itself
            if recursing && child.name == self.node.name {
                continue;
            }
            let relation = model
                .get_relation(&child.relation_name)
                .ok_or_else(|| unknown(&child.relation_name))?;
            let expr = RelationExpression {
                node: Arc::clone(child),
                recursion_depth: 0,
            };
            f(expr, relation)?;
        }
        Ok(())
    }

    /// Copy of this expression where every node reached by `path` also carries `modifier`
    ///
    /// Paths missing from this expression are ignored.
    pub fn modify_at(&self, path: &RelationExpression, modifier: &ModifierRef) -> RelationExpression {
        fn apply(node: &RelationNode, path: &RelationNode, modifier: &ModifierRef) -> RelationNode {
            let mut node = node.clone();
            for path_child in &path.children {
                if let Some(slot) = node.children.iter_mut().find(|c| c.name == path_child.name) {
                    let mut updated = apply(slot, path_child, modifier);
                    if path_child.children.is_empty() {
                        updated.add_modifier(modifier);
                    }
                    *slot = Arc::new(updated);
                }
            }
            node
        }

        RelationExpression {
            node: Arc::new(apply(&self.node, &path.node, modifier)),
            recursion_depth: self.recursion_depth,
        }
    }

    /// Every node path of the expression, recursion markers included
    ///
    /// `children.^3` yields `children` and `children.^3`; `*` yields `*`.
    pub fn paths(&self) -> BTreeSet<String> {
        fn walk(node: &RelationNode, prefix: &str, out: &mut BTreeSet<String>) {
            let join = |segment: &str| {
                if prefix.is_empty() {
                    segment.to_string()
                } else {
                    format!("{}.{}", prefix, segment)
                }
            };
            if node.all_recursive {
                out.insert(join("*"));
            }
            match node.recursion {
                Recursion::None => {}
                Recursion::Depth(n) => {
                    out.insert(join(&format!("^{}", n)));
                }
                Recursion::Unbounded => {
                    out.insert(join("^"));
                }
            }
            for child in &node.children {
                let path = join(&child.name);
                out.insert(path.clone());
                walk(child, &path, out);
            }
        }

        let mut out = BTreeSet::new();
        walk(&self.node, "", &mut out);
        out
    }
}

impl fmt::Display for RelationExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.node.all_recursive {
            return f.write_str("*");
        }
        f.write_str(&join_entries(child_entries(&self.node)))
    }
}

/// Rendered entries for the children of `node`, one per sibling in a `[...]` list
///
/// A node with both a recursion marker and children renders as two siblings,
/// `a.^3` and `a.[b, c]`, which parse back into the same merged node.
fn child_entries(node: &RelationNode) -> Vec<String> {
    let mut entries = Vec::new();
    for child in &node.children {
        let mut head = child.relation_name.clone();
        let names: Vec<&str> = child.modifiers.iter().filter_map(ModifierRef::name).collect();
        if !names.is_empty() {
            head.push_str(&format!("({})", names.join(", ")));
        }
        if child.name != child.relation_name {
            head.push_str(&format!(" as {}", child.name));
        }

        if child.all_recursive {
            entries.push(format!("{}.*", head));
            continue;
        }
        match child.recursion {
            Recursion::None => {}
            Recursion::Depth(n) => entries.push(format!("{}.^{}", head, n)),
            Recursion::Unbounded => entries.push(format!("{}.^", head)),
        }
        let nested = child_entries(child);
        if !nested.is_empty() {
            entries.push(format!("{}.{}", head, join_entries(nested)));
        } else if child.recursion == Recursion::None {
            entries.push(head);
        }
    }
    entries
}

fn join_entries(entries: Vec<String>) -> String {
    match entries.len() {
        0 => String::new(),
        1 => entries.concat(),
        _ => format!("[{}]", entries.join(", ")),
    }
}

/// Shared cache of parsed expressions, keyed by the expression string
///
/// Owned by a [`ModelRegistry`](crate::ModelRegistry) and shared read-only by
/// every query built from it. Inserts keep the first parse of a string.
#[derive(Debug, Default)]
pub struct ExpressionCache {
    entries: RwLock<HashMap<String, RelationExpression>>,
}

impl ExpressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `expression`, reusing an earlier parse of the same string
    pub fn parse(&self, expression: &str) -> Result<RelationExpression, GraphError> {
        if let Ok(entries) = self.entries.read() {
            if let Some(cached) = entries.get(expression) {
                return Ok(cached.clone());
            }
        }

        let parsed = RelationExpression::parse(expression)?;
        match self.entries.write() {
            Ok(mut entries) => Ok(entries
                .entry(expression.to_string())
                .or_insert(parsed)
                .clone()),
            Err(_) => {
                log::warn!("relation expression cache is poisoned, parsing without it");
                Ok(parsed)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> RelationExpression {
        RelationExpression::parse(s).unwrap()
    }

    #[test]
    fn test_merge_unions_children_and_modifiers() {
        let a = parse("children(byName).pets");
        let b = parse("[children(byAge).movies, parent]");
        let merged = a.merge(&b);

        let children = merged.child_expression("children").unwrap();
        let names: Vec<_> = children.modifiers().iter().filter_map(ModifierRef::name).collect();
        assert_eq!(names, vec!["byName", "byAge"]);
        assert!(children.child_expression("pets").is_some());
        assert!(children.child_expression("movies").is_some());
        assert!(merged.child_expression("parent").is_some());

        // Inputs are untouched
        assert!(a.child_expression("parent").is_none());
    }

    #[test]
    fn test_merge_recursion_flags() {
        assert_eq!(parse("a.^2").merge(&parse("a.^5")), parse("a.^5"));
        assert_eq!(parse("a.^2").merge(&parse("a.^")), parse("a.^"));
        assert_eq!(parse("a").merge(&parse("a.^3")), parse("a.^3"));
        assert!(parse("a").merge(&parse("*")).is_all_recursive());
    }

    #[test]
    fn test_sub_expression() {
        let allowed = parse("[children.[pets, movies], parent]");
        assert!(allowed.is_sub_expression(&parse("children.pets")));
        assert!(allowed.is_sub_expression(&parse("[parent, children]")));
        assert!(!allowed.is_sub_expression(&parse("children.parent")));
        assert!(allowed.is_sub_expression(&RelationExpression::empty()));

        // Recursion depth bounds
        assert!(parse("children.^3").is_sub_expression(&parse("children.^2")));
        assert!(!parse("children.^2").is_sub_expression(&parse("children.^3")));
        assert!(parse("children.^").is_sub_expression(&parse("children.^40")));
    }

    #[test]
    fn test_sub_expression_checks_children_of_recursive_nodes() {
        let allowed = parse("children.^3");
        let eager = parse("children.^3").merge(&parse("children.pets"));
        assert_eq!(eager.child_expression("children").unwrap().max_recursion_depth(), 3);
        assert!(!allowed.is_sub_expression(&eager));

        let wider = parse("[children.^3, children.pets]");
        assert!(wider.is_sub_expression(&eager));
        assert!(allowed.is_sub_expression(&parse("children.children")));
    }

    #[test]
    fn test_display_keeps_children_of_recursive_nodes() {
        let merged = parse("children.^3").merge(&parse("children.pets"));
        assert_eq!(merged.to_string(), "[children.^3, children.pets]");
        let reparsed = parse(&merged.to_string());
        assert_eq!(reparsed, merged);
        assert_eq!(reparsed.paths(), merged.paths());
    }

    #[test]
    fn test_sub_expression_all_recursive() {
        assert!(parse("*").is_sub_expression(&parse("a.b.c")));
        assert!(parse("*").is_sub_expression(&parse("*")));
        assert!(!parse("a.b").is_sub_expression(&parse("*")));
    }

    #[test]
    fn test_child_expression_recursion_budget() {
        let expr = parse("children.^3");
        let level1 = expr.child_expression("children").unwrap();
        let level2 = level1.child_expression("children").unwrap();
        let level3 = level2.child_expression("children").unwrap();
        assert_eq!(level3.recursion_depth(), 2);
        assert!(level3.child_expression("children").is_none());
    }

    #[test]
    fn test_modify_at_adds_modifier_to_path() {
        let expr = parse("children.[pets, movies]");
        let modified = expr.modify_at(&parse("children.pets"), &ModifierRef::named("onlyDogs"));
        let pets = modified
            .child_expression("children")
            .and_then(|c| c.child_expression("pets"))
            .unwrap();
        assert_eq!(pets.modifiers(), &[ModifierRef::named("onlyDogs")]);
        let movies = modified
            .child_expression("children")
            .and_then(|c| c.child_expression("movies"))
            .unwrap();
        assert!(movies.modifiers().is_empty());
    }

    #[test]
    fn test_display_round_trip() {
        for s in [
            "children",
            "[children.pets, parent]",
            "children(byName, byAge).^3",
            "parent as mother.pets",
            "a.*",
            "*",
        ] {
            let expr = parse(s);
            let reparsed = parse(&expr.to_string());
            assert_eq!(expr.paths(), reparsed.paths(), "round trip of {}", s);
        }
        assert_eq!(parse("[a, b.[c, d]]").to_string(), "[a, b.[c, d]]");
    }

    #[test]
    fn test_cache_reuses_parse() {
        let cache = ExpressionCache::new();
        let a = cache.parse("children.pets").unwrap();
        let b = cache.parse("children.pets").unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);
        assert!(cache.parse("children.[").is_err());
        assert_eq!(cache.len(), 1);
    }
}
