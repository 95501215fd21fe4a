//! Joined eager loading on a `QueryBuilder`.
//!
//! `with_graph_joined` adds one [`JoinEagerOperation`]; repeated calls merge
//! their expressions into it. During `on_build` the operation plans the join tree
//! with a [`RelationJoiner`] and adds the resulting joins and select list as its
//! child operations. During `on_raw_result` it folds the flat rows into nested
//! models.

use crate::error::GraphError;
use crate::model::ModifierRef;
use crate::query::builder::QueryBuilder;
use crate::query::operation::{Hook, HookSet, Operation};
use crate::query::operations::operation_common;
use crate::query::QueryResult;
use crate::relation::eager::{GraphJoinOptions, RelationJoiner};
use crate::relation::expression::RelationExpression;
use std::any::Any;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Loads a relation expression with joins in the root statement
#[derive(Debug, Clone)]
pub struct JoinEagerOperation {
    pub expression: RelationExpression,
    pub options: GraphJoinOptions,
    joiner: Option<RelationJoiner>,
}

impl JoinEagerOperation {
    pub fn new(expression: RelationExpression, options: GraphJoinOptions) -> Self {
        Self {
            expression,
            options,
            joiner: None,
        }
    }

    /// The joiner of the last `on_build`, if the operation was built
    pub fn joiner(&self) -> Option<&RelationJoiner> {
        self.joiner.as_ref()
    }
}

impl Operation for JoinEagerOperation {
    operation_common!("eager", HookSet::of(&[Hook::OnBuild, Hook::OnRawResult]));

    fn on_build(&mut self, builder: &mut QueryBuilder) -> Result<(), GraphError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::plan_graph_span(&self.expression.to_string(), builder.model().name()).entered();

        let mut expression = self.expression.clone();
        for (path, modifier) in &builder.graph_modifiers_at_path {
            expression = expression.modify_at(path, modifier);
        }

        let mut joiner = RelationJoiner::new(Arc::clone(builder.model()), expression, self.options.clone());
        joiner.set_modifiers(builder.graph_modifiers.clone());
        joiner.fetch_column_info(builder)?;
        joiner.build(builder)?;
        self.joiner = Some(joiner);
        Ok(())
    }

    fn on_raw_result(&mut self, _builder: &mut QueryBuilder, result: QueryResult) -> Result<QueryResult, GraphError> {
        match (result, &self.joiner) {
            (QueryResult::Rows(rows), Some(joiner)) => Ok(QueryResult::Models(joiner.parse_result(&rows)?)),
            (result, _) => Ok(result),
        }
    }
}

/// Restricts the eager expression a query may load
#[derive(Debug, Clone)]
pub struct AllowGraphOperation {
    pub expression: RelationExpression,
}

impl Operation for AllowGraphOperation {
    operation_common!("allowGraph", HookSet::of(&[Hook::OnBuild]));

    fn on_build(&mut self, builder: &mut QueryBuilder) -> Result<(), GraphError> {
        match builder.graph_expression() {
            Some(eager) if !self.expression.is_sub_expression(&eager) => Err(GraphError::NotAllowed {
                expression: eager.to_string(),
                allowed: self.expression.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

impl QueryBuilder {
    /// Eagerly load `expression` with joins, using the registry's join options
    ///
    /// A malformed expression rejects the query; the error surfaces when it runs.
    pub fn with_graph_joined(&mut self, expression: &str) -> &mut Self {
        let options = GraphJoinOptions::from_config(self.registry().config());
        self.with_graph_joined_opts(expression, options)
    }

    pub fn with_graph_joined_opts(&mut self, expression: &str, options: GraphJoinOptions) -> &mut Self {
        match self.registry().expression_cache().parse(expression) {
            Ok(parsed) => self.with_graph_joined_expr(parsed, options),
            Err(err) => self.reject(err),
        }
    }

    /// Merge an already parsed expression into the eager expression
    pub fn with_graph_joined_expr(&mut self, expression: RelationExpression, options: GraphJoinOptions) -> &mut Self {
        match self.find_operation_mut::<JoinEagerOperation>() {
            Some(existing) => {
                existing.expression = existing.expression.merge(&expression);
                existing.options = options;
            }
            None => {
                self.add_operation(Box::new(JoinEagerOperation::new(expression, options)));
            }
        }
        self.check_allowed_graph()
    }

    /// Only allow eager expressions contained in `expression`; repeated calls widen it
    pub fn allow_graph(&mut self, expression: &str) -> &mut Self {
        let parsed = match self.registry().expression_cache().parse(expression) {
            Ok(parsed) => parsed,
            Err(err) => return self.reject(err),
        };
        match self.find_operation_mut::<AllowGraphOperation>() {
            Some(existing) => existing.expression = existing.expression.merge(&parsed),
            None => {
                self.add_operation(Box::new(AllowGraphOperation { expression: parsed }));
            }
        }
        self.check_allowed_graph()
    }

    /// Apply `modifier` to every relation `path` reaches in the eager expression
    pub fn modify_graph(&mut self, path: &str, modifier: impl Into<ModifierRef>) -> &mut Self {
        match self.registry().expression_cache().parse(path) {
            Ok(parsed) => self.graph_modifiers_at_path.push((parsed, modifier.into())),
            Err(err) => {
                self.reject(err);
            }
        }
        self
    }

    /// Define a named modifier that expressions can reference as `relation(name)`;
    /// takes precedence over the models' own modifiers
    pub fn graph_modifiers(&mut self, name: impl Into<String>, modifier: impl Into<ModifierRef>) -> &mut Self {
        self.graph_modifiers.insert(name.into(), modifier.into());
        self
    }

    /// The merged eager expression, `None` without `with_graph_joined`
    pub fn graph_expression(&self) -> Option<RelationExpression> {
        self.find_operation_of::<JoinEagerOperation>()
            .map(|op| op.expression.clone())
    }

    pub fn allowed_graph_expression(&self) -> Option<RelationExpression> {
        self.find_operation_of::<AllowGraphOperation>()
            .map(|op| op.expression.clone())
    }

    /// Reject early once both an eager and an allowed expression exist and disagree
    fn check_allowed_graph(&mut self) -> &mut Self {
        if let (Some(eager), Some(allowed)) = (self.graph_expression(), self.allowed_graph_expression()) {
            if !allowed.is_sub_expression(&eager) {
                log::debug!("relation expression {} rejected, allowed: {}", eager, allowed);
                return self.reject(GraphError::NotAllowed {
                    expression: eager.to_string(),
                    allowed: allowed.to_string(),
                });
            }
        }
        self
    }
}
