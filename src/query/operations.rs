//! Built-in query operations.
//!
//! Each type here is one `QueryBuilder` method turned into an [`Operation`]:
//! the builder records it, and `on_build_query` applies it to the SeaQuery
//! statement when the query is built.

use crate::error::GraphError;
use crate::query::builder::QueryBuilder;
use crate::query::operation::{Hook, HookSet, Operation};
use crate::query::QueryResult;
use sea_query::{Alias, Asterisk, Condition, Expr, JoinType, Order, SelectStatement};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

macro_rules! operation_common {
    ($name:expr, $hooks:expr) => {
        fn name(&self) -> &str {
            $name
        }

        fn hooks(&self) -> HookSet {
            $hooks
        }

        fn clone_box(&self) -> Box<dyn Operation> {
            Box::new(self.clone())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    };
}

pub(crate) use operation_common;

/// A column reference in `[table.]column [as alias]` form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub table: Option<String>,
    pub column: String,
    pub alias: Option<String>,
}

impl Selection {
    pub fn new(table: Option<&str>, column: impl Into<String>, alias: Option<&str>) -> Self {
        Self {
            table: table.map(str::to_string),
            column: column.into(),
            alias: alias.map(str::to_string),
        }
    }

    /// Parse `column`, `table.column`, `column as alias` or `table.column as alias`
    pub fn parse(selection: &str) -> Self {
        let selection = selection.trim();
        let lower = selection.to_ascii_lowercase();
        let (reference, alias) = match lower.find(" as ") {
            Some(pos) => (
                selection[..pos].trim(),
                Some(selection[pos + 4..].trim().to_string()),
            ),
            None => (selection, None),
        };
        let (table, column) = match reference.rfind('.') {
            Some(pos) => (Some(reference[..pos].to_string()), reference[pos + 1..].to_string()),
            None => (None, reference.to_string()),
        };
        Self { table, column, alias }
    }

    pub fn is_all(&self) -> bool {
        self.column == "*"
    }

    /// Name of the column in the statement's output
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.column)
    }

    fn column_expr(&self) -> Expr {
        match &self.table {
            Some(table) => Expr::col((Alias::new(table), Alias::new(&self.column))),
            None => Expr::col(Alias::new(&self.column)),
        }
    }

    fn apply(&self, statement: &mut SelectStatement) {
        match (&self.table, self.is_all(), &self.alias) {
            (None, true, _) => {
                statement.column(Asterisk);
            }
            (Some(table), true, _) => {
                statement.column((Alias::new(table), Asterisk));
            }
            (_, false, Some(alias)) => {
                statement.expr_as(self.column_expr(), Alias::new(alias));
            }
            (Some(table), false, None) => {
                statement.column((Alias::new(table), Alias::new(&self.column)));
            }
            (None, false, None) => {
                statement.column(Alias::new(&self.column));
            }
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(table) = &self.table {
            write!(f, "{}.", table)?;
        }
        f.write_str(&self.column)?;
        if let Some(alias) = &self.alias {
            write!(f, " as {}", alias)?;
        }
        Ok(())
    }
}

/// Expression for a possibly table-qualified column name
pub(crate) fn column_expr(column: &str) -> Expr {
    Selection::parse(column).column_expr()
}

#[derive(Debug, Clone)]
pub struct SelectOperation {
    pub selections: Vec<Selection>,
}

impl Operation for SelectOperation {
    operation_common!("select", HookSet::of(&[Hook::OnBuildQuery]));

    fn on_build_query(&self, _builder: &QueryBuilder, statement: &mut SelectStatement) -> Result<(), GraphError> {
        for selection in &self.selections {
            selection.apply(statement);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct WhereOperation {
    pub condition: Condition,
}

impl Operation for WhereOperation {
    operation_common!("where", HookSet::of(&[Hook::OnBuildQuery]));

    fn on_build_query(&self, _builder: &QueryBuilder, statement: &mut SelectStatement) -> Result<(), GraphError> {
        statement.cond_where(self.condition.clone());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct OrderByOperation {
    pub column: String,
    pub order: Order,
}

impl Operation for OrderByOperation {
    operation_common!("orderBy", HookSet::of(&[Hook::OnBuildQuery]));

    fn on_build_query(&self, _builder: &QueryBuilder, statement: &mut SelectStatement) -> Result<(), GraphError> {
        statement.order_by_expr(column_expr(&self.column), self.order.clone());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LimitOperation {
    pub limit: u64,
}

impl Operation for LimitOperation {
    operation_common!("limit", HookSet::of(&[Hook::OnBuildQuery]));

    fn on_build_query(&self, _builder: &QueryBuilder, statement: &mut SelectStatement) -> Result<(), GraphError> {
        statement.limit(self.limit);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct OffsetOperation {
    pub offset: u64,
}

impl Operation for OffsetOperation {
    operation_common!("offset", HookSet::of(&[Hook::OnBuildQuery]));

    fn on_build_query(&self, _builder: &QueryBuilder, statement: &mut SelectStatement) -> Result<(), GraphError> {
        statement.offset(self.offset);
        Ok(())
    }
}

/// What a join attaches: a table or a derived table
#[derive(Debug, Clone)]
pub enum JoinTarget {
    Table { table: String, alias: String },
    SubQuery { query: Box<SelectStatement>, alias: String },
}

impl JoinTarget {
    pub fn alias(&self) -> &str {
        match self {
            JoinTarget::Table { alias, .. } | JoinTarget::SubQuery { alias, .. } => alias,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JoinOperation {
    pub kind: JoinType,
    pub target: JoinTarget,
    pub on: Condition,
}

impl Operation for JoinOperation {
    operation_common!("join", HookSet::of(&[Hook::OnBuildQuery]));

    fn on_build_query(&self, _builder: &QueryBuilder, statement: &mut SelectStatement) -> Result<(), GraphError> {
        match &self.target {
            JoinTarget::Table { table, alias } => {
                statement.join_as(self.kind, Alias::new(table), Alias::new(alias), self.on.clone());
            }
            JoinTarget::SubQuery { query, alias } => {
                statement.join_subquery(self.kind, query.as_ref().clone(), Alias::new(alias), self.on.clone());
            }
        }
        Ok(())
    }
}

/// Unwraps the result to its first model
#[derive(Debug, Clone)]
pub struct FirstOperation;

impl Operation for FirstOperation {
    operation_common!("first", HookSet::of(&[Hook::OnAfter3]));

    fn on_after3(&mut self, _builder: &mut QueryBuilder, result: QueryResult) -> Result<QueryResult, GraphError> {
        Ok(match result {
            QueryResult::Models(models) => QueryResult::Single(models.into_iter().next()),
            other => other,
        })
    }
}

pub type DelegateFn = Arc<dyn Fn(&QueryBuilder) -> Result<QueryBuilder, GraphError> + Send + Sync>;

/// Runs another builder in place of the one it is added to
#[derive(Clone)]
pub struct DelegateOperation {
    pub delegate: DelegateFn,
}

impl fmt::Debug for DelegateOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DelegateOperation")
    }
}

impl Operation for DelegateOperation {
    operation_common!("delegate", HookSet::of(&[Hook::QueryExecutor]));

    fn query_executor(&self, builder: &QueryBuilder) -> Result<QueryBuilder, GraphError> {
        (self.delegate)(builder)
    }
}
