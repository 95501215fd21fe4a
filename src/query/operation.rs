//! The `Operation` trait and hook capability flags.
//!
//! A [`QueryBuilder`] is a list of operations. Executing it drives every operation
//! through a fixed hook sequence:
//!
//! ```text
//! on_add -> on_before1 -> run_before callbacks -> on_before2 -> on_before3
//!        -> on_build -> on_build_query -> (execute) -> on_raw_result
//!        -> on_after1 -> on_after2 -> run_after callbacks -> on_after3
//! ```
//!
//! Each operation declares the hooks it implements through [`Operation::hooks`];
//! the builder never calls a hook an operation did not declare.

use crate::error::GraphError;
use crate::query::builder::QueryBuilder;
use crate::query::QueryResult;
use sea_query::SelectStatement;
use std::any::Any;
use std::fmt;

/// A hook an operation can take part in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    OnAdd,
    OnBefore1,
    OnBefore2,
    OnBefore3,
    OnBuild,
    OnBuildQuery,
    OnRawResult,
    OnAfter1,
    OnAfter2,
    OnAfter3,
    OnError,
    QueryExecutor,
}

impl Hook {
    const fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// Set of hooks an operation declares
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct HookSet(u16);

impl HookSet {
    pub const EMPTY: HookSet = HookSet(0);

    pub const fn of(hooks: &[Hook]) -> HookSet {
        let mut bits = 0;
        let mut i = 0;
        while i < hooks.len() {
            bits |= hooks[i].bit();
            i += 1;
        }
        HookSet(bits)
    }

    pub const fn with(self, hook: Hook) -> HookSet {
        HookSet(self.0 | hook.bit())
    }

    pub const fn has(self, hook: Hook) -> bool {
        self.0 & hook.bit() != 0
    }
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const ALL: [Hook; 12] = [
            Hook::OnAdd,
            Hook::OnBefore1,
            Hook::OnBefore2,
            Hook::OnBefore3,
            Hook::OnBuild,
            Hook::OnBuildQuery,
            Hook::OnRawResult,
            Hook::OnAfter1,
            Hook::OnAfter2,
            Hook::OnAfter3,
            Hook::OnError,
            Hook::QueryExecutor,
        ];
        f.debug_set()
            .entries(ALL.iter().filter(|h| self.has(**h)))
            .finish()
    }
}

/// One step of a query
///
/// Every hook has a no-op default; an implementation overrides the hooks it lists
/// in [`hooks`](Self::hooks). While a hook runs, operations it adds to the builder
/// become its children under that hook, and the next call of the same hook removes
/// them first.
pub trait Operation: Send + Sync {
    /// Name used by name and regex selectors
    fn name(&self) -> &str;

    fn hooks(&self) -> HookSet;

    fn clone_box(&self) -> Box<dyn Operation>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Called when the operation is added; returning `false` drops it
    fn on_add(&mut self, _builder: &mut QueryBuilder) -> Result<bool, GraphError> {
        Ok(true)
    }

    fn on_before1(&mut self, _builder: &mut QueryBuilder) -> Result<(), GraphError> {
        Ok(())
    }

    fn on_before2(&mut self, _builder: &mut QueryBuilder) -> Result<(), GraphError> {
        Ok(())
    }

    fn on_before3(&mut self, _builder: &mut QueryBuilder) -> Result<(), GraphError> {
        Ok(())
    }

    /// Plan the query; may add further operations
    fn on_build(&mut self, _builder: &mut QueryBuilder) -> Result<(), GraphError> {
        Ok(())
    }

    /// Apply the operation to the statement being built
    fn on_build_query(&self, _builder: &QueryBuilder, _statement: &mut SelectStatement) -> Result<(), GraphError> {
        Ok(())
    }

    fn on_raw_result(&mut self, _builder: &mut QueryBuilder, result: QueryResult) -> Result<QueryResult, GraphError> {
        Ok(result)
    }

    fn on_after1(&mut self, _builder: &mut QueryBuilder, result: QueryResult) -> Result<QueryResult, GraphError> {
        Ok(result)
    }

    fn on_after2(&mut self, _builder: &mut QueryBuilder, result: QueryResult) -> Result<QueryResult, GraphError> {
        Ok(result)
    }

    fn on_after3(&mut self, _builder: &mut QueryBuilder, result: QueryResult) -> Result<QueryResult, GraphError> {
        Ok(result)
    }

    /// React to an execution error: `Ok(Some(_))` offers a recovery value,
    /// `Err(_)` replaces the error
    fn on_error(&self, _builder: &QueryBuilder, _error: &GraphError) -> Result<Option<QueryResult>, GraphError> {
        Ok(None)
    }

    /// Return the builder that runs instead of this one
    fn query_executor(&self, builder: &QueryBuilder) -> Result<QueryBuilder, GraphError> {
        Ok(builder.clone())
    }
}

impl Clone for Box<dyn Operation> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl fmt::Debug for dyn Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name())
            .field("hooks", &self.hooks())
            .finish()
    }
}
