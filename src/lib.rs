//! # Lifeguard Graph
//!
//! Relation-graph eager loading for PostgreSQL: a relation expression such as
//! `children.[pets, movies]` becomes one joined SELECT, and its flat rows come
//! back as a nested model graph.
//!
//! Queries are built from [`Operation`]s on a [`QueryBuilder`]; statements are
//! built with SeaQuery and run through a [`LifeExecutor`], with
//! [`MayPostgresExecutor`] for coroutine-based `may_postgres` clients.
//!
//! See [README on GitHub](https://github.com/microscaler/lifeguard) for the
//! surrounding ORM.

pub mod config;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod model;
pub mod query;
pub mod relation;
pub mod test_helpers;

pub use config::{GraphConfig, JoinKind};
pub use error::GraphError;
pub use executor::{FlatRow, LifeError, LifeExecutor, MayPostgresExecutor};
pub use model::{Model, ModelDef, ModelRegistry, Modifier, ModifierRef, Related};
pub use query::{Hook, HookSet, Operation, QueryBuilder, QueryResult, Selection, Selector};
pub use relation::{
    GraphJoinOptions, Identity, RelationDef, RelationExpression, RelationType, ThroughDef,
};
