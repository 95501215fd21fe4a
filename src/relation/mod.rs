//! Relation metadata, relation expressions and join-based eager loading.
//!
//! - **Identity**: single and composite key column lists
//! - **Def**: relation definitions (`RelationDef`, `RelationType`) and join conditions
//! - **Expression**: the relation expression language and its algebra
//! - **Eager**: planning one joined statement for an expression and parsing its rows

// Identity types
pub mod identity;
#[doc(inline)]
pub use identity::Identity;

// Relation definitions
pub mod def;
#[doc(inline)]
pub use def::{join_tbl_on_condition, JoinTableExtra, RelationDef, RelationType, ThroughDef};

// Relation expressions
pub mod expression;
#[doc(inline)]
pub use expression::{ExpressionCache, Recursion, RelationExpression, RelationNode, MAX_RECURSION_DEPTH};

// Joined eager loading
pub mod eager;
#[doc(inline)]
pub use eager::{GraphJoinOptions, JoinResultParser, RelationJoiner, TableNode, TableTree};
