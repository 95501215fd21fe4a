//! Error types for relation-graph planning and execution.
//!
//! Every variant except `Execution` is raised while the query is being planned,
//! i.e. before anything reaches the [`LifeExecutor`](crate::executor::LifeExecutor).

use crate::executor::LifeError;
use std::fmt;
use std::sync::Arc;

/// Errors produced by the eager-loading engine and the operation pipeline
#[derive(Debug, Clone)]
pub enum GraphError {
    /// Malformed relation expression
    Parse {
        expression: String,
        position: usize,
        fragment: String,
        message: String,
    },
    /// A relation expression references a relation the model does not declare
    UnknownRelation { model: String, relation: String },
    /// A model name that is not present in the registry
    UnknownModel(String),
    /// Recursion in a relation expression goes deeper than the hard cap
    RecursionTooDeep { expression: String, limit: usize },
    /// The eager expression is not contained in the allowed expression
    NotAllowed { expression: String, allowed: String },
    /// A table or column alias is longer than the identifier ceiling
    IdentifierTooLong { identifier: String, model: String, limit: usize },
    /// A relation whose metadata the joiner cannot turn into joins
    UnsupportedRelation { relation: String, reason: String },
    /// A modifier name that resolves to nothing
    UnknownModifier { modifier: String, relation: String },
    /// Two table nodes of one join plan computed the same alias
    AliasCollision { alias: String },
    /// Operation pipeline misuse (e.g. a non-terminating executor chain)
    Pipeline(String),
    /// Error surfaced by the SQL collaborator
    Execution(Arc<LifeError>),
}

impl GraphError {
    /// True for errors raised before any statement was executed
    pub fn is_planning_error(&self) -> bool {
        !matches!(self, GraphError::Execution(_))
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::Parse {
                expression,
                position,
                fragment,
                message,
            } => write!(
                f,
                "Invalid relation expression \"{}\": {} at position {} near \"{}\"",
                expression, message, position, fragment
            ),
            GraphError::UnknownRelation { model, relation } => {
                write!(f, "Unknown relation \"{}\" in a relation expression for model {}", relation, model)
            }
            GraphError::UnknownModel(name) => write!(f, "Unknown model: {}", name),
            GraphError::RecursionTooDeep { expression, limit } => write!(
                f,
                "Recursion depth of relation expression \"{}\" exceeds the limit of {}",
                expression, limit
            ),
            GraphError::NotAllowed { expression, allowed } => write!(
                f,
                "Relation expression \"{}\" is not allowed (allowed: \"{}\")",
                expression, allowed
            ),
            GraphError::IdentifierTooLong {
                identifier,
                model,
                limit,
            } => write!(
                f,
                "Identifier \"{}\" for model {} is over {} characters long and would be truncated by the database engine; use the `minimize` join option",
                identifier, model, limit
            ),
            GraphError::UnsupportedRelation { relation, reason } => {
                write!(f, "Relation \"{}\" cannot be joined: {}", relation, reason)
            }
            GraphError::UnknownModifier { modifier, relation } => write!(
                f,
                "Could not find modifier \"{}\" for relation \"{}\"",
                modifier, relation
            ),
            GraphError::AliasCollision { alias } => {
                write!(f, "Table alias \"{}\" is used by more than one relation in the join", alias)
            }
            GraphError::Pipeline(msg) => write!(f, "Query pipeline error: {}", msg),
            GraphError::Execution(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for GraphError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GraphError::Execution(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<LifeError> for GraphError {
    fn from(err: LifeError) -> Self {
        GraphError::Execution(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_names_fragment() {
        let err = GraphError::Parse {
            expression: "a.[b".to_string(),
            position: 4,
            fragment: "".to_string(),
            message: "expected ']'".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("a.[b"));
        assert!(display.contains("position 4"));
    }

    #[test]
    fn test_identifier_error_names_alias() {
        let err = GraphError::IdentifierTooLong {
            identifier: "owner:pets:toys:name".to_string(),
            model: "Toy".to_string(),
            limit: 63,
        };
        assert!(err.to_string().contains("owner:pets:toys:name"));
        assert!(err.is_planning_error());
    }

    #[test]
    fn test_execution_error_wraps_life_error() {
        let err: GraphError = LifeError::QueryError("boom".to_string()).into();
        assert!(!err.is_planning_error());
        assert!(err.to_string().contains("boom"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
