//! RelationDef struct for storing relationship metadata
//!
//! This module provides the `RelationDef` struct which contains all metadata about
//! a relation declared on a model. The joiner turns it into SeaQuery join
//! conditions through [`join_tbl_on_condition`], using table aliases rather than
//! table names so the same table can be joined more than once.

use crate::config::JoinKind;
use crate::error::GraphError;
use crate::model::ModifierRef;
use crate::relation::identity::Identity;
use sea_query::{Alias, Condition, Expr, ExprTrait};

/// Type of relationship between entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationType {
    /// Many-to-one: the owner holds the key (`owner.from_col = related.to_col`)
    BelongsTo,
    /// One-to-one: the related row holds the key
    HasOne,
    /// One-to-many: the related rows hold the key
    HasMany,
    /// Many-to-many through a join table
    ManyToMany,
    /// One-to-one through a join table
    HasOneThrough,
}

impl RelationType {
    pub fn is_through(self) -> bool {
        matches!(self, RelationType::ManyToMany | RelationType::HasOneThrough)
    }
}

/// An extra column read from the join table of a through relation
#[derive(Debug, Clone, PartialEq)]
pub struct JoinTableExtra {
    /// Column name in the join table
    pub column: String,
    /// Property name the value is exposed as on the related model
    pub alias: String,
}

/// Join table of a through relation
///
/// `from_col` references the owner's `RelationDef::from_col`, `to_col` references the
/// related model's `RelationDef::to_col`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThroughDef {
    pub table: String,
    pub from_col: Identity,
    pub to_col: Identity,
    pub extras: Vec<JoinTableExtra>,
}

impl ThroughDef {
    pub fn new(table: impl Into<String>, from_col: impl Into<Identity>, to_col: impl Into<Identity>) -> Self {
        Self {
            table: table.into(),
            from_col: from_col.into(),
            to_col: to_col.into(),
            extras: Vec::new(),
        }
    }

    /// Also read `column` from the join table, exposed as `alias`
    pub fn extra(mut self, column: impl Into<String>, alias: impl Into<String>) -> Self {
        self.extras.push(JoinTableExtra {
            column: column.into(),
            alias: alias.into(),
        });
        self
    }
}

/// Defines a relationship between two models
///
/// # Example
///
/// ```
/// use lifeguard_graph::relation::def::{RelationDef, RelationType, ThroughDef};
///
/// // Person.parentID -> Person.personID, seen from the parent
/// let children = RelationDef::has_many("children", "Person", "personID", "parentID");
/// assert!(!children.is_one_to_one());
///
/// let tags = RelationDef::many_to_many(
///     "tags",
///     "Tag",
///     "id",
///     ThroughDef::new("post_tags", "post_id", "tag_id").extra("weight", "tagWeight"),
///     "id",
/// );
/// assert_eq!(tags.rel_type, RelationType::ManyToMany);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDef {
    /// Relation property name on the owning model
    pub name: String,
    /// Type of relationship
    pub rel_type: RelationType,
    /// Name of the related model in the registry
    pub related_model: String,
    /// Key column(s) on the owning model
    pub from_col: Identity,
    /// Key column(s) on the related model
    pub to_col: Identity,
    /// Join table, for `ManyToMany` and `HasOneThrough`
    pub through: Option<ThroughDef>,
    /// Default modifier applied to the related rows
    pub modify: Option<ModifierRef>,
    /// Join used for this relation instead of the planner default
    pub join_type: Option<JoinKind>,
}

impl RelationDef {
    pub fn new(
        name: impl Into<String>,
        rel_type: RelationType,
        related_model: impl Into<String>,
        from_col: impl Into<Identity>,
        to_col: impl Into<Identity>,
    ) -> Self {
        Self {
            name: name.into(),
            rel_type,
            related_model: related_model.into(),
            from_col: from_col.into(),
            to_col: to_col.into(),
            through: None,
            modify: None,
            join_type: None,
        }
    }

    pub fn belongs_to(
        name: impl Into<String>,
        related_model: impl Into<String>,
        from_col: impl Into<Identity>,
        to_col: impl Into<Identity>,
    ) -> Self {
        Self::new(name, RelationType::BelongsTo, related_model, from_col, to_col)
    }

    pub fn has_one(
        name: impl Into<String>,
        related_model: impl Into<String>,
        from_col: impl Into<Identity>,
        to_col: impl Into<Identity>,
    ) -> Self {
        Self::new(name, RelationType::HasOne, related_model, from_col, to_col)
    }

    pub fn has_many(
        name: impl Into<String>,
        related_model: impl Into<String>,
        from_col: impl Into<Identity>,
        to_col: impl Into<Identity>,
    ) -> Self {
        Self::new(name, RelationType::HasMany, related_model, from_col, to_col)
    }

    pub fn many_to_many(
        name: impl Into<String>,
        related_model: impl Into<String>,
        from_col: impl Into<Identity>,
        through: ThroughDef,
        to_col: impl Into<Identity>,
    ) -> Self {
        let mut rel = Self::new(name, RelationType::ManyToMany, related_model, from_col, to_col);
        rel.through = Some(through);
        rel
    }

    pub fn has_one_through(
        name: impl Into<String>,
        related_model: impl Into<String>,
        from_col: impl Into<Identity>,
        through: ThroughDef,
        to_col: impl Into<Identity>,
    ) -> Self {
        let mut rel = Self::new(name, RelationType::HasOneThrough, related_model, from_col, to_col);
        rel.through = Some(through);
        rel
    }

    pub fn with_modify(mut self, modifier: impl Into<ModifierRef>) -> Self {
        self.modify = Some(modifier.into());
        self
    }

    pub fn with_join_type(mut self, join_type: JoinKind) -> Self {
        self.join_type = Some(join_type);
        self
    }

    /// True if the relation property holds a single model
    pub fn is_one_to_one(&self) -> bool {
        matches!(
            self.rel_type,
            RelationType::BelongsTo | RelationType::HasOne | RelationType::HasOneThrough
        )
    }

    /// Check that the key columns can be paired up into join conditions
    pub fn validate(&self) -> Result<(), GraphError> {
        let unsupported = |reason: String| GraphError::UnsupportedRelation {
            relation: self.name.clone(),
            reason,
        };

        if self.from_col.arity() == 0 {
            return Err(unsupported("relation declares no key columns".to_string()));
        }

        match (&self.through, self.rel_type.is_through()) {
            (None, false) => {
                if self.from_col.arity() != self.to_col.arity() {
                    return Err(unsupported(format!(
                        "owner key has {} columns but related key has {}",
                        self.from_col.arity(),
                        self.to_col.arity()
                    )));
                }
            }
            (Some(through), true) => {
                if self.from_col.arity() != through.from_col.arity()
                    || self.to_col.arity() != through.to_col.arity()
                {
                    return Err(unsupported(format!(
                        "join table {} keys do not match the owner and related keys",
                        through.table
                    )));
                }
            }
            (None, true) => {
                return Err(unsupported(format!("{:?} relation has no join table", self.rel_type)));
            }
            (Some(_), false) => {
                return Err(unsupported(format!("{:?} relation cannot have a join table", self.rel_type)));
            }
        }
        Ok(())
    }
}

/// Build join condition from Identity pairs
///
/// Creates `from_alias.from_col = to_alias.to_col` for every column pair. Both
/// sides are table aliases, so a table joined twice (self relations) stays
/// unambiguous.
///
/// # Errors
///
/// Returns `GraphError::UnsupportedRelation` if the two identities have different arity.
///
/// # Example
///
/// ```
/// use lifeguard_graph::relation::def::join_tbl_on_condition;
/// use lifeguard_graph::relation::identity::Identity;
///
/// let condition = join_tbl_on_condition(
///     "posts",
///     "posts:author",
///     &Identity::from("user_id"),
///     &Identity::from("id"),
/// );
/// assert!(condition.is_ok());
/// ```
pub fn join_tbl_on_condition(
    from_alias: &str,
    to_alias: &str,
    from_col: &Identity,
    to_col: &Identity,
) -> Result<Condition, GraphError> {
    if from_col.arity() != to_col.arity() {
        return Err(GraphError::UnsupportedRelation {
            relation: format!("{} -> {}", from_alias, to_alias),
            reason: "foreign key and primary key must have matching arity".to_string(),
        });
    }

    let mut condition = Condition::all();
    for (fk_col, pk_col) in from_col.iter().zip(to_col.iter()) {
        let expr = Expr::col((Alias::new(from_alias), Alias::new(fk_col)))
            .equals((Alias::new(to_alias), Alias::new(pk_col)));
        condition = condition.add(expr);
    }
    Ok(condition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_query::{PostgresQueryBuilder, Query};

    #[test]
    fn test_relation_type_cardinality() {
        assert!(RelationDef::belongs_to("parent", "Person", "parentID", "personID").is_one_to_one());
        assert!(RelationDef::has_one("profile", "Profile", "id", "user_id").is_one_to_one());
        assert!(!RelationDef::has_many("children", "Person", "personID", "parentID").is_one_to_one());
    }

    #[test]
    fn test_join_condition_renders_aliases() {
        let cond = join_tbl_on_condition(
            "persons",
            "children",
            &Identity::from("personID"),
            &Identity::from("parentID"),
        )
        .unwrap();

        let sql = Query::select()
            .column(sea_query::Asterisk)
            .from(Alias::new("persons"))
            .cond_where(cond)
            .to_string(PostgresQueryBuilder);
        assert!(sql.contains(r#""persons"."personID" = "children"."parentID""#), "{}", sql);
    }

    #[test]
    fn test_join_condition_composite() {
        // Edge case: composite keys produce one equality per column pair
        let cond = join_tbl_on_condition(
            "a",
            "b",
            &Identity::from(["x", "y"]),
            &Identity::from(["x2", "y2"]),
        )
        .unwrap();
        let sql = Query::select()
            .column(sea_query::Asterisk)
            .from(Alias::new("a"))
            .cond_where(cond)
            .to_string(PostgresQueryBuilder);
        assert!(sql.contains(r#""a"."x" = "b"."x2""#));
        assert!(sql.contains(r#""a"."y" = "b"."y2""#));
    }

    #[test]
    fn test_join_condition_arity_mismatch() {
        let result = join_tbl_on_condition("a", "b", &Identity::from(["x", "y"]), &Identity::from("x"));
        assert!(matches!(result, Err(GraphError::UnsupportedRelation { .. })));
    }

    #[test]
    fn test_validate_through_relations() {
        let ok = RelationDef::many_to_many("tags", "Tag", "id", ThroughDef::new("post_tags", "post_id", "tag_id"), "id");
        assert!(ok.validate().is_ok());

        let mut missing = ok.clone();
        missing.through = None;
        assert!(matches!(missing.validate(), Err(GraphError::UnsupportedRelation { relation, .. }) if relation == "tags"));

        let mismatched = RelationDef::has_many("items", "Item", ["a", "b"], "c");
        assert!(mismatched.validate().is_err());
    }
}
