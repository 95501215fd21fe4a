//! Integration tests for joined eager loading
//!
//! Queries are planned against the fixture schema from `test_helpers` and run on a
//! `MockExecutor`, which records the generated SQL and replays canned flat rows
//! shaped like the ones PostgreSQL would return for that SQL.

use lifeguard_graph::relation::eager::{GraphJoinOptions, TableTree};
use lifeguard_graph::test_helpers::{fixture_registry, row, MockExecutor};
use lifeguard_graph::{
    GraphError, JoinKind, ModelDef, ModelRegistry, ModifierRef, Related, RelationDef, RelationExpression,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

#[test]
fn test_person_children_scenario() {
    let registry = fixture_registry();
    let mut query = registry.query("Person").unwrap();
    query.with_graph_joined("children");

    let executor = MockExecutor::new().with_rows(vec![
        row(json!({"personID": 1, "name": "A", "children:personID": 2, "children:name": "B"})),
        row(json!({"personID": 1, "name": "A", "children:personID": 3, "children:name": "C"})),
    ]);
    let people = query.all(&executor).unwrap();

    assert_eq!(people.len(), 1);
    assert_eq!(people[0].get("personID"), Some(&json!(1)));
    let children = people[0].related_many("children");
    let ids: Vec<_> = children.iter().map(|c| c.get("personID").cloned()).collect();
    assert_eq!(ids, vec![Some(json!(2)), Some(json!(3))]);
    assert_eq!(children[0].get("name"), Some(&json!("B")));

    let sql = &executor.queries()[0];
    assert!(sql.contains(r#"LEFT JOIN "persons" AS "children""#), "{}", sql);
}

#[test]
fn test_round_trip_keeps_every_related_row() {
    let registry = fixture_registry();
    let mut query = registry.query("Person").unwrap();
    query.with_graph_joined("pets");

    let k = 5;
    let rows = (0..k)
        .map(|i| row(json!({"personID": 7, "name": "Owner", "pets:id": 100 + i, "pets:name": format!("pet{}", i)})))
        .collect();
    let executor = MockExecutor::new().with_rows(rows);
    let people = query.all(&executor).unwrap();

    assert_eq!(people.len(), 1);
    let pets = people[0].related_many("pets");
    assert_eq!(pets.len(), k);
    let distinct: HashSet<String> = pets.iter().map(|p| p.get("id").unwrap().to_string()).collect();
    assert_eq!(distinct.len(), k);
}

#[test]
fn test_repeated_rows_do_not_duplicate() {
    let registry = fixture_registry();
    let mut query = registry.query("Person").unwrap();
    query.with_graph_joined("children.pets");

    let r = row(json!({
        "personID": 1, "children:personID": 2, "children:pets:id": 9, "children:pets:name": "Rex"
    }));
    let once = query.all(&MockExecutor::new().with_rows(vec![r.clone()])).unwrap();
    let twice = query.all(&MockExecutor::new().with_rows(vec![r.clone(), r])).unwrap();
    assert_eq!(once, twice);
    assert_eq!(twice[0].related_many("children")[0].related_many("pets").len(), 1);
}

#[test]
fn test_null_to_one_is_none() {
    let registry = fixture_registry();
    let mut query = registry.query("Person").unwrap();
    query.with_graph_joined("[parent, pets]");

    let executor = MockExecutor::new().with_rows(vec![row(json!({
        "personID": 1, "name": "A",
        "parent:personID": null, "parent:name": null,
        "pets:id": null, "pets:name": null
    }))]);
    let people = query.all(&executor).unwrap();

    assert_eq!(people[0].related("parent"), Some(&Related::One(None)));
    assert_eq!(people[0].related("pets"), Some(&Related::Many(vec![])));
    let json = people[0].to_json();
    assert!(json["parent"].is_null());
    assert_eq!(json["pets"], json!([]));
}

#[test]
fn test_many_to_many_extras_land_on_related_model() {
    let registry = fixture_registry();
    let mut query = registry.query("Person").unwrap();
    query.with_graph_joined("movies");

    let executor = MockExecutor::new().with_rows(vec![
        row(json!({"personID": 1, "movies:id": 10, "movies:name": "Heat", "movies:role": "lead"})),
        row(json!({"personID": 1, "movies:id": 11, "movies:name": "Ronin", "movies:role": "extra"})),
    ]);
    let people = query.all(&executor).unwrap();
    let movies = people[0].related_many("movies");
    assert_eq!(movies.len(), 2);
    assert_eq!(movies[1].get("role"), Some(&json!("extra")));
}

#[test]
fn test_identifier_guard_fails_before_execution() {
    let registry = fixture_registry();
    let mut query = registry.query("Person").unwrap();
    let options = GraphJoinOptions {
        identifier_max_length: 20,
        ..GraphJoinOptions::from_config(registry.config())
    };
    query.with_graph_joined_opts("children.children.children", options);

    let executor = MockExecutor::new();
    let result = query.execute(&executor);
    assert!(matches!(result, Err(GraphError::IdentifierTooLong { .. })));
    assert!(executor.queries().is_empty());

    // The same plan fits with short aliases
    let mut minimized = registry.query("Person").unwrap();
    minimized.with_graph_joined_opts(
        "children.children.children",
        GraphJoinOptions::from_config(registry.config()).minimize(true),
    );
    assert!(minimized.to_sql().unwrap().contains(r#"AS "_t3""#));
}

#[test]
fn test_aliases_are_unique_per_path() {
    let registry = fixture_registry();
    let person = registry.model("Person").unwrap();
    for expression in ["children.[pets, children.pets]", "[parent.pets, children.parent, movies]", "children.^4"] {
        let parsed = RelationExpression::parse(expression).unwrap();
        let tree = TableTree::create(&registry, &parsed, person.clone(), "persons", &GraphJoinOptions::default()).unwrap();
        let distinct_paths = parsed.paths().iter().filter(|p| !p.contains('^')).count();
        let aliases: HashSet<&str> = tree.nodes().iter().map(|n| n.alias()).collect();
        assert_eq!(aliases.len(), tree.len(), "{}", expression);
        if !expression.contains('^') {
            assert_eq!(tree.len(), distinct_paths + 1, "{}", expression);
        }
    }
}

#[test]
fn test_unknown_relation_fails_at_plan_time() {
    let registry = fixture_registry();
    let mut query = registry.query("Person").unwrap();
    query.with_graph_joined("children.friends");
    let executor = MockExecutor::new();
    assert!(matches!(
        query.execute(&executor),
        Err(GraphError::UnknownRelation { relation, .. }) if relation == "friends"
    ));
    assert!(executor.queries().is_empty());
}

#[test]
fn test_join_operation_and_relation_join_type() {
    let registry = fixture_registry();
    let mut query = registry.query("Person").unwrap();
    query.with_graph_joined_opts(
        "pets",
        GraphJoinOptions::from_config(registry.config()).join_operation(JoinKind::Inner),
    );
    let sql = query.to_sql().unwrap();
    assert!(sql.contains(r#"INNER JOIN "animals" AS "pets""#), "{}", sql);
}

#[test]
fn test_custom_separator_round_trips() {
    let registry = fixture_registry();
    let mut query = registry.query("Person").unwrap();
    query.with_graph_joined_opts("children", GraphJoinOptions::from_config(registry.config()).separator("__"));
    let executor = MockExecutor::new().with_rows(vec![row(json!({
        "personID": 1, "children__personID": 2, "children__name": "B"
    }))]);
    let people = query.all(&executor).unwrap();
    assert!(executor.queries()[0].contains(r#""children"."name" AS "children__name""#));
    assert_eq!(people[0].related_many("children")[0].get("name"), Some(&json!("B")));
}

#[test]
fn test_modifiers_filter_related_rows_and_keep_root_filter() {
    let registry = fixture_registry();
    let mut query = registry.query("Person").unwrap();
    query.where_eq("persons.name", "A").with_graph_joined("pets(dogs)");
    let sql = query.to_sql().unwrap();
    assert!(sql.contains(r#"WHERE "species" = 'dog'"#), "{}", sql);
    assert!(sql.ends_with(r#"WHERE "persons"."name" = 'A'"#), "{}", sql);
}

#[test]
fn test_graph_modifiers_override_model_modifiers() {
    let registry = fixture_registry();
    let mut query = registry.query("Person").unwrap();
    query
        .graph_modifiers(
            "dogs",
            ModifierRef::func(|q| {
                q.where_eq("species", "wolf");
            }),
        )
        .with_graph_joined("pets(dogs)");
    let sql = query.to_sql().unwrap();
    assert!(sql.contains("'wolf'"), "{}", sql);
    assert!(!sql.contains("'dog'"), "{}", sql);
}

#[test]
fn test_result_size_counts_roots_without_joins() {
    let registry = fixture_registry();
    let mut query = registry.query("Person").unwrap();
    query.where_eq("age", 40).with_graph_joined("children").limit(10);

    let executor = MockExecutor::new().with_rows(vec![row(json!({"count": 3}))]);
    assert_eq!(query.result_size(&executor).unwrap(), 3);

    let sql = &executor.queries()[0];
    assert!(sql.starts_with(r#"SELECT COUNT(*) AS "count" FROM (SELECT "persons".* FROM "persons""#), "{}", sql);
    assert!(!sql.contains("JOIN"), "{}", sql);
    assert!(!sql.contains("LIMIT"), "{}", sql);
}

/// Orders keyed by tenant and number, with line items keyed by order and line
fn composite_key_registry() -> Arc<ModelRegistry> {
    let mut registry = ModelRegistry::new();
    registry
        .register(
            ModelDef::new("Order", "orders")
                .id_columns(["tenant_id", "order_no"])
                .columns(["tenant_id", "order_no", "note"])
                .relation(RelationDef::has_many(
                    "items",
                    "LineItem",
                    ["tenant_id", "order_no"],
                    ["tenant_id", "order_no"],
                )),
        )
        .register(
            ModelDef::new("LineItem", "line_items")
                .id_columns(["tenant_id", "order_no", "line_no"])
                .columns(["tenant_id", "order_no", "line_no", "sku"]),
        );
    Arc::new(registry)
}

#[test]
fn test_composite_keys_join_and_dedupe() {
    let registry = composite_key_registry();
    let mut query = registry.query("Order").unwrap();
    query.with_graph_joined("items");

    let sql = query.to_sql().unwrap();
    assert!(
        sql.contains(
            r#"LEFT JOIN "line_items" AS "items" ON "orders"."tenant_id" = "items"."tenant_id" AND "orders"."order_no" = "items"."order_no""#
        ),
        "{}",
        sql
    );

    let item = |tenant: i64, order: i64, note: &str, line: Option<i64>, sku: Option<&str>| {
        row(json!({
            "tenant_id": tenant, "order_no": order, "note": note,
            "items:tenant_id": line.map(|_| tenant), "items:order_no": line.map(|_| order),
            "items:line_no": line, "items:sku": sku,
        }))
    };
    let executor = MockExecutor::new().with_rows(vec![
        item(1, 10, "first", Some(1), Some("x")),
        item(1, 10, "first", Some(2), Some("y")),
        item(1, 10, "first", Some(2), Some("y")),
        item(2, 10, "second", Some(1), Some("z")),
        item(3, 10, "empty", None, None),
    ]);
    let orders = query.all(&executor).unwrap();

    // Same order number under different tenants stays distinct
    assert_eq!(orders.len(), 3);
    let skus = |i: usize| -> Vec<serde_json::Value> {
        orders[i].related_many("items").iter().map(|it| it.get("sku").cloned().unwrap()).collect()
    };
    assert_eq!(skus(0), vec![json!("x"), json!("y")]);
    assert_eq!(skus(1), vec![json!("z")]);
    assert!(skus(2).is_empty());
    assert_eq!(orders[1].get("note"), Some(&json!("second")));
    assert_eq!(orders[1].related_many("items")[0].get("tenant_id"), Some(&json!(2)));
}
