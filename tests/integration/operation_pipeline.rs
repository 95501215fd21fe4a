//! Integration tests for the operation pipeline
//!
//! Custom operations record the hooks they see into a shared log, so the tests can
//! check hook order, child operations, executor substitution and error handling.

use lifeguard_graph::test_helpers::{fixture_registry, row, MockExecutor};
use lifeguard_graph::{
    GraphError, Hook, HookSet, Operation, QueryBuilder, QueryResult, Selector,
};
use serde_json::json;
use std::any::Any;
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<String>>>;

/// Records every hook it is called for
#[derive(Clone)]
struct Recorder {
    log: Log,
}

impl Recorder {
    fn push(&self, entry: &str) {
        self.log.lock().unwrap().push(entry.to_string());
    }
}

impl Operation for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn hooks(&self) -> HookSet {
        HookSet::of(&[
            Hook::OnAdd,
            Hook::OnBefore1,
            Hook::OnBefore2,
            Hook::OnBefore3,
            Hook::OnBuild,
            Hook::OnRawResult,
            Hook::OnAfter1,
            Hook::OnAfter2,
            Hook::OnAfter3,
        ])
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

    fn on_add(&mut self, _builder: &mut QueryBuilder) -> Result<bool, GraphError> {
        self.push("on_add");
        Ok(true)
    }

    fn on_before1(&mut self, _builder: &mut QueryBuilder) -> Result<(), GraphError> {
        self.push("on_before1");
        Ok(())
    }

    fn on_before2(&mut self, _builder: &mut QueryBuilder) -> Result<(), GraphError> {
        self.push("on_before2");
        Ok(())
    }

    fn on_before3(&mut self, _builder: &mut QueryBuilder) -> Result<(), GraphError> {
        self.push("on_before3");
        Ok(())
    }

    fn on_build(&mut self, _builder: &mut QueryBuilder) -> Result<(), GraphError> {
        self.push("on_build");
        Ok(())
    }

    fn on_raw_result(&mut self, _builder: &mut QueryBuilder, result: QueryResult) -> Result<QueryResult, GraphError> {
        self.push("on_raw_result");
        Ok(result)
    }

    fn on_after1(&mut self, _builder: &mut QueryBuilder, result: QueryResult) -> Result<QueryResult, GraphError> {
        self.push("on_after1");
        Ok(result)
    }

    fn on_after2(&mut self, _builder: &mut QueryBuilder, result: QueryResult) -> Result<QueryResult, GraphError> {
        self.push("on_after2");
        Ok(result)
    }

    fn on_after3(&mut self, _builder: &mut QueryBuilder, result: QueryResult) -> Result<QueryResult, GraphError> {
        self.push("on_after3");
        Ok(result)
    }
}

/// Offers a fixed recovery value, or translates the error
#[derive(Clone)]
struct Recover {
    translate: bool,
}

impl Operation for Recover {
    fn name(&self) -> &str {
        "recover"
    }

    fn hooks(&self) -> HookSet {
        HookSet::of(&[Hook::OnError])
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

    fn on_error(&self, _builder: &QueryBuilder, error: &GraphError) -> Result<Option<QueryResult>, GraphError> {
        if self.translate {
            return Err(GraphError::Pipeline(format!("translated: {}", error)));
        }
        Ok(Some(QueryResult::Value(json!("recovered"))))
    }
}

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

#[test]
fn test_hooks_run_in_order() {
    let registry = fixture_registry();
    let entries = log();
    let mut query = registry.query("Person").unwrap();
    query.add_operation(Box::new(Recorder { log: entries.clone() }));
    {
        let entries = entries.clone();
        query.run_before(move |_| {
            entries.lock().unwrap().push("before callback".to_string());
            Ok(())
        });
    }
    {
        let entries = entries.clone();
        query.run_after(move |_, result| {
            entries.lock().unwrap().push("after callback".to_string());
            Ok(result)
        });
    }

    query.execute(&MockExecutor::new()).unwrap();
    assert_eq!(
        *entries.lock().unwrap(),
        vec![
            "on_add",
            "on_before1",
            "before callback",
            "on_before2",
            "on_before3",
            "on_build",
            "on_raw_result",
            "on_after1",
            "on_after2",
            "after callback",
            "on_after3",
        ]
    );
}

#[test]
fn test_executing_twice_leaves_template_untouched() {
    let registry = fixture_registry();
    let mut query = registry.query("Person").unwrap();
    query.where_eq("name", "A").with_graph_joined("children");
    let before = format!("{:?}", query);

    let executor = MockExecutor::new();
    query.execute(&executor).unwrap();
    query.execute(&executor).unwrap();

    assert_eq!(format!("{:?}", query), before);
    let queries = executor.queries();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0], queries[1]);
}

#[test]
fn test_eager_children_are_visible_to_selectors() {
    let registry = fixture_registry();
    let mut query = registry.query("Person").unwrap();
    query.with_graph_joined("children");
    assert!(!query.has(&Selector::name("join")));
    assert!(query.has(&Selector::name("eager")));

    // The statement has the joins the eager operation adds while it builds
    let sql = query.to_sql().unwrap();
    assert!(sql.contains("LEFT JOIN"), "{}", sql);
}

#[test]
fn test_delegation_replaces_the_builder() {
    let registry = fixture_registry();
    let mut query = registry.query("Person").unwrap();
    let target = {
        let registry = registry.clone();
        move |_: &QueryBuilder| -> Result<QueryBuilder, GraphError> {
            let mut animals = registry.query("Animal")?;
            animals.where_eq("species", "cat");
            Ok(animals)
        }
    };
    query.delegate_to(target);

    let executor = MockExecutor::new().with_rows(vec![row(json!({"id": 1, "name": "Tom"}))]);
    let result = query.all(&executor).unwrap();
    assert_eq!(result[0].model_name(), "Animal");
    assert!(executor.queries()[0].contains(r#"FROM "animals""#));
}

#[test]
fn test_delegation_chain_is_bounded() {
    let registry = fixture_registry();
    let mut query = registry.query("Person").unwrap();
    query.delegate_to(|builder| Ok(builder.clone()));

    let executor = MockExecutor::new();
    assert!(matches!(query.execute(&executor), Err(GraphError::Pipeline(_))));
    assert!(executor.queries().is_empty());
}

#[test]
fn test_resolve_and_reject_skip_the_executor() {
    let registry = fixture_registry();
    let executor = MockExecutor::new();

    let mut query = registry.query("Person").unwrap();
    query.run_before(|builder| {
        builder.resolve(QueryResult::Value(json!([1, 2])));
        Ok(())
    });
    assert_eq!(query.execute(&executor).unwrap(), QueryResult::Value(json!([1, 2])));

    let mut rejected = registry.query("Person").unwrap();
    rejected.reject(GraphError::Pipeline("no".to_string()));
    assert!(rejected.execute(&executor).is_err());
    assert!(executor.queries().is_empty());
}

#[test]
fn test_execution_errors_reach_on_error() {
    let registry = fixture_registry();

    let mut query = registry.query("Person").unwrap();
    query.add_operation(Box::new(Recover { translate: false }));
    let failing = MockExecutor::new().with_error("connection reset");
    match query.execute(&failing) {
        Err(GraphError::Execution(e)) => assert!(e.to_string().contains("connection reset")),
        other => panic!("expected an execution error, got {:?}", other),
    }

    query.capture_errors(true);
    let failing = MockExecutor::new().with_error("connection reset");
    assert_eq!(query.execute(&failing).unwrap(), QueryResult::Value(json!("recovered")));

    let mut translated = registry.query("Person").unwrap();
    translated.add_operation(Box::new(Recover { translate: true }));
    let failing = MockExecutor::new().with_error("connection reset");
    assert!(matches!(
        translated.execute(&failing),
        Err(GraphError::Pipeline(msg)) if msg.starts_with("translated")
    ));
}

#[test]
fn test_first_unwraps_a_single_model() {
    let registry = fixture_registry();
    let mut query = registry.query("Person").unwrap();
    query.first();
    let executor = MockExecutor::new().with_rows(vec![
        row(json!({"personID": 1})),
        row(json!({"personID": 2})),
    ]);
    match query.execute(&executor).unwrap() {
        QueryResult::Single(Some(model)) => assert_eq!(model.get("personID"), Some(&json!(1))),
        other => panic!("expected one model, got {:?}", other),
    }
    assert!(!executor.queries()[0].contains("LIMIT"));
}

#[test]
fn test_copy_and_clear() {
    let registry = fixture_registry();
    let mut source = registry.query("Person").unwrap();
    source.where_eq("age", 3).limit(2).with_graph_joined("pets");

    let mut target = registry.query("Person").unwrap();
    target.copy_from(&source, &Selector::regex("^(where|eager)$").unwrap());
    assert_eq!(target.operation_count(), 2);
    assert!(target.graph_expression().is_some());

    target.clear(&Selector::name("eager"));
    assert!(target.graph_expression().is_none());
    assert_eq!(target.to_sql().unwrap(), r#"SELECT "persons".* FROM "persons" WHERE "age" = 3"#);
}
