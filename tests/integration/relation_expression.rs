//! Integration tests for the relation expression language and its algebra
//!
//! These tests exercise parsing, merging, containment and the expression cache
//! through the public API only.

use lifeguard_graph::relation::expression::ExpressionCache;
use lifeguard_graph::{GraphError, RelationExpression};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

fn parse(expression: &str) -> RelationExpression {
    RelationExpression::parse(expression).unwrap()
}

fn paths(expression: &RelationExpression) -> BTreeSet<String> {
    expression.paths()
}

const SAMPLES: [&str; 6] = [
    "children",
    "children.pets",
    "[children.movies, parent]",
    "pets(dogs)",
    "children.^3",
    "parent.[pets, movies as films]",
];

#[test]
fn test_merge_is_commutative() {
    for a in SAMPLES {
        for b in SAMPLES {
            let (a, b) = (parse(a), parse(b));
            assert_eq!(paths(&a.merge(&b)), paths(&b.merge(&a)), "{} + {}", a, b);
        }
    }
}

#[test]
fn test_merge_is_associative() {
    for a in SAMPLES {
        for b in SAMPLES {
            for c in SAMPLES {
                let (a, b, c) = (parse(a), parse(b), parse(c));
                assert_eq!(
                    paths(&a.merge(&b).merge(&c)),
                    paths(&a.merge(&b.merge(&c))),
                    "{} + {} + {}",
                    a,
                    b,
                    c
                );
            }
        }
    }
}

#[test]
fn test_containment_is_reflexive_and_antisymmetric() {
    for a in SAMPLES {
        let a = parse(a);
        assert!(a.is_sub_expression(&a), "{}", a);
        for b in SAMPLES {
            let b = parse(b);
            if a.is_sub_expression(&b) && paths(&a) != paths(&b) {
                assert!(!b.is_sub_expression(&a), "{} and {}", a, b);
            }
        }
    }
}

#[test]
fn test_merge_contains_both_sides() {
    let a = parse("children.pets");
    let b = parse("[parent, movies]");
    let merged = a.merge(&b);
    assert!(merged.is_sub_expression(&a));
    assert!(merged.is_sub_expression(&b));
    assert!(!a.is_sub_expression(&merged));
}

#[test]
fn test_all_recursive_containment() {
    let everything = parse("*");
    assert!(everything.is_sub_expression(&parse("children.pets.[a, b]")));
    assert!(!parse("children").is_sub_expression(&everything));
    assert!(everything.is_sub_expression(&everything));
}

#[test]
fn test_recursion_containment_compares_depth() {
    assert!(parse("children.^5").is_sub_expression(&parse("children.^3")));
    assert!(!parse("children.^2").is_sub_expression(&parse("children.^3")));
    assert!(parse("children.^").is_sub_expression(&parse("children.^30")));
}

#[test]
fn test_display_round_trips() {
    for sample in SAMPLES {
        let expression = parse(sample);
        let reparsed = parse(&expression.to_string());
        assert_eq!(paths(&expression), paths(&reparsed), "{}", sample);
    }
}

#[test]
fn test_display_round_trips_merged_expressions() {
    for a in SAMPLES {
        for b in SAMPLES {
            let merged = parse(a).merge(&parse(b));
            let reparsed = parse(&merged.to_string());
            assert_eq!(paths(&merged), paths(&reparsed), "{}", merged);
        }
    }
}

#[test]
fn test_deep_nesting_is_a_parse_error() {
    let depth = 200_000;
    let expression = format!("{}a{}", "[".repeat(depth), "]".repeat(depth));
    assert!(matches!(
        RelationExpression::parse(&expression),
        Err(GraphError::Parse { .. })
    ));

    let dotted = vec!["a"; 100_000].join(".");
    assert!(matches!(
        RelationExpression::parse(&dotted),
        Err(GraphError::Parse { .. })
    ));
}

#[test]
fn test_parse_errors_name_the_fragment() {
    match RelationExpression::parse("children.[pets,, movies]") {
        Err(GraphError::Parse { expression, fragment, .. }) => {
            assert_eq!(expression, "children.[pets,, movies]");
            assert!(fragment.starts_with(','), "{}", fragment);
        }
        other => panic!("expected a parse error, got {:?}", other),
    }
    assert!(matches!(
        RelationExpression::parse("children.^65"),
        Err(GraphError::RecursionTooDeep { limit: 64, .. })
    ));
    assert!(RelationExpression::parse("children.^0").is_err());
    assert!(RelationExpression::parse("children.[^, pets]").is_err());
}

#[test]
fn test_empty_expressions() {
    assert!(parse("").is_empty());
    assert!(parse("[]").is_empty());
    assert!(paths(&parse("")).is_empty());
}

#[test]
fn test_cache_is_shared_across_threads() {
    let cache = Arc::new(ExpressionCache::new());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for sample in SAMPLES {
                    cache.parse(sample).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(cache.len(), SAMPLES.len());
    assert_eq!(cache.parse("children.pets").unwrap(), parse("children.pets"));
}
