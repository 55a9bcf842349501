//! End-to-end scenarios against the public `Environment` API: a positive
//! join, negation unblocking, logical support, salience ordering, modify
//! preserving fact identity, and duplicate suppression.

use rete_core::{CondElement, ConflictStrategy, Environment, FieldTest, Rule};
use std::collections::HashMap;
use std::sync::Arc;
use template_registry::{SlotDef, Template};

fn slots(pairs: &[(&str, serde_json::Value)]) -> HashMap<String, serde_json::Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[test]
fn positive_single_join_fires_once_for_the_matching_pair() {
    let mut env = Environment::new();
    env.deftemplate(Template::new("p", vec![SlotDef::unconstrained("x")]));
    env.deftemplate(Template::new("q", vec![SlotDef::unconstrained("x")]));
    env.deftemplate(Template::new("pair", vec![SlotDef::unconstrained("v")]));

    env.defrule(Rule::new(
        "R",
        "MAIN",
        0,
        vec![
            CondElement::positive("p", vec![FieldTest::Bind { slot: "x".into(), var: "v".into() }]),
            CondElement::positive("q", vec![FieldTest::BindEq { slot: "x".into(), var: "v".into() }]),
        ],
        Arc::new(|bindings, env| {
            let v = bindings["v"].to_json(&env.atoms);
            env.assert_fact("pair", slots(&[("v", v)]), false)?;
            Ok(())
        }),
    ))
    .unwrap();

    env.assert_fact("p", slots(&[("x", serde_json::json!(1))]), false).unwrap();
    env.assert_fact("p", slots(&[("x", serde_json::json!(2))]), false).unwrap();
    env.assert_fact("q", slots(&[("x", serde_json::json!(2))]), false).unwrap();

    let fired = env.run(-1).unwrap();
    assert_eq!(fired, 1);

    let pairs: Vec<_> = env.facts_iter().filter(|f| f.template == "pair").collect();
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].slots[0].to_json(&env.atoms), serde_json::json!(2));
}

#[test]
fn negation_unblocks_when_the_blocking_fact_is_retracted() {
    let mut env = Environment::new();
    env.deftemplate(Template::new("p", vec![SlotDef::unconstrained("x")]));
    env.deftemplate(Template::new("q", vec![SlotDef::unconstrained("x")]));
    env.deftemplate(Template::new("lonely", vec![SlotDef::unconstrained("v")]));

    env.defrule(Rule::new(
        "R",
        "MAIN",
        0,
        vec![
            CondElement::positive("p", vec![FieldTest::Bind { slot: "x".into(), var: "v".into() }]),
            CondElement::not("q", vec![FieldTest::BindEq { slot: "x".into(), var: "v".into() }]),
        ],
        Arc::new(|bindings, env| {
            let v = bindings["v"].to_json(&env.atoms);
            env.assert_fact("lonely", slots(&[("v", v)]), false)?;
            Ok(())
        }),
    ))
    .unwrap();

    env.assert_fact("p", slots(&[("x", serde_json::json!(7))]), false).unwrap();
    assert_eq!(env.run(-1).unwrap(), 1);
    assert_eq!(env.facts_iter().filter(|f| f.template == "lonely").count(), 1);

    let q = env
        .assert_fact("q", slots(&[("x", serde_json::json!(7))]), false)
        .unwrap()
        .unwrap();
    assert_eq!(env.run(-1).unwrap(), 0, "R's only activation is blocked by q");
    assert_eq!(env.facts_iter().filter(|f| f.template == "lonely").count(), 1);

    env.retract(q).unwrap();
    assert_eq!(env.run(-1).unwrap(), 1, "retracting q unblocks R again");
    assert_eq!(env.facts_iter().filter(|f| f.template == "lonely").count(), 2);
}

#[test]
fn logical_support_retracts_the_dependent_fact_when_its_basis_is_retracted() {
    let mut env = Environment::new();
    env.deftemplate(Template::new("a", vec![]));
    env.deftemplate(Template::new("b", vec![]));

    env.defrule(Rule::new(
        "R",
        "MAIN",
        0,
        vec![CondElement::positive("a", vec![])],
        Arc::new(|_bindings, env| {
            env.assert_fact("b", HashMap::new(), true)?;
            Ok(())
        }),
    ))
    .unwrap();

    let a = env.assert_fact("a", HashMap::new(), false).unwrap().unwrap();
    env.run(-1).unwrap();
    assert!(env.facts_iter().any(|f| f.template == "b"));

    env.retract(a).unwrap();
    assert!(!env.facts_iter().any(|f| f.template == "b"));
}

#[test]
fn salience_orders_the_agenda_ahead_of_declaration_order() {
    let mut env = Environment::new();
    env.set_strategy(ConflictStrategy::Depth);
    env.deftemplate(Template::new("t", vec![]));
    env.deftemplate(Template::new("h", vec![]));
    env.deftemplate(Template::new("l", vec![]));

    // Declared Low-first, High-second: if declaration order leaked into
    // the agenda this would still put Low ahead, so the test is only
    // meaningful because salience wins regardless.
    env.defrule(Rule::new(
        "Low",
        "MAIN",
        0,
        vec![CondElement::positive("t", vec![])],
        Arc::new(|_b, env| {
            env.assert_fact("l", HashMap::new(), false)?;
            Ok(())
        }),
    ))
    .unwrap();
    env.defrule(Rule::new(
        "High",
        "MAIN",
        50,
        vec![CondElement::positive("t", vec![])],
        Arc::new(|_b, env| {
            env.assert_fact("h", HashMap::new(), false)?;
            Ok(())
        }),
    ))
    .unwrap();

    env.assert_fact("t", HashMap::new(), false).unwrap();
    let activations = env.agenda("MAIN");
    assert_eq!(activations[0].rule_id, "High");
    assert_eq!(activations[1].rule_id, "Low");

    env.run(-1).unwrap();
    assert!(env.facts_iter().any(|f| f.template == "h"));
    assert!(env.facts_iter().any(|f| f.template == "l"));
}

#[test]
fn modify_preserves_fact_index_and_touches_only_the_named_slot() {
    let mut env = Environment::new();
    env.deftemplate(Template::new(
        "rec",
        vec![SlotDef::unconstrained("x"), SlotDef::unconstrained("y")],
    ));

    let f = env
        .assert_fact("rec", slots(&[("x", serde_json::json!(1)), ("y", serde_json::json!(2))]), false)
        .unwrap()
        .unwrap();

    env.modify(f, slots(&[("y", serde_json::json!(9))])).unwrap();

    let fact = env.fact(f).expect("same index still resolves");
    assert_eq!(fact.index, f);
    assert_eq!(fact.slots[0].to_json(&env.atoms), serde_json::json!(1));
    assert_eq!(fact.slots[1].to_json(&env.atoms), serde_json::json!(9));
}

#[test]
fn duplicate_fact_assertion_is_suppressed() {
    let mut env = Environment::new();
    env.deftemplate(Template::new("p", vec![SlotDef::unconstrained("x")]));

    let first = env.assert_fact("p", slots(&[("x", serde_json::json!(1))]), false).unwrap();
    assert!(first.is_some());

    let second = env.assert_fact("p", slots(&[("x", serde_json::json!(1))]), false).unwrap();
    assert!(second.is_none(), "content-identical fact must be suppressed");

    assert_eq!(env.fact_count(), 1);
}

#[test]
fn run_drains_a_focused_module_then_falls_through_to_main() {
    let mut env = Environment::new();
    env.deftemplate(Template::new("t", vec![]));
    env.deftemplate(Template::new("from-main", vec![]));
    env.deftemplate(Template::new("from-sub", vec![]));

    env.defrule(Rule::new(
        "main-rule",
        "MAIN",
        0,
        vec![CondElement::positive("t", vec![])],
        Arc::new(|_b, env| {
            env.assert_fact("from-main", HashMap::new(), false)?;
            Ok(())
        }),
    ))
    .unwrap();
    env.defrule(Rule::new(
        "sub-rule",
        "SUB",
        0,
        vec![CondElement::positive("t", vec![])],
        Arc::new(|_b, env| {
            env.assert_fact("from-sub", HashMap::new(), false)?;
            Ok(())
        }),
    ))
    .unwrap();

    env.assert_fact("t", HashMap::new(), false).unwrap();
    env.focus("SUB");
    assert_eq!(env.focus_stack().to_vec(), vec!["MAIN".to_string(), "SUB".to_string()]);

    // SUB's agenda drains first; once empty it should auto-pop off the
    // focus stack so MAIN's own pending activation can fire in the same
    // `run` call, instead of `run` stopping the moment SUB goes idle.
    let fired = env.run(-1).unwrap();
    assert_eq!(fired, 2);
    assert!(env.facts_iter().any(|f| f.template == "from-sub"));
    assert!(env.facts_iter().any(|f| f.template == "from-main"));
    assert_eq!(env.focus_stack().to_vec(), vec!["MAIN".to_string()]);
}
