//! Builtin demonstration ruleset, loaded with `--demo`. Generalizes the
//! teacher's canned `rules.rs`/`runbooks.rs` domain content (crash-loop /
//! OOM-kill incident patterns) into the generic scenarios spec §8 itself
//! names as testable properties, so a fresh REPL session can exercise a
//! positive join, negation unblocking, logical support, and salience
//! ordering without the operator having to hand-type deftemplates first.

use rete_core::{Atom, CondElement, Environment, FieldTest, Rule};
use std::collections::HashMap;
use std::sync::Arc;
use template_registry::{SlotDef, Template};

/// Seeds the templates and rules for spec §8 scenarios (a), (b), (d): a
/// positive two-pattern join, negation unblocking, and salience ordering.
/// Scenario (c) (logical support) and (e)/(f) (modify/duplicate) need no
/// rule at all -- they're exercised directly against `assert`/`modify`/
/// `duplicate`, so they're left to the operator or to integration tests.
pub fn install(env: &mut Environment) {
    env.deftemplate(Template::new("p", vec![SlotDef::unconstrained("x")]));
    env.deftemplate(Template::new("q", vec![SlotDef::unconstrained("x")]));
    env.deftemplate(Template::new("pair", vec![SlotDef::unconstrained("v")]));
    env.deftemplate(Template::new("lonely", vec![SlotDef::unconstrained("v")]));
    env.deftemplate(Template::new("t", vec![]));
    env.deftemplate(Template::new("h", vec![]));
    env.deftemplate(Template::new("l", vec![]));
    env.deftemplate(Template::new("a", vec![]));
    env.deftemplate(Template::new("b", vec![]));

    env.defrule(Rule::new(
        "join-example",
        "MAIN",
        0,
        vec![
            CondElement::positive("p", vec![FieldTest::Bind { slot: "x".into(), var: "v".into() }]),
            CondElement::positive("q", vec![FieldTest::BindEq { slot: "x".into(), var: "v".into() }]),
        ],
        Arc::new(|bindings, env| {
            let v = bindings.get("v").cloned().unwrap_or(Atom::Void).to_json(&env.atoms);
            env.assert_fact("pair", HashMap::from([("v".to_string(), v)]), false)?;
            Ok(())
        }),
    ))
    .expect("join-example compiles");

    env.defrule(Rule::new(
        "lonely-example",
        "MAIN",
        0,
        vec![
            CondElement::positive("p", vec![FieldTest::Bind { slot: "x".into(), var: "v".into() }]),
            CondElement::not("q", vec![FieldTest::BindEq { slot: "x".into(), var: "v".into() }]),
        ],
        Arc::new(|bindings, env| {
            let v = bindings.get("v").cloned().unwrap_or(Atom::Void).to_json(&env.atoms);
            env.assert_fact("lonely", HashMap::from([("v".to_string(), v)]), false)?;
            Ok(())
        }),
    ))
    .expect("lonely-example compiles");

    env.defrule(Rule::new(
        "logical-support-example",
        "MAIN",
        0,
        vec![CondElement::positive("a", vec![])],
        Arc::new(|_bindings, env| {
            env.assert_fact("b", HashMap::new(), true)?;
            Ok(())
        }),
    ))
    .expect("logical-support-example compiles");

    env.defrule(Rule::new(
        "high-salience",
        "MAIN",
        50,
        vec![CondElement::positive("t", vec![])],
        Arc::new(|_bindings, env| {
            env.assert_fact("h", HashMap::new(), false)?;
            Ok(())
        }),
    ))
    .expect("high-salience compiles");

    env.defrule(Rule::new(
        "low-salience",
        "MAIN",
        0,
        vec![CondElement::positive("t", vec![])],
        Arc::new(|_bindings, env| {
            env.assert_fact("l", HashMap::new(), false)?;
            Ok(())
        }),
    ))
    .expect("low-salience compiles");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rete_core::ConflictStrategy;

    #[test]
    fn join_example_fires_once_for_matching_pair() {
        let mut env = Environment::new();
        install(&mut env);
        env.assert_fact("p", HashMap::from([("x".to_string(), serde_json::json!(1))]), false).unwrap();
        env.assert_fact("p", HashMap::from([("x".to_string(), serde_json::json!(2))]), false).unwrap();
        env.assert_fact("q", HashMap::from([("x".to_string(), serde_json::json!(2))]), false).unwrap();

        let fired = env.run(-1).unwrap();
        assert_eq!(fired, 1);
        assert!(env.facts_iter().any(|f| f.template == "pair"));
    }

    #[test]
    fn lonely_example_unblocks_after_retract() {
        let mut env = Environment::new();
        install(&mut env);
        let p = env
            .assert_fact("p", HashMap::from([("x".to_string(), serde_json::json!(7))]), false)
            .unwrap()
            .unwrap();
        env.run(-1).unwrap();
        assert_eq!(env.facts_iter().filter(|f| f.template == "lonely").count(), 1);

        let q = env
            .assert_fact("q", HashMap::from([("x".to_string(), serde_json::json!(7))]), false)
            .unwrap()
            .unwrap();
        env.run(-1).unwrap();
        assert_eq!(env.facts_iter().filter(|f| f.template == "lonely").count(), 1);

        env.retract(q).unwrap();
        env.run(-1).unwrap();
        assert_eq!(env.facts_iter().filter(|f| f.template == "lonely").count(), 2);
        let _ = p;
    }

    #[test]
    fn logical_support_retracts_dependent_fact() {
        let mut env = Environment::new();
        install(&mut env);
        let a = env.assert_fact("a", HashMap::new(), false).unwrap().unwrap();
        env.run(-1).unwrap();
        assert!(env.facts_iter().any(|f| f.template == "b"));

        env.retract(a).unwrap();
        assert!(!env.facts_iter().any(|f| f.template == "b"));
    }

    #[test]
    fn high_salience_rule_fires_before_low_salience_rule() {
        let mut env = Environment::new();
        env.set_strategy(ConflictStrategy::Depth);
        install(&mut env);
        env.assert_fact("t", HashMap::new(), false).unwrap();

        let activations = env.agenda("MAIN");
        let high_idx = activations.iter().position(|a| a.rule_id == "high-salience").unwrap();
        let low_idx = activations.iter().position(|a| a.rule_id == "low-salience").unwrap();
        assert!(high_idx < low_idx);
    }
}
