//! Deftemplate-style schema declarations for working-memory facts.
//!
//! A [`Template`] names a fact's shape: an ordered list of slots, each with
//! a single/multi cardinality, an optional default, and a type constraint.
//! [`TemplateRegistry`] collects templates by name and validates the slot
//! map an `assert` is about to commit, generalizing the single hardcoded
//! `alert.v1` schema this crate started from into a registry of arbitrary
//! named schemas.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotCardinality {
    Single,
    Multi,
}

/// A constraint on the values a slot may hold. Checked against the raw
/// `serde_json::Value` carried by the slot map during validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SlotConstraint {
    Unconstrained,
    /// Value's type tag must be one of these (`"SYMBOL"`, `"STRING"`, `"INTEGER"`, `"FLOAT"`).
    TypeOneOf(Vec<String>),
    /// Value must match one of a fixed set of allowed values.
    AllowedValues(Vec<Value>),
    /// Numeric value must fall within `[min, max]` inclusive.
    Range(f64, f64),
}

impl SlotConstraint {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            SlotConstraint::Unconstrained => true,
            SlotConstraint::TypeOneOf(tags) => tags.iter().any(|t| t == type_tag(value)),
            SlotConstraint::AllowedValues(values) => values.contains(value),
            SlotConstraint::Range(min, max) => {
                value.as_f64().is_some_and(|n| n >= *min && n <= *max)
            }
        }
    }
}

fn type_tag(value: &Value) -> &'static str {
    match value {
        Value::Null => "VOID",
        Value::Bool(_) => "SYMBOL",
        Value::Number(n) if n.is_i64() || n.is_u64() => "INTEGER",
        Value::Number(_) => "FLOAT",
        Value::String(_) => "STRING",
        Value::Array(_) => "MULTIFIELD",
        Value::Object(_) => "STRING",
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SlotDef {
    pub name: String,
    pub cardinality: SlotCardinality,
    pub default: Option<Value>,
    /// `no_default` slots left void at assert time fail validation, matching
    /// CLIPS's `(default ?NONE)` / `no_default` slot option.
    pub no_default: bool,
    pub constraint: SlotConstraint,
}

impl SlotDef {
    pub fn unconstrained(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cardinality: SlotCardinality::Single,
            default: None,
            no_default: false,
            constraint: SlotConstraint::Unconstrained,
        }
    }

    pub fn required(mut self) -> Self {
        self.no_default = true;
        self
    }

    pub fn multi(mut self) -> Self {
        self.cardinality = SlotCardinality::Multi;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_constraint(mut self, constraint: SlotConstraint) -> Self {
        self.constraint = constraint;
        self
    }
}

/// A deftemplate: an ordered slot schema a fact must conform to.
///
/// An *implied* template (created by asserting an unordered-fact literal
/// directly, without a prior `deftemplate`) has no declared slots; it
/// carries a single implicit multifield slot instead.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub slots: Vec<SlotDef>,
    pub implied: bool,
}

impl Template {
    pub fn new(name: impl Into<String>, slots: Vec<SlotDef>) -> Self {
        Self {
            name: name.into(),
            slots,
            implied: false,
        }
    }

    pub fn implied(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slots: vec![SlotDef {
                name: "implied".into(),
                cardinality: SlotCardinality::Multi,
                default: None,
                no_default: false,
                constraint: SlotConstraint::Unconstrained,
            }],
            implied: true,
        }
    }

    pub fn slot(&self, name: &str) -> Option<&SlotDef> {
        self.slots.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TemplateError {
    #[error("unknown template '{0}'")]
    UnknownTemplate(String),
    #[error("unknown slot '{slot}' on template '{template}'")]
    UnknownSlot { template: String, slot: String },
    #[error("slot '{slot}' on '{template}' requires a value and has no default")]
    MissingRequiredSlot { template: String, slot: String },
    #[error("slot '{slot}' on '{template}' rejected value {value}")]
    ConstraintViolation {
        template: String,
        slot: String,
        value: Value,
    },
    #[error("slot '{slot}' on '{template}' is single-valued but received a multifield")]
    CardinalityViolation { template: String, slot: String },
}

/// Registry of named deftemplates, mirroring CLIPS's module-scoped
/// deftemplate construct list (spec §4.2).
#[derive(Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Template>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, template: Template) {
        self.templates.insert(template.name.clone(), template);
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Template> {
        self.templates.remove(name)
    }

    pub fn clear(&mut self) {
        self.templates.clear();
    }

    /// Validate a slot map against its template, filling in defaults for
    /// void slots in place. Rejects unknown slots, type/range/cardinality
    /// violations, and required slots left void — the same checks CLIPS's
    /// `assign_defaults` and per-slot write validation perform before a
    /// fact is allowed onto the fact list.
    pub fn validate(
        &self,
        template_name: &str,
        slots: &mut HashMap<String, Value>,
    ) -> Result<(), TemplateError> {
        let template = self
            .templates
            .get(template_name)
            .ok_or_else(|| TemplateError::UnknownTemplate(template_name.to_string()))?;

        if template.implied {
            return Ok(());
        }

        for provided_name in slots.keys() {
            if template.slot(provided_name).is_none() {
                return Err(TemplateError::UnknownSlot {
                    template: template_name.to_string(),
                    slot: provided_name.clone(),
                });
            }
        }

        for slot in &template.slots {
            match slots.get(&slot.name).cloned() {
                Some(value) => {
                    if slot.cardinality == SlotCardinality::Single && value.is_array() {
                        return Err(TemplateError::CardinalityViolation {
                            template: template_name.to_string(),
                            slot: slot.name.clone(),
                        });
                    }
                    if !slot.constraint.accepts(&value) {
                        return Err(TemplateError::ConstraintViolation {
                            template: template_name.to_string(),
                            slot: slot.name.clone(),
                            value,
                        });
                    }
                }
                None => match &slot.default {
                    Some(default) => {
                        slots.insert(slot.name.clone(), default.clone());
                    }
                    None if slot.no_default => {
                        return Err(TemplateError::MissingRequiredSlot {
                            template: template_name.to_string(),
                            slot: slot.name.clone(),
                        });
                    }
                    None => {}
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn alert_template() -> Template {
        Template::new(
            "alert",
            vec![
                SlotDef::unconstrained("id").required(),
                SlotDef::unconstrained("title").required(),
                SlotDef::unconstrained("severity")
                    .with_constraint(SlotConstraint::AllowedValues(vec![
                        json!("low"),
                        json!("medium"),
                        json!("high"),
                        json!("critical"),
                    ]))
                    .with_default(json!("low")),
                SlotDef::unconstrained("tags").multi(),
            ],
        )
    }

    #[test]
    fn validates_known_template_with_all_slots_present() {
        let mut reg = TemplateRegistry::new();
        reg.define(alert_template());

        let mut slots = HashMap::from([
            ("id".to_string(), json!("inc-1")),
            ("title".to_string(), json!("cpu high")),
            ("severity".to_string(), json!("high")),
            ("tags".to_string(), json!(["cpu"])),
        ]);

        assert!(reg.validate("alert", &mut slots).is_ok());
    }

    #[test]
    fn fills_in_default_for_missing_optional_slot() {
        let mut reg = TemplateRegistry::new();
        reg.define(alert_template());

        let mut slots = HashMap::from([
            ("id".to_string(), json!("inc-2")),
            ("title".to_string(), json!("mem high")),
        ]);

        reg.validate("alert", &mut slots).unwrap();
        assert_eq!(slots.get("severity"), Some(&json!("low")));
    }

    #[test]
    fn rejects_missing_required_slot() {
        let mut reg = TemplateRegistry::new();
        reg.define(alert_template());

        let mut slots = HashMap::from([("title".to_string(), json!("no id"))]);

        assert_eq!(
            reg.validate("alert", &mut slots),
            Err(TemplateError::MissingRequiredSlot {
                template: "alert".into(),
                slot: "id".into(),
            })
        );
    }

    #[test]
    fn rejects_constraint_violation() {
        let mut reg = TemplateRegistry::new();
        reg.define(alert_template());

        let mut slots = HashMap::from([
            ("id".to_string(), json!("inc-3")),
            ("title".to_string(), json!("bogus severity")),
            ("severity".to_string(), json!("urgent")),
        ]);

        assert!(matches!(
            reg.validate("alert", &mut slots),
            Err(TemplateError::ConstraintViolation { .. })
        ));
    }

    #[test]
    fn rejects_unknown_slot() {
        let mut reg = TemplateRegistry::new();
        reg.define(alert_template());

        let mut slots = HashMap::from([
            ("id".to_string(), json!("inc-4")),
            ("title".to_string(), json!("t")),
            ("bogus".to_string(), json!(1)),
        ]);

        assert!(matches!(
            reg.validate("alert", &mut slots),
            Err(TemplateError::UnknownSlot { .. })
        ));
    }

    #[test]
    fn rejects_multifield_in_single_slot() {
        let mut reg = TemplateRegistry::new();
        reg.define(alert_template());

        let mut slots = HashMap::from([
            ("id".to_string(), json!(["not", "scalar"])),
            ("title".to_string(), json!("t")),
        ]);

        assert!(matches!(
            reg.validate("alert", &mut slots),
            Err(TemplateError::CardinalityViolation { .. })
        ));
    }

    #[test]
    fn unknown_template_is_rejected() {
        let reg = TemplateRegistry::new();
        let mut slots = HashMap::new();
        assert_eq!(
            reg.validate("nope", &mut slots),
            Err(TemplateError::UnknownTemplate("nope".into()))
        );
    }

    #[test]
    fn implied_template_accepts_anything() {
        let mut reg = TemplateRegistry::new();
        reg.define(Template::implied("misc"));

        let mut slots = HashMap::from([("implied".to_string(), json!([1, 2, 3]))]);
        assert!(reg.validate("misc", &mut slots).is_ok());
    }
}
