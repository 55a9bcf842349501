//! Dispatches parsed [`Command`]s against a live [`rete_core::Environment`],
//! mirroring the teacher's `agent-core::agent::run_agent` shape (receive ->
//! mutate shared state -> log) but synchronous and REPL-driven instead of
//! channel-driven, since the engine's match-resolve-act loop is itself
//! single-threaded and non-reentrant (spec §5).

use crate::command::Command;
use crate::error::CliError;
use crate::watch_log::{WatchCategory, WatchKind, WatchLog};
use rete_core::{Environment, WatchItem};

pub struct Session {
    pub env: Environment,
    pub watch_log: WatchLog,
}

impl Session {
    pub fn new(env: Environment, watch_log: WatchLog) -> Self {
        Self { env, watch_log }
    }

    fn log(&self, item: WatchItem, kind: WatchKind, description: impl Into<String>, details: Option<serde_json::Value>) {
        let Some(category) = WatchCategory::from_item(item) else {
            return;
        };
        if let Err(err) = self.watch_log.record(category, kind, description, details) {
            tracing::warn!(error = %err, "failed to persist watch entry");
        }
    }

    pub fn execute(&mut self, cmd: Command) -> Result<String, CliError> {
        match cmd {
            Command::Assert { template, slots, logical } => {
                let result = self.env.assert_fact(&template, slots.clone(), logical)?;
                match result {
                    Some(id) => {
                        if self.env.watch.facts {
                            self.log(
                                WatchItem::Facts,
                                WatchKind::Assert,
                                format!("assert {template}"),
                                Some(serde_json::json!({"fact": id, "slots": slots})),
                            );
                        }
                        Ok(format!("<Fact-{id}>"))
                    }
                    None => Ok("duplicate fact suppressed".to_string()),
                }
            }
            Command::Retract { fact } => {
                self.env.retract(fact)?;
                if self.env.watch.facts {
                    self.log(WatchItem::Facts, WatchKind::Retract, format!("retract {fact}"), None);
                }
                Ok(format!("retracted <Fact-{fact}>"))
            }
            Command::Modify { fact, updates } => {
                self.env.modify(fact, updates.clone())?;
                if self.env.watch.facts {
                    self.log(
                        WatchItem::Facts,
                        WatchKind::Modify,
                        format!("modify {fact}"),
                        Some(serde_json::json!({"slots": updates})),
                    );
                }
                Ok(format!("<Fact-{fact}>"))
            }
            Command::Duplicate { fact, overrides } => {
                let result = self.env.duplicate(fact, overrides.clone())?;
                match result {
                    Some(id) => {
                        if self.env.watch.facts {
                            self.log(
                                WatchItem::Facts,
                                WatchKind::Duplicate,
                                format!("duplicate {fact} -> {id}"),
                                Some(serde_json::json!({"overrides": overrides})),
                            );
                        }
                        Ok(format!("<Fact-{id}>"))
                    }
                    None => Ok("duplicate fact suppressed".to_string()),
                }
            }
            Command::Reset => {
                self.env.reset();
                Ok("reset".to_string())
            }
            Command::Clear => {
                self.env.clear()?;
                Ok("clear".to_string())
            }
            Command::Run { n } => {
                let fired = self.env.run(n)?;
                if self.env.watch.statistics {
                    self.log(
                        WatchItem::Statistics,
                        WatchKind::Stat,
                        format!("run fired {fired}"),
                        Some(serde_json::json!({"fired": fired})),
                    );
                }
                Ok(format!("{fired}"))
            }
            Command::Halt => {
                self.env.halt();
                Ok("halt".to_string())
            }
            Command::Focus { module } => {
                self.env.focus(module.clone());
                Ok(format!("focus {module}"))
            }
            Command::PopFocus => {
                let popped = self.env.pop_focus();
                Ok(popped.unwrap_or_else(|| "MAIN".to_string()))
            }
            Command::ClearFocusStack => {
                self.env.clear_focus_stack();
                Ok("clear-focus-stack".to_string())
            }
            Command::GetFocusStack => Ok(self.env.get_focus_stack().join(" ")),
            Command::Agenda { module } => Ok(self.format_agenda(module.as_deref())),
            Command::Facts => Ok(self.format_facts()),
            Command::Watch { item } => {
                self.env.watch(item);
                Ok(format!("now watching {item:?}"))
            }
            Command::Unwatch { item } => {
                self.env.unwatch(item);
                Ok(format!("no longer watching {item:?}"))
            }
            Command::Strategy { strategy } => {
                self.env.set_strategy(strategy);
                Ok(format!("strategy {strategy:?}"))
            }
            Command::Help => Ok(HELP_TEXT.to_string()),
        }
    }

    fn format_facts(&self) -> String {
        let mut lines = Vec::new();
        for fact in self.env.facts_iter() {
            lines.push(describe_fact(&self.env, fact));
        }
        if lines.is_empty() {
            "no facts".to_string()
        } else {
            lines.join("\n")
        }
    }

    fn format_agenda(&self, module: Option<&str>) -> String {
        let module = module.unwrap_or(self.env.current_module());
        let activations = self.env.agenda(module);
        if activations.is_empty() {
            return format!("{module}: empty");
        }
        activations
            .iter()
            .map(|a| format!("{:>3}  {}  pm={}", a.salience, a.rule_id, a.pm))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn describe_fact(env: &Environment, fact: &rete_core::fact::Fact) -> String {
    let name = &fact.template;
    let rendered = match env.templates.get(name) {
        Some(tmpl) if !tmpl.implied => tmpl
            .slots
            .iter()
            .zip(fact.slots.iter())
            .map(|(s, a)| format!("({} {})", s.name, a.to_json(&env.atoms)))
            .collect::<Vec<_>>()
            .join(" "),
        _ => fact
            .slots
            .first()
            .map(|a| a.to_json(&env.atoms).to_string())
            .unwrap_or_default(),
    };
    format!("f-{}  ({} {})", fact.index, name, rendered)
}

const HELP_TEXT: &str = "\
commands: assert retract modify duplicate reset clear run halt \
focus pop-focus clear-focus-stack get-focus-stack agenda facts \
watch unwatch strategy help";

#[cfg(test)]
mod tests {
    use super::*;
    use rete_core::{CondElement, Rule};
    use template_registry::{SlotDef, Template};

    fn seeded_session() -> Session {
        let mut env = Environment::new();
        env.deftemplate(Template::new("p", vec![SlotDef::unconstrained("x")]));
        Session::new(env, WatchLog::open(&tmp_db("session")).expect("open"))
    }

    fn tmp_db(name: &str) -> String {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        format!("/tmp/rete-cli-tests/{name}-{nanos}.db")
    }

    #[test]
    fn assert_then_facts_lists_the_new_fact() {
        let mut session = seeded_session();
        session
            .execute(Command::Assert {
                template: "p".into(),
                slots: std::collections::HashMap::from([("x".to_string(), serde_json::json!(1))]),
                logical: false,
            })
            .expect("assert");
        let out = session.execute(Command::Facts).expect("facts");
        assert!(out.contains("(p (x 1))"));
    }

    #[test]
    fn retract_removes_the_fact_from_the_listing() {
        let mut session = seeded_session();
        session
            .execute(Command::Assert {
                template: "p".into(),
                slots: std::collections::HashMap::from([("x".to_string(), serde_json::json!(1))]),
                logical: false,
            })
            .expect("assert");
        session.execute(Command::Retract { fact: 1 }).expect("retract");
        let out = session.execute(Command::Facts).expect("facts");
        assert_eq!(out, "no facts");
    }

    #[test]
    fn run_fires_activated_rule_and_reports_count() {
        let mut env = Environment::new();
        env.deftemplate(Template::new("t", vec![]));
        env.deftemplate(Template::new("h", vec![]));
        env.defrule(Rule::new(
            "R",
            "MAIN",
            0,
            vec![CondElement::positive("t", vec![])],
            std::sync::Arc::new(|_bindings, env| {
                env.assert_fact("h", std::collections::HashMap::new(), false)?;
                Ok(())
            }),
        ))
        .expect("defrule");
        let mut session = Session::new(env, WatchLog::open(&tmp_db("run")).expect("open"));
        session
            .execute(Command::Assert {
                template: "t".into(),
                slots: std::collections::HashMap::new(),
                logical: false,
            })
            .expect("assert");
        let fired = session.execute(Command::Run { n: -1 }).expect("run");
        assert_eq!(fired, "1");
    }

    #[test]
    fn watch_toggles_are_reflected_in_message() {
        let mut session = seeded_session();
        let out = session.execute(Command::Watch { item: WatchItem::Facts }).unwrap();
        assert!(out.contains("Facts"));
    }
}
