//! Textual REPL commands (spec §6 "commands exposed to the outer
//! shell"). The surface LHS/RHS expression language stays an external
//! collaborator per spec §1; this tokenizer only needs to recognize the
//! handful of verbs §6 names and a `slot=value` assignment list, not a
//! general expression grammar.

use rete_core::{ConflictStrategy, FactId, WatchItem};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Assert {
        template: String,
        slots: HashMap<String, serde_json::Value>,
        logical: bool,
    },
    Retract {
        fact: FactId,
    },
    Modify {
        fact: FactId,
        updates: HashMap<String, serde_json::Value>,
    },
    Duplicate {
        fact: FactId,
        overrides: HashMap<String, serde_json::Value>,
    },
    Reset,
    Clear,
    Run {
        n: i64,
    },
    Halt,
    Focus {
        module: String,
    },
    PopFocus,
    ClearFocusStack,
    GetFocusStack,
    Agenda {
        module: Option<String>,
    },
    Facts,
    Watch {
        item: WatchItem,
    },
    Unwatch {
        item: WatchItem,
    },
    Strategy {
        strategy: ConflictStrategy,
    },
    Help,
}

/// Split a line into whitespace-separated tokens, honoring `"..."`
/// double-quoted spans as a single token (so string slot values may
/// contain spaces).
fn tokenize(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let Some(&c) = chars.peek() else { break };
        if c == '"' {
            chars.next();
            let mut tok = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some(ch) => tok.push(ch),
                    None => return Err("unterminated quoted string".to_string()),
                }
            }
            tokens.push(tok);
        } else {
            let mut tok = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                tok.push(ch);
                chars.next();
            }
            tokens.push(tok);
        }
    }
    Ok(tokens)
}

/// Parse a `key=value` token. `value` is interpreted as JSON when it
/// parses as such (numbers, `true`/`false`, `null`, `[...]`, quoted
/// strings); anything else is taken as a bare symbol string, matching
/// CLIPS's permissive unquoted-symbol slot literals.
fn parse_assignment(tok: &str) -> Result<(String, serde_json::Value), String> {
    let (key, raw) = tok
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{tok}'"))?;
    if key.is_empty() {
        return Err(format!("empty slot name in '{tok}'"));
    }
    let value = parse_value(raw);
    Ok((key.to_string(), value))
}

fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn parse_fact_id(tok: &str) -> Result<FactId, String> {
    tok.parse::<FactId>()
        .map_err(|_| format!("expected a fact id, got '{tok}'"))
}

fn parse_watch_item(tok: &str) -> Result<WatchItem, String> {
    match tok.to_ascii_lowercase().as_str() {
        "facts" => Ok(WatchItem::Facts),
        "rules" => Ok(WatchItem::Rules),
        "activations" => Ok(WatchItem::Activations),
        "compilations" => Ok(WatchItem::Compilations),
        "statistics" => Ok(WatchItem::Statistics),
        "all" => Ok(WatchItem::All),
        other => Err(format!("unknown watch item '{other}'")),
    }
}

fn parse_strategy(tok: &str) -> Result<ConflictStrategy, String> {
    match tok.to_ascii_lowercase().as_str() {
        "depth" => Ok(ConflictStrategy::Depth),
        "breadth" => Ok(ConflictStrategy::Breadth),
        "lex" => Ok(ConflictStrategy::Lex),
        "mea" => Ok(ConflictStrategy::Mea),
        "complexity" => Ok(ConflictStrategy::Complexity),
        "simplicity" => Ok(ConflictStrategy::Simplicity),
        other => Err(format!("unknown strategy '{other}'")),
    }
}

impl Command {
    pub fn parse(line: &str) -> Result<Option<Command>, String> {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') {
            return Ok(None);
        }
        let tokens = tokenize(line)?;
        let Some((verb, rest)) = tokens.split_first() else {
            return Ok(None);
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "assert" => {
                let template = rest.first().ok_or("assert requires a template name")?.clone();
                let mut slots = HashMap::new();
                let mut logical = false;
                for tok in &rest[1..] {
                    if tok == "logical" {
                        logical = true;
                        continue;
                    }
                    let (k, v) = parse_assignment(tok)?;
                    slots.insert(k, v);
                }
                Command::Assert { template, slots, logical }
            }
            "retract" => {
                let tok = rest.first().ok_or("retract requires a fact id")?;
                Command::Retract { fact: parse_fact_id(tok)? }
            }
            "modify" => {
                let tok = rest.first().ok_or("modify requires a fact id")?;
                let fact = parse_fact_id(tok)?;
                let mut updates = HashMap::new();
                for tok in &rest[1..] {
                    let (k, v) = parse_assignment(tok)?;
                    updates.insert(k, v);
                }
                Command::Modify { fact, updates }
            }
            "duplicate" => {
                let tok = rest.first().ok_or("duplicate requires a fact id")?;
                let fact = parse_fact_id(tok)?;
                let mut overrides = HashMap::new();
                for tok in &rest[1..] {
                    let (k, v) = parse_assignment(tok)?;
                    overrides.insert(k, v);
                }
                Command::Duplicate { fact, overrides }
            }
            "reset" => Command::Reset,
            "clear" => Command::Clear,
            "run" => {
                let n = match rest.first() {
                    Some(tok) => tok.parse::<i64>().map_err(|_| format!("expected an integer, got '{tok}'"))?,
                    None => -1,
                };
                Command::Run { n }
            }
            "halt" => Command::Halt,
            "focus" => {
                let module = rest.first().ok_or("focus requires a module name")?.clone();
                Command::Focus { module }
            }
            "pop-focus" => Command::PopFocus,
            "clear-focus-stack" => Command::ClearFocusStack,
            "get-focus-stack" => Command::GetFocusStack,
            "agenda" => Command::Agenda { module: rest.first().cloned() },
            "facts" => Command::Facts,
            "watch" => {
                let tok = rest.first().ok_or("watch requires an item")?;
                Command::Watch { item: parse_watch_item(tok)? }
            }
            "unwatch" => {
                let tok = rest.first().ok_or("unwatch requires an item")?;
                Command::Unwatch { item: parse_watch_item(tok)? }
            }
            "strategy" => {
                let tok = rest.first().ok_or("strategy requires a name")?;
                Command::Strategy { strategy: parse_strategy(tok)? }
            }
            "help" | "?" => Command::Help,
            other => return Err(format!("unknown command '{other}'")),
        };
        Ok(Some(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assert_parses_template_and_slots() {
        let cmd = Command::parse("assert p x=1 y=\"hi there\"").unwrap().unwrap();
        match cmd {
            Command::Assert { template, slots, logical } => {
                assert_eq!(template, "p");
                assert_eq!(slots.get("x"), Some(&json!(1)));
                assert_eq!(slots.get("y"), Some(&json!("hi there")));
                assert!(!logical);
            }
            other => panic!("expected Assert, got {other:?}"),
        }
    }

    #[test]
    fn assert_recognizes_logical_flag() {
        let cmd = Command::parse("assert b logical").unwrap().unwrap();
        match cmd {
            Command::Assert { logical, .. } => assert!(logical),
            other => panic!("expected Assert, got {other:?}"),
        }
    }

    #[test]
    fn run_defaults_to_unbounded() {
        let cmd = Command::parse("run").unwrap().unwrap();
        assert_eq!(cmd, Command::Run { n: -1 });
    }

    #[test]
    fn run_accepts_explicit_count() {
        let cmd = Command::parse("run 3").unwrap().unwrap();
        assert_eq!(cmd, Command::Run { n: 3 });
    }

    #[test]
    fn blank_and_comment_lines_parse_to_none() {
        assert_eq!(Command::parse("").unwrap(), None);
        assert_eq!(Command::parse("   ").unwrap(), None);
        assert_eq!(Command::parse("; a comment").unwrap(), None);
    }

    #[test]
    fn unknown_verb_is_rejected() {
        assert!(Command::parse("frobnicate").is_err());
    }

    #[test]
    fn retract_requires_a_numeric_fact_id() {
        assert!(Command::parse("retract abc").is_err());
        assert_eq!(Command::parse("retract 4").unwrap().unwrap(), Command::Retract { fact: 4 });
    }

    #[test]
    fn watch_parses_known_items() {
        assert_eq!(
            Command::parse("watch facts").unwrap().unwrap(),
            Command::Watch { item: WatchItem::Facts }
        );
        assert!(Command::parse("watch nonsense").is_err());
    }
}
