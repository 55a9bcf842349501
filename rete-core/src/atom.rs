//! Interned symbols and typed atomic values (spec §4.1).
//!
//! Symbols and strings are hash-consed through a [`lasso::Rodeo`] so that
//! variable-binding equality collapses to a `u32` compare at join time
//! instead of a string compare. The intern table is a field of
//! [`crate::engine::Environment`] rather than a process-wide static --
//! the redesign note in spec §9 calls for threading one explicit handle
//! through every operation instead of hiding state behind a singleton.

use crate::fact::FactId;
use lasso::{Rodeo, Spur};
use std::fmt;

/// An interned symbol. Two symbols compare equal iff they were interned
/// from equal strings in the same [`AtomTable`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol(pub(crate) Spur);

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.0)
    }
}

/// Hash-consing table for symbols and instance names (spec §4.1).
///
/// Numerics are not interned here: `Atom::Int`/`Atom::Float` already
/// compare and hash structurally, which gives the same join-time benefit
/// without the bookkeeping of a numeric pool.
pub struct AtomTable {
    symbols: Rodeo,
}

impl Default for AtomTable {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomTable {
    pub fn new() -> Self {
        Self {
            symbols: Rodeo::new(),
        }
    }

    /// Install: intern `s`, returning the same `Symbol` for equal strings.
    pub fn intern(&mut self, s: &str) -> Symbol {
        Symbol(self.symbols.get_or_intern(s))
    }

    pub fn resolve(&self, sym: Symbol) -> &str {
        self.symbols.resolve(&sym.0)
    }

    pub fn get(&self, s: &str) -> Option<Symbol> {
        self.symbols.get(s).map(Symbol)
    }
}

/// A typed atomic value carried in a fact slot or a variable binding.
///
/// `Multifield` is the one non-interned, non-scalar variant: it is a
/// plain owned sequence, reference-counted at the `Fact` level via
/// `busy_count` rather than here (spec §4.1).
#[derive(Clone, Debug, PartialEq)]
pub enum Atom {
    Sym(Symbol),
    Str(String),
    Int(i64),
    Float(u64), // bits of an f64 (total order, hashable); see `Atom::float`
    InstanceName(Symbol),
    FactRef(FactId),
    ExternalAddr(usize),
    Multifield(Vec<Atom>),
    Void,
}

impl Atom {
    pub fn float(v: f64) -> Self {
        Atom::Float(v.to_bits())
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Atom::Float(bits) => Some(f64::from_bits(*bits)),
            Atom::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Atom::Void)
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            Atom::Sym(_) => "SYMBOL",
            Atom::Str(_) => "STRING",
            Atom::Int(_) => "INTEGER",
            Atom::Float(_) => "FLOAT",
            Atom::InstanceName(_) => "INSTANCE-NAME",
            Atom::FactRef(_) => "FACT-ADDRESS",
            Atom::ExternalAddr(_) => "EXTERNAL-ADDRESS",
            Atom::Multifield(_) => "MULTIFIELD",
            Atom::Void => "VOID",
        }
    }

    /// Convert from the dynamic JSON slot representation `template-registry`
    /// validates against, given a table to intern any string into a symbol.
    pub fn from_json(value: &serde_json::Value, table: &mut AtomTable) -> Atom {
        match value {
            serde_json::Value::Null => Atom::Void,
            serde_json::Value::Bool(b) => Atom::Sym(table.intern(if *b { "TRUE" } else { "FALSE" })),
            serde_json::Value::Number(n) if n.is_i64() => Atom::Int(n.as_i64().unwrap()),
            serde_json::Value::Number(n) if n.is_u64() => Atom::Int(n.as_u64().unwrap() as i64),
            serde_json::Value::Number(n) => Atom::float(n.as_f64().unwrap_or_default()),
            serde_json::Value::String(s) => Atom::Sym(table.intern(s)),
            serde_json::Value::Array(items) => Atom::Multifield(
                items.iter().map(|v| Atom::from_json(v, table)).collect(),
            ),
            serde_json::Value::Object(_) => Atom::Str(value.to_string()),
        }
    }

    pub fn to_json(&self, table: &AtomTable) -> serde_json::Value {
        match self {
            Atom::Sym(s) | Atom::InstanceName(s) => serde_json::Value::String(table.resolve(*s).to_string()),
            Atom::Str(s) => serde_json::Value::String(s.clone()),
            Atom::Int(i) => serde_json::Value::from(*i),
            Atom::Float(_) => serde_json::Number::from_f64(self.as_float().unwrap())
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Atom::FactRef(idx) => serde_json::Value::from(*idx),
            Atom::ExternalAddr(addr) => serde_json::Value::from(*addr as u64),
            Atom::Multifield(items) => {
                serde_json::Value::Array(items.iter().map(|a| a.to_json(table)).collect())
            }
            Atom::Void => serde_json::Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_strings_intern_to_equal_symbols() {
        let mut table = AtomTable::new();
        let a = table.intern("foo");
        let b = table.intern("foo");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_strings_intern_to_distinct_symbols() {
        let mut table = AtomTable::new();
        let a = table.intern("foo");
        let b = table.intern("bar");
        assert_ne!(a, b);
    }

    #[test]
    fn json_roundtrip_for_scalars() {
        let mut table = AtomTable::new();
        let atom = Atom::from_json(&serde_json::json!("hello"), &mut table);
        assert_eq!(atom.to_json(&table), serde_json::json!("hello"));

        let atom = Atom::from_json(&serde_json::json!(42), &mut table);
        assert_eq!(atom.to_json(&table), serde_json::json!(42));
    }
}
