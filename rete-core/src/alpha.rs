//! Discrimination (alpha) network: single-pattern constraint nodes
//! terminating in alpha memories (spec §4.3).

use crate::atom::Atom;
use crate::fact::{Fact, FactId};
use crate::pattern::{CondElement, FieldTest};
use std::collections::HashMap;

pub type AlphaMemoryId = usize;

pub type Bindings = HashMap<String, Atom>;

/// Terminal node of one pattern's constraint chain: the set of facts that
/// currently satisfy it. The beta layer reads this memory directly rather
/// than being notified through a successor chain (see `beta.rs`).
pub struct AlphaMemory {
    pub id: AlphaMemoryId,
    pub template: String,
    tests: Vec<FieldTest>,
    /// Facts currently matching this pattern, in assert order.
    facts: Vec<FactId>,
}

impl AlphaMemory {
    /// Evaluate this alpha memory's tests against `fact`, returning the
    /// variable bindings captured within the pattern if it matches.
    ///
    /// Intra-pattern consistency (the same variable named twice within one
    /// CE) is resolved here via `FieldTest::BindEq` against the locally
    /// accumulated map; cross-pattern consistency is the join network's
    /// job (spec §4.4).
    pub fn matches(&self, fact: &Fact) -> Option<Bindings> {
        if fact.template != self.template {
            return None;
        }
        let mut bindings = Bindings::new();
        for test in &self.tests {
            match test {
                FieldTest::Eq { slot, value } => {
                    let actual = slot_value(fact, slot)?;
                    if actual != value {
                        return None;
                    }
                }
                FieldTest::Bind { slot, var } => {
                    let actual = slot_value(fact, slot)?.clone();
                    bindings.insert(var.clone(), actual);
                }
                FieldTest::BindEq { slot, var } => {
                    let actual = slot_value(fact, slot)?.clone();
                    match bindings.get(var) {
                        Some(existing) if existing != &actual => return None,
                        _ => {
                            bindings.insert(var.clone(), actual);
                        }
                    }
                }
                FieldTest::Predicate { slot, var, test, .. } => {
                    let actual = slot_value(fact, slot)?;
                    if !test(actual) {
                        return None;
                    }
                    if let Some(var) = var {
                        bindings.insert(var.clone(), actual.clone());
                    }
                }
            }
        }
        Some(bindings)
    }

    pub fn facts(&self) -> &[FactId] {
        &self.facts
    }

    fn add(&mut self, id: FactId) {
        self.facts.push(id);
    }

    fn remove(&mut self, id: FactId) {
        self.facts.retain(|&f| f != id);
    }
}

fn slot_value<'a>(fact: &'a Fact, slot: &str) -> Option<&'a Atom> {
    // Implied-template facts carry a single multifield slot named
    // "implied"; named-slot facts look the name up positionally. Both are
    // modeled as a lookup by name against a parallel name vector owned by
    // the template, but the alpha network only needs the *value*, so we
    // accept either a numeric index encoded as the slot name or fall back
    // to treating the first slot as the match target for implied facts.
    if let Ok(idx) = slot.parse::<usize>() {
        return fact.slots.get(idx);
    }
    fact.slots.first()
}

/// Forest of pattern nodes keyed by template name, terminating in alpha
/// memories (spec §4.3). Memory sharing across rules keys on the
/// template plus the CE's constant (`Eq`) tests; `Bind`/`BindEq`/
/// `Predicate` tests are rule-local and always force a fresh memory.
#[derive(Default)]
pub struct AlphaNetwork {
    memories: Vec<AlphaMemory>,
    by_template: HashMap<String, Vec<AlphaMemoryId>>,
    shared_keys: HashMap<(String, Vec<(String, Atom)>), AlphaMemoryId>,
}

impl AlphaNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile_pattern(&mut self, ce: &CondElement) -> AlphaMemoryId {
        let shareable = ce
            .tests
            .iter()
            .all(|t| matches!(t, FieldTest::Eq { .. }));
        if shareable {
            let mut key: Vec<(String, Atom)> = ce
                .tests
                .iter()
                .map(|t| match t {
                    FieldTest::Eq { slot, value } => (slot.clone(), value.clone()),
                    _ => unreachable!(),
                })
                .collect();
            key.sort_by(|a, b| a.0.cmp(&b.0));
            if let Some(&id) = self.shared_keys.get(&(ce.template.clone(), key.clone())) {
                return id;
            }
            let id = self.new_memory(ce);
            self.shared_keys.insert((ce.template.clone(), key), id);
            return id;
        }
        self.new_memory(ce)
    }

    fn new_memory(&mut self, ce: &CondElement) -> AlphaMemoryId {
        let id = self.memories.len();
        self.memories.push(AlphaMemory {
            id,
            template: ce.template.clone(),
            tests: ce.tests.clone(),
            facts: Vec::new(),
        });
        self.by_template.entry(ce.template.clone()).or_default().push(id);
        id
    }

    pub fn memory(&self, id: AlphaMemoryId) -> &AlphaMemory {
        &self.memories[id]
    }

    /// Assert `fact` into every alpha memory for its template whose tests
    /// it satisfies. Returns `(memory, bindings)` pairs for each match, in
    /// memory-id order -- the caller (engine) drives right activation on
    /// the memory's successor joins and records the membership on the
    /// fact for retraction.
    pub fn assert(&mut self, fact: &Fact) -> Vec<(AlphaMemoryId, Bindings)> {
        let mut hits = Vec::new();
        let Some(ids) = self.by_template.get(&fact.template).cloned() else {
            return hits;
        };
        for id in ids {
            if let Some(bindings) = self.memories[id].matches(fact) {
                self.memories[id].add(fact.index);
                hits.push((id, bindings));
            }
        }
        hits
    }

    /// Remove `fact` from every alpha memory that currently lists it.
    /// Returns the memory ids it was removed from.
    pub fn retract(&mut self, fact: &Fact) -> Vec<AlphaMemoryId> {
        let mut hit = Vec::new();
        let Some(ids) = self.by_template.get(&fact.template).cloned() else {
            return hit;
        };
        for id in ids {
            if self.memories[id].facts.contains(&fact.index) {
                self.memories[id].remove(fact.index);
                hit.push(id);
            }
        }
        hit
    }

    pub fn clear(&mut self) {
        self.memories.clear();
        self.by_template.clear();
        self.shared_keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::CondElement;

    fn fact(template: &str, slots: Vec<Atom>) -> Fact {
        Fact {
            index: 1,
            time_tag: 1,
            template: template.to_string(),
            slots,
            hash: 0,
            garbage: false,
            busy_count: 0,
            basis_snapshot: None,
        }
    }

    #[test]
    fn identical_constant_patterns_share_one_memory() {
        let mut net = AlphaNetwork::new();
        let ce = CondElement::positive(
            "p",
            vec![FieldTest::Eq {
                slot: "0".into(),
                value: Atom::Int(1),
            }],
        );
        let a = net.compile_pattern(&ce);
        let b = net.compile_pattern(&ce);
        assert_eq!(a, b);
    }

    #[test]
    fn bind_pattern_always_gets_fresh_memory() {
        let mut net = AlphaNetwork::new();
        let ce = CondElement::positive(
            "p",
            vec![FieldTest::Bind {
                slot: "0".into(),
                var: "v".into(),
            }],
        );
        let a = net.compile_pattern(&ce);
        let b = net.compile_pattern(&ce);
        assert_ne!(a, b);
    }

    #[test]
    fn assert_matches_and_binds() {
        let mut net = AlphaNetwork::new();
        let ce = CondElement::positive(
            "p",
            vec![FieldTest::Bind {
                slot: "0".into(),
                var: "v".into(),
            }],
        );
        net.compile_pattern(&ce);
        let f = fact("p", vec![Atom::Int(42)]);
        let hits = net.assert(&f);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1.get("v"), Some(&Atom::Int(42)));
    }
}
