//! Join (beta) network: maintains, per rule, the set of partial matches
//! that satisfy every condition element on its LHS (spec §4.4).
//!
//! The alpha network (see `alpha.rs`) is incrementally maintained: each
//! assert/retract updates exactly the alpha memories a fact's template
//! feeds. The beta layer recomputes the affected rule's terminal partial
//! matches from those alpha memories on every change and diffs the
//! result against the rule's previous partial-match set (its *beta
//! memory*) to produce activate/deactivate events. Spec §8's own
//! testable property phrases the target as "the naive cross-join of
//! alpha memberships filtered by all join tests" -- that is exactly what
//! `enumerate_matches` computes, so recompute-and-diff is a faithful
//! (if less micro-incremental) realization of §4.4's four entry points
//! rather than a hand-rolled per-node delta propagation graph. See
//! `DESIGN.md` for the tradeoff against full node-level incrementality.

use crate::alpha::{AlphaMemoryId, AlphaNetwork, Bindings};
use crate::fact::{FactId, FactStore};
use std::collections::HashMap;
use std::sync::Arc;

pub type PartialMatchId = u64;

pub type SecondaryTest = Arc<dyn Fn(&Bindings) -> bool + Send + Sync>;

/// One compiled condition element: which alpha memory feeds it, its
/// polarity, and any arbitrary test beyond variable-equality (spec
/// §4.4 "secondary network test").
#[derive(Clone)]
pub struct CompiledCe {
    pub alpha: AlphaMemoryId,
    pub negated: bool,
    pub exists: bool,
    pub secondary_test: Option<SecondaryTest>,
}

/// An ordered tuple of fact references satisfying every positive CE of a
/// rule, with the bindings they imply (spec GLOSSARY "Partial match").
/// Negated/exists CE positions carry `None` -- they contribute no fact
/// reference, only a pass/fail existence test.
#[derive(Clone, Debug)]
pub struct PartialMatch {
    pub id: PartialMatchId,
    pub trace: Vec<Option<FactId>>,
    pub bindings: Bindings,
}

#[derive(Debug)]
pub enum BetaEvent {
    Activate(PartialMatch),
    /// Carries the removed match in full (not just its id) so callers can
    /// decrement per-fact `busy_count` using its trace (spec I7).
    Deactivate(PartialMatch),
}

#[derive(Default)]
struct BetaMemory {
    /// Keyed by the tuple of positive-CE fact ids, which uniquely
    /// determines a match since negated/exists CEs carry no fact.
    live: HashMap<Vec<Option<FactId>>, PartialMatch>,
}

/// Owns every rule's compiled LHS and its current beta memory.
#[derive(Default)]
pub struct BetaNetwork {
    plans: HashMap<String, Vec<CompiledCe>>,
    memories: HashMap<String, BetaMemory>,
    next_pm_id: PartialMatchId,
}

impl BetaNetwork {
    pub fn new() -> Self {
        Self {
            next_pm_id: 1,
            ..Default::default()
        }
    }

    pub fn compile_rule(&mut self, rule_id: &str, ces: Vec<CompiledCe>) {
        self.plans.insert(rule_id.to_string(), ces);
        self.memories.insert(rule_id.to_string(), BetaMemory::default());
    }

    pub fn remove_rule(&mut self, rule_id: &str) -> Vec<BetaEvent> {
        self.plans.remove(rule_id);
        let Some(memory) = self.memories.remove(rule_id) else {
            return Vec::new();
        };
        memory.live.into_values().map(BetaEvent::Deactivate).collect()
    }

    pub fn rules(&self) -> impl Iterator<Item = &String> {
        self.plans.keys()
    }

    /// Rules with at least one CE (positive, negated, or exists) reading
    /// from `alpha`. Any fact assert/retract affecting that alpha memory
    /// requires these rules to recompute.
    pub fn rules_reading(&self, alpha: AlphaMemoryId) -> Vec<String> {
        self.plans
            .iter()
            .filter(|(_, ces)| ces.iter().any(|ce| ce.alpha == alpha))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Recompute `rule_id`'s terminal partial matches from the current
    /// alpha network contents and diff against its previous beta memory.
    pub fn recompute_rule(
        &mut self,
        rule_id: &str,
        alpha_net: &AlphaNetwork,
        facts: &FactStore,
    ) -> Vec<BetaEvent> {
        let Some(ces) = self.plans.get(rule_id).cloned() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut trace = Vec::with_capacity(ces.len());
        enumerate_matches(&ces, 0, alpha_net, facts, &mut trace, &Bindings::new(), &mut out);

        let memory = self.memories.entry(rule_id.to_string()).or_default();
        let mut events = Vec::new();
        let mut still_live = std::collections::HashSet::new();

        for (trace, bindings) in out {
            still_live.insert(trace.clone());
            if !memory.live.contains_key(&trace) {
                let id = self.next_pm_id;
                self.next_pm_id += 1;
                let pm = PartialMatch { id, trace: trace.clone(), bindings };
                memory.live.insert(trace, pm.clone());
                events.push(BetaEvent::Activate(pm));
            }
        }

        let stale: Vec<Vec<Option<FactId>>> = memory
            .live
            .keys()
            .filter(|k| !still_live.contains(*k))
            .cloned()
            .collect();
        for key in stale {
            if let Some(pm) = memory.live.remove(&key) {
                events.push(BetaEvent::Deactivate(pm));
            }
        }

        events
    }

    /// Look up a specific live partial match by id, e.g. to fetch the
    /// bindings for an activation popped off the agenda (spec §4.6).
    pub fn find_live(&self, rule_id: &str, pm_id: PartialMatchId) -> Option<&PartialMatch> {
        self.memories.get(rule_id)?.live.values().find(|pm| pm.id == pm_id)
    }

    pub fn live_matches(&self, rule_id: &str) -> impl Iterator<Item = &PartialMatch> {
        self.memories
            .get(rule_id)
            .into_iter()
            .flat_map(|m| m.live.values())
    }

    pub fn clear(&mut self) {
        self.plans.clear();
        self.memories.clear();
        self.next_pm_id = 1;
    }
}

fn enumerate_matches(
    ces: &[CompiledCe],
    idx: usize,
    alpha_net: &AlphaNetwork,
    facts: &FactStore,
    trace: &mut Vec<Option<FactId>>,
    bindings: &Bindings,
    out: &mut Vec<(Vec<Option<FactId>>, Bindings)>,
) {
    if idx == ces.len() {
        out.push((trace.clone(), bindings.clone()));
        return;
    }
    let ce = &ces[idx];
    let mem = alpha_net.memory(ce.alpha);

    if ce.negated || ce.exists {
        let mut satisfied = false;
        for &fid in mem.facts() {
            if let Some(f) = facts.get(fid) {
                if let Some(fb) = mem.matches(f) {
                    if let Some(merged) = merge_bindings(bindings, &fb) {
                        if ce.secondary_test.as_ref().is_none_or(|t| t(&merged)) {
                            satisfied = true;
                            break;
                        }
                    }
                }
            }
        }
        let proceed = if ce.negated { !satisfied } else { satisfied };
        if proceed {
            trace.push(None);
            enumerate_matches(ces, idx + 1, alpha_net, facts, trace, bindings, out);
            trace.pop();
        }
        return;
    }

    for &fid in mem.facts() {
        let Some(f) = facts.get(fid) else { continue };
        let Some(fb) = mem.matches(f) else { continue };
        let Some(merged) = merge_bindings(bindings, &fb) else {
            continue;
        };
        if !ce.secondary_test.as_ref().is_none_or(|t| t(&merged)) {
            continue;
        }
        trace.push(Some(fid));
        enumerate_matches(ces, idx + 1, alpha_net, facts, trace, &merged, out);
        trace.pop();
    }
}

/// Consistency check between two binding maps: every variable present in
/// both must hold equal atoms. Returns the union on success -- this *is*
/// the join test spec §4.4 describes for inter-pattern variable equality.
pub fn merge_bindings(a: &Bindings, b: &Bindings) -> Option<Bindings> {
    let mut out = a.clone();
    for (k, v) in b {
        match out.get(k) {
            Some(existing) if existing != v => return None,
            _ => {
                out.insert(k.clone(), v.clone());
            }
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Atom;

    #[test]
    fn merge_rejects_conflicting_bindings() {
        let mut a = Bindings::new();
        a.insert("v".into(), Atom::Int(1));
        let mut b = Bindings::new();
        b.insert("v".into(), Atom::Int(2));
        assert!(merge_bindings(&a, &b).is_none());
    }

    #[test]
    fn merge_unions_disjoint_bindings() {
        let mut a = Bindings::new();
        a.insert("v".into(), Atom::Int(1));
        let mut b = Bindings::new();
        b.insert("w".into(), Atom::Int(2));
        let merged = merge_bindings(&a, &b).unwrap();
        assert_eq!(merged.len(), 2);
    }
}
