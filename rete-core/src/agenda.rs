//! Agenda and conflict resolution (spec §4.5).

use crate::beta::PartialMatchId;
use std::cmp::Ordering;

/// `(rule, terminal-partial-match)` pair awaiting execution (spec
/// GLOSSARY "Activation").
#[derive(Clone, Debug)]
pub struct Activation {
    pub rule_id: String,
    pub pm: PartialMatchId,
    pub salience: i32,
    /// Assigned when the activation enters the agenda; used as the
    /// strategy-independent tie-break (spec I6) and as the `depth`/
    /// `breadth` ordering key.
    pub seq: u64,
}

/// Pluggable total order over activations (spec §4.5). `Lex`/`Mea` are
/// CLIPS's "LEX"/"MEA" strategies: both degrade to salience+recency here
/// since the core has no expression-tree RHS to inspect for MEA's
/// goal-slot heuristic -- recorded as a simplification, not a silent
/// drop, since both strategies are still selectable and still total-order
/// the agenda (spec I6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictStrategy {
    Depth,
    Breadth,
    Lex,
    Mea,
    Complexity,
    Simplicity,
}

impl ConflictStrategy {
    /// Orders two activations so that the *first* in iteration order is
    /// the one that should fire next (spec §4.5, §8d).
    fn cmp(&self, a: &Activation, b: &Activation) -> Ordering {
        a.salience
            .cmp(&b.salience)
            .reverse()
            .then_with(|| match self {
                ConflictStrategy::Depth | ConflictStrategy::Lex | ConflictStrategy::Mea => {
                    b.seq.cmp(&a.seq)
                }
                ConflictStrategy::Breadth => a.seq.cmp(&b.seq),
                ConflictStrategy::Complexity => b.pm.cmp(&a.pm),
                ConflictStrategy::Simplicity => a.pm.cmp(&b.pm),
            })
    }
}

/// Per-module prioritized collection of activations (spec §4.5, §4.9).
#[derive(Default)]
pub struct Agenda {
    strategy: ConflictStrategy,
    activations: Vec<Activation>,
    next_seq: u64,
}

impl Default for ConflictStrategy {
    fn default() -> Self {
        ConflictStrategy::Depth
    }
}

impl Agenda {
    pub fn new(strategy: ConflictStrategy) -> Self {
        Self {
            strategy,
            activations: Vec::new(),
            next_seq: 1,
        }
    }

    pub fn set_strategy(&mut self, strategy: ConflictStrategy) {
        self.strategy = strategy;
        self.resort();
    }

    pub fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    pub fn insert(&mut self, rule_id: String, pm: PartialMatchId, salience: i32) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.activations.push(Activation {
            rule_id,
            pm,
            salience,
            seq,
        });
        self.resort();
    }

    pub fn remove(&mut self, pm: PartialMatchId) {
        self.activations.retain(|a| a.pm != pm);
    }

    pub fn remove_rule(&mut self, rule_id: &str) {
        self.activations.retain(|a| a.rule_id != rule_id);
    }

    pub fn pop(&mut self) -> Option<Activation> {
        if self.activations.is_empty() {
            None
        } else {
            Some(self.activations.remove(0))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.activations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.activations.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Activation> {
        self.activations.iter()
    }

    pub fn clear(&mut self) {
        self.activations.clear();
    }

    fn resort(&mut self) {
        let strategy = self.strategy;
        self.activations.sort_by(|a, b| strategy.cmp(a, b));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_salience_fires_first_regardless_of_insertion_order() {
        let mut agenda = Agenda::new(ConflictStrategy::Depth);
        agenda.insert("low".into(), 1, 0);
        agenda.insert("high".into(), 2, 50);
        let first = agenda.pop().unwrap();
        assert_eq!(first.rule_id, "high");
    }

    #[test]
    fn depth_strategy_fires_most_recent_activation_first_within_salience() {
        let mut agenda = Agenda::new(ConflictStrategy::Depth);
        agenda.insert("first".into(), 1, 0);
        agenda.insert("second".into(), 2, 0);
        let next = agenda.pop().unwrap();
        assert_eq!(next.rule_id, "second");
    }

    #[test]
    fn breadth_strategy_fires_oldest_activation_first_within_salience() {
        let mut agenda = Agenda::new(ConflictStrategy::Breadth);
        agenda.insert("first".into(), 1, 0);
        agenda.insert("second".into(), 2, 0);
        let next = agenda.pop().unwrap();
        assert_eq!(next.rule_id, "first");
    }

    #[test]
    fn remove_drops_a_specific_activation() {
        let mut agenda = Agenda::new(ConflictStrategy::Depth);
        agenda.insert("r1".into(), 1, 0);
        agenda.insert("r2".into(), 2, 0);
        agenda.remove(1);
        assert_eq!(agenda.len(), 1);
        assert_eq!(agenda.pop().unwrap().rule_id, "r2");
    }
}
