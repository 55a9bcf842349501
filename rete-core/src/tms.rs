//! Logical-support (truth maintenance) layer (spec §4.7).
//!
//! A fact asserted with `logical = true` while a rule's RHS is firing is
//! supported by that rule's satisfying partial match. Multiple supports
//! OR together: the fact survives as long as at least one supporting
//! match is still live; when the last one is retracted,
//! `ForceLogicalRetractions` schedules the fact itself for retraction.

use crate::beta::PartialMatchId;
use crate::fact::FactId;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
pub struct LogicalSupport {
    /// fact -> set of partial matches currently supporting it.
    supports: HashMap<FactId, HashSet<PartialMatchId>>,
    /// partial match -> set of facts it supports, for fast teardown when
    /// the match itself is retracted.
    dependents: HashMap<PartialMatchId, HashSet<FactId>>,
}

impl LogicalSupport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_support(&mut self, fact: FactId, pm: PartialMatchId) {
        self.supports.entry(fact).or_default().insert(pm);
        self.dependents.entry(pm).or_default().insert(fact);
    }

    /// A supporting partial match was retracted. Returns the facts whose
    /// support set is now empty -- these must be force-retracted.
    pub fn on_match_removed(&mut self, pm: PartialMatchId) -> Vec<FactId> {
        let Some(facts) = self.dependents.remove(&pm) else {
            return Vec::new();
        };
        let mut orphaned = Vec::new();
        for fact in facts {
            if let Some(set) = self.supports.get_mut(&fact) {
                set.remove(&pm);
                if set.is_empty() {
                    self.supports.remove(&fact);
                    orphaned.push(fact);
                }
            }
        }
        orphaned
    }

    pub fn on_fact_removed(&mut self, fact: FactId) {
        if let Some(pms) = self.supports.remove(&fact) {
            for pm in pms {
                if let Some(set) = self.dependents.get_mut(&pm) {
                    set.remove(&fact);
                }
            }
        }
    }

    pub fn is_supported(&self, fact: FactId) -> bool {
        self.supports.contains_key(&fact)
    }

    pub fn clear(&mut self) {
        self.supports.clear();
        self.dependents.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fact_orphaned_once_its_only_support_is_removed() {
        let mut tms = LogicalSupport::new();
        tms.add_support(10, 1);
        let orphaned = tms.on_match_removed(1);
        assert_eq!(orphaned, vec![10]);
        assert!(!tms.is_supported(10));
    }

    #[test]
    fn fact_survives_while_any_support_remains() {
        let mut tms = LogicalSupport::new();
        tms.add_support(10, 1);
        tms.add_support(10, 2);
        let orphaned = tms.on_match_removed(1);
        assert!(orphaned.is_empty());
        assert!(tms.is_supported(10));
        let orphaned = tms.on_match_removed(2);
        assert_eq!(orphaned, vec![10]);
    }
}
