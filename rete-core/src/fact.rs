//! Working-memory facts and the fact store (spec §3, §4.2).

use crate::atom::Atom;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub type FactId = u64;

/// A working-memory fact (spec §3 `Fact` row).
///
/// `index` is the monotone identity used everywhere else in the engine
/// (joins, activations, logical-support links); it is never reused, even
/// after the fact is retracted and reclaimed (invariant I1).
#[derive(Clone, Debug)]
pub struct Fact {
    pub index: FactId,
    pub time_tag: u64,
    pub template: String,
    pub slots: Vec<Atom>,
    pub hash: u64,
    pub garbage: bool,
    pub busy_count: u32,
    /// Snapshot of slot values taken the moment `modify` begins rewriting
    /// them, so that only-changed-slot watch traces can diff against it
    /// (spec §4.8).
    pub basis_snapshot: Option<Vec<Atom>>,
}

impl Fact {
    pub fn content_hash(template: &str, slots: &[Atom]) -> u64 {
        let mut hasher = DefaultHasher::new();
        template.hash(&mut hasher);
        for slot in slots {
            hash_atom(slot, &mut hasher);
        }
        hasher.finish()
    }
}

fn hash_atom(atom: &Atom, hasher: &mut impl Hasher) {
    match atom {
        Atom::Sym(s) | Atom::InstanceName(s) => {
            0u8.hash(hasher);
            s.hash(hasher);
        }
        Atom::Str(s) => {
            1u8.hash(hasher);
            s.hash(hasher);
        }
        Atom::Int(i) => {
            2u8.hash(hasher);
            i.hash(hasher);
        }
        Atom::Float(bits) => {
            3u8.hash(hasher);
            bits.hash(hasher);
        }
        Atom::FactRef(idx) => {
            4u8.hash(hasher);
            idx.hash(hasher);
        }
        Atom::ExternalAddr(addr) => {
            5u8.hash(hasher);
            addr.hash(hasher);
        }
        Atom::Multifield(items) => {
            6u8.hash(hasher);
            for item in items {
                hash_atom(item, hasher);
            }
        }
        Atom::Void => 7u8.hash(hasher),
    }
}

/// Ordered fact list, hash index for duplicate detection, per-template
/// lists, and the deferred-free ("garbage") list (spec §2.2, §4.2).
///
/// Invariant I2: a fact present in `by_hash` is present in `facts` and
/// `garbage == false`; a fact on `garbage_list` has `garbage == true` and
/// is absent from `by_hash`.
#[derive(Default)]
pub struct FactStore {
    facts: HashMap<FactId, Fact>,
    order: Vec<FactId>,
    by_template: HashMap<String, Vec<FactId>>,
    by_hash: HashMap<u64, FactId>,
    garbage_list: Vec<FactId>,
    next_index: FactId,
    next_time_tag: u64,
}

impl FactStore {
    pub fn new() -> Self {
        Self {
            next_index: 1,
            next_time_tag: 1,
            ..Default::default()
        }
    }

    pub fn next_time_tag(&mut self) -> u64 {
        let tag = self.next_time_tag;
        self.next_time_tag += 1;
        tag
    }

    pub fn peek_next_index(&self) -> FactId {
        self.next_index
    }

    /// Look up a live fact by content hash, for duplicate suppression.
    pub fn find_duplicate(&self, template: &str, slots: &[Atom]) -> Option<FactId> {
        let hash = Fact::content_hash(template, slots);
        self.by_hash.get(&hash).copied()
    }

    /// Insert a freshly constructed fact, preserving `index`/`time_tag` if
    /// already set to nonzero (used by `modify`'s reassert, which must not
    /// advance `NextFactIndex`).
    pub fn insert(&mut self, mut fact: Fact, preserve_identity: bool) -> FactId {
        if !preserve_identity {
            fact.index = self.next_index;
            self.next_index += 1;
            fact.time_tag = self.next_time_tag();
        }
        let id = fact.index;
        let hash = fact.hash;
        self.by_template
            .entry(fact.template.clone())
            .or_default()
            .push(id);
        self.by_hash.insert(hash, id);
        if !preserve_identity || !self.order.contains(&id) {
            self.order.push(id);
        }
        self.facts.insert(id, fact);
        id
    }

    pub fn get(&self, id: FactId) -> Option<&Fact> {
        self.facts.get(&id)
    }

    pub fn get_mut(&mut self, id: FactId) -> Option<&mut Fact> {
        self.facts.get_mut(&id)
    }

    /// Move a fact to the garbage list (spec §4.2 retract path). `modify`
    /// passes `keep_slot = true` so the fact keeps its position/identity
    /// and is not actually detached.
    pub fn retract(&mut self, id: FactId) -> Option<Fact> {
        let fact = self.facts.get_mut(&id)?;
        fact.garbage = true;
        self.by_hash.remove(&fact.hash);
        self.garbage_list.push(id);
        self.order.retain(|&f| f != id);
        if let Some(list) = self.by_template.get_mut(&fact.template) {
            list.retain(|&f| f != id);
        }
        Some(self.facts.get(&id).cloned().expect("just checked"))
    }

    /// Reclaim every garbage fact with `busy_count == 0`. Called at the end
    /// of the enclosing top-level operation (spec §5 deferred reclamation).
    pub fn sweep_garbage(&mut self) {
        let mut remaining = Vec::new();
        for id in self.garbage_list.drain(..) {
            let reclaim = self.facts.get(&id).is_some_and(|f| f.busy_count == 0);
            if reclaim {
                self.facts.remove(&id);
            } else {
                remaining.push(id);
            }
        }
        self.garbage_list = remaining;
    }

    /// Rewrite a live fact's slots/hash in place, preserving `index` and
    /// `time_tag` (spec §4.8 "modify preserves the fact's address").
    /// Returns the previous slot values, for watch-trace diffing.
    pub fn rehash(&mut self, id: FactId, new_slots: Vec<Atom>, new_hash: u64) -> Option<Vec<Atom>> {
        let fact = self.facts.get_mut(&id)?;
        let old_slots = std::mem::replace(&mut fact.slots, new_slots);
        let old_hash = fact.hash;
        fact.hash = new_hash;
        fact.basis_snapshot = Some(old_slots.clone());
        self.by_hash.remove(&old_hash);
        self.by_hash.insert(new_hash, id);
        Some(old_slots)
    }

    pub fn facts_for_template(&self, template: &str) -> &[FactId] {
        self.by_template
            .get(template)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fact> {
        self.order.iter().filter_map(move |id| self.facts.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.facts.clear();
        self.order.clear();
        self.by_template.clear();
        self.by_hash.clear();
        self.garbage_list.clear();
        self.next_index = 1;
        self.next_time_tag = 1;
    }
}

impl Clone for Fact {
    fn clone(&self) -> Self {
        Fact {
            index: self.index,
            time_tag: self.time_tag,
            template: self.template.clone(),
            slots: self.slots.clone(),
            hash: self.hash,
            garbage: self.garbage,
            busy_count: self.busy_count,
            basis_snapshot: self.basis_snapshot.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk(template: &str, slots: Vec<Atom>) -> Fact {
        let hash = Fact::content_hash(template, &slots);
        Fact {
            index: 0,
            time_tag: 0,
            template: template.to_string(),
            slots,
            hash,
            garbage: false,
            busy_count: 0,
            basis_snapshot: None,
        }
    }

    #[test]
    fn insert_assigns_monotone_index() {
        let mut store = FactStore::new();
        let a = store.insert(mk("p", vec![Atom::Int(1)]), false);
        let b = store.insert(mk("p", vec![Atom::Int(2)]), false);
        assert!(b > a);
    }

    #[test]
    fn retract_removes_from_hash_index_but_keeps_garbage_entry() {
        let mut store = FactStore::new();
        let id = store.insert(mk("p", vec![Atom::Int(1)]), false);
        assert!(store.find_duplicate("p", &[Atom::Int(1)]).is_some());
        store.retract(id);
        assert!(store.find_duplicate("p", &[Atom::Int(1)]).is_none());
        assert!(store.get(id).unwrap().garbage);
    }

    #[test]
    fn sweep_reclaims_only_unreferenced_garbage() {
        let mut store = FactStore::new();
        let id = store.insert(mk("p", vec![Atom::Int(1)]), false);
        store.get_mut(id).unwrap().busy_count = 1;
        store.retract(id);
        store.sweep_garbage();
        assert!(store.get(id).is_some());

        store.get_mut(id).unwrap().busy_count = 0;
        store.sweep_garbage();
        assert!(store.get(id).is_none());
    }

    #[test]
    fn index_never_reused_after_retract() {
        let mut store = FactStore::new();
        let a = store.insert(mk("p", vec![Atom::Int(1)]), false);
        store.retract(a);
        store.sweep_garbage();
        let b = store.insert(mk("p", vec![Atom::Int(2)]), false);
        assert_ne!(a, b);
        assert!(b > a);
    }
}
