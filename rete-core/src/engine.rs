//! The engine driver: the explicit `Environment` handle threaded through
//! every operation (spec §4.6, §4.9, §9 "Global mutable environment").
//!
//! Unlike the CLIPS source this is modeled on, there is no hidden
//! process-wide state: every subsystem -- atom table, fact store, alpha
//! and beta networks, agendas, focus stack, truth maintenance -- is a
//! typed field of `Environment`, exactly as spec §9's redesign note asks.

use crate::agenda::{Agenda, ConflictStrategy};
use crate::alpha::AlphaNetwork;
use crate::atom::{Atom, AtomTable};
use crate::beta::{BetaEvent, BetaNetwork, CompiledCe, PartialMatchId};
use crate::error::EngineError;
use crate::fact::{Fact, FactId, FactStore};
use crate::module::{FocusStack, Module, MAIN_MODULE};
use crate::pattern::{CondElement, FieldTest};
use crate::rule::Rule;
use crate::tms::LogicalSupport;
use std::collections::{HashMap, HashSet};
use template_registry::{Template, TemplateRegistry};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WatchItem {
    Facts,
    Rules,
    Activations,
    Compilations,
    Statistics,
    #[default]
    All,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WatchFlags {
    pub facts: bool,
    pub rules: bool,
    pub activations: bool,
    pub compilations: bool,
    pub statistics: bool,
}

impl WatchFlags {
    fn set(&mut self, item: WatchItem, value: bool) {
        match item {
            WatchItem::Facts => self.facts = value,
            WatchItem::Rules => self.rules = value,
            WatchItem::Activations => self.activations = value,
            WatchItem::Compilations => self.compilations = value,
            WatchItem::Statistics => self.statistics = value,
            WatchItem::All => {
                self.facts = value;
                self.rules = value;
                self.activations = value;
                self.compilations = value;
                self.statistics = value;
            }
        }
    }
}

/// The forward-chaining rule engine: templates, working memory, the
/// compiled alpha/beta networks, the agenda, focus stack, and truth
/// maintenance (spec §2 component list).
pub struct Environment {
    pub atoms: AtomTable,
    pub templates: TemplateRegistry,
    facts: FactStore,
    alpha: AlphaNetwork,
    beta: BetaNetwork,
    rules: HashMap<String, Rule>,
    modules: HashMap<String, Module>,
    agendas: HashMap<String, Agenda>,
    focus: FocusStack,
    tms: LogicalSupport,
    /// The partial match currently firing, if any -- facts asserted with
    /// `logical = true` while it is set are supported by it (spec §4.7).
    current_support: Option<PartialMatchId>,
    join_in_progress: bool,
    already_running: bool,
    halt: bool,
    poisoned: bool,
    pub watch: WatchFlags,
    default_strategy: ConflictStrategy,
    /// `deffacts`-equivalent: facts re-asserted on every `reset` (spec §6
    /// "`reset`: clears facts, re-asserts initial facts, pushes MAIN").
    initial_facts: Vec<(String, HashMap<String, serde_json::Value>, bool)>,
    fired_count: u64,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self {
            atoms: AtomTable::new(),
            templates: TemplateRegistry::new(),
            facts: FactStore::new(),
            alpha: AlphaNetwork::new(),
            beta: BetaNetwork::new(),
            rules: HashMap::new(),
            modules: HashMap::from([(MAIN_MODULE.to_string(), Module::new(MAIN_MODULE))]),
            agendas: HashMap::from([(MAIN_MODULE.to_string(), Agenda::new(ConflictStrategy::Depth))]),
            focus: FocusStack::new(),
            tms: LogicalSupport::new(),
            current_support: None,
            join_in_progress: false,
            already_running: false,
            halt: false,
            poisoned: false,
            watch: WatchFlags::default(),
            default_strategy: ConflictStrategy::Depth,
            initial_facts: Vec::new(),
            fired_count: 0,
        }
    }

    // ---- inspection -----------------------------------------------------

    pub fn fact(&self, id: FactId) -> Option<&Fact> {
        self.facts.get(id)
    }

    pub fn facts_iter(&self) -> impl Iterator<Item = &Fact> {
        self.facts.iter()
    }

    pub fn fact_count(&self) -> usize {
        self.facts.len()
    }

    pub fn is_halted(&self) -> bool {
        self.halt
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn fired_count(&self) -> u64 {
        self.fired_count
    }

    pub fn focus_stack(&self) -> &[String] {
        self.focus.stack()
    }

    pub fn agenda(&self, module: &str) -> Vec<crate::agenda::Activation> {
        self.agendas
            .get(module)
            .map(|a| a.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn strategy(&self) -> ConflictStrategy {
        self.default_strategy
    }

    pub fn set_strategy(&mut self, strategy: ConflictStrategy) {
        self.default_strategy = strategy;
        for agenda in self.agendas.values_mut() {
            agenda.set_strategy(strategy);
        }
    }

    // ---- focus / modules --------------------------------------------------

    pub fn focus(&mut self, module: impl Into<String>) {
        self.focus.push(module);
    }

    pub fn pop_focus(&mut self) -> Option<String> {
        self.focus.pop()
    }

    pub fn clear_focus_stack(&mut self) {
        self.focus.clear();
    }

    pub fn get_focus_stack(&self) -> &[String] {
        self.focus.stack()
    }

    pub fn current_module(&self) -> &str {
        self.focus.current()
    }

    // ---- watch / unwatch ---------------------------------------------------

    pub fn watch(&mut self, item: WatchItem) {
        self.watch.set(item, true);
    }

    pub fn unwatch(&mut self, item: WatchItem) {
        self.watch.set(item, false);
    }

    pub fn halt(&mut self) {
        self.halt = true;
    }

    // ---- construct definition ----------------------------------------------

    pub fn deftemplate(&mut self, template: Template) {
        if self.watch.compilations {
            tracing::debug!(template = template.name.as_str(), "deftemplate");
        }
        self.templates.define(template);
    }

    pub fn add_initial_fact(
        &mut self,
        template: impl Into<String>,
        slots: HashMap<String, serde_json::Value>,
        logical: bool,
    ) {
        self.initial_facts.push((template.into(), slots, logical));
    }

    /// Compile a rule's LHS into the alpha/beta network and register its
    /// RHS (spec §4.4, §4.6). Existing facts are matched against the new
    /// rule immediately, mirroring a `reset`-time right-prime pass scoped
    /// to just this rule.
    pub fn defrule(&mut self, rule: Rule) -> Result<(), EngineError> {
        let compiled = self.compile_lhs(&rule.lhs)?;
        self.beta.compile_rule(&rule.id, compiled);
        self.modules
            .entry(rule.module.clone())
            .or_insert_with(|| Module::new(rule.module.clone()))
            .rules
            .push(rule.id.clone());
        let strategy = self.default_strategy;
        self.agendas
            .entry(rule.module.clone())
            .or_insert_with(|| Agenda::new(strategy));

        if self.watch.compilations {
            tracing::debug!(rule = rule.id.as_str(), module = rule.module.as_str(), "defrule");
        }
        self.rules.insert(rule.id.clone(), rule.clone());

        let events = self.beta.recompute_rule(&rule.id, &self.alpha, &self.facts);
        self.apply_events(&rule.id, events);
        Ok(())
    }

    pub fn undefrule(&mut self, rule_id: &str) {
        for module in self.modules.values_mut() {
            module.rules.retain(|r| r != rule_id);
        }
        let events = self.beta.remove_rule(rule_id);
        for agenda in self.agendas.values_mut() {
            agenda.remove_rule(rule_id);
        }

        let mut to_force_retract = Vec::new();
        for event in events {
            if let BetaEvent::Deactivate(pm) = event {
                for fid in pm.trace.iter().flatten() {
                    if let Some(f) = self.facts.get_mut(*fid) {
                        f.busy_count = f.busy_count.saturating_sub(1);
                    }
                }
                to_force_retract.extend(self.tms.on_match_removed(pm.id));
            }
        }
        for fact_id in to_force_retract {
            let _ = self.force_retract(fact_id);
        }

        self.rules.remove(rule_id);
    }

    fn compile_lhs(&mut self, lhs: &[CondElement]) -> Result<Vec<CompiledCe>, EngineError> {
        let mut out = Vec::with_capacity(lhs.len());
        for ce in lhs {
            let resolved = self.resolve_ce(ce)?;
            let alpha = self.alpha.compile_pattern(&resolved);
            out.push(CompiledCe {
                alpha,
                negated: resolved.negated,
                exists: resolved.exists,
                secondary_test: resolved.secondary_test.clone(),
            });
        }
        Ok(out)
    }

    /// Resolve each field test's slot *name* to the template's positional
    /// index, so the alpha network (which only knows positions) can stay
    /// generic over any template (spec §4.2/§4.3).
    fn resolve_ce(&self, ce: &CondElement) -> Result<CondElement, EngineError> {
        let tmpl = self.templates.get(&ce.template).ok_or_else(|| {
            EngineError::name(
                self.focus.current(),
                format!("unknown template '{}'", ce.template),
            )
        })?;
        let resolve_slot = |slot_name: &str| -> Result<String, EngineError> {
            if tmpl.implied {
                return Ok("0".to_string());
            }
            tmpl.slots
                .iter()
                .position(|s| s.name == slot_name)
                .map(|idx| idx.to_string())
                .ok_or_else(|| {
                    EngineError::name(
                        self.focus.current(),
                        format!("unknown slot '{slot_name}' on '{}'", ce.template),
                    )
                })
        };
        let tests = ce
            .tests
            .iter()
            .map(|t| resolve_field_test(t, &resolve_slot))
            .collect::<Result<Vec<_>, EngineError>>()?;
        Ok(CondElement {
            template: ce.template.clone(),
            tests,
            negated: ce.negated,
            exists: ce.exists,
            secondary_test: ce.secondary_test.clone(),
        })
    }

    // ---- working memory -----------------------------------------------------

    /// `assert`: validate, dedup, commit to the fact store, and propagate
    /// through the alpha/beta network (spec §6, §8f). Returns `Ok(None)`
    /// when an identical fact already exists and was suppressed rather
    /// than asserted.
    pub fn assert_fact(
        &mut self,
        template: &str,
        mut slots: HashMap<String, serde_json::Value>,
        logical: bool,
    ) -> Result<Option<FactId>, EngineError> {
        self.guard_mutation()?;

        self.templates
            .validate(template, &mut slots)
            .map_err(|e| EngineError::constraint(self.focus.current(), e.to_string()))?;
        let tmpl = self
            .templates
            .get(template)
            .cloned()
            .ok_or_else(|| EngineError::name(self.focus.current(), format!("unknown template '{template}'")))?;

        let atoms = self.slots_to_atoms(&tmpl, &slots);
        if self.facts.find_duplicate(template, &atoms).is_some() {
            return Ok(None);
        }

        let hash = Fact::content_hash(template, &atoms);
        let fact = Fact {
            index: 0,
            time_tag: 0,
            template: template.to_string(),
            slots: atoms,
            hash,
            garbage: false,
            busy_count: 0,
            basis_snapshot: None,
        };

        self.join_in_progress = true;
        let id = self.facts.insert(fact, false);

        if logical {
            if let Some(pm) = self.current_support {
                self.tms.add_support(id, pm);
            }
        }

        if self.watch.facts {
            tracing::debug!(fact = id, template, "assert");
        }

        let fact_clone = self.facts.get(id).cloned().expect("just inserted");
        let hits = self.alpha.assert(&fact_clone);
        let dirty = self.dirty_rules(&hits.iter().map(|(m, _)| *m).collect::<Vec<_>>());
        for rule_id in dirty {
            let events = self.beta.recompute_rule(&rule_id, &self.alpha, &self.facts);
            self.apply_events(&rule_id, events);
        }

        self.join_in_progress = false;
        self.facts.sweep_garbage();
        Ok(Some(id))
    }

    pub fn retract(&mut self, id: FactId) -> Result<(), EngineError> {
        self.retract_internal(id, false, false)?;
        Ok(())
    }

    /// Retract a fact whose logical support just vanished (spec §4.7
    /// `ForceLogicalRetractions`). This runs from *inside* the enclosing
    /// assert/retract's own `join_in_progress` window -- it is the same
    /// top-level operation cascading, not a concurrent caller -- so it
    /// bypasses the re-entrancy guard rather than tripping it.
    fn force_retract(&mut self, id: FactId) -> Result<(), EngineError> {
        self.retract_internal(id, false, true)?;
        Ok(())
    }

    fn retract_internal(&mut self, id: FactId, modify_op: bool, bypass_reentrancy: bool) -> Result<Fact, EngineError> {
        if bypass_reentrancy {
            self.guard_poisoned()?;
        } else {
            self.guard_mutation()?;
        }
        let fact = self
            .facts
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::name(self.focus.current(), format!("no such fact {id}")))?;

        self.join_in_progress = true;
        let mem_ids = self.alpha.retract(&fact);
        let dirty = self.dirty_rules(&mem_ids);
        for rule_id in dirty {
            let events = self.beta.recompute_rule(&rule_id, &self.alpha, &self.facts);
            self.apply_events(&rule_id, events);
        }

        if !modify_op {
            self.facts.retract(id);
            self.tms.on_fact_removed(id);
            if self.watch.facts {
                tracing::debug!(fact = id, "retract");
            }
        }

        self.join_in_progress = false;
        if !modify_op {
            self.facts.sweep_garbage();
        }
        Ok(fact)
    }

    /// `modify`: preserves fact index/address (spec §4.8). Implemented as
    /// a retract that skips the garbage list, followed by a reassert
    /// under the same index.
    pub fn modify(
        &mut self,
        id: FactId,
        updates: HashMap<String, serde_json::Value>,
    ) -> Result<(), EngineError> {
        let old = self
            .facts
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::name(self.focus.current(), format!("no such fact {id}")))?;
        let tmpl = self
            .templates
            .get(&old.template)
            .cloned()
            .ok_or_else(|| EngineError::name(self.focus.current(), format!("unknown template '{}'", old.template)))?;

        let mut slot_map = self.atoms_to_slot_map(&tmpl, &old.slots);
        let changed: Vec<String> = updates.keys().cloned().collect();
        for (k, v) in updates {
            slot_map.insert(k, v);
        }
        self.templates
            .validate(&old.template, &mut slot_map)
            .map_err(|e| EngineError::constraint(self.focus.current(), e.to_string()))?;
        let new_atoms = self.slots_to_atoms(&tmpl, &slot_map);

        self.retract_internal(id, true, false)?;

        let new_hash = Fact::content_hash(&old.template, &new_atoms);
        self.facts.rehash(id, new_atoms, new_hash);

        self.join_in_progress = true;
        let fact_clone = self.facts.get(id).cloned().expect("still present");
        let hits = self.alpha.assert(&fact_clone);
        let dirty = self.dirty_rules(&hits.iter().map(|(m, _)| *m).collect::<Vec<_>>());
        for rule_id in dirty {
            let events = self.beta.recompute_rule(&rule_id, &self.alpha, &self.facts);
            self.apply_events(&rule_id, events);
        }
        self.join_in_progress = false;
        self.facts.sweep_garbage();

        if self.watch.facts {
            tracing::debug!(fact = id, slots = ?changed, "modify");
        }
        Ok(())
    }

    /// `duplicate`: assert a fresh fact (new index) cloned from `id` with
    /// `overrides` applied on top of its current slot values.
    pub fn duplicate(
        &mut self,
        id: FactId,
        overrides: HashMap<String, serde_json::Value>,
    ) -> Result<Option<FactId>, EngineError> {
        let old = self
            .facts
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::name(self.focus.current(), format!("no such fact {id}")))?;
        let tmpl = self
            .templates
            .get(&old.template)
            .cloned()
            .ok_or_else(|| EngineError::name(self.focus.current(), format!("unknown template '{}'", old.template)))?;
        let mut slot_map = self.atoms_to_slot_map(&tmpl, &old.slots);
        for (k, v) in overrides {
            slot_map.insert(k, v);
        }
        self.assert_fact(&old.template, slot_map, false)
    }

    fn guard_mutation(&self) -> Result<(), EngineError> {
        self.guard_poisoned()?;
        if self.join_in_progress {
            return Err(EngineError::state(
                self.focus.current(),
                "operation disallowed while a join operation is in progress",
            ));
        }
        Ok(())
    }

    fn guard_poisoned(&self) -> Result<(), EngineError> {
        if self.poisoned {
            return Err(EngineError::system(
                self.focus.current(),
                "environment poisoned by a prior system error; call clear",
            ));
        }
        Ok(())
    }

    fn dirty_rules(&self, memories: &[crate::alpha::AlphaMemoryId]) -> HashSet<String> {
        let mut dirty = HashSet::new();
        for mem in memories {
            for rule_id in self.beta.rules_reading(*mem) {
                dirty.insert(rule_id);
            }
        }
        dirty
    }

    fn apply_events(&mut self, rule_id: &str, events: Vec<BetaEvent>) {
        let Some(rule) = self.rules.get(rule_id) else {
            return;
        };
        let module = rule.module.clone();
        let salience = rule.salience;
        let strategy = self.default_strategy;
        let watch_activations = self.watch.activations;

        {
            let agenda = self
                .agendas
                .entry(module)
                .or_insert_with(|| Agenda::new(strategy));
            for event in &events {
                match event {
                    BetaEvent::Activate(pm) => {
                        agenda.insert(rule_id.to_string(), pm.id, salience);
                        if watch_activations {
                            tracing::debug!(rule = rule_id, pm = pm.id, "activate");
                        }
                    }
                    BetaEvent::Deactivate(pm) => {
                        agenda.remove(pm.id);
                        if watch_activations {
                            tracing::debug!(rule = rule_id, pm = pm.id, "deactivate");
                        }
                    }
                }
            }
        }

        let mut to_force_retract = Vec::new();
        for event in events {
            match event {
                BetaEvent::Activate(pm) => {
                    for fid in pm.trace.iter().flatten() {
                        if let Some(f) = self.facts.get_mut(*fid) {
                            f.busy_count += 1;
                        }
                    }
                }
                BetaEvent::Deactivate(pm) => {
                    for fid in pm.trace.iter().flatten() {
                        if let Some(f) = self.facts.get_mut(*fid) {
                            f.busy_count = f.busy_count.saturating_sub(1);
                        }
                    }
                    to_force_retract.extend(self.tms.on_match_removed(pm.id));
                }
            }
        }
        for fact_id in to_force_retract {
            let _ = self.force_retract(fact_id);
        }
    }

    // ---- the match-resolve-act loop -----------------------------------------

    /// `run(n)`: fire up to `n` activations (or until the agenda drains
    /// if `n < 0`), respecting focus and halt (spec §4.6).
    pub fn run(&mut self, n: i64) -> Result<u64, EngineError> {
        if self.poisoned {
            return Err(EngineError::system(self.focus.current(), "environment poisoned"));
        }
        if self.already_running {
            return Err(EngineError::state(self.focus.current(), "run is not reentrant"));
        }
        self.already_running = true;
        self.halt = false;
        let mut fired = 0u64;

        loop {
            if self.halt {
                break;
            }
            if n >= 0 && fired >= n as u64 {
                break;
            }
            let module = self.focus.current().to_string();
            let Some(activation) = self.agendas.get_mut(&module).and_then(|a| a.pop()) else {
                // This module's agenda is drained (spec §4.9 "invisible
                // until the top module's agenda drains"): pop it off the
                // focus stack and keep firing the module beneath. Only
                // stop once MAIN itself is exhausted -- `FocusStack::pop`
                // refuses to pop below MAIN and returns `None` there.
                if self.focus.pop().is_some() {
                    continue;
                }
                break;
            };
            let Some(rule) = self.rules.get(&activation.rule_id).cloned() else {
                continue;
            };
            let Some(bindings) = self
                .beta
                .find_live(&activation.rule_id, activation.pm)
                .map(|pm| pm.bindings.clone())
            else {
                continue;
            };

            if self.watch.rules {
                tracing::debug!(rule = activation.rule_id.as_str(), pm = activation.pm, "FIRE");
            }

            self.current_support = Some(activation.pm);
            let result = (rule.rhs)(&bindings, self);
            self.current_support = None;
            fired += 1;
            self.fired_count += 1;

            if let Err(err) = result {
                if err.is_system() {
                    self.poisoned = true;
                    self.halt = true;
                }
                tracing::warn!(rule = activation.rule_id.as_str(), error = %err, "RHS error");
            }
            self.facts.sweep_garbage();
        }

        self.already_running = false;
        Ok(fired)
    }

    /// `reset`: clear facts, recompile the network against the existing
    /// construct definitions, re-assert `deffacts`, push MAIN (spec §6).
    pub fn reset(&mut self) {
        self.facts.clear();
        self.alpha.clear();
        self.beta.clear();
        for agenda in self.agendas.values_mut() {
            agenda.clear();
        }
        self.tms.clear();
        self.halt = false;
        self.poisoned = false;
        self.focus.clear();

        let rules: Vec<Rule> = self.rules.values().cloned().collect();
        for rule in &rules {
            if let Ok(compiled) = self.compile_lhs(&rule.lhs) {
                self.beta.compile_rule(&rule.id, compiled);
            }
        }

        let initial = self.initial_facts.clone();
        for (template, slots, logical) in initial {
            let _ = self.assert_fact(&template, slots, logical);
        }
    }

    /// `clear`: tear down all constructs (spec §6). Fails while a join
    /// operation is in progress.
    pub fn clear(&mut self) -> Result<(), EngineError> {
        if self.join_in_progress {
            return Err(EngineError::state(
                self.focus.current(),
                "clear disallowed while a join operation is in progress",
            ));
        }
        self.facts.clear();
        self.alpha.clear();
        self.beta.clear();
        self.rules.clear();
        self.modules.clear();
        self.agendas.clear();
        self.agendas.insert(MAIN_MODULE.to_string(), Agenda::new(self.default_strategy));
        self.focus.clear();
        self.tms.clear();
        self.initial_facts.clear();
        self.templates.clear();
        self.halt = false;
        self.poisoned = false;
        self.already_running = false;
        Ok(())
    }

    fn slots_to_atoms(&mut self, tmpl: &Template, slots: &HashMap<String, serde_json::Value>) -> Vec<Atom> {
        if tmpl.implied {
            let value = slots
                .get("implied")
                .cloned()
                .unwrap_or(serde_json::Value::Array(Vec::new()));
            return vec![Atom::from_json(&value, &mut self.atoms)];
        }
        tmpl.slots
            .iter()
            .map(|s| {
                let value = slots.get(&s.name).cloned().unwrap_or(serde_json::Value::Null);
                Atom::from_json(&value, &mut self.atoms)
            })
            .collect()
    }

    fn atoms_to_slot_map(&self, tmpl: &Template, atoms: &[Atom]) -> HashMap<String, serde_json::Value> {
        if tmpl.implied {
            let mut map = HashMap::new();
            if let Some(a) = atoms.first() {
                map.insert("implied".to_string(), a.to_json(&self.atoms));
            }
            return map;
        }
        tmpl.slots
            .iter()
            .zip(atoms.iter())
            .map(|(s, a)| (s.name.clone(), a.to_json(&self.atoms)))
            .collect()
    }
}

fn resolve_field_test(
    test: &FieldTest,
    resolve_slot: &impl Fn(&str) -> Result<String, EngineError>,
) -> Result<FieldTest, EngineError> {
    Ok(match test {
        FieldTest::Eq { slot, value } => FieldTest::Eq {
            slot: resolve_slot(slot)?,
            value: value.clone(),
        },
        FieldTest::Bind { slot, var } => FieldTest::Bind {
            slot: resolve_slot(slot)?,
            var: var.clone(),
        },
        FieldTest::BindEq { slot, var } => FieldTest::BindEq {
            slot: resolve_slot(slot)?,
            var: var.clone(),
        },
        FieldTest::Predicate {
            slot,
            var,
            test,
            description,
        } => FieldTest::Predicate {
            slot: resolve_slot(slot)?,
            var: var.clone(),
            test: test.clone(),
            description: description.clone(),
        },
    })
}
