//! A forward-chaining production rule engine: deftemplates, working
//! memory, an alpha/beta discrimination and join network, an agenda with
//! pluggable conflict resolution, truth maintenance for logically
//! supported facts, and a focus stack of modules.
//!
//! [`engine::Environment`] is the single explicit handle every operation
//! is threaded through, rather than a hidden global (spec §9 redesign
//! note). The surface parser/expression interpreter is an external
//! collaborator; this crate owns everything from `assert` through the
//! agenda to RHS dispatch.

pub mod agenda;
pub mod alpha;
pub mod atom;
pub mod beta;
pub mod engine;
pub mod error;
pub mod fact;
pub mod module;
pub mod pattern;
pub mod rule;
pub mod tms;

#[cfg(feature = "derive")]
pub use rete_derive::Fact;

use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::hash::Hash;

/// A typed fact definition usable with `#[derive(Fact)]`, distinct from
/// the untyped [`fact::Fact`] working-memory representation the engine
/// stores internally. A type implementing this trait is a convenience
/// surface for host applications constructing slot maps; the engine
/// itself only ever sees the interned/atomized form.
pub trait Fact: Clone + Eq + Hash + Debug + Send + Sync + 'static {
    type Id: Clone + Eq + Hash + Debug + Send + Sync;

    fn id(&self) -> &Self::Id;
    fn timestamp(&self) -> DateTime<Utc>;
}

pub use agenda::{Activation, Agenda, ConflictStrategy};
pub use alpha::{AlphaMemoryId, AlphaNetwork, Bindings};
pub use atom::{Atom, AtomTable, Symbol};
pub use beta::{BetaEvent, BetaNetwork, CompiledCe, PartialMatch, PartialMatchId};
pub use engine::{Environment, WatchFlags, WatchItem};
pub use error::EngineError;
pub use fact::{FactId, FactStore};
pub use module::{FocusStack, Module, MAIN_MODULE};
pub use pattern::{restriction_covers, CondElement, FieldTest};
pub use rule::{Rule, RhsAction};
pub use tms::LogicalSupport;
