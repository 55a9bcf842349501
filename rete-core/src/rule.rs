//! Rules: an LHS condition-element list plus an RHS action (spec §4.6).

use crate::alpha::Bindings;
use crate::engine::Environment;
use crate::error::EngineError;
use crate::pattern::CondElement;
use std::sync::Arc;

/// RHS action: a closure over the satisfying bindings and the live
/// environment. The surface language's expression-tree interpreter is an
/// external collaborator (spec §6); the core only needs a compiled
/// closure to invoke at fire time, matching the "compiled closure table"
/// design note in spec §9.
pub type RhsAction = Arc<dyn Fn(&Bindings, &mut Environment) -> Result<(), EngineError> + Send + Sync>;

#[derive(Clone)]
pub struct Rule {
    pub id: String,
    pub module: String,
    pub salience: i32,
    pub lhs: Vec<CondElement>,
    pub rhs: RhsAction,
}

impl Rule {
    pub fn new(
        id: impl Into<String>,
        module: impl Into<String>,
        salience: i32,
        lhs: Vec<CondElement>,
        rhs: RhsAction,
    ) -> Self {
        Self {
            id: id.into(),
            module: module.into(),
            salience,
            lhs,
            rhs,
        }
    }
}
