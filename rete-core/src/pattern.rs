//! LHS pattern IR consumed by the alpha/beta compiler (spec §6).
//!
//! The surface parser is an external collaborator; the core only needs a
//! tree whose nodes carry field-kind, slot-ref, connective, variable
//! symbol, literal, and constraint-expression, per spec §6. `CondElement`
//! is one conjunct (one pattern CE) of a rule's LHS; `FieldTest` is one
//! constraint against a single slot of that CE.

use crate::atom::Atom;
use std::fmt;
use std::sync::Arc;

/// A single-field test within a pattern CE (spec §4.3 "single-field
/// constant tests, symbol class checks, range checks, variable captures").
#[derive(Clone)]
pub enum FieldTest {
    /// Slot must equal this literal atom.
    Eq { slot: String, value: Atom },
    /// First occurrence of `var`: bind it to whatever this slot holds, no
    /// constraint beyond that.
    Bind { slot: String, var: String },
    /// Later occurrence of a variable already bound earlier in the rule:
    /// this slot's value must equal the existing binding (a join test,
    /// spec §4.4).
    BindEq { slot: String, var: String },
    /// Arbitrary predicate over the slot value, optionally also binding
    /// it to a variable. Closures stand in for the RHS expression-tree
    /// interpreter the spec excludes from core scope.
    Predicate {
        slot: String,
        var: Option<String>,
        test: Arc<dyn Fn(&Atom) -> bool + Send + Sync>,
        description: String,
    },
}

impl fmt::Debug for FieldTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldTest::Eq { slot, value } => write!(f, "Eq({slot} == {value:?})"),
            FieldTest::Bind { slot, var } => write!(f, "Bind({slot} -> ?{var})"),
            FieldTest::BindEq { slot, var } => write!(f, "BindEq({slot} == ?{var})"),
            FieldTest::Predicate {
                slot, description, ..
            } => write!(f, "Predicate({slot}: {description})"),
        }
    }
}

/// One pattern condition element of a rule's LHS.
#[derive(Clone)]
pub struct CondElement {
    pub template: String,
    pub tests: Vec<FieldTest>,
    /// `(not (template ...))` — see spec §4.4.
    pub negated: bool,
    /// `(exists (template ...))` — negation with flipped polarity.
    pub exists: bool,
    /// Arbitrary test run after the structural join test, against the
    /// tentative combined binding (spec §4.4 "secondary network test").
    pub secondary_test: Option<Arc<dyn Fn(&crate::alpha::Bindings) -> bool + Send + Sync>>,
}

impl fmt::Debug for CondElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CondElement")
            .field("template", &self.template)
            .field("tests", &self.tests)
            .field("negated", &self.negated)
            .field("exists", &self.exists)
            .field("secondary_test", &self.secondary_test.is_some())
            .finish()
    }
}

impl CondElement {
    pub fn positive(template: impl Into<String>, tests: Vec<FieldTest>) -> Self {
        Self {
            template: template.into(),
            tests,
            negated: false,
            exists: false,
            secondary_test: None,
        }
    }

    pub fn not(template: impl Into<String>, tests: Vec<FieldTest>) -> Self {
        Self {
            template: template.into(),
            tests,
            negated: true,
            exists: false,
            secondary_test: None,
        }
    }

    pub fn exists(template: impl Into<String>, tests: Vec<FieldTest>) -> Self {
        Self {
            template: template.into(),
            tests,
            negated: false,
            exists: true,
            secondary_test: None,
        }
    }

    pub fn with_test(
        mut self,
        test: impl Fn(&crate::alpha::Bindings) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.secondary_test = Some(Arc::new(test));
        self
    }
}

/// Resolves the §9 open question about the restriction-string position
/// test verbatim: true iff the requested position is at most the number
/// of `;`-separated restriction slots present. The original C function's
/// last branch built a throwaway expression and discarded it -- a no-op
/// we do not carry forward.
pub fn restriction_covers(restriction: &str, position: usize) -> bool {
    let separators = restriction.matches(';').count();
    position <= separators
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_within_separator_count_is_covered() {
        assert!(restriction_covers("a;b;c", 2));
        assert!(restriction_covers("a;b;c", 0));
    }

    #[test]
    fn position_past_separator_count_is_not_covered() {
        assert!(!restriction_covers("a;b;c", 3));
        assert!(!restriction_covers("", 1));
    }

    #[test]
    fn empty_restriction_covers_only_position_zero() {
        assert!(restriction_covers("", 0));
        assert!(!restriction_covers("", 1));
    }
}
