//! Specialization of quadratic constraints into simpler constraint forms.
//!
//! After presolve a quadratic constraint may have lost the features that
//! made it quadratic. Upgrade rules are capability objects tried in
//! priority order; the first rule whose predicate matches transforms the
//! constraint into a more specific form that the host can hand to a
//! dedicated handler.

use crate::model::{QuadConstraint, VariableStore};
use crate::terms::LinearTerm;

/// A more specific constraint form produced by an upgrade rule.
#[derive(Debug, Clone)]
pub enum UpgradedForm {
    /// A purely linear constraint `lhs <= sum(terms) <= rhs`.
    Linear {
        /// Linear terms.
        terms: Vec<LinearTerm>,
        /// Left-hand side.
        lhs: f64,
        /// Right-hand side.
        rhs: f64,
    },
}

/// A pluggable upgrade capability.
pub trait UpgradeRule {
    /// Rule name (for logging).
    fn name(&self) -> &'static str;

    /// Priority; higher priorities are tried first.
    fn priority(&self) -> i32;

    /// Attempt the upgrade; `None` if the rule does not apply.
    fn try_upgrade(
        &self,
        cons: &QuadConstraint,
        vars: &dyn VariableStore,
    ) -> Option<UpgradedForm>;
}

/// Prioritized list of upgrade rules.
#[derive(Default)]
pub struct UpgradeRegistry {
    rules: Vec<Box<dyn UpgradeRule>>,
}

impl UpgradeRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in rules.
    pub fn with_default_rules() -> Self {
        let mut reg = Self::new();
        reg.register(Box::new(LinearUpgrade));
        reg
    }

    /// Register a rule, keeping the list sorted by decreasing priority.
    /// Among equal priorities, earlier registrations win.
    pub fn register(&mut self, rule: Box<dyn UpgradeRule>) {
        let pos = self
            .rules
            .iter()
            .position(|r| r.priority() < rule.priority())
            .unwrap_or(self.rules.len());
        self.rules.insert(pos, rule);
    }

    /// Number of registered rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True if no rules are registered.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Try every rule in priority order; the first match wins.
    pub fn try_upgrade(
        &self,
        cons: &QuadConstraint,
        vars: &dyn VariableStore,
    ) -> Option<(&'static str, UpgradedForm)> {
        for rule in &self.rules {
            if let Some(form) = rule.try_upgrade(cons, vars) {
                log::debug!("quadratic constraint upgraded by rule '{}'", rule.name());
                return Some((rule.name(), form));
            }
        }
        None
    }
}

/// Upgrade a constraint whose quadratic part vanished into a linear
/// constraint.
pub struct LinearUpgrade;

impl UpgradeRule for LinearUpgrade {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn priority(&self) -> i32 {
        0
    }

    fn try_upgrade(
        &self,
        cons: &QuadConstraint,
        _vars: &dyn VariableStore,
    ) -> Option<UpgradedForm> {
        if !cons.terms().is_linear() || cons.terms().is_empty() {
            return None;
        }
        Some(UpgradedForm::Linear {
            terms: cons.terms().linear_terms().to_vec(),
            lhs: cons.lhs(),
            rhs: cons.rhs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{VarPool, VarType};
    use crate::settings::QuadSettings;

    #[test]
    fn test_linear_upgrade_applies_after_presolve() {
        let mut pool = VarPool::default();
        let x = pool.add_var(0.0, 1.0, VarType::Binary);
        let y = pool.add_var(0.0, 5.0, VarType::Continuous);
        let settings = QuadSettings::default();

        // x^2 + y <= 3 with x binary: presolve folds x^2 into x, leaving a
        // linear constraint.
        let mut cons = QuadConstraint::new(f64::NEG_INFINITY, 3.0).unwrap();
        cons.add_quad_var(x, 0.0, 1.0);
        cons.add_linear(y, 1.0, &settings);
        cons.presolve(&pool, &settings).unwrap();

        let reg = UpgradeRegistry::with_default_rules();
        let (name, form) = reg.try_upgrade(&cons, &pool).unwrap();
        assert_eq!(name, "linear");
        let UpgradedForm::Linear { terms, lhs, rhs } = form;
        assert_eq!(terms.len(), 2);
        assert_eq!(lhs, f64::NEG_INFINITY);
        assert_eq!(rhs, 3.0);
    }

    #[test]
    fn test_no_upgrade_for_quadratic_constraint() {
        let mut pool = VarPool::default();
        let x = pool.add_var(0.0, 5.0, VarType::Continuous);

        let mut cons = QuadConstraint::new(f64::NEG_INFINITY, 3.0).unwrap();
        cons.add_quad_var(x, 0.0, 1.0);

        let reg = UpgradeRegistry::with_default_rules();
        assert!(reg.try_upgrade(&cons, &pool).is_none());
    }

    #[test]
    fn test_priority_order() {
        struct Stub(&'static str, i32);
        impl UpgradeRule for Stub {
            fn name(&self) -> &'static str {
                self.0
            }
            fn priority(&self) -> i32 {
                self.1
            }
            fn try_upgrade(
                &self,
                _cons: &QuadConstraint,
                _vars: &dyn VariableStore,
            ) -> Option<UpgradedForm> {
                Some(UpgradedForm::Linear {
                    terms: Vec::new(),
                    lhs: 0.0,
                    rhs: 0.0,
                })
            }
        }

        let mut reg = UpgradeRegistry::new();
        reg.register(Box::new(Stub("low", -5)));
        reg.register(Box::new(Stub("high", 10)));
        reg.register(Box::new(Stub("mid", 0)));

        let pool = VarPool::default();
        let cons = QuadConstraint::new(0.0, 0.0).unwrap();
        let (name, _) = reg.try_upgrade(&cons, &pool).unwrap();
        assert_eq!(name, "high");
    }
}
