use std::collections::BTreeMap;

use crate::{Base, SymbolicValue};

/// A simple evaluator that evaluates a [SymbolicValue] given an [Environment]. The environment is
/// fixed for the lifetime of the evaluator.
#[derive(Clone, Debug, Default)]
pub struct Evaluator {
    environment: Environment,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    /// A symbol was used in the evaluation but did not have an assignment
    #[error("symbol {0} has no assigned value")]
    UnassignedSymbol(String),

    /// The value (or a value it depends on) is behind pending dereferences. Resolving these would
    /// require a model of memory contents.
    #[error("value is behind {0} pending dereference(s)")]
    Dereference(u32),
}

impl Evaluator {
    /// Create a new instance using the given [Environment].
    pub fn new(environment: impl Into<Environment>) -> Self {
        Self {
            environment: environment.into(),
        }
    }

    /// Evaluate the value to a concrete integer. Arithmetic wraps on overflow.
    pub fn evaluate(&self, value: &SymbolicValue) -> Result<i64, EvaluationError> {
        if value.deref_depth() > 0 {
            return Err(EvaluationError::Dereference(value.deref_depth()));
        }

        let base = match value.base() {
            Base::Zero => 0,
            Base::Symbol(name) => self
                .environment
                .get(name)
                .ok_or_else(|| EvaluationError::UnassignedSymbol(name.to_string()))?,
            Base::Nested(value) => self.evaluate(value)?,
            Base::Sum(lhs, rhs) => self.evaluate(lhs)?.wrapping_add(self.evaluate(rhs)?),
            Base::Lane {
                source,
                shift,
                bits,
            } => {
                // Environment values are 64 bits wide, so lanes above the low 64 bits of a wider
                // source evaluate to zero.
                let source = self.evaluate(source)? as u64;
                let shifted = source.checked_shr(*shift).unwrap_or(0);
                let mask = 1u64.checked_shl(*bits).map_or(u64::MAX, |bit| bit - 1);
                (shifted & mask) as i64
            }
        };

        Ok(base.wrapping_add(value.offset()))
    }
}

impl From<Environment> for Evaluator {
    fn from(value: Environment) -> Self {
        Self::new(value)
    }
}

impl SymbolicValue {
    /// Convenience for evaluating a single value. See [Evaluator::evaluate].
    pub fn evaluate(&self, environment: &Environment) -> Result<i64, EvaluationError> {
        Evaluator::new(environment.clone()).evaluate(self)
    }
}

/// Mapping of symbol names to concrete values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Environment {
    assignments: BTreeMap<String, i64>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, name: impl Into<String>, value: i64) {
        self.assignments.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.assignments.get(name).copied()
    }
}

impl<S: Into<String>, const N: usize> From<[(S, i64); N]> for Environment {
    fn from(assignments: [(S, i64); N]) -> Self {
        assignments.into_iter().collect()
    }
}

impl<S: Into<String>> FromIterator<(S, i64)> for Environment {
    fn from_iter<T: IntoIterator<Item = (S, i64)>>(iter: T) -> Self {
        Self {
            assignments: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        }
    }
}
