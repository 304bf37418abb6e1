use crate::prelude::Real;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactorOperator {
    #[serde(rename = "=")]
    Assign,
    #[serde(rename = "*=")]
    Multiply,
    #[serde(rename = "/=")]
    Divide,
}

/// An adjustment of a susceptibility or infectivity term. Results are
/// clamped to >= 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorOperation {
    pub operator: FactorOperator,
    pub value: Real,
}

impl FactorOperation {
    pub fn apply(&self, factor: Real) -> Real {
        let result = match self.operator {
            FactorOperator::Assign => self.value,
            FactorOperator::Multiply => factor * self.value,
            FactorOperator::Divide => {
                if self.value == 0.0 {
                    factor
                } else {
                    factor / self.value
                }
            }
        };
        result.max(0.0)
    }
}

/// Apply an optional operation, passing the term through when absent.
pub fn apply_factor(operation: &Option<FactorOperation>, factor: Real) -> Real {
    match operation {
        Some(op) => op.apply(factor),
        None => factor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operators() {
        let assign = FactorOperation { operator: FactorOperator::Assign, value: 0.5 };
        let multiply = FactorOperation { operator: FactorOperator::Multiply, value: 2.0 };
        let divide = FactorOperation { operator: FactorOperator::Divide, value: 4.0 };

        assert_eq!(assign.apply(3.0), 0.5);
        assert_eq!(multiply.apply(3.0), 6.0);
        assert_eq!(divide.apply(8.0), 2.0);
    }

    #[test]
    fn clamped_and_guarded() {
        let negative = FactorOperation { operator: FactorOperator::Assign, value: -1.0 };
        assert_eq!(negative.apply(3.0), 0.0);

        let by_zero = FactorOperation { operator: FactorOperator::Divide, value: 0.0 };
        assert_eq!(by_zero.apply(3.0), 3.0);
    }

    #[test]
    fn json_operator_symbols() {
        let op: FactorOperation = serde_json::from_str(r#"{"operator": "*=", "value": 2.0}"#).unwrap();
        assert_eq!(op.operator, FactorOperator::Multiply);
    }
}
