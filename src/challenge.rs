//! Operator/operand challenge functions.
//!
//! Each endpoint issues a challenge to its peer during the key
//! authentication phase and later verifies the peer's answer to *its own*
//! challenge. The direction matters: an endpoint checking the answer to the
//! peer's challenge instead of its own would let the peer self-validate.

use zeroize::Zeroize;

use crate::rng::SeededRng;
use crate::Error;

/// Wire byte for the addition operator.
pub const OPERATOR_ADD: u8 = b'+';

const OPERAND_RANGE: std::ops::Range<u64> = 1..10_000;

/// A challenge function: an operator applied to an operand.
///
/// Only addition is defined. The operator is kept as the raw wire byte so an
/// unknown value is rejected explicitly instead of silently defaulting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Challenge {
    pub operator: u8,
    pub operand: u64,
}

impl Challenge {
    /// Generate a fresh addition challenge.
    pub fn generate(rng: &mut SeededRng) -> Challenge {
        Challenge {
            operator: OPERATOR_ADD,
            operand: rng.random_range(OPERAND_RANGE),
        }
    }

    /// Evaluate the challenge against the given input.
    pub fn apply(&self, input: u64) -> Result<u64, Error> {
        match self.operator {
            OPERATOR_ADD => Ok(input.wrapping_add(self.operand)),
            other => Err(Error::UnsupportedChallengeOperator(other)),
        }
    }

    /// Check a claimed answer against the expected evaluation.
    pub fn check_answer(&self, claimed: u64, input: u64) -> Result<bool, Error> {
        Ok(self.apply(input)? == claimed)
    }
}

impl Zeroize for Challenge {
    fn zeroize(&mut self) {
        self.operator.zeroize();
        self.operand.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_accepts_only_exact_value() {
        let ch = Challenge {
            operator: OPERATOR_ADD,
            operand: 42,
        };

        assert!(ch.check_answer(142, 100).unwrap());
        assert!(!ch.check_answer(141, 100).unwrap());
        assert!(!ch.check_answer(143, 100).unwrap());
        assert!(!ch.check_answer(0, 100).unwrap());
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let ch = Challenge {
            operator: b'*',
            operand: 42,
        };

        let err = ch.apply(100).unwrap_err();
        assert!(matches!(err, Error::UnsupportedChallengeOperator(b'*')));
    }

    #[test]
    fn generated_challenges_use_addition() {
        let mut rng = SeededRng::new(Some(1));
        let ch = Challenge::generate(&mut rng);
        assert_eq!(ch.operator, OPERATOR_ADD);
        assert!(OPERAND_RANGE.contains(&ch.operand));
    }
}
