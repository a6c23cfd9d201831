use std::fmt;

use crate::rejection::RejectionReason;

/// Stages a single checkout attempt moves through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutStage {
    Validating,
    ReservingStock,
    ReservingCoupon,
    Persisting,
    Committed,
    Aborted(RejectionReason),
}

impl CheckoutStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckoutStage::Committed | CheckoutStage::Aborted(_))
    }
}

impl fmt::Display for CheckoutStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckoutStage::Validating => write!(f, "validating"),
            CheckoutStage::ReservingStock => write!(f, "reserving_stock"),
            CheckoutStage::ReservingCoupon => write!(f, "reserving_coupon"),
            CheckoutStage::Persisting => write!(f, "persisting"),
            CheckoutStage::Committed => write!(f, "committed"),
            CheckoutStage::Aborted(reason) => write!(f, "aborted({})", reason.code()),
        }
    }
}

/// Service for validating checkout stage transitions
pub struct CheckoutStateMachine;

impl CheckoutStateMachine {
    /// Check if a stage transition is valid
    ///
    /// # Valid Transitions
    /// - Validating → ReservingStock
    /// - ReservingStock → ReservingCoupon
    /// - ReservingCoupon → Persisting
    /// - Persisting → Committed
    /// - any non-terminal stage → Aborted
    pub fn is_valid_transition(from: CheckoutStage, to: CheckoutStage) -> bool {
        if from.is_terminal() {
            return false;
        }

        matches!(
            (from, to),
            (CheckoutStage::Validating, CheckoutStage::ReservingStock)
                | (CheckoutStage::ReservingStock, CheckoutStage::ReservingCoupon)
                | (CheckoutStage::ReservingCoupon, CheckoutStage::Persisting)
                | (CheckoutStage::Persisting, CheckoutStage::Committed)
                | (_, CheckoutStage::Aborted(_))
        )
    }

    pub fn transition(from: CheckoutStage, to: CheckoutStage) -> Result<CheckoutStage, String> {
        if Self::is_valid_transition(from, to) {
            Ok(to)
        } else {
            Err(format!("Invalid checkout transition from {} to {}", from, to))
        }
    }
}

/// Current stage of one attempt; every move is checked and traced
#[derive(Debug)]
pub struct StageTracker {
    stage: CheckoutStage,
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            stage: CheckoutStage::Validating,
        }
    }

    pub fn stage(&self) -> CheckoutStage {
        self.stage
    }

    /// Move to the next stage
    pub fn advance(&mut self, to: CheckoutStage) -> Result<(), String> {
        let next = CheckoutStateMachine::transition(self.stage, to)?;
        tracing::trace!(from = %self.stage, to = %next, "Checkout stage");
        self.stage = next;
        Ok(())
    }

    /// Record an abort and hand the reason back
    pub fn abort(&mut self, reason: RejectionReason) -> RejectionReason {
        if !self.stage.is_terminal() {
            tracing::debug!(stage = %self.stage, reason = reason.code(), "Checkout aborted");
            self.stage = CheckoutStage::Aborted(reason);
        }
        reason
    }
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn stage_strategy() -> impl Strategy<Value = CheckoutStage> {
        prop_oneof![
            Just(CheckoutStage::Validating),
            Just(CheckoutStage::ReservingStock),
            Just(CheckoutStage::ReservingCoupon),
            Just(CheckoutStage::Persisting),
            Just(CheckoutStage::Committed),
            Just(CheckoutStage::Aborted(RejectionReason::BelowMinOrder)),
        ]
    }

    /// Any non-terminal stage can abort; terminal stages go nowhere
    #[test]
    fn prop_abort_only_from_non_terminal() {
        proptest!(|(from in stage_strategy())| {
            let to = CheckoutStage::Aborted(RejectionReason::InsufficientStock);
            prop_assert_eq!(CheckoutStateMachine::is_valid_transition(from, to), !from.is_terminal());
        });
    }

    /// No stage transitions back to Validating
    #[test]
    fn prop_never_returns_to_validating() {
        proptest!(|(from in stage_strategy())| {
            prop_assert!(!CheckoutStateMachine::is_valid_transition(from, CheckoutStage::Validating));
        });
    }
}
