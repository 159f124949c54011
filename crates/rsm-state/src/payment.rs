//! # Payment Lifecycle
//!
//! A payment intent starts `Pending` and is either confirmed against a bank
//! receipt or cancelled together with its order.

use serde::{Deserialize, Serialize};

use crate::lifecycle::{Lifecycle, LifecycleState, TransitionError, TransitionEvidence};

/// Status of a payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Issued, awaiting funds.
    Pending,
    /// Funds received (terminal).
    Confirmed,
    /// Withdrawn (terminal).
    Cancelled,
}

impl LifecycleState for PaymentStatus {
    const KIND: &'static str = "payment";

    fn all() -> &'static [Self] {
        &[Self::Pending, Self::Confirmed, Self::Cancelled]
    }

    fn allowed_transitions(self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Confirmed, Self::Cancelled],
            Self::Confirmed | Self::Cancelled => &[],
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Lifecycle<PaymentStatus> {
    /// `Pending → Confirmed`.
    pub fn confirm(&mut self, evidence: TransitionEvidence) -> Result<(), TransitionError> {
        self.transition(PaymentStatus::Confirmed, evidence)
            .map(drop)
    }

    /// `Pending → Cancelled`.
    pub fn cancel(&mut self, evidence: TransitionEvidence) -> Result<(), TransitionError> {
        self.transition(PaymentStatus::Cancelled, evidence)
            .map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirm_once() {
        let mut lc = Lifecycle::new(PaymentStatus::Pending);
        lc.confirm(TransitionEvidence::by("agent")).unwrap();
        assert!(lc.confirm(TransitionEvidence::by("agent")).is_err());
        assert_eq!(lc.version, 2);
    }

    #[test]
    fn cancelled_cannot_be_confirmed() {
        let mut lc = Lifecycle::new(PaymentStatus::Pending);
        lc.cancel(TransitionEvidence::default()).unwrap();
        assert!(lc.confirm(TransitionEvidence::default()).is_err());
    }
}
