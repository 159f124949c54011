//! # Stamp Order Lifecycle
//!
//! ```text
//! Draft ─▶ Submitted ─▶ PendingVerification ─▶ Approved ─▶ PaymentPending
//!              └──────────────────────────────────▲              │
//!                                                                ▼
//! Delivered ◀─ ReadyForDelivery ◀─ InProduction ◀─ PaymentConfirmed
//! ```
//!
//! `Submitted` may skip verification and go straight to `Approved`.
//! `Submitted` and `PendingVerification` may also move to `Rejected`.
//!
//! `Delivered`, `Rejected` and `Cancelled` are terminal. Cancellation is
//! possible up to and including `PaymentPending`; once money is confirmed
//! the order can only move forward.

use serde::{Deserialize, Serialize};

use crate::lifecycle::{Lifecycle, LifecycleState, TransitionError, TransitionEvidence};

/// Status of a stamp order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Saved but not yet submitted.
    Draft,
    /// Submitted, awaiting review.
    Submitted,
    /// Under document or certificate verification.
    PendingVerification,
    /// Approved by an agent, awaiting a payment intent.
    Approved,
    /// Payment intent issued.
    PaymentPending,
    /// Payment confirmed.
    PaymentConfirmed,
    /// Stamps are being produced.
    InProduction,
    /// Stamps produced, awaiting pickup or dispatch.
    ReadyForDelivery,
    /// Handed over (terminal).
    Delivered,
    /// Withdrawn (terminal).
    Cancelled,
    /// Refused by an agent (terminal).
    Rejected,
}

impl OrderStatus {
    /// Whether the order still counts toward the taxpayer's open workload.
    pub fn is_open(self) -> bool {
        !self.is_terminal()
    }

    /// Statuses from which an agent may approve or reject.
    pub fn is_reviewable(self) -> bool {
        matches!(self, Self::Submitted | Self::PendingVerification)
    }
}

impl LifecycleState for OrderStatus {
    const KIND: &'static str = "order";

    fn all() -> &'static [Self] {
        use OrderStatus::*;
        &[
            Draft,
            Submitted,
            PendingVerification,
            Approved,
            PaymentPending,
            PaymentConfirmed,
            InProduction,
            ReadyForDelivery,
            Delivered,
            Cancelled,
            Rejected,
        ]
    }

    fn allowed_transitions(self) -> &'static [Self] {
        use OrderStatus::*;
        match self {
            Draft => &[Submitted, Cancelled],
            Submitted => &[PendingVerification, Approved, Rejected, Cancelled],
            PendingVerification => &[Approved, Rejected, Cancelled],
            Approved => &[PaymentPending, Cancelled],
            PaymentPending => &[PaymentConfirmed, Cancelled],
            PaymentConfirmed => &[InProduction],
            InProduction => &[ReadyForDelivery],
            ReadyForDelivery => &[Delivered],
            Delivered | Cancelled | Rejected => &[],
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::PendingVerification => "pending_verification",
            Self::Approved => "approved",
            Self::PaymentPending => "payment_pending",
            Self::PaymentConfirmed => "payment_confirmed",
            Self::InProduction => "in_production",
            Self::ReadyForDelivery => "ready_for_delivery",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Named operations ────────────────────────────────────────────────

impl Lifecycle<OrderStatus> {
    /// `Draft → Submitted`.
    pub fn submit(&mut self, evidence: TransitionEvidence) -> Result<(), TransitionError> {
        self.transition(OrderStatus::Submitted, evidence).map(drop)
    }

    /// `Submitted → PendingVerification`.
    pub fn begin_verification(
        &mut self,
        evidence: TransitionEvidence,
    ) -> Result<(), TransitionError> {
        self.transition(OrderStatus::PendingVerification, evidence)
            .map(drop)
    }

    /// `Submitted | PendingVerification → Approved`.
    pub fn approve(&mut self, evidence: TransitionEvidence) -> Result<(), TransitionError> {
        self.transition(OrderStatus::Approved, evidence).map(drop)
    }

    /// `Submitted | PendingVerification → Rejected`. Requires a reason.
    pub fn reject(&mut self, evidence: TransitionEvidence) -> Result<(), TransitionError> {
        self.transition_with_reason(OrderStatus::Rejected, evidence)
            .map(drop)
    }

    /// Any pre-payment status `→ Cancelled`. Requires a reason.
    pub fn cancel(&mut self, evidence: TransitionEvidence) -> Result<(), TransitionError> {
        self.transition_with_reason(OrderStatus::Cancelled, evidence)
            .map(drop)
    }

    /// `Approved → PaymentPending`, when a payment intent is issued.
    pub fn await_payment(&mut self, evidence: TransitionEvidence) -> Result<(), TransitionError> {
        self.transition(OrderStatus::PaymentPending, evidence)
            .map(drop)
    }

    /// `PaymentPending → PaymentConfirmed`.
    pub fn confirm_payment(
        &mut self,
        evidence: TransitionEvidence,
    ) -> Result<(), TransitionError> {
        self.transition(OrderStatus::PaymentConfirmed, evidence)
            .map(drop)
    }

    /// `PaymentConfirmed → InProduction`.
    pub fn start_production(
        &mut self,
        evidence: TransitionEvidence,
    ) -> Result<(), TransitionError> {
        self.transition(OrderStatus::InProduction, evidence)
            .map(drop)
    }

    /// `InProduction → ReadyForDelivery`.
    pub fn mark_ready(&mut self, evidence: TransitionEvidence) -> Result<(), TransitionError> {
        self.transition(OrderStatus::ReadyForDelivery, evidence)
            .map(drop)
    }

    /// `ReadyForDelivery → Delivered`.
    pub fn deliver(&mut self, evidence: TransitionEvidence) -> Result<(), TransitionError> {
        self.transition(OrderStatus::Delivered, evidence).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> TransitionEvidence {
        TransitionEvidence::by("admin")
    }

    fn submitted() -> Lifecycle<OrderStatus> {
        Lifecycle::new(OrderStatus::Submitted)
    }

    #[test]
    fn full_happy_path_reaches_delivered() {
        let mut lc = Lifecycle::new(OrderStatus::Draft);
        lc.submit(admin()).unwrap();
        lc.begin_verification(admin()).unwrap();
        lc.approve(admin()).unwrap();
        lc.await_payment(admin()).unwrap();
        lc.confirm_payment(admin()).unwrap();
        lc.start_production(admin()).unwrap();
        lc.mark_ready(admin()).unwrap();
        lc.deliver(admin()).unwrap();
        assert_eq!(lc.status, OrderStatus::Delivered);
        assert_eq!(lc.version, 9);
        assert_eq!(lc.transitions.len(), 8);
        assert!(lc.is_terminal());
    }

    #[test]
    fn approve_directly_from_submitted() {
        let mut lc = submitted();
        lc.approve(admin()).unwrap();
        assert_eq!(lc.status, OrderStatus::Approved);
        assert_eq!(lc.version, 2);
    }

    #[test]
    fn approve_twice_fails_and_does_not_bump_version() {
        let mut lc = submitted();
        lc.approve(admin()).unwrap();
        let err = lc.approve(admin()).unwrap_err();
        assert!(matches!(err, TransitionError::InvalidTransition { .. }));
        assert_eq!(lc.version, 2);
    }

    #[test]
    fn delivered_order_cannot_be_approved() {
        let mut lc = Lifecycle::restore(OrderStatus::Delivered, 9, Vec::new());
        let err = lc.approve(admin()).unwrap_err();
        assert_eq!(
            err,
            TransitionError::Terminal {
                kind: "order",
                state: "delivered".into()
            }
        );
    }

    #[test]
    fn reject_requires_reason() {
        let mut lc = submitted();
        assert!(matches!(
            lc.reject(admin()),
            Err(TransitionError::ReasonRequired { .. })
        ));
        assert_eq!(lc.status, OrderStatus::Submitted);

        lc.reject(admin().with_reason("missing certificate"))
            .unwrap();
        assert_eq!(lc.status, OrderStatus::Rejected);
        assert_eq!(
            lc.last_transition().unwrap().reason.as_deref(),
            Some("missing certificate")
        );
    }

    #[test]
    fn cancel_allowed_until_payment_confirmed() {
        for start in [
            OrderStatus::Draft,
            OrderStatus::Submitted,
            OrderStatus::PendingVerification,
            OrderStatus::Approved,
            OrderStatus::PaymentPending,
        ] {
            let mut lc = Lifecycle::new(start);
            lc.cancel(admin().with_reason("changed mind")).unwrap();
            assert_eq!(lc.status, OrderStatus::Cancelled);
        }

        let mut paid = Lifecycle::new(OrderStatus::PaymentConfirmed);
        assert!(paid.cancel(admin().with_reason("too late")).is_err());
    }

    #[test]
    fn deliver_only_from_ready() {
        let mut lc = Lifecycle::new(OrderStatus::InProduction);
        assert!(lc.deliver(admin()).is_err());
        lc.mark_ready(admin()).unwrap();
        lc.deliver(admin()).unwrap();
    }

    #[test]
    fn every_transition_target_is_a_known_status() {
        for status in OrderStatus::all() {
            for target in status.allowed_transitions() {
                assert!(OrderStatus::all().contains(target));
                assert_ne!(status, target);
            }
        }
    }

    #[test]
    fn terminal_statuses() {
        let terminal: Vec<_> = OrderStatus::all()
            .iter()
            .filter(|s| s.is_terminal())
            .copied()
            .collect();
        assert_eq!(
            terminal,
            vec![
                OrderStatus::Delivered,
                OrderStatus::Cancelled,
                OrderStatus::Rejected
            ]
        );
    }

    #[test]
    fn serde_matches_as_str() {
        for status in OrderStatus::all() {
            let json = serde_json::to_string(status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn reviewable_statuses() {
        assert!(OrderStatus::Submitted.is_reviewable());
        assert!(OrderStatus::PendingVerification.is_reviewable());
        assert!(!OrderStatus::Approved.is_reviewable());
        assert!(OrderStatus::Approved.is_open());
        assert!(!OrderStatus::Delivered.is_open());
    }
}
