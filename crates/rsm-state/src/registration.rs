//! # Taxpayer Registration Lifecycle
//!
//! ```text
//! Pending ──▶ Verified ──▶ Active ◀──▶ Suspended
//!   │  ▲          │                       ▲
//!   ▼  │          └───────────────────────┘
//! Rejected
//! ```
//!
//! No status is terminal: a rejected registration can be resubmitted and a
//! suspension can be lifted.

use serde::{Deserialize, Serialize};

use crate::lifecycle::{Lifecycle, LifecycleState, TransitionError, TransitionEvidence};

/// Verification status of a taxpayer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// Awaiting document review.
    Pending,
    /// Documents checked.
    Verified,
    /// Refused; may resubmit.
    Rejected,
    /// Trading.
    Active,
    /// Temporarily barred.
    Suspended,
}

impl RegistrationStatus {
    /// Whether the taxpayer may place stamp orders.
    pub fn can_order(self) -> bool {
        matches!(self, Self::Verified | Self::Active)
    }
}

impl LifecycleState for RegistrationStatus {
    const KIND: &'static str = "taxpayer";
    const STATUS_FIELD: &'static str = "registration_status";

    fn all() -> &'static [Self] {
        use RegistrationStatus::*;
        &[Pending, Verified, Rejected, Active, Suspended]
    }

    fn allowed_transitions(self) -> &'static [Self] {
        use RegistrationStatus::*;
        match self {
            Pending => &[Verified, Rejected],
            Rejected => &[Pending],
            Verified => &[Active, Suspended],
            Active => &[Suspended],
            Suspended => &[Active],
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
            Self::Active => "active",
            Self::Suspended => "suspended",
        }
    }
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Lifecycle<RegistrationStatus> {
    /// `Pending → Verified`.
    pub fn verify(&mut self, evidence: TransitionEvidence) -> Result<(), TransitionError> {
        self.transition(RegistrationStatus::Verified, evidence)
            .map(drop)
    }

    /// `Pending → Rejected`. Requires a reason.
    pub fn reject(&mut self, evidence: TransitionEvidence) -> Result<(), TransitionError> {
        self.transition_with_reason(RegistrationStatus::Rejected, evidence)
            .map(drop)
    }

    /// `Verified | Suspended → Active`.
    pub fn activate(&mut self, evidence: TransitionEvidence) -> Result<(), TransitionError> {
        self.transition(RegistrationStatus::Active, evidence)
            .map(drop)
    }

    /// `Verified | Active → Suspended`. Requires a reason.
    pub fn suspend(&mut self, evidence: TransitionEvidence) -> Result<(), TransitionError> {
        self.transition_with_reason(RegistrationStatus::Suspended, evidence)
            .map(drop)
    }

    /// `Rejected → Pending`.
    pub fn resubmit(&mut self, evidence: TransitionEvidence) -> Result<(), TransitionError> {
        self.transition(RegistrationStatus::Pending, evidence)
            .map(drop)
    }
}
