//! # Catalogue Entry Lifecycle
//!
//! Status of one taxpayer/product pair. Only `Active` entries may be
//! ordered against. `Rejected` returns to `Pending` when a new certificate
//! is uploaded, and `Expired` returns to `Pending` on renewal.

use serde::{Deserialize, Serialize};

use crate::lifecycle::{Lifecycle, LifecycleState, TransitionError, TransitionEvidence};

/// Status of a taxpayer's catalogue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogueStatus {
    /// Awaiting review.
    Pending,
    /// Orderable.
    Active,
    /// Refused.
    Rejected,
    /// Temporarily withdrawn.
    Suspended,
    /// Certificate lapsed.
    Expired,
}

impl CatalogueStatus {
    /// Whether orders may reference this entry.
    pub fn is_orderable(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl LifecycleState for CatalogueStatus {
    const KIND: &'static str = "catalogue entry";

    fn all() -> &'static [Self] {
        use CatalogueStatus::*;
        &[Pending, Active, Rejected, Suspended, Expired]
    }

    fn allowed_transitions(self) -> &'static [Self] {
        use CatalogueStatus::*;
        match self {
            Pending => &[Active, Rejected],
            Active => &[Suspended, Expired],
            Suspended => &[Active, Expired],
            Rejected => &[Pending],
            Expired => &[Pending],
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Rejected => "rejected",
            Self::Suspended => "suspended",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for CatalogueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Lifecycle<CatalogueStatus> {
    /// Move to `to`, requiring a reason for rejection and suspension.
    pub fn set_status(
        &mut self,
        to: CatalogueStatus,
        evidence: TransitionEvidence,
    ) -> Result<(), TransitionError> {
        match to {
            CatalogueStatus::Rejected | CatalogueStatus::Suspended => {
                self.transition_with_reason(to, evidence).map(drop)
            }
            _ => self.transition(to, evidence).map(drop),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_to_active_is_orderable() {
        let mut lc = Lifecycle::new(CatalogueStatus::Pending);
        assert!(!lc.status.is_orderable());
        lc.set_status(CatalogueStatus::Active, TransitionEvidence::by("admin"))
            .unwrap();
        assert!(lc.status.is_orderable());
    }

    #[test]
    fn suspension_needs_reason() {
        let mut lc = Lifecycle::new(CatalogueStatus::Active);
        assert!(lc
            .set_status(CatalogueStatus::Suspended, TransitionEvidence::by("admin"))
            .is_err());
        lc.set_status(
            CatalogueStatus::Suspended,
            TransitionEvidence::by("admin").with_reason("certificate under review"),
        )
        .unwrap();
        assert_eq!(lc.status, CatalogueStatus::Suspended);
    }

    #[test]
    fn expired_entry_renews_through_pending() {
        let mut lc = Lifecycle::new(CatalogueStatus::Expired);
        assert!(lc
            .set_status(CatalogueStatus::Active, TransitionEvidence::default())
            .is_err());
        lc.set_status(CatalogueStatus::Pending, TransitionEvidence::default())
            .unwrap();
        lc.set_status(CatalogueStatus::Active, TransitionEvidence::default())
            .unwrap();
        assert_eq!(lc.version, 3);
    }
}
