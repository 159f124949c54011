//! # Stamp Lifecycle
//!
//! ```text
//! Produced ──▶ Activated ──▶ Used
//!    │             │
//!    └──▶ Lost / Void ◀──┘
//! ```

use serde::{Deserialize, Serialize};

use crate::lifecycle::{Lifecycle, LifecycleState, TransitionError, TransitionEvidence};

/// Status of an individual stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StampStatus {
    /// Printed or issued, not yet affixed.
    Produced,
    /// Affixed to a product and live.
    Activated,
    /// Consumed at point of sale (terminal).
    Used,
    /// Reported lost (terminal).
    Lost,
    /// Cancelled by an agent (terminal).
    Void,
}

impl StampStatus {
    /// Whether a public verification should report the stamp as genuine and live.
    pub fn is_valid(self) -> bool {
        matches!(self, Self::Produced | Self::Activated)
    }
}

impl LifecycleState for StampStatus {
    const KIND: &'static str = "stamp";

    fn all() -> &'static [Self] {
        use StampStatus::*;
        &[Produced, Activated, Used, Lost, Void]
    }

    fn allowed_transitions(self) -> &'static [Self] {
        use StampStatus::*;
        match self {
            Produced => &[Activated, Lost, Void],
            Activated => &[Used, Lost, Void],
            Used | Lost | Void => &[],
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Produced => "produced",
            Self::Activated => "activated",
            Self::Used => "used",
            Self::Lost => "lost",
            Self::Void => "void",
        }
    }
}

impl std::fmt::Display for StampStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Lifecycle<StampStatus> {
    /// `Produced → Activated`.
    pub fn activate(&mut self, evidence: TransitionEvidence) -> Result<(), TransitionError> {
        self.transition(StampStatus::Activated, evidence).map(drop)
    }

    /// `Activated → Used`.
    pub fn mark_used(&mut self, evidence: TransitionEvidence) -> Result<(), TransitionError> {
        self.transition(StampStatus::Used, evidence).map(drop)
    }

    /// `Produced | Activated → Lost`.
    pub fn report_lost(&mut self, evidence: TransitionEvidence) -> Result<(), TransitionError> {
        self.transition(StampStatus::Lost, evidence).map(drop)
    }

    /// `Produced | Activated → Void`. Requires a reason.
    pub fn void(&mut self, evidence: TransitionEvidence) -> Result<(), TransitionError> {
        self.transition_with_reason(StampStatus::Void, evidence)
            .map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produced_stamp_cannot_be_used_before_activation() {
        let mut lc = Lifecycle::new(StampStatus::Produced);
        assert!(lc.mark_used(TransitionEvidence::default()).is_err());
        lc.activate(TransitionEvidence::default()).unwrap();
        lc.mark_used(TransitionEvidence::default()).unwrap();
        assert!(lc.is_terminal());
        assert!(!lc.status.is_valid());
    }

    #[test]
    fn lost_is_terminal() {
        let mut lc = Lifecycle::new(StampStatus::Activated);
        lc.report_lost(TransitionEvidence::by("taxpayer")).unwrap();
        assert!(matches!(
            lc.activate(TransitionEvidence::default()),
            Err(TransitionError::Terminal { .. })
        ));
    }

    #[test]
    fn void_requires_reason() {
        let mut lc = Lifecycle::new(StampStatus::Produced);
        assert!(lc.void(TransitionEvidence::by("agent")).is_err());
        lc.void(TransitionEvidence::by("agent").with_reason("misprint"))
            .unwrap();
        assert_eq!(lc.status, StampStatus::Void);
    }
}
