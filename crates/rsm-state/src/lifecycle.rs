//! # Generic Lifecycle
//!
//! [`Lifecycle<S>`] owns the current status, the version counter and the
//! ordered transition log for any status enum implementing
//! [`LifecycleState`]. The per-domain modules add named operations
//! (`approve`, `suspend`, …) on top of [`Lifecycle::transition`].

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use rsm_core::Timestamp;

/// Longest accepted free-text reason for rejections, cancellations and
/// suspensions.
pub const MAX_REASON_LEN: usize = 500;

/// A closed set of statuses with a static transition table.
pub trait LifecycleState:
    Copy + Eq + std::fmt::Debug + std::fmt::Display + Send + Sync + 'static
{
    /// Human-readable machine name used in error messages ("order", "stamp").
    const KIND: &'static str;

    /// JSON field name the status is serialized under.
    const STATUS_FIELD: &'static str = "status";

    /// Every status, in declaration order.
    fn all() -> &'static [Self];

    /// Statuses reachable in one step from `self`.
    fn allowed_transitions(self) -> &'static [Self];

    /// The persisted string form (`snake_case`).
    fn as_str(self) -> &'static str;

    /// Whether `to` is reachable in one step.
    fn can_transition_to(self, to: Self) -> bool {
        self.allowed_transitions().contains(&to)
    }

    /// A status with no outgoing transitions.
    fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Parse the persisted string form.
    fn parse(value: &str) -> Result<Self, TransitionError> {
        Self::all()
            .iter()
            .copied()
            .find(|s| s.as_str() == value)
            .ok_or_else(|| TransitionError::UnknownState {
                kind: Self::KIND,
                value: value.to_string(),
            })
    }
}

/// Errors raised by lifecycle operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The target status is not in the transition table for the current one.
    #[error("invalid {kind} transition: {from} -> {to}")]
    InvalidTransition {
        /// Machine name.
        kind: &'static str,
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// The record is in a terminal status.
    #[error("{kind} is in terminal state {state}")]
    Terminal {
        /// Machine name.
        kind: &'static str,
        /// The terminal status.
        state: String,
    },

    /// The transition needs a reason and none was given.
    #[error("a reason is required to move {kind} to {to}")]
    ReasonRequired {
        /// Machine name.
        kind: &'static str,
        /// Requested status.
        to: String,
    },

    /// The reason exceeds [`MAX_REASON_LEN`].
    #[error("reason is {len} characters, maximum is {max}")]
    ReasonTooLong {
        /// Supplied length in characters.
        len: usize,
        /// Allowed maximum.
        max: usize,
    },

    /// The caller acted on a stale read.
    #[error("{kind} version mismatch: expected {expected}, current {current}")]
    VersionMismatch {
        /// Machine name.
        kind: &'static str,
        /// Version the caller saw.
        expected: i64,
        /// Version on record.
        current: i64,
    },

    /// A persisted status string does not name a known status.
    #[error("unknown {kind} status {value:?}")]
    UnknownState {
        /// Machine name.
        kind: &'static str,
        /// The unrecognized value.
        value: String,
    },
}

/// Who asked for a transition, and why.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionEvidence {
    /// Acting principal (role and subject, e.g. `admin` or `agent:<uuid>`).
    pub actor: Option<String>,
    /// Free-text justification.
    pub reason: Option<String>,
}

impl TransitionEvidence {
    /// Evidence naming only the actor.
    pub fn by(actor: impl Into<String>) -> Self {
        Self {
            actor: Some(actor.into()),
            reason: None,
        }
    }

    /// Attach a reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// One entry in a transition log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord<S> {
    /// Status before.
    pub from: S,
    /// Status after.
    pub to: S,
    /// Version after the transition.
    pub version: i64,
    /// When it happened.
    pub at: Timestamp,
    /// Who did it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    /// Why.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Current status, version and history of one record.
///
/// Serializes as `{ <STATUS_FIELD>, version, transitions }`, so it can be
/// `#[serde(flatten)]`ed into the owning record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lifecycle<S> {
    /// Current status.
    pub status: S,
    /// Starts at 1, incremented on every transition.
    pub version: i64,
    /// Ordered transition log.
    pub transitions: Vec<TransitionRecord<S>>,
}

impl<S: LifecycleState + Serialize> Serialize for Lifecycle<S> {
    fn serialize<Z: Serializer>(&self, serializer: Z) -> Result<Z::Ok, Z::Error> {
        let mut st = serializer.serialize_struct("Lifecycle", 3)?;
        st.serialize_field(S::STATUS_FIELD, &self.status)?;
        st.serialize_field("version", &self.version)?;
        st.serialize_field("transitions", &self.transitions)?;
        st.end()
    }
}

impl<S: LifecycleState> Lifecycle<S> {
    /// A fresh lifecycle in `initial`, version 1, empty history.
    pub fn new(initial: S) -> Self {
        Self {
            status: initial,
            version: 1,
            transitions: Vec::new(),
        }
    }

    /// Rebuild a lifecycle loaded from storage.
    pub fn restore(status: S, version: i64, transitions: Vec<TransitionRecord<S>>) -> Self {
        Self {
            status,
            version,
            transitions,
        }
    }

    /// Whether the current status is terminal.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The most recent transition, if any.
    pub fn last_transition(&self) -> Option<&TransitionRecord<S>> {
        self.transitions.last()
    }

    /// Fail unless `expected` is absent or equal to the current version.
    pub fn check_version(&self, expected: Option<i64>) -> Result<(), TransitionError> {
        match expected {
            Some(expected) if expected != self.version => Err(TransitionError::VersionMismatch {
                kind: S::KIND,
                expected,
                current: self.version,
            }),
            _ => Ok(()),
        }
    }

    /// Move to `to` if the transition table allows it.
    pub fn transition(
        &mut self,
        to: S,
        evidence: TransitionEvidence,
    ) -> Result<&TransitionRecord<S>, TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal {
                kind: S::KIND,
                state: self.status.to_string(),
            });
        }
        if !self.status.can_transition_to(to) {
            return Err(TransitionError::InvalidTransition {
                kind: S::KIND,
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }

        self.version += 1;
        self.transitions.push(TransitionRecord {
            from: self.status,
            to,
            version: self.version,
            at: Timestamp::now(),
            actor: evidence.actor,
            reason: evidence.reason,
        });
        self.status = to;
        Ok(&self.transitions[self.transitions.len() - 1])
    }

    /// Like [`transition`](Self::transition), but the evidence must carry a
    /// non-empty reason of at most [`MAX_REASON_LEN`] characters.
    pub fn transition_with_reason(
        &mut self,
        to: S,
        mut evidence: TransitionEvidence,
    ) -> Result<&TransitionRecord<S>, TransitionError> {
        let reason = validate_reason::<S>(evidence.reason.as_deref(), to)?;
        evidence.reason = Some(reason);
        self.transition(to, evidence)
    }
}

/// Trim and bound-check a transition reason.
pub fn validate_reason<S: LifecycleState>(
    reason: Option<&str>,
    to: S,
) -> Result<String, TransitionError> {
    let reason = reason.map(str::trim).unwrap_or_default();
    if reason.is_empty() {
        return Err(TransitionError::ReasonRequired {
            kind: S::KIND,
            to: to.to_string(),
        });
    }
    let len = reason.chars().count();
    if len > MAX_REASON_LEN {
        return Err(TransitionError::ReasonTooLong {
            len,
            max: MAX_REASON_LEN,
        });
    }
    Ok(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PaymentStatus;

    #[test]
    fn new_lifecycle_starts_at_version_one() {
        let lc = Lifecycle::new(PaymentStatus::Pending);
        assert_eq!(lc.version, 1);
        assert!(lc.transitions.is_empty());
        assert!(lc.last_transition().is_none());
    }

    #[test]
    fn transition_records_history_and_bumps_version() {
        let mut lc = Lifecycle::new(PaymentStatus::Pending);
        let record = lc
            .transition(PaymentStatus::Confirmed, TransitionEvidence::by("admin"))
            .unwrap()
            .clone();
        assert_eq!(record.from, PaymentStatus::Pending);
        assert_eq!(record.to, PaymentStatus::Confirmed);
        assert_eq!(record.version, 2);
        assert_eq!(record.actor.as_deref(), Some("admin"));
        assert_eq!(lc.status, PaymentStatus::Confirmed);
        assert_eq!(lc.version, 2);
    }

    #[test]
    fn terminal_state_rejects_everything() {
        let mut lc = Lifecycle::new(PaymentStatus::Pending);
        lc.transition(PaymentStatus::Cancelled, TransitionEvidence::default())
            .unwrap();
        let err = lc
            .transition(PaymentStatus::Confirmed, TransitionEvidence::default())
            .unwrap_err();
        assert!(matches!(err, TransitionError::Terminal { .. }));
        assert_eq!(lc.version, 2);
    }

    #[test]
    fn self_transition_is_invalid() {
        let mut lc = Lifecycle::new(PaymentStatus::Pending);
        let err = lc
            .transition(PaymentStatus::Pending, TransitionEvidence::default())
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError::InvalidTransition {
                kind: "payment",
                from: "pending".into(),
                to: "pending".into(),
            }
        );
    }

    #[test]
    fn check_version_accepts_none_and_match() {
        let lc = Lifecycle::new(PaymentStatus::Pending);
        assert!(lc.check_version(None).is_ok());
        assert!(lc.check_version(Some(1)).is_ok());
        let err = lc.check_version(Some(7)).unwrap_err();
        assert!(err.to_string().contains("expected 7, current 1"));
    }

    #[test]
    fn reason_is_trimmed_and_bounded() {
        assert_eq!(
            validate_reason(Some("  duplicate  "), PaymentStatus::Cancelled).unwrap(),
            "duplicate"
        );
        assert!(matches!(
            validate_reason(Some("   "), PaymentStatus::Cancelled),
            Err(TransitionError::ReasonRequired { .. })
        ));
        assert!(matches!(
            validate_reason(None, PaymentStatus::Cancelled),
            Err(TransitionError::ReasonRequired { .. })
        ));
        let long = "x".repeat(MAX_REASON_LEN + 1);
        assert_eq!(
            validate_reason(Some(&long), PaymentStatus::Cancelled),
            Err(TransitionError::ReasonTooLong {
                len: MAX_REASON_LEN + 1,
                max: MAX_REASON_LEN
            })
        );
        let exact = "y".repeat(MAX_REASON_LEN);
        assert!(validate_reason(Some(&exact), PaymentStatus::Cancelled).is_ok());
    }

    #[test]
    fn parse_roundtrips_every_status() {
        for status in PaymentStatus::all() {
            assert_eq!(PaymentStatus::parse(status.as_str()).unwrap(), *status);
        }
        assert!(matches!(
            PaymentStatus::parse("refunded"),
            Err(TransitionError::UnknownState { .. })
        ));
    }

    #[test]
    fn lifecycle_serializes_status_in_snake_case() {
        let lc = Lifecycle::new(PaymentStatus::Pending);
        let json = serde_json::to_value(&lc).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["version"], 1);
    }
}
