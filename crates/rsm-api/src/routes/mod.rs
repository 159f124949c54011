//! # Route Modules
//!
//! Each module defines an Axum Router for one API surface area.
//! Routers are assembled in `lib.rs` into the application.

pub mod catalogue;
pub mod dashboard;
pub mod field_controls;
pub mod home;
pub mod orders;
pub mod payments;
pub mod products;
pub mod stamp_types;
pub mod stamps;
pub mod taxpayers;

use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;

use metrics::counter;
use rsm_state::{LifecycleState, TransitionEvidence};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::CallerIdentity;
use crate::db::persist_error;
use crate::error::{AppError, FieldErrors};
use crate::state::Store;

/// Body of lifecycle action endpoints (`/approve`, `/suspend`, …).
///
/// The body may be empty. `reason` is required by rejecting, cancelling,
/// suspending and voiding actions; `expected_version` turns the action into
/// a compare-and-set.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ActionRequest {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

impl ActionRequest {
    /// Evidence naming the caller and carrying the supplied reason.
    pub fn evidence(&self, caller: &CallerIdentity) -> TransitionEvidence {
        let evidence = caller.evidence();
        match &self.reason {
            Some(reason) => evidence.with_reason(reason.clone()),
            None => evidence,
        }
    }
}

/// Count one lifecycle transition.
pub(crate) fn record_transition<S: LifecycleState>(to: S) {
    counter!(
        "rsm_lifecycle_transitions_total",
        "kind" => S::KIND,
        "to" => to.as_str()
    )
    .increment(1);
}

/// Await the database write for a record just changed in `store`.
///
/// On failure the in-memory change is undone with [`Store::revert`]
/// (`previous = None` undoes an insert) and the error becomes a 500.
pub(crate) async fn persist_or_revert<K, V>(
    store: &Store<K, V>,
    id: &K,
    previous: Option<V>,
    written: &V,
    what: &str,
    write: impl Future<Output = Result<(), sqlx::Error>>,
) -> Result<(), AppError>
where
    K: Eq + Hash + Clone + Send + Sync + Display,
    V: Clone + PartialEq + Send + Sync,
{
    if let Err(e) = write.await {
        store.revert(id, previous, written);
        return Err(persist_error(what, id, e));
    }
    Ok(())
}

/// Trim, and treat blank as absent.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Append a message to a field's error list.
pub(crate) fn push_error(errors: &mut FieldErrors, field: &str, message: impl Into<String>) {
    errors
        .entry(field.to_string())
        .or_default()
        .push(message.into());
}

/// A non-blank value, or a "required" error for `field`.
pub(crate) fn required(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<String>,
) -> Option<String> {
    let value = non_blank(value);
    if value.is_none() {
        push_error(
            errors,
            field,
            format!("The {} field is required.", field.replace('_', " ")),
        );
    }
    value
}

/// Reject values longer than `max` characters.
pub(crate) fn check_max_len(errors: &mut FieldErrors, field: &str, value: Option<&str>, max: usize) {
    if value.is_some_and(|v| v.chars().count() > max) {
        push_error(
            errors,
            field,
            format!(
                "The {} may not be greater than {max} characters.",
                field.replace('_', " ")
            ),
        );
    }
}

/// `Ok(())` when no field failed.
pub(crate) fn field_errors_result(errors: FieldErrors) -> Result<(), AppError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::FieldValidation(errors))
    }
}

/// Minimal address shape check: one `@`, a non-empty local part and a
/// dotted domain, no whitespace.
pub(crate) fn is_valid_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("contact@brasserie.example"));
        assert!(!is_valid_email("contact"));
        assert!(!is_valid_email("@brasserie.example"));
        assert!(!is_valid_email("a@b@c.example"));
        assert!(!is_valid_email("a@localhost"));
        assert!(!is_valid_email("a b@c.example"));
        assert!(!is_valid_email("a@c.example."));
    }

    #[test]
    fn required_collects_messages() {
        let mut errors = FieldErrors::new();
        assert_eq!(required(&mut errors, "phone", Some(" 0812 ".into())).as_deref(), Some("0812"));
        assert!(required(&mut errors, "company_name", Some("   ".into())).is_none());
        assert!(required(&mut errors, "email", None).is_none());
        assert_eq!(
            errors["company_name"],
            vec!["The company name field is required.".to_string()]
        );
        assert!(errors.contains_key("email"));
        assert!(!errors.contains_key("phone"));
    }

    #[test]
    fn max_len_counts_chars() {
        let mut errors = FieldErrors::new();
        check_max_len(&mut errors, "city", Some("Mbandaka"), 8);
        assert!(errors.is_empty());
        check_max_len(&mut errors, "city", Some("Lubumbashi"), 8);
        assert_eq!(errors["city"].len(), 1);
    }

    #[test]
    fn action_evidence_carries_reason() {
        let action = ActionRequest {
            reason: Some("stale certificate".into()),
            expected_version: None,
        };
        let evidence = action.evidence(&CallerIdentity::admin());
        assert_eq!(evidence.actor.as_deref(), Some("admin"));
        assert_eq!(evidence.reason.as_deref(), Some("stale certificate"));
    }
}
