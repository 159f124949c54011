//! # rsm-state — Lifecycle State Machines
//!
//! Every status field in the revenue stamp service is a closed enum with a
//! single transition table. A status change goes through
//! [`Lifecycle::transition`], which checks the table, bumps the version and
//! appends a [`TransitionRecord`]. No code path writes a status directly.
//!
//! ## State Machines
//!
//! - **Order** (`order.rs`): `draft → submitted → (pending_verification) →
//!   approved → payment_pending → payment_confirmed → in_production →
//!   ready_for_delivery → delivered`, with `rejected` and `cancelled` exits.
//!
//! - **Registration** (`registration.rs`): taxpayer verification workflow
//!   `pending → verified → active ⇄ suspended`, with `rejected`.
//!
//! - **Catalogue** (`catalogue.rs`): per taxpayer/product entry
//!   `pending → active ⇄ suspended`, `rejected`, `expired`.
//!
//! - **Stamp** (`stamp.rs`): `produced → activated → used`, with `lost` and
//!   `void`.
//!
//! - **Payment** (`payment.rs`): `pending → confirmed | cancelled`.
//!
//! ## Versioning
//!
//! [`Lifecycle::version`] increases by one on every transition. Callers that
//! read a record and later act on it pass the version they saw; a mismatch
//! fails with [`TransitionError::VersionMismatch`] instead of silently
//! applying a second approval on top of the first.

pub mod catalogue;
pub mod lifecycle;
pub mod order;
pub mod payment;
pub mod registration;
pub mod stamp;

pub use catalogue::CatalogueStatus;
pub use lifecycle::{
    Lifecycle, LifecycleState, TransitionError, TransitionEvidence, TransitionRecord,
    MAX_REASON_LEN,
};
pub use order::OrderStatus;
pub use payment::PaymentStatus;
pub use registration::RegistrationStatus;
pub use stamp::StampStatus;
