//! # rsm-core — Foundational Types for the Revenue Stamp Service
//!
//! Every other crate in the workspace depends on `rsm-core`; it depends on
//! nothing internal.
//!
//! ## Contents
//!
//! - **Identifiers** (`identity.rs`): UUID newtypes for every record kind
//!   plus the validated [`TaxIdentificationNumber`]. An `OrderId` cannot be
//!   passed where a `TaxpayerId` is expected.
//!
//! - **Money** (`money.rs`): amounts are `i64` minor units (cents), rates are
//!   basis points. No floating point touches a monetary value; the only
//!   `f64` in this crate is the rounded percentage used for compliance ratios.
//!
//! - **Pricing** (`pricing.rs`): [`OrderPricing`] fixes unit price, total,
//!   tax and grand total when an order is created.
//!
//! - **Time** (`temporal.rs`): UTC-only [`Timestamp`] truncated to seconds,
//!   used in lifecycle transition logs.
//!
//! - **Errors** (`error.rs`): `thiserror` hierarchy shared by the state
//!   machines and the API layer.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `rsm-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod identity;
pub mod money;
pub mod pricing;
pub mod temporal;

pub use error::{RsmError, ValidationError};
pub use identity::{
    FieldControlId, OrderId, PaymentId, ProductId, StampId, StampTypeId, TaxIdentificationNumber,
    TaxpayerId,
};
pub use money::{apply_rate_bps, format_amount, line_total, parse_amount, percentage, Cents};
pub use pricing::OrderPricing;
pub use temporal::Timestamp;
