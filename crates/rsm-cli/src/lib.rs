//! # rsm-cli — Revenue Stamp Management Command-Line Interface
//!
//! Operator tooling that runs without the HTTP service.
//!
//! ## Subcommands
//!
//! - `transitions` — Print a lifecycle's statuses and legal transitions
//! - `quote` — Price an order with the service's arithmetic
//! - `migrate` — Apply the embedded database migrations
//! - `audit-verify` — Check the audit log hash chain
//!
//! Handlers return `anyhow::Result<u8>`; the value is the process exit code.

pub mod database;
pub mod quote;
pub mod transitions;
