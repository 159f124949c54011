//! # Numbers and Codes
//!
//! Human-facing identifiers derived from record UUIDs:
//!
//! | Kind            | Format                              |
//! |-----------------|-------------------------------------|
//! | Order number    | `ORD-YYYYMMDD-XXXXXXXX`             |
//! | Payment ref     | `NP-YYYYMMDD-XXXXXXXX` (Note de Perception) |
//! | Stamp serial    | `{TYPE}-{ORDER32}-{seq:06}`         |
//!
//! `XXXXXXXX` is the first eight hex digits of the record UUID, upper-cased.
//! Order numbers and payment references can therefore collide and are
//! checked for uniqueness when issued. `ORDER32` is the whole order UUID, so
//! serials of different orders never share a prefix. A stamp's verification
//! code is the first 16 hex characters of `SHA-256("{serial}|{order_uuid}")`.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Fresh identifiers tried before giving up on a unique number.
pub const ISSUE_ATTEMPTS: usize = 4;

fn short_hex(id: &Uuid) -> String {
    id.simple().to_string()[..8].to_ascii_uppercase()
}

/// `ORD-20260115-1A2B3C4D`.
pub fn order_number(id: &Uuid, at: DateTime<Utc>) -> String {
    format!("ORD-{}-{}", at.format("%Y%m%d"), short_hex(id))
}

/// `NP-20260115-1A2B3C4D`.
pub fn payment_reference(id: &Uuid, at: DateTime<Utc>) -> String {
    format!("NP-{}-{}", at.format("%Y%m%d"), short_hex(id))
}

/// `TAB-1A2B3C4D000040008000000000000000-000001`. `type_code` is upper-cased
/// and stripped of anything but ASCII alphanumerics.
pub fn stamp_serial(type_code: &str, order_id: &Uuid, seq: u32) -> String {
    let code: String = type_code
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    format!(
        "{}-{}-{:06}",
        code,
        order_id.simple().to_string().to_ascii_uppercase(),
        seq
    )
}

/// First 16 hex characters of `SHA-256("{serial}|{order_id}")`.
pub fn verification_code(serial: &str, order_id: &Uuid) -> String {
    let digest = Sha256::digest(format!("{serial}|{order_id}").as_bytes());
    digest
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}
