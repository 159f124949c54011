//! # Identifier Newtypes
//!
//! Newtype wrappers for every record identifier. These prevent accidental
//! identifier confusion: a handler that expects a `ProductId` will not
//! accept an `OrderId`.
//!
//! The UUID-backed identifiers serialize transparently as the bare UUID so
//! they line up with the `uuid` columns in Postgres and the JSON API.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Serde `Deserialize` that routes through the validating `new()` constructor.
macro_rules! impl_validating_deserialize {
    ($ty:ident) => {
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::new(raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

/// UUID newtype with `new()`, `from_uuid()`, `as_uuid()` and a
/// `kind:uuid` display form.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $ty:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $ty(Uuid);

        impl $ty {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $ty {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$ty> for Uuid {
            fn from(id: $ty) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

uuid_id!(
    /// A registered business obligated to purchase revenue stamps.
    TaxpayerId,
    "taxpayer"
);
uuid_id!(
    /// A catalogue product subject to stamping.
    ProductId,
    "product"
);
uuid_id!(
    /// A kind of stamp (physical label, digital code).
    StampTypeId,
    "stamp-type"
);
uuid_id!(
    /// A stamp order.
    OrderId,
    "order"
);
uuid_id!(
    /// A payment intent tied to exactly one order.
    PaymentId,
    "payment"
);
uuid_id!(
    /// A single produced stamp.
    StampId,
    "stamp"
);
uuid_id!(
    /// A field inspection record.
    FieldControlId,
    "field-control"
);

// ---------------------------------------------------------------------------
// Tax identification number
// ---------------------------------------------------------------------------

/// Tax identification number (NIF) of a taxpayer.
///
/// Stored trimmed and upper-cased. 5 to 20 characters drawn from ASCII
/// alphanumerics, `-` and `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TaxIdentificationNumber(String);

impl TaxIdentificationNumber {
    /// Minimum accepted length after trimming.
    pub const MIN_LEN: usize = 5;
    /// Maximum accepted length after trimming.
    pub const MAX_LEN: usize = 20;

    /// Validate and normalize a tax identification number.
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        let normalized = raw.trim().to_ascii_uppercase();
        let reject = |reason: &str| ValidationError::InvalidTaxId {
            value: raw.clone(),
            reason: reason.to_string(),
        };

        if normalized.len() < Self::MIN_LEN || normalized.len() > Self::MAX_LEN {
            return Err(reject("must be between 5 and 20 characters"));
        }
        if !normalized
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '/')
        {
            return Err(reject("only letters, digits, '-' and '/' are allowed"));
        }
        if !normalized.chars().any(|c| c.is_ascii_digit()) {
            return Err(reject("must contain at least one digit"));
        }
        Ok(Self(normalized))
    }

    /// Return the normalized value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl_validating_deserialize!(TaxIdentificationNumber);

impl std::fmt::Display for TaxIdentificationNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_ids_are_distinct() {
        assert_ne!(OrderId::new(), OrderId::new());
    }

    #[test]
    fn uuid_id_display_carries_kind() {
        let uuid = Uuid::nil();
        assert_eq!(
            TaxpayerId::from_uuid(uuid).to_string(),
            "taxpayer:00000000-0000-0000-0000-000000000000"
        );
        assert!(StampTypeId::from(uuid).to_string().starts_with("stamp-type:"));
    }

    #[test]
    fn uuid_id_serializes_as_bare_uuid() {
        let id = ProductId::from_uuid(Uuid::nil());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"00000000-0000-0000-0000-000000000000\"");
        let back: ProductId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn tax_id_is_normalized() {
        let nif = TaxIdentificationNumber::new("  a1234567b ").unwrap();
        assert_eq!(nif.as_str(), "A1234567B");
    }

    #[test]
    fn tax_id_accepts_separators() {
        assert!(TaxIdentificationNumber::new("01-2345/K").is_ok());
    }

    #[test]
    fn tax_id_rejects_short_and_long() {
        assert!(TaxIdentificationNumber::new("A12").is_err());
        assert!(TaxIdentificationNumber::new("1".repeat(21)).is_err());
    }

    #[test]
    fn tax_id_rejects_bad_characters() {
        let err = TaxIdentificationNumber::new("A12 345").unwrap_err();
        assert!(err.to_string().contains("only letters"));
    }

    #[test]
    fn tax_id_requires_a_digit() {
        assert!(TaxIdentificationNumber::new("ABCDEF").is_err());
    }

    #[test]
    fn tax_id_deserialize_validates() {
        assert!(serde_json::from_str::<TaxIdentificationNumber>("\"A1\"").is_err());
        let ok: TaxIdentificationNumber = serde_json::from_str("\"a10001\"").unwrap();
        assert_eq!(ok.as_str(), "A10001");
    }
}
