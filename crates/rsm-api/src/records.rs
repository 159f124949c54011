//! # Record Types
//!
//! The in-memory representation of every persisted row. Records embed their
//! [`Lifecycle`] with `#[serde(flatten)]`, so the JSON form carries the
//! status, `version` and `transitions` at the top level.

use chrono::{DateTime, NaiveDate, Utc};
use rsm_core::{
    percentage, Cents, FieldControlId, OrderId, PaymentId, ProductId, StampId, StampTypeId,
    TaxIdentificationNumber, TaxpayerId,
};
use rsm_state::{
    CatalogueStatus, Lifecycle, OrderStatus, PaymentStatus, RegistrationStatus, StampStatus,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// -- Taxpayer -----------------------------------------------------------------

/// A registered business.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Taxpayer {
    pub id: TaxpayerId,
    pub company_name: String,
    pub tax_identification_number: TaxIdentificationNumber,
    pub trade_register_number: Option<String>,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: Option<String>,
    pub activity_sector: Option<String>,
    pub legal_representative_name: String,
    pub legal_representative_phone: Option<String>,
    #[serde(flatten)]
    pub registration: Lifecycle<RegistrationStatus>,
    pub rejection_reason: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Product ------------------------------------------------------------------

/// A catalogue item subject to stamping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: ProductId,
    /// Unique, upper-cased.
    pub code: String,
    pub name: String,
    pub category: String,
    /// "bottle", "pack", "carton", …
    pub unit_type: String,
    /// Price of one stamp for this product, in cents.
    pub stamp_price: Cents,
    pub requires_certificate: bool,
    pub is_active: bool,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Stamp type ---------------------------------------------------------------

/// Physical label or digital code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StampKind {
    Physical,
    Digital,
}

impl StampKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Physical => "physical",
            Self::Digital => "digital",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "physical" => Some(Self::Physical),
            "digital" => Some(Self::Digital),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StampType {
    pub id: StampTypeId,
    /// Unique, upper-cased; prefixes every serial of this type.
    pub code: String,
    pub name: String,
    pub kind: StampKind,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Catalogue entry ----------------------------------------------------------

/// One product in one taxpayer's catalogue. `(taxpayer_id, product_id)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogueEntry {
    pub id: Uuid,
    pub taxpayer_id: TaxpayerId,
    pub product_id: ProductId,
    #[serde(flatten)]
    pub lifecycle: Lifecycle<CatalogueStatus>,
    pub certificate_path: Option<String>,
    pub certificate_expiry: Option<NaiveDate>,
    pub notes: Option<String>,
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CatalogueEntry {
    /// A certificate is on file and not past its expiry date.
    pub fn has_valid_certificate(&self, today: NaiveDate) -> bool {
        self.certificate_path.is_some()
            && self.certificate_expiry.map_or(true, |expiry| expiry >= today)
    }
}

// -- Stamp order --------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StampOrder {
    pub id: OrderId,
    pub order_number: String,
    pub taxpayer_id: TaxpayerId,
    pub product_id: ProductId,
    pub stamp_type_id: StampTypeId,
    pub quantity: i64,
    pub unit_price: Cents,
    pub total_amount: Cents,
    pub tax_rate_bps: i64,
    pub tax_amount: Cents,
    pub grand_total: Cents,
    #[serde(flatten)]
    pub lifecycle: Lifecycle<OrderStatus>,
    pub notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Payment ------------------------------------------------------------------

/// Payment intent. Exactly one per order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub taxpayer_id: TaxpayerId,
    /// Note de Perception number.
    pub reference: String,
    pub amount: Cents,
    #[serde(flatten)]
    pub lifecycle: Lifecycle<PaymentStatus>,
    pub payment_method: Option<String>,
    pub bank_reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Stamp --------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stamp {
    pub id: StampId,
    pub serial_number: String,
    pub order_id: OrderId,
    pub taxpayer_id: TaxpayerId,
    pub product_id: ProductId,
    pub stamp_type_id: StampTypeId,
    pub kind: StampKind,
    pub verification_code: String,
    #[serde(flatten)]
    pub lifecycle: Lifecycle<StampStatus>,
    pub activated_at: Option<DateTime<Utc>>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Field control ------------------------------------------------------------

/// An inspection record. Rates are derived, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldControl {
    pub id: FieldControlId,
    /// Actor string of the inspecting agent.
    pub agent: String,
    pub taxpayer_id: TaxpayerId,
    pub location: String,
    pub control_date: NaiveDate,
    pub total_items_checked: i64,
    pub compliant_items: i64,
    pub non_compliant_items: i64,
    pub counterfeit_items: i64,
    pub observations: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FieldControl {
    /// `compliant / total × 100`, two decimals, `0` when nothing was checked.
    pub fn compliance_rate(&self) -> f64 {
        percentage(self.compliant_items, self.total_items_checked)
    }

    pub fn non_compliance_rate(&self) -> f64 {
        percentage(self.non_compliant_items, self.total_items_checked)
    }

    pub fn counterfeit_rate(&self) -> f64 {
        percentage(self.counterfeit_items, self.total_items_checked)
    }

    /// The record plus its derived rates, for JSON responses.
    pub fn view(&self) -> FieldControlView<'_> {
        FieldControlView {
            record: self,
            compliance_rate: self.compliance_rate(),
            non_compliance_rate: self.non_compliance_rate(),
            counterfeit_rate: self.counterfeit_rate(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FieldControlView<'a> {
    #[serde(flatten)]
    pub record: &'a FieldControl,
    pub compliance_rate: f64,
    pub non_compliance_rate: f64,
    pub counterfeit_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inspection(total: i64, compliant: i64, non_compliant: i64, counterfeit: i64) -> FieldControl {
        FieldControl {
            id: FieldControlId::new(),
            agent: "agent".into(),
            taxpayer_id: TaxpayerId::new(),
            location: "Marché central".into(),
            control_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            total_items_checked: total,
            compliant_items: compliant,
            non_compliant_items: non_compliant,
            counterfeit_items: counterfeit,
            observations: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn rates_with_nothing_checked_are_zero() {
        let fc = inspection(0, 0, 0, 0);
        assert_eq!(fc.compliance_rate(), 0.0);
        assert_eq!(fc.non_compliance_rate(), 0.0);
        assert_eq!(fc.counterfeit_rate(), 0.0);
    }

    #[test]
    fn rates_round_to_two_decimals() {
        let fc = inspection(3, 2, 1, 1);
        assert_eq!(fc.compliance_rate(), 66.67);
        assert_eq!(fc.non_compliance_rate(), 33.33);
    }

    #[test]
    fn view_flattens_record_and_rates() {
        let fc = inspection(10, 9, 1, 0);
        let json = serde_json::to_value(fc.view()).unwrap();
        assert_eq!(json["compliance_rate"], 90.0);
        assert_eq!(json["total_items_checked"], 10);
        assert_eq!(json["location"], "Marché central");
    }

    #[test]
    fn certificate_validity() {
        let today = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        let mut entry = CatalogueEntry {
            id: Uuid::new_v4(),
            taxpayer_id: TaxpayerId::new(),
            product_id: ProductId::new(),
            lifecycle: Lifecycle::new(CatalogueStatus::Active),
            certificate_path: None,
            certificate_expiry: None,
            notes: None,
            status_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!entry.has_valid_certificate(today));
        entry.certificate_path = Some("certs/abc.pdf".into());
        assert!(entry.has_valid_certificate(today));
        entry.certificate_expiry = NaiveDate::from_ymd_opt(2026, 5, 31);
        assert!(!entry.has_valid_certificate(today));
        entry.certificate_expiry = Some(today);
        assert!(entry.has_valid_certificate(today));
    }

    #[test]
    fn taxpayer_json_exposes_registration_status() {
        let now = Utc::now();
        let taxpayer = Taxpayer {
            id: TaxpayerId::new(),
            company_name: "Brasserie du Fleuve".into(),
            tax_identification_number: TaxIdentificationNumber::new("A1234567B").unwrap(),
            trade_register_number: None,
            email: "contact@fleuve.example".into(),
            phone: "+243 81 000 0000".into(),
            address: "1 avenue du Port".into(),
            city: None,
            activity_sector: None,
            legal_representative_name: "Amani Mbuyi".into(),
            legal_representative_phone: None,
            registration: Lifecycle::new(RegistrationStatus::Pending),
            rejection_reason: None,
            verified_at: None,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&taxpayer).unwrap();
        assert_eq!(json["registration_status"], "pending");
        assert_eq!(json["version"], 1);
        assert_eq!(json["tax_identification_number"], "A1234567B");
    }
}
