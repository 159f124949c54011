//! Taxpayer persistence.

use chrono::{DateTime, Utc};
use rsm_core::{TaxIdentificationNumber, TaxpayerId};
use rsm_state::RegistrationStatus;
use sqlx::PgPool;
use uuid::Uuid;

use super::{restore_lifecycle, transitions_json};
use crate::records::Taxpayer;

/// Save a taxpayer (upsert).
pub async fn save(pool: &PgPool, record: &Taxpayer) -> Result<(), sqlx::Error> {
    let transitions = transitions_json(&record.registration.transitions)?;

    sqlx::query(
        "INSERT INTO taxpayers (id, company_name, tax_identification_number, trade_register_number,
            email, phone, address, city, activity_sector, legal_representative_name,
            legal_representative_phone, registration_status, version, transitions,
            rejection_reason, verified_at, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
         ON CONFLICT (id) DO UPDATE SET
            company_name = EXCLUDED.company_name,
            trade_register_number = EXCLUDED.trade_register_number,
            email = EXCLUDED.email,
            phone = EXCLUDED.phone,
            address = EXCLUDED.address,
            city = EXCLUDED.city,
            activity_sector = EXCLUDED.activity_sector,
            legal_representative_name = EXCLUDED.legal_representative_name,
            legal_representative_phone = EXCLUDED.legal_representative_phone,
            registration_status = EXCLUDED.registration_status,
            version = EXCLUDED.version,
            transitions = EXCLUDED.transitions,
            rejection_reason = EXCLUDED.rejection_reason,
            verified_at = EXCLUDED.verified_at,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(record.id.as_uuid())
    .bind(&record.company_name)
    .bind(record.tax_identification_number.as_str())
    .bind(&record.trade_register_number)
    .bind(&record.email)
    .bind(&record.phone)
    .bind(&record.address)
    .bind(&record.city)
    .bind(&record.activity_sector)
    .bind(&record.legal_representative_name)
    .bind(&record.legal_representative_phone)
    .bind(record.registration.status.to_string())
    .bind(record.registration.version)
    .bind(&transitions)
    .bind(&record.rejection_reason)
    .bind(record.verified_at)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load all taxpayers for hydration.
pub async fn load_all(pool: &PgPool) -> Result<Vec<Taxpayer>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TaxpayerRow>(
        "SELECT id, company_name, tax_identification_number, trade_register_number, email, phone,
            address, city, activity_sector, legal_representative_name, legal_representative_phone,
            registration_status, version, transitions, rejection_reason, verified_at,
            created_at, updated_at
         FROM taxpayers ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(TaxpayerRow::into_record).collect()
}

#[derive(sqlx::FromRow)]
struct TaxpayerRow {
    id: Uuid,
    company_name: String,
    tax_identification_number: String,
    trade_register_number: Option<String>,
    email: String,
    phone: String,
    address: String,
    city: Option<String>,
    activity_sector: Option<String>,
    legal_representative_name: String,
    legal_representative_phone: Option<String>,
    registration_status: String,
    version: i64,
    transitions: serde_json::Value,
    rejection_reason: Option<String>,
    verified_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TaxpayerRow {
    fn into_record(self) -> Result<Taxpayer, sqlx::Error> {
        let id = TaxpayerId::from_uuid(self.id);
        let nif = TaxIdentificationNumber::new(self.tax_identification_number).map_err(|e| {
            sqlx::Error::Protocol(format!("corrupt tax identification number in {id}: {e}"))
        })?;
        let registration = restore_lifecycle::<RegistrationStatus>(
            id,
            &self.registration_status,
            self.version,
            self.transitions,
        )?;

        Ok(Taxpayer {
            id,
            company_name: self.company_name,
            tax_identification_number: nif,
            trade_register_number: self.trade_register_number,
            email: self.email,
            phone: self.phone,
            address: self.address,
            city: self.city,
            activity_sector: self.activity_sector,
            legal_representative_name: self.legal_representative_name,
            legal_representative_phone: self.legal_representative_phone,
            registration,
            rejection_reason: self.rejection_reason,
            verified_at: self.verified_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
