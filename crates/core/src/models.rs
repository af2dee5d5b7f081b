//! Row types for the clinic store.
//!
//! These are plain data carriers: the store maps SQLite rows into them and
//! the HTTP layer serialises them straight out as JSON. Report generation
//! consumes the same structures, so every field a document needs is present
//! here rather than re-queried piecemeal.

use chrono::{DateTime, Utc};
use clinica_types::{ConsultationState, Role, Sex};
use rusqlite::types::Type;
use rusqlite::Row;
use serde::Serialize;
use std::str::FromStr;

/// Maps a text column through `FromStr`, surfacing parse failures as
/// conversion errors on the originating column.
fn parse_text_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    T::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Same as [`parse_text_col`] for nullable columns.
fn parse_opt_text_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        T::from_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

#[derive(Debug, Clone, Serialize)]
pub struct StaffUser {
    pub id: i64,
    pub full_name: String,
    pub username: String,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub current_clinic_id: Option<i64>,
    pub active: bool,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl StaffUser {
    pub(crate) const COLUMNS: &'static str = "id, full_name, username, email, password_hash, \
         role, current_clinic_id, active, email_verified, created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            full_name: row.get(1)?,
            username: row.get(2)?,
            email: row.get(3)?,
            password_hash: row.get(4)?,
            role: parse_text_col(row, 5)?,
            current_clinic_id: row.get(6)?,
            active: row.get(7)?,
            email_verified: row.get(8)?,
            created_at: row.get(9)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Patient {
    pub id: i64,
    pub full_name: String,
    pub age: Option<i64>,
    pub sex: Option<Sex>,
    pub national_id: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub occupation: Option<String>,
    pub marital_status: Option<String>,
    pub has_chart: bool,
    pub created_at: DateTime<Utc>,
}

impl Patient {
    pub(crate) const COLUMNS: &'static str = "id, full_name, age, sex, national_id, phone, \
         address, occupation, marital_status, has_chart, created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            full_name: row.get(1)?,
            age: row.get(2)?,
            sex: parse_opt_text_col(row, 3)?,
            national_id: row.get(4)?,
            phone: row.get(5)?,
            address: row.get(6)?,
            occupation: row.get(7)?,
            marital_status: row.get(8)?,
            has_chart: row.get(9)?,
            created_at: row.get(10)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Clinic {
    pub id: i64,
    pub name: String,
    pub available: bool,
}

impl Clinic {
    pub(crate) const COLUMNS: &'static str = "id, name, available";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            available: row.get(2)?,
        })
    }
}

/// One patient encounter record.
///
/// A row with `snapshot_of = None` and state `in_progress` is the patient's
/// working draft. Finalize stamps immutable `completed` snapshots that point
/// back at the draft through `snapshot_of`; the draft itself is never
/// rewritten by finalize.
#[derive(Debug, Clone, Serialize)]
pub struct Consultation {
    pub id: i64,
    pub patient_id: i64,
    pub clinic_id: Option<i64>,
    pub physician_id: Option<i64>,
    pub consultation_type: Option<String>,
    pub state: ConsultationState,
    pub visit_reason: Option<String>,
    pub history: Option<String>,
    pub systems_review: Option<String>,
    pub obstetric_history: Option<String>,
    pub physical_exam: Option<String>,
    pub diagnosis: Option<String>,
    pub lab_orders: Option<String>,
    pub treatment: Option<String>,
    pub instructions: Option<String>,
    pub snapshot_of: Option<i64>,
    pub created_at: DateTime<Utc>,
    /// Refreshed by every section save; this is "last saved", not the visit
    /// date.
    pub updated_at: DateTime<Utc>,
}

impl Consultation {
    pub(crate) const COLUMNS: &'static str =
        "id, patient_id, clinic_id, physician_id, consultation_type, state, visit_reason, \
         history, systems_review, obstetric_history, physical_exam, diagnosis, lab_orders, \
         treatment, instructions, snapshot_of, created_at, updated_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            patient_id: row.get(1)?,
            clinic_id: row.get(2)?,
            physician_id: row.get(3)?,
            consultation_type: row.get(4)?,
            state: parse_text_col(row, 5)?,
            visit_reason: row.get(6)?,
            history: row.get(7)?,
            systems_review: row.get(8)?,
            obstetric_history: row.get(9)?,
            physical_exam: row.get(10)?,
            diagnosis: row.get(11)?,
            lab_orders: row.get(12)?,
            treatment: row.get(13)?,
            instructions: row.get(14)?,
            snapshot_of: row.get(15)?,
            created_at: row.get(16)?,
            updated_at: row.get(17)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VitalSigns {
    pub id: i64,
    pub consultation_id: Option<i64>,
    pub patient_id: Option<i64>,
    pub blood_pressure: Option<String>,
    pub heart_rate: Option<i64>,
    pub respiratory_rate: Option<i64>,
    pub temperature: Option<f64>,
    pub oxygen_saturation: Option<i64>,
    pub glucose: Option<i64>,
    pub recorded_at: DateTime<Utc>,
}

impl VitalSigns {
    pub(crate) const COLUMNS: &'static str = "id, consultation_id, patient_id, blood_pressure, \
         heart_rate, respiratory_rate, temperature, oxygen_saturation, glucose, recorded_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            consultation_id: row.get(1)?,
            patient_id: row.get(2)?,
            blood_pressure: row.get(3)?,
            heart_rate: row.get(4)?,
            respiratory_rate: row.get(5)?,
            temperature: row.get(6)?,
            oxygen_saturation: row.get(7)?,
            glucose: row.get(8)?,
            recorded_at: row.get(9)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoleChangeAudit {
    pub id: i64,
    pub actor_id: i64,
    pub subject_id: i64,
    pub old_role: Role,
    pub new_role: Role,
    pub changed_at: DateTime<Utc>,
}

impl RoleChangeAudit {
    pub(crate) const COLUMNS: &'static str =
        "id, actor_id, subject_id, old_role, new_role, changed_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            actor_id: row.get(1)?,
            subject_id: row.get(2)?,
            old_role: parse_text_col(row, 3)?,
            new_role: parse_text_col(row, 4)?,
            changed_at: row.get(5)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClinicAssignmentAudit {
    pub id: i64,
    pub actor_id: i64,
    pub subject_id: i64,
    pub old_clinic_id: Option<i64>,
    pub new_clinic_id: Option<i64>,
    pub changed_at: DateTime<Utc>,
}

impl ClinicAssignmentAudit {
    pub(crate) const COLUMNS: &'static str =
        "id, actor_id, subject_id, old_clinic_id, new_clinic_id, changed_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            actor_id: row.get(1)?,
            subject_id: row.get(2)?,
            old_clinic_id: row.get(3)?,
            new_clinic_id: row.get(4)?,
            changed_at: row.get(5)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct VerificationCode {
    pub id: i64,
    pub email: String,
    pub user_id: Option<i64>,
    pub purpose: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: i64,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl VerificationCode {
    pub(crate) const COLUMNS: &'static str =
        "id, email, user_id, purpose, code, expires_at, attempts, used, created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            user_id: row.get(2)?,
            purpose: row.get(3)?,
            code: row.get(4)?,
            expires_at: row.get(5)?,
            attempts: row.get(6)?,
            used: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}
