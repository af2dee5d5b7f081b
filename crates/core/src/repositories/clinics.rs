//! Clinic rooms and their availability.
//!
//! Availability is an explicit per-clinic transition: occupying one room
//! flips that room alone, and releasing it flips it back. There is no
//! "mark everything else available" sweep across shared rows.

use crate::models::Clinic;
use crate::scope::AccessContext;
use crate::store::Store;
use crate::{ClinicError, ClinicResult};
use clinica_types::Capability;
use rusqlite::{params, OptionalExtension};

impl Store {
    pub fn create_clinic(&self, ctx: &AccessContext, name: &str) -> ClinicResult<Clinic> {
        ctx.require(Capability::ManageClinics)?;
        if name.trim().is_empty() {
            return Err(ClinicError::InvalidInput("clinic name is required".into()));
        }
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO clinics (name, available) VALUES (?1, 1)",
            params![name.trim()],
        )?;
        self.clinic(conn.last_insert_rowid())
    }

    pub fn clinic(&self, id: i64) -> ClinicResult<Clinic> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM clinics WHERE id = ?1", Clinic::COLUMNS),
            [id],
            Clinic::from_row,
        )
        .optional()?
        .ok_or(ClinicError::NotFound {
            entity: "clinic",
            id,
        })
    }

    pub fn list_clinics(&self) -> ClinicResult<Vec<Clinic>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM clinics ORDER BY name",
            Clinic::COLUMNS
        ))?;
        let rows = stmt
            .query_map([], Clinic::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// First available clinic, if any. Intake uses this to place a new
    /// consultation.
    pub fn first_available_clinic(&self) -> ClinicResult<Option<Clinic>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {} FROM clinics WHERE available = 1 ORDER BY id LIMIT 1",
                    Clinic::COLUMNS
                ),
                [],
                Clinic::from_row,
            )
            .optional()?)
    }

    /// Sets one clinic's availability. Touches only the named clinic.
    pub fn set_clinic_availability(
        &self,
        ctx: &AccessContext,
        clinic_id: i64,
        available: bool,
    ) -> ClinicResult<Clinic> {
        ctx.require(Capability::ClinicalAccess)?;
        self.clinic(clinic_id)?;
        let conn = self.conn()?;
        conn.execute(
            "UPDATE clinics SET available = ?1 WHERE id = ?2",
            params![available, clinic_id],
        )?;
        self.clinic(clinic_id)
    }
}
