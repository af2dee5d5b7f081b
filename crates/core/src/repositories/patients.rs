//! Patient registration, search, and scoped listing.

use crate::models::Patient;
use crate::scope::{consultation_filter, AccessContext, Visibility};
use crate::store::Store;
use crate::{ClinicError, ClinicResult};
use chrono::Utc;
use clinica_types::{Capability, Sex};
use rusqlite::{params, OptionalExtension, ToSql};

/// Intake form for a new patient.
#[derive(Debug, Clone, Default)]
pub struct NewPatient {
    pub full_name: String,
    pub age: Option<i64>,
    pub sex: Option<Sex>,
    pub national_id: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub occupation: Option<String>,
    pub marital_status: Option<String>,
    pub has_chart: bool,
}

impl Store {
    /// Registers a patient at intake.
    ///
    /// A duplicate national ID is caught at the unique index and reported
    /// as a user-facing message; the insert rolls back as a unit.
    pub fn register_patient(&self, ctx: &AccessContext, new: NewPatient) -> ClinicResult<Patient> {
        ctx.require(Capability::ClinicalAccess)?;
        if new.full_name.trim().is_empty() {
            return Err(ClinicError::InvalidInput("full name is required".into()));
        }
        if let Some(age) = new.age {
            if !(0..=130).contains(&age) {
                return Err(ClinicError::InvalidInput(format!(
                    "age {} is out of range",
                    age
                )));
            }
        }
        let national_id = new
            .national_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);

        let conn = self.conn()?;
        let result = conn.execute(
            "INSERT INTO patients \
             (full_name, age, sex, national_id, phone, address, occupation, marital_status, \
              has_chart, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                new.full_name.trim(),
                new.age,
                new.sex.map(Sex::as_str),
                national_id,
                new.phone,
                new.address,
                new.occupation,
                new.marital_status,
                new.has_chart,
                Utc::now()
            ],
        );

        match result {
            Ok(_) => self.patient(conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(code, _))
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(ClinicError::DuplicateNationalId(
                    national_id.unwrap_or_default(),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Updates a patient's demographic profile.
    pub fn update_patient(
        &self,
        ctx: &AccessContext,
        patient_id: i64,
        new: NewPatient,
    ) -> ClinicResult<Patient> {
        ctx.require(Capability::ClinicalAccess)?;
        if new.full_name.trim().is_empty() {
            return Err(ClinicError::InvalidInput("full name is required".into()));
        }
        // Ensure it exists first so the error names the patient.
        self.patient(patient_id)?;
        let national_id = new
            .national_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);

        let conn = self.conn()?;
        let result = conn.execute(
            "UPDATE patients SET full_name = ?1, age = ?2, sex = ?3, national_id = ?4, \
             phone = ?5, address = ?6, occupation = ?7, marital_status = ?8, has_chart = ?9 \
             WHERE id = ?10",
            params![
                new.full_name.trim(),
                new.age,
                new.sex.map(Sex::as_str),
                national_id,
                new.phone,
                new.address,
                new.occupation,
                new.marital_status,
                new.has_chart,
                patient_id
            ],
        );
        match result {
            Ok(_) => self.patient(patient_id),
            Err(rusqlite::Error::SqliteFailure(code, _))
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(ClinicError::DuplicateNationalId(
                    national_id.unwrap_or_default(),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fetches a patient, hard-failing when every one of their
    /// consultations is outside the caller's scope.
    ///
    /// A patient with no consultations yet is reachable by any clinical
    /// role: intake registers the patient before the first encounter
    /// exists, so there is nothing to scope by.
    pub fn patient_scoped(&self, ctx: &AccessContext, patient_id: i64) -> ClinicResult<Patient> {
        ctx.require(Capability::ClinicalAccess)?;
        let patient = self.patient(patient_id)?;
        let vis = ctx.visibility()?;
        if vis == Visibility::Global {
            return Ok(patient);
        }

        let conn = self.conn()?;
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM consultations WHERE patient_id = ?1",
            [patient_id],
            |row| row.get(0),
        )?;
        if total == 0 {
            return Ok(patient);
        }

        let (filter, mut bind) = consultation_filter(vis);
        bind.push(patient_id);
        let patient_param = format!("?{}", bind.len());
        let bind: Vec<&dyn ToSql> = bind.iter().map(|v| v as &dyn ToSql).collect();
        let in_scope: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM consultations c \
                 WHERE c.patient_id = {patient_param} AND {filter}"
            ),
            &bind[..],
            |row| row.get(0),
        )?;
        if in_scope > 0 {
            Ok(patient)
        } else {
            Err(ClinicError::Forbidden(format!(
                "patient {} is outside the caller's scope",
                patient_id
            )))
        }
    }

    pub fn patient(&self, id: i64) -> ClinicResult<Patient> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM patients WHERE id = ?1", Patient::COLUMNS),
            [id],
            Patient::from_row,
        )
        .optional()?
        .ok_or(ClinicError::NotFound {
            entity: "patient",
            id,
        })
    }

    /// Name/id search used by the consultation screens.
    ///
    /// A numeric term is also tried as an exact patient id, matching the
    /// registration-desk workflow of searching by chart number.
    pub fn search_patients(&self, term: &str, limit: usize) -> ClinicResult<Vec<Patient>> {
        let term = term.trim();
        if term.len() < 2 {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let pattern = format!("%{}%", term);
        let as_id: i64 = term.parse().unwrap_or(-1);
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM patients WHERE full_name LIKE ?1 COLLATE NOCASE OR id = ?2 \
             ORDER BY full_name LIMIT ?3",
            Patient::COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![pattern, as_id, limit as i64], Patient::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Lists the patients visible under the given scope: everyone for
    /// global visibility, otherwise exactly the patients with at least one
    /// consultation matching the clinic/ownership filter.
    pub fn list_patients(&self, vis: Visibility) -> ClinicResult<Vec<Patient>> {
        let conn = self.conn()?;
        if vis == Visibility::Global {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM patients ORDER BY full_name",
                Patient::COLUMNS
            ))?;
            let rows = stmt
                .query_map([], Patient::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            return Ok(rows);
        }

        let (filter, bind) = consultation_filter(vis);
        let mut stmt = conn.prepare(&format!(
            "SELECT {cols} FROM patients p WHERE EXISTS \
             (SELECT 1 FROM consultations c WHERE c.patient_id = p.id AND {filter}) \
             ORDER BY p.full_name",
            cols = Patient::COLUMNS
        ))?;
        let bind: Vec<&dyn ToSql> = bind.iter().map(|v| v as &dyn ToSql).collect();
        let rows = stmt
            .query_map(&bind[..], Patient::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Deletes a patient.
    ///
    /// A patient with consultation history can only be removed by a caller
    /// holding `manage_records`; the delete then cascades to consultations
    /// and vitals. Patients with no history can be removed by any clinical
    /// role (a mistyped intake, typically).
    pub fn delete_patient(&self, ctx: &AccessContext, patient_id: i64) -> ClinicResult<()> {
        ctx.require(Capability::ClinicalAccess)?;
        self.patient(patient_id)?;

        let conn = self.conn()?;
        let consultations: i64 = conn.query_row(
            "SELECT COUNT(*) FROM consultations WHERE patient_id = ?1",
            [patient_id],
            |row| row.get(0),
        )?;
        if consultations > 0 {
            ctx.require(Capability::ManageRecords)?;
        }

        conn.execute("DELETE FROM patients WHERE id = ?1", [patient_id])?;
        tracing::info!(patient = patient_id, actor = ctx.user_id, "patient deleted");
        Ok(())
    }
}
