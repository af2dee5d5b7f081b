//! Vital sign readings.
//!
//! A reading is attached to a consultation (one per consultation, updated
//! in place on re-measurement) or, for pre-encounter intake readings,
//! directly to the patient until a consultation picks them up.

use crate::models::VitalSigns;
use crate::scope::AccessContext;
use crate::store::Store;
use crate::{ClinicError, ClinicResult};
use chrono::Utc;
use clinica_types::Capability;
use rusqlite::{params, OptionalExtension};

/// One set of readings from the vitals station.
#[derive(Debug, Clone, Default)]
pub struct NewVitals {
    pub blood_pressure: Option<String>,
    pub heart_rate: Option<i64>,
    pub respiratory_rate: Option<i64>,
    pub temperature: Option<f64>,
    pub oxygen_saturation: Option<i64>,
    pub glucose: Option<i64>,
}

impl NewVitals {
    fn validate(&self) -> ClinicResult<()> {
        fn check(name: &str, value: Option<i64>, range: std::ops::RangeInclusive<i64>) -> ClinicResult<()> {
            if let Some(v) = value {
                if !range.contains(&v) {
                    return Err(ClinicError::InvalidInput(format!(
                        "{} {} is out of range",
                        name, v
                    )));
                }
            }
            Ok(())
        }
        check("heart rate", self.heart_rate, 20..=300)?;
        check("respiratory rate", self.respiratory_rate, 4..=90)?;
        check("oxygen saturation", self.oxygen_saturation, 0..=100)?;
        check("glucose", self.glucose, 10..=1500)?;
        if let Some(t) = self.temperature {
            if !(25.0..=45.0).contains(&t) {
                return Err(ClinicError::InvalidInput(format!(
                    "temperature {} is out of range",
                    t
                )));
            }
        }
        Ok(())
    }
}

impl Store {
    /// Records intake vitals for a patient not yet in consultation.
    pub fn record_intake_vitals(
        &self,
        ctx: &AccessContext,
        patient_id: i64,
        vitals: NewVitals,
    ) -> ClinicResult<VitalSigns> {
        ctx.require(Capability::ClinicalAccess)?;
        vitals.validate()?;
        self.patient(patient_id)?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO vital_signs \
             (patient_id, blood_pressure, heart_rate, respiratory_rate, temperature, \
              oxygen_saturation, glucose, recorded_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                patient_id,
                vitals.blood_pressure,
                vitals.heart_rate,
                vitals.respiratory_rate,
                vitals.temperature,
                vitals.oxygen_saturation,
                vitals.glucose,
                Utc::now()
            ],
        )?;
        self.vitals(conn.last_insert_rowid())
    }

    /// Saves the vitals for a consultation, replacing an earlier reading.
    ///
    /// Counts as a section save: the consultation's `updated_at` is
    /// refreshed in the same transaction.
    pub fn save_consultation_vitals(
        &self,
        ctx: &AccessContext,
        consultation_id: i64,
        vitals: NewVitals,
    ) -> ClinicResult<VitalSigns> {
        let consultation = self.consultation_scoped(ctx, consultation_id)?;
        if consultation.snapshot_of.is_some() {
            return Err(ClinicError::InvalidInput(
                "finalized snapshots cannot be edited".into(),
            ));
        }
        vitals.validate()?;

        let now = Utc::now();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM vital_signs WHERE consultation_id = ?1",
                [consultation_id],
                |row| row.get(0),
            )
            .optional()?;
        let id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE vital_signs SET blood_pressure = ?1, heart_rate = ?2, \
                     respiratory_rate = ?3, temperature = ?4, oxygen_saturation = ?5, \
                     glucose = ?6, recorded_at = ?7 WHERE id = ?8",
                    params![
                        vitals.blood_pressure,
                        vitals.heart_rate,
                        vitals.respiratory_rate,
                        vitals.temperature,
                        vitals.oxygen_saturation,
                        vitals.glucose,
                        now,
                        id
                    ],
                )?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO vital_signs \
                     (consultation_id, patient_id, blood_pressure, heart_rate, respiratory_rate, \
                      temperature, oxygen_saturation, glucose, recorded_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        consultation_id,
                        consultation.patient_id,
                        vitals.blood_pressure,
                        vitals.heart_rate,
                        vitals.respiratory_rate,
                        vitals.temperature,
                        vitals.oxygen_saturation,
                        vitals.glucose,
                        now
                    ],
                )?;
                tx.last_insert_rowid()
            }
        };
        tx.execute(
            "UPDATE consultations SET updated_at = ?1 WHERE id = ?2",
            params![now, consultation_id],
        )?;
        tx.commit()?;

        self.vitals(id)
    }

    pub fn vitals(&self, id: i64) -> ClinicResult<VitalSigns> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM vital_signs WHERE id = ?1", VitalSigns::COLUMNS),
            [id],
            VitalSigns::from_row,
        )
        .optional()?
        .ok_or(ClinicError::NotFound {
            entity: "vital signs",
            id,
        })
    }

    pub fn vitals_for_consultation(
        &self,
        consultation_id: i64,
    ) -> ClinicResult<Option<VitalSigns>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {} FROM vital_signs WHERE consultation_id = ?1",
                    VitalSigns::COLUMNS
                ),
                [consultation_id],
                VitalSigns::from_row,
            )
            .optional()?)
    }

    /// Latest reading for a patient, whether tied to a consultation or
    /// taken at intake.
    pub fn latest_vitals_for_patient(&self, patient_id: i64) -> ClinicResult<Option<VitalSigns>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {} FROM vital_signs WHERE patient_id = ?1 \
                     ORDER BY recorded_at DESC, id DESC LIMIT 1",
                    VitalSigns::COLUMNS
                ),
                [patient_id],
                VitalSigns::from_row,
            )
            .optional()?)
    }
}
