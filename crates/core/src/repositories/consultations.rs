//! Consultation lifecycle: begin/reuse, section saves, finalize, transfer.
//!
//! Each patient has at most one working draft (`in_progress`, no
//! `snapshot_of`). Beginning care reuses the draft when one exists; the
//! partial unique index backstops the check under concurrent double
//! submission. Finalize never rewrites the draft: it stamps an immutable
//! `completed` snapshot pointing back at it, and the patient's history is
//! the list of those snapshots.

use crate::models::Consultation;
use crate::scope::{consultation_filter, AccessContext, Visibility};
use crate::store::Store;
use crate::{ClinicError, ClinicResult};
use chrono::Utc;
use clinica_types::{Capability, ConsultationState, Role};
use rusqlite::{params, Connection, OptionalExtension, ToSql, TransactionBehavior};

/// One independently-saveable slice of the clinical note.
///
/// Every save refreshes the consultation's `updated_at`, so that column is
/// "last section saved", not the visit date.
#[derive(Debug, Clone)]
pub enum ConsultationSection {
    VisitReason {
        visit_reason: Option<String>,
        history: Option<String>,
    },
    SystemsReview {
        systems_review: Option<String>,
        obstetric_history: Option<String>,
    },
    PhysicalExam {
        physical_exam: Option<String>,
    },
    Diagnosis {
        diagnosis: Option<String>,
        lab_orders: Option<String>,
    },
    Treatment {
        treatment: Option<String>,
        instructions: Option<String>,
    },
}

fn draft_for_patient_on(
    conn: &Connection,
    patient_id: i64,
) -> rusqlite::Result<Option<Consultation>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM consultations \
             WHERE patient_id = ?1 AND state = 'in_progress' AND snapshot_of IS NULL",
            Consultation::COLUMNS
        ),
        [patient_id],
        Consultation::from_row,
    )
    .optional()
}

impl Store {
    /// Starts care for a patient, reusing the existing draft when there is
    /// one.
    ///
    /// The check-then-insert runs in an immediate transaction and the
    /// unique draft index catches whatever slips through, so two
    /// double-submitted requests converge on a single draft row.
    pub fn begin_consultation(
        &self,
        ctx: &AccessContext,
        patient_id: i64,
        clinic_id: Option<i64>,
        consultation_type: Option<&str>,
    ) -> ClinicResult<Consultation> {
        ctx.require(Capability::ClinicalAccess)?;
        self.patient(patient_id)?;
        if let Some(clinic_id) = clinic_id {
            self.clinic(clinic_id)?;
        }

        let physician_id = (ctx.role == Role::Physician).then_some(ctx.user_id);

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if let Some(existing) = draft_for_patient_on(&tx, patient_id)? {
            tx.commit()?;
            tracing::debug!(
                patient = patient_id,
                consultation = existing.id,
                "reusing in-progress consultation"
            );
            return Ok(existing);
        }

        let now = Utc::now();
        let inserted = tx.execute(
            "INSERT INTO consultations \
             (patient_id, clinic_id, physician_id, consultation_type, state, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                patient_id,
                clinic_id,
                physician_id,
                consultation_type,
                ConsultationState::InProgress.as_str(),
                now
            ],
        );

        match inserted {
            Ok(_) => {
                let id = tx.last_insert_rowid();
                tx.commit()?;
                self.consultation(id)
            }
            Err(rusqlite::Error::SqliteFailure(code, _))
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                // Lost the race to a concurrent create: hand back the row
                // that won.
                drop(tx);
                let conn = self.conn()?;
                draft_for_patient_on(&conn, patient_id)?.ok_or(ClinicError::NotFound {
                    entity: "consultation draft",
                    id: patient_id,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Unscoped fetch. API paths go through
    /// [`consultation_scoped`](Self::consultation_scoped).
    pub fn consultation(&self, id: i64) -> ClinicResult<Consultation> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM consultations WHERE id = ?1",
                Consultation::COLUMNS
            ),
            [id],
            Consultation::from_row,
        )
        .optional()?
        .ok_or(ClinicError::NotFound {
            entity: "consultation",
            id,
        })
    }

    /// Fetches a consultation, hard-failing when it is outside the
    /// caller's scope and not personally owned.
    pub fn consultation_scoped(&self, ctx: &AccessContext, id: i64) -> ClinicResult<Consultation> {
        let consultation = self.consultation(id)?;
        ctx.check_consultation(&consultation)?;
        Ok(consultation)
    }

    /// The patient's working draft, if any.
    pub fn draft_for_patient(&self, patient_id: i64) -> ClinicResult<Option<Consultation>> {
        let conn = self.conn()?;
        Ok(draft_for_patient_on(&conn, patient_id)?)
    }

    /// Saves one clinical section, refreshing `updated_at` to now.
    ///
    /// Snapshots are immutable history and reject every save.
    pub fn update_section(
        &self,
        ctx: &AccessContext,
        consultation_id: i64,
        section: ConsultationSection,
    ) -> ClinicResult<Consultation> {
        let consultation = self.consultation_scoped(ctx, consultation_id)?;
        if consultation.snapshot_of.is_some() {
            return Err(ClinicError::InvalidInput(
                "finalized snapshots cannot be edited".into(),
            ));
        }

        let now = Utc::now();
        let conn = self.conn()?;
        match section {
            ConsultationSection::VisitReason {
                visit_reason,
                history,
            } => conn.execute(
                "UPDATE consultations SET visit_reason = ?1, history = ?2, updated_at = ?3 \
                 WHERE id = ?4",
                params![visit_reason, history, now, consultation_id],
            )?,
            ConsultationSection::SystemsReview {
                systems_review,
                obstetric_history,
            } => conn.execute(
                "UPDATE consultations SET systems_review = ?1, obstetric_history = ?2, \
                 updated_at = ?3 WHERE id = ?4",
                params![systems_review, obstetric_history, now, consultation_id],
            )?,
            ConsultationSection::PhysicalExam { physical_exam } => conn.execute(
                "UPDATE consultations SET physical_exam = ?1, updated_at = ?2 WHERE id = ?3",
                params![physical_exam, now, consultation_id],
            )?,
            ConsultationSection::Diagnosis {
                diagnosis,
                lab_orders,
            } => conn.execute(
                "UPDATE consultations SET diagnosis = ?1, lab_orders = ?2, updated_at = ?3 \
                 WHERE id = ?4",
                params![diagnosis, lab_orders, now, consultation_id],
            )?,
            ConsultationSection::Treatment {
                treatment,
                instructions,
            } => conn.execute(
                "UPDATE consultations SET treatment = ?1, instructions = ?2, updated_at = ?3 \
                 WHERE id = ?4",
                params![treatment, instructions, now, consultation_id],
            )?,
        };

        self.consultation(consultation_id)
    }

    /// Finalizes the draft: stamps an immutable completed snapshot of its
    /// current clinical fields and leaves the draft itself untouched.
    ///
    /// Requires a non-empty diagnosis and treatment on the draft.
    pub fn finalize_consultation(
        &self,
        ctx: &AccessContext,
        consultation_id: i64,
    ) -> ClinicResult<Consultation> {
        let draft = self.consultation_scoped(ctx, consultation_id)?;
        if draft.snapshot_of.is_some() {
            return Err(ClinicError::InvalidInput(
                "cannot finalize a snapshot".into(),
            ));
        }
        let diagnosis_ok = draft
            .diagnosis
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty());
        let treatment_ok = draft
            .treatment
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty());
        if !diagnosis_ok || !treatment_ok {
            return Err(ClinicError::InvalidInput(
                "diagnosis and treatment are required to finalize".into(),
            ));
        }

        let physician_id = draft
            .physician_id
            .or_else(|| (ctx.role == Role::Physician).then_some(ctx.user_id));
        let now = Utc::now();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO consultations \
             (patient_id, clinic_id, physician_id, consultation_type, state, visit_reason, \
              history, systems_review, obstetric_history, physical_exam, diagnosis, lab_orders, \
              treatment, instructions, snapshot_of, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)",
            params![
                draft.patient_id,
                draft.clinic_id,
                physician_id,
                draft.consultation_type,
                ConsultationState::Completed.as_str(),
                draft.visit_reason,
                draft.history,
                draft.systems_review,
                draft.obstetric_history,
                draft.physical_exam,
                draft.diagnosis,
                draft.lab_orders,
                draft.treatment,
                draft.instructions,
                draft.id,
                now
            ],
        )?;
        let snapshot = self.consultation(conn.last_insert_rowid())?;

        tracing::info!(
            consultation = draft.id,
            snapshot = snapshot.id,
            patient = draft.patient_id,
            "consultation finalized"
        );
        Ok(snapshot)
    }

    /// Walks the encounter to a different exam room mid-consultation.
    ///
    /// Releases only the previously bound clinic and occupies only the new
    /// one; the acting physician takes over the encounter.
    pub fn transfer_consultation(
        &self,
        ctx: &AccessContext,
        consultation_id: i64,
        new_clinic_id: i64,
    ) -> ClinicResult<Consultation> {
        let consultation = self.consultation_scoped(ctx, consultation_id)?;
        if consultation.snapshot_of.is_some() {
            return Err(ClinicError::InvalidInput(
                "cannot transfer a snapshot".into(),
            ));
        }
        self.clinic(new_clinic_id)?;

        let physician_id = if ctx.role == Role::Physician {
            Some(ctx.user_id)
        } else {
            consultation.physician_id
        };

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if let Some(old_clinic) = consultation.clinic_id {
            if old_clinic != new_clinic_id {
                tx.execute(
                    "UPDATE clinics SET available = 1 WHERE id = ?1",
                    [old_clinic],
                )?;
            }
        }
        tx.execute(
            "UPDATE clinics SET available = 0 WHERE id = ?1",
            [new_clinic_id],
        )?;
        tx.execute(
            "UPDATE consultations SET clinic_id = ?1, physician_id = ?2, updated_at = ?3 \
             WHERE id = ?4",
            params![new_clinic_id, physician_id, Utc::now(), consultation_id],
        )?;
        tx.commit()?;

        self.consultation(consultation_id)
    }

    /// Finalized snapshots for one patient visible to the caller, newest
    /// first.
    pub fn consultation_history(
        &self,
        ctx: &AccessContext,
        patient_id: i64,
    ) -> ClinicResult<Vec<Consultation>> {
        let vis = ctx.visibility()?;
        self.patient(patient_id)?;

        let (filter, mut bind) = consultation_filter(vis);
        bind.push(patient_id);
        let patient_param = format!("?{}", bind.len());

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {cols} FROM consultations c \
             WHERE c.patient_id = {patient_param} AND c.snapshot_of IS NOT NULL AND {filter} \
             ORDER BY c.created_at DESC",
            cols = Consultation::COLUMNS
        ))?;
        let bind: Vec<&dyn ToSql> = bind.iter().map(|v| v as &dyn ToSql).collect();
        let rows = stmt
            .query_map(&bind[..], Consultation::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// All working encounters (non-snapshot rows) visible under the scope,
    /// newest first. Report screens feed from this.
    pub fn list_consultations(&self, vis: Visibility) -> ClinicResult<Vec<Consultation>> {
        let (filter, bind) = consultation_filter(vis);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {cols} FROM consultations c \
             WHERE c.snapshot_of IS NULL AND {filter} \
             ORDER BY c.updated_at DESC",
            cols = Consultation::COLUMNS
        ))?;
        let bind: Vec<&dyn ToSql> = bind.iter().map(|v| v as &dyn ToSql).collect();
        let rows = stmt
            .query_map(&bind[..], Consultation::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn sequential_begin_reuses_the_draft() {
        let (store, _dir) = testutil::store();
        let admin = testutil::seed_admin(&store);
        let clinic = testutil::seed_clinic(&store, "Room A");
        let phys = testutil::seed_physician(&store, &admin, "bruno", Some(clinic));
        let patient = testutil::seed_patient(&store, &admin, "Ana", Some(67));

        let first = store
            .begin_consultation(&phys, patient, Some(clinic), Some("first_visit"))
            .expect("first begin should create");
        let second = store
            .begin_consultation(&phys, patient, Some(clinic), None)
            .expect("second begin should reuse");

        assert_eq!(first.id, second.id, "existing draft must be reused");
        assert_eq!(store.list_consultations(Visibility::Global).unwrap().len(), 1);
    }

    #[test]
    fn out_of_scope_fetch_fails_hard() {
        let (store, _dir) = testutil::store();
        let admin = testutil::seed_admin(&store);
        let clinic_a = testutil::seed_clinic(&store, "Room A");
        let clinic_b = testutil::seed_clinic(&store, "Room B");
        let phys_a = testutil::seed_physician(&store, &admin, "bruno", Some(clinic_a));
        let phys_b = testutil::seed_physician(&store, &admin, "carla", Some(clinic_b));
        let patient = testutil::seed_patient(&store, &admin, "Ana", Some(67));

        let consultation = store
            .begin_consultation(&phys_b, patient, Some(clinic_b), None)
            .expect("consultation in clinic B");

        let err = store
            .consultation_scoped(&phys_a, consultation.id)
            .expect_err("fetch outside scope must fail, not return empty");
        assert!(matches!(err, ClinicError::Forbidden(_)));

        // The owner and the admin both still reach it.
        store
            .consultation_scoped(&phys_b, consultation.id)
            .expect("owner fetch should succeed");
        store
            .consultation_scoped(&admin, consultation.id)
            .expect("admin fetch should succeed");
    }

    #[test]
    fn section_saves_refresh_updated_at_only() {
        let (store, _dir) = testutil::store();
        let admin = testutil::seed_admin(&store);
        let clinic = testutil::seed_clinic(&store, "Room A");
        let phys = testutil::seed_physician(&store, &admin, "bruno", Some(clinic));
        let patient = testutil::seed_patient(&store, &admin, "Ana", Some(67));
        let draft = store
            .begin_consultation(&phys, patient, Some(clinic), None)
            .expect("begin should succeed");

        let updated = store
            .update_section(
                &phys,
                draft.id,
                ConsultationSection::Diagnosis {
                    diagnosis: Some("bronchitis".into()),
                    lab_orders: None,
                },
            )
            .expect("section save should succeed");

        assert_eq!(updated.diagnosis.as_deref(), Some("bronchitis"));
        assert_eq!(updated.created_at, draft.created_at);
        assert!(updated.updated_at >= draft.updated_at);
    }

    #[test]
    fn finalize_requires_diagnosis_and_treatment() {
        let (store, _dir) = testutil::store();
        let admin = testutil::seed_admin(&store);
        let clinic = testutil::seed_clinic(&store, "Room A");
        let phys = testutil::seed_physician(&store, &admin, "bruno", Some(clinic));
        let patient = testutil::seed_patient(&store, &admin, "Ana", Some(67));
        let draft = store
            .begin_consultation(&phys, patient, Some(clinic), None)
            .expect("begin should succeed");

        let err = store
            .finalize_consultation(&phys, draft.id)
            .expect_err("empty diagnosis/treatment must not finalize");
        assert!(matches!(err, ClinicError::InvalidInput(_)));
    }

    #[test]
    fn finalize_stamps_a_snapshot_and_leaves_the_draft_alone() {
        let (store, _dir) = testutil::store();
        let admin = testutil::seed_admin(&store);
        let clinic = testutil::seed_clinic(&store, "Room A");
        let phys = testutil::seed_physician(&store, &admin, "bruno", Some(clinic));
        let patient = testutil::seed_patient(&store, &admin, "Ana", Some(67));
        let draft = store
            .begin_consultation(&phys, patient, Some(clinic), None)
            .expect("begin should succeed");

        store
            .update_section(
                &phys,
                draft.id,
                ConsultationSection::Diagnosis {
                    diagnosis: Some("bronchitis".into()),
                    lab_orders: Some("chest x-ray".into()),
                },
            )
            .expect("diagnosis save should succeed");
        store
            .update_section(
                &phys,
                draft.id,
                ConsultationSection::Treatment {
                    treatment: Some("amoxicillin 500mg".into()),
                    instructions: Some("rest and fluids".into()),
                },
            )
            .expect("treatment save should succeed");
        let before = store.consultation(draft.id).unwrap();

        let snapshot = store
            .finalize_consultation(&phys, draft.id)
            .expect("finalize should succeed");

        assert_eq!(snapshot.snapshot_of, Some(draft.id));
        assert_eq!(snapshot.state, ConsultationState::Completed);
        assert_eq!(snapshot.diagnosis, before.diagnosis);
        assert_eq!(snapshot.treatment, before.treatment);
        assert_eq!(snapshot.instructions, before.instructions);
        assert_eq!(snapshot.lab_orders, before.lab_orders);

        // The draft is untouched, including its state and timestamps.
        let after = store.consultation(draft.id).unwrap();
        assert_eq!(after.state, ConsultationState::InProgress);
        assert_eq!(after.updated_at, before.updated_at);
        assert_eq!(after.snapshot_of, None);

        // Snapshots are immutable and cannot be finalized again.
        assert!(store
            .update_section(
                &phys,
                snapshot.id,
                ConsultationSection::PhysicalExam {
                    physical_exam: Some("later edit".into())
                },
            )
            .is_err());
        assert!(store.finalize_consultation(&phys, snapshot.id).is_err());

        // History lists the snapshot.
        let history = store
            .consultation_history(&phys, patient)
            .expect("history should succeed");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, snapshot.id);
    }

    #[test]
    fn finalizing_twice_yields_two_snapshots() {
        let (store, _dir) = testutil::store();
        let admin = testutil::seed_admin(&store);
        let clinic = testutil::seed_clinic(&store, "Room A");
        let phys = testutil::seed_physician(&store, &admin, "bruno", Some(clinic));
        let patient = testutil::seed_patient(&store, &admin, "Ana", Some(67));
        let draft = store
            .begin_consultation(&phys, patient, Some(clinic), None)
            .expect("begin should succeed");

        store
            .update_section(
                &phys,
                draft.id,
                ConsultationSection::Diagnosis {
                    diagnosis: Some("bronchitis".into()),
                    lab_orders: None,
                },
            )
            .unwrap();
        store
            .update_section(
                &phys,
                draft.id,
                ConsultationSection::Treatment {
                    treatment: Some("amoxicillin".into()),
                    instructions: None,
                },
            )
            .unwrap();

        let first = store.finalize_consultation(&phys, draft.id).unwrap();
        store
            .update_section(
                &phys,
                draft.id,
                ConsultationSection::Diagnosis {
                    diagnosis: Some("pneumonia".into()),
                    lab_orders: None,
                },
            )
            .unwrap();
        let second = store.finalize_consultation(&phys, draft.id).unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.diagnosis.as_deref(), Some("bronchitis"));
        assert_eq!(second.diagnosis.as_deref(), Some("pneumonia"));
        assert_eq!(store.consultation_history(&phys, patient).unwrap().len(), 2);
    }

    #[test]
    fn transfer_moves_the_encounter_between_rooms() {
        let (store, _dir) = testutil::store();
        let admin = testutil::seed_admin(&store);
        let clinic_a = testutil::seed_clinic(&store, "Room A");
        let clinic_b = testutil::seed_clinic(&store, "Room B");
        let clinic_c = testutil::seed_clinic(&store, "Room C");
        let phys = testutil::seed_physician(&store, &admin, "bruno", Some(clinic_a));
        let patient = testutil::seed_patient(&store, &admin, "Ana", Some(67));

        let draft = store
            .begin_consultation(&phys, patient, Some(clinic_a), None)
            .expect("begin should succeed");
        store
            .set_clinic_availability(&phys, clinic_a, false)
            .expect("occupy room A");

        let moved = store
            .transfer_consultation(&phys, draft.id, clinic_b)
            .expect("transfer should succeed");

        assert_eq!(moved.clinic_id, Some(clinic_b));
        assert_eq!(moved.physician_id, Some(phys.user_id));
        assert!(store.clinic(clinic_a).unwrap().available, "old room released");
        assert!(!store.clinic(clinic_b).unwrap().available, "new room occupied");
        assert!(
            store.clinic(clinic_c).unwrap().available,
            "unrelated rooms are not swept"
        );
    }
}
