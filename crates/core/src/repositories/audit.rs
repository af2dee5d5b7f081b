//! Append-only audit trails for privileged changes.
//!
//! Role changes and clinic (re)assignments each record actor, subject, the
//! before/after values, and a timestamp. Rows are inserted in the same
//! transaction as the change they describe and are never updated or
//! deleted.

use crate::models::{ClinicAssignmentAudit, RoleChangeAudit};
use crate::store::Store;
use crate::ClinicResult;
use chrono::Utc;
use clinica_types::Role;
use rusqlite::{params, Connection};

/// Inserts one role-change audit row. Runs on the caller's transaction so
/// the row and the change commit or roll back together.
pub(crate) fn insert_role_change(
    conn: &Connection,
    actor_id: i64,
    subject_id: i64,
    old_role: Role,
    new_role: Role,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO role_change_audit (actor_id, subject_id, old_role, new_role, changed_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            actor_id,
            subject_id,
            old_role.as_str(),
            new_role.as_str(),
            Utc::now()
        ],
    )?;
    Ok(())
}

/// Inserts one clinic-assignment audit row on the caller's transaction.
pub(crate) fn insert_clinic_assignment(
    conn: &Connection,
    actor_id: i64,
    subject_id: i64,
    old_clinic_id: Option<i64>,
    new_clinic_id: Option<i64>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO clinic_assignment_audit \
         (actor_id, subject_id, old_clinic_id, new_clinic_id, changed_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![actor_id, subject_id, old_clinic_id, new_clinic_id, Utc::now()],
    )?;
    Ok(())
}

impl Store {
    /// Role-change history for one subject, oldest first.
    pub fn role_changes_for(&self, subject_id: i64) -> ClinicResult<Vec<RoleChangeAudit>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM role_change_audit WHERE subject_id = ?1 ORDER BY id",
            RoleChangeAudit::COLUMNS
        ))?;
        let rows = stmt
            .query_map([subject_id], RoleChangeAudit::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Clinic-assignment history for one subject, oldest first.
    pub fn clinic_assignments_for(
        &self,
        subject_id: i64,
    ) -> ClinicResult<Vec<ClinicAssignmentAudit>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM clinic_assignment_audit WHERE subject_id = ?1 ORDER BY id",
            ClinicAssignmentAudit::COLUMNS
        ))?;
        let rows = stmt
            .query_map([subject_id], ClinicAssignmentAudit::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
