//! Staff accounts, roles, and clinic assignment.
//!
//! Registration creates a `pending` account with no privileges; an
//! administrator (or supervising physician, which carries the same
//! capability set) later promotes it and, for physicians, assigns a current
//! clinic. Every effective role or clinic change appends exactly one audit
//! row in the same transaction; a same-value "change" reports success and
//! appends none.

use crate::repositories::audit;
use crate::scope::AccessContext;
use crate::store::Store;
use crate::{ClinicError, ClinicResult};
use chrono::Utc;
use clinica_types::{Capability, Role};
use rusqlite::{params, OptionalExtension};

/// Input for staff registration.
#[derive(Debug, Clone)]
pub struct NewStaffUser {
    pub full_name: String,
    pub username: String,
    pub email: Option<String>,
    pub password: String,
}

impl Store {
    /// Registers a staff account in the `pending` role.
    pub fn create_staff_user(&self, new: NewStaffUser) -> ClinicResult<crate::models::StaffUser> {
        if new.full_name.trim().is_empty() || new.username.trim().is_empty() {
            return Err(ClinicError::InvalidInput(
                "full name and username are required".into(),
            ));
        }
        if new.password.len() < 6 {
            return Err(ClinicError::InvalidInput(
                "password must be at least 6 characters".into(),
            ));
        }

        let hash = bcrypt::hash(&new.password, self.config().bcrypt_cost())?;
        let conn = self.conn()?;
        let result = conn.execute(
            "INSERT INTO staff_users (full_name, username, email, password_hash, role, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                new.full_name.trim(),
                new.username.trim(),
                new.email,
                hash,
                Role::Pending.as_str(),
                Utc::now()
            ],
        );

        match result {
            Ok(_) => self.staff_user(conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(code, msg))
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                // The extended message names the violated column.
                if msg
                    .as_deref()
                    .is_some_and(|m| m.contains("staff_users.email"))
                {
                    Err(ClinicError::DuplicateEmail(new.email.unwrap_or_default()))
                } else {
                    Err(ClinicError::DuplicateUsername(new.username))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Verifies username and password against the stored bcrypt hash.
    ///
    /// Inactive accounts fail exactly like wrong credentials; callers get a
    /// single uniform error either way.
    pub fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> ClinicResult<crate::models::StaffUser> {
        let invalid = || ClinicError::Forbidden("invalid username or password".into());

        let user = self
            .staff_user_by_username(username)?
            .ok_or_else(invalid)?;
        if !user.active {
            return Err(invalid());
        }
        if bcrypt::verify(password, &user.password_hash)? {
            Ok(user)
        } else {
            Err(invalid())
        }
    }

    pub fn staff_user(&self, id: i64) -> ClinicResult<crate::models::StaffUser> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM staff_users WHERE id = ?1",
                crate::models::StaffUser::COLUMNS
            ),
            [id],
            crate::models::StaffUser::from_row,
        )
        .optional()?
        .ok_or(ClinicError::NotFound {
            entity: "staff user",
            id,
        })
    }

    pub fn staff_user_by_username(
        &self,
        username: &str,
    ) -> ClinicResult<Option<crate::models::StaffUser>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {} FROM staff_users WHERE username = ?1",
                    crate::models::StaffUser::COLUMNS
                ),
                [username],
                crate::models::StaffUser::from_row,
            )
            .optional()?)
    }

    pub fn staff_user_by_email(
        &self,
        email: &str,
    ) -> ClinicResult<Option<crate::models::StaffUser>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {} FROM staff_users WHERE email = ?1",
                    crate::models::StaffUser::COLUMNS
                ),
                [email],
                crate::models::StaffUser::from_row,
            )
            .optional()?)
    }

    pub fn list_staff(&self) -> ClinicResult<Vec<crate::models::StaffUser>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM staff_users ORDER BY full_name",
            crate::models::StaffUser::COLUMNS
        ))?;
        let rows = stmt
            .query_map([], crate::models::StaffUser::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Builds the caller's [`AccessContext`] from a staff user id.
    ///
    /// Inactive accounts are treated the same as pending ones: no access.
    pub fn access_context(&self, user_id: i64) -> ClinicResult<AccessContext> {
        let user = self.staff_user(user_id)?;
        Ok(AccessContext {
            user_id: user.id,
            role: if user.active { user.role } else { Role::Pending },
            current_clinic: user.current_clinic_id,
        })
    }

    /// Changes a user's role, appending exactly one audit row per effective
    /// change. A same-value request succeeds without touching the audit
    /// trail.
    pub fn change_role(
        &self,
        ctx: &AccessContext,
        subject_id: i64,
        new_role: Role,
    ) -> ClinicResult<()> {
        ctx.require(Capability::ManageRoles)?;
        let subject = self.staff_user(subject_id)?;
        if subject.role == new_role {
            return Ok(());
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        audit::insert_role_change(&tx, ctx.user_id, subject_id, subject.role, new_role)?;
        tx.execute(
            "UPDATE staff_users SET role = ?1 WHERE id = ?2",
            params![new_role.as_str(), subject_id],
        )?;
        tx.commit()?;

        tracing::info!(
            actor = ctx.user_id,
            subject = subject_id,
            old = %subject.role,
            new = %new_role,
            "role changed"
        );
        Ok(())
    }

    /// Assigns (or clears) a physician's current clinic.
    ///
    /// Only physicians can hold a clinic; a same-value assignment is a
    /// reported-success no-op with no audit row.
    pub fn assign_clinic(
        &self,
        ctx: &AccessContext,
        physician_id: i64,
        clinic_id: Option<i64>,
    ) -> ClinicResult<()> {
        ctx.require(Capability::ManageRoles)?;
        let subject = self.staff_user(physician_id)?;
        if subject.role != Role::Physician {
            return Err(ClinicError::InvalidInput(format!(
                "user {} is not a physician (role: {})",
                physician_id, subject.role
            )));
        }
        if let Some(clinic_id) = clinic_id {
            // Existence check up front so the error names the clinic.
            self.clinic(clinic_id)?;
        }
        if subject.current_clinic_id == clinic_id {
            return Ok(());
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        audit::insert_clinic_assignment(
            &tx,
            ctx.user_id,
            physician_id,
            subject.current_clinic_id,
            clinic_id,
        )?;
        tx.execute(
            "UPDATE staff_users SET current_clinic_id = ?1 WHERE id = ?2",
            params![clinic_id, physician_id],
        )?;
        tx.commit()?;

        tracing::info!(
            actor = ctx.user_id,
            subject = physician_id,
            old = ?subject.current_clinic_id,
            new = ?clinic_id,
            "clinic assignment changed"
        );
        Ok(())
    }

    /// Detaches a physician from future access: clears the clinic,
    /// deactivates the account, and demotes the role to `pending`.
    ///
    /// Existing consultations and patients are never touched; removing a
    /// physician only cuts off future access.
    pub fn unassign_and_deactivate(
        &self,
        ctx: &AccessContext,
        physician_id: i64,
    ) -> ClinicResult<()> {
        ctx.require(Capability::ManageRoles)?;
        let subject = self.staff_user(physician_id)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if subject.current_clinic_id.is_some() {
            audit::insert_clinic_assignment(
                &tx,
                ctx.user_id,
                physician_id,
                subject.current_clinic_id,
                None,
            )?;
        }
        if subject.role != Role::Pending {
            audit::insert_role_change(&tx, ctx.user_id, physician_id, subject.role, Role::Pending)?;
        }
        tx.execute(
            "UPDATE staff_users SET current_clinic_id = NULL, active = 0, role = ?1 WHERE id = ?2",
            params![Role::Pending.as_str(), physician_id],
        )?;
        tx.commit()?;

        tracing::info!(actor = ctx.user_id, subject = physician_id, "physician deactivated");
        Ok(())
    }

    /// Replaces a user's password hash.
    pub fn set_password(&self, user_id: i64, new_password: &str) -> ClinicResult<()> {
        if new_password.len() < 6 {
            return Err(ClinicError::InvalidInput(
                "password must be at least 6 characters".into(),
            ));
        }
        let hash = bcrypt::hash(new_password, self.config().bcrypt_cost())?;
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE staff_users SET password_hash = ?1 WHERE id = ?2",
            params![hash, user_id],
        )?;
        if changed == 0 {
            return Err(ClinicError::NotFound {
                entity: "staff user",
                id: user_id,
            });
        }
        Ok(())
    }
}
