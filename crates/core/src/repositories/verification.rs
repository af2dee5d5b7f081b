//! Short-lived verification codes.
//!
//! A code is bound to an email and a purpose, lives for a configured
//! window, and is consumed exactly once: marked used on a successful
//! validation, or dead after three failed attempts or expiry. Issuing a
//! fresh code retires any outstanding one for the same email and purpose.

use crate::models::VerificationCode;
use crate::store::Store;
use crate::{ClinicError, ClinicResult};
use chrono::{Duration, Utc};
use rand::Rng;
use rusqlite::{params, OptionalExtension};

pub const PURPOSE_PASSWORD_RESET: &str = "password_reset";
pub const PURPOSE_EMAIL_VERIFY: &str = "email_verify";

impl Store {
    /// Issues a verification code for the account behind `email`.
    ///
    /// Returns `Ok(None)` when no account matches: callers answering
    /// user-enumeration-sensitive endpoints report success either way and
    /// simply have nothing to deliver.
    pub fn issue_verification_code(
        &self,
        email: &str,
        purpose: &str,
    ) -> ClinicResult<Option<VerificationCode>> {
        let Some(user) = self.staff_user_by_email(email)? else {
            return Ok(None);
        };

        let code = rand::thread_rng().gen_range(1000..=9999).to_string();
        let now = Utc::now();
        let expires_at = now + Duration::minutes(self.config().code_ttl_minutes());

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE verification_codes SET used = 1 WHERE email = ?1 AND purpose = ?2 AND used = 0",
            params![email, purpose],
        )?;
        tx.execute(
            "INSERT INTO verification_codes \
             (email, user_id, purpose, code, expires_at, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![email, user.id, purpose, code, expires_at, now],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        let conn = self.conn()?;
        let row = conn.query_row(
            &format!(
                "SELECT {} FROM verification_codes WHERE id = ?1",
                VerificationCode::COLUMNS
            ),
            [id],
            VerificationCode::from_row,
        )?;
        Ok(Some(row))
    }

    /// Validates and consumes a code.
    ///
    /// Wrong guesses burn an attempt; the third failure, expiry, or prior
    /// use all yield the same [`ClinicError::CodeInvalid`].
    pub fn validate_verification_code(
        &self,
        email: &str,
        purpose: &str,
        code: &str,
    ) -> ClinicResult<()> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM verification_codes \
                     WHERE email = ?1 AND purpose = ?2 AND used = 0 \
                     ORDER BY id DESC LIMIT 1",
                    VerificationCode::COLUMNS
                ),
                params![email, purpose],
                VerificationCode::from_row,
            )
            .optional()?;

        let Some(row) = row else {
            return Err(ClinicError::CodeInvalid);
        };
        if Utc::now() > row.expires_at || row.attempts >= self.config().code_max_attempts() {
            return Err(ClinicError::CodeInvalid);
        }

        if row.code != code.trim() {
            conn.execute(
                "UPDATE verification_codes SET attempts = attempts + 1 WHERE id = ?1",
                [row.id],
            )?;
            return Err(ClinicError::CodeInvalid);
        }

        conn.execute("UPDATE verification_codes SET used = 1 WHERE id = ?1", [row.id])?;
        Ok(())
    }

    /// Completes a password reset: validates the code, then replaces the
    /// password of the account behind the email.
    pub fn reset_password_with_code(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> ClinicResult<()> {
        self.validate_verification_code(email, PURPOSE_PASSWORD_RESET, code)?;
        let user = self
            .staff_user_by_email(email)?
            .ok_or(ClinicError::CodeInvalid)?;
        self.set_password(user.id, new_password)?;
        tracing::info!(user = user.id, "password reset via verification code");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn issue_and_validate_consumes_the_code_once() {
        let (store, _dir) = testutil::store();
        store
            .create_staff_user(testutil::new_user("ana", "ana@clinic.test"))
            .expect("registration should succeed");

        let code = store
            .issue_verification_code("ana@clinic.test", PURPOSE_PASSWORD_RESET)
            .expect("issue should succeed")
            .expect("account exists");
        assert_eq!(code.code.len(), 4);

        store
            .validate_verification_code("ana@clinic.test", PURPOSE_PASSWORD_RESET, &code.code)
            .expect("first validation should succeed");

        let err = store
            .validate_verification_code("ana@clinic.test", PURPOSE_PASSWORD_RESET, &code.code)
            .expect_err("a consumed code must not validate again");
        assert!(matches!(err, ClinicError::CodeInvalid));
    }

    #[test]
    fn unknown_email_issues_nothing() {
        let (store, _dir) = testutil::store();
        let issued = store
            .issue_verification_code("nobody@clinic.test", PURPOSE_PASSWORD_RESET)
            .expect("issue should not error for unknown accounts");
        assert!(issued.is_none());
    }

    #[test]
    fn three_wrong_guesses_kill_the_code() {
        let (store, _dir) = testutil::store();
        store
            .create_staff_user(testutil::new_user("ana", "ana@clinic.test"))
            .expect("registration should succeed");
        let code = store
            .issue_verification_code("ana@clinic.test", PURPOSE_PASSWORD_RESET)
            .unwrap()
            .unwrap();

        for _ in 0..3 {
            assert!(store
                .validate_verification_code("ana@clinic.test", PURPOSE_PASSWORD_RESET, "0000")
                .is_err());
        }
        // Even the right code fails now.
        let err = store
            .validate_verification_code("ana@clinic.test", PURPOSE_PASSWORD_RESET, &code.code)
            .expect_err("code must be dead after three failures");
        assert!(matches!(err, ClinicError::CodeInvalid));
    }

    #[test]
    fn expired_codes_are_rejected() {
        let (store, _dir) = testutil::store_with(|cfg| cfg.with_code_ttl_minutes(-1));
        store
            .create_staff_user(testutil::new_user("ana", "ana@clinic.test"))
            .expect("registration should succeed");
        let code = store
            .issue_verification_code("ana@clinic.test", PURPOSE_PASSWORD_RESET)
            .unwrap()
            .unwrap();

        let err = store
            .validate_verification_code("ana@clinic.test", PURPOSE_PASSWORD_RESET, &code.code)
            .expect_err("expired code must not validate");
        assert!(matches!(err, ClinicError::CodeInvalid));
    }

    #[test]
    fn reissuing_retires_the_previous_code() {
        let (store, _dir) = testutil::store();
        store
            .create_staff_user(testutil::new_user("ana", "ana@clinic.test"))
            .expect("registration should succeed");

        let first = store
            .issue_verification_code("ana@clinic.test", PURPOSE_PASSWORD_RESET)
            .unwrap()
            .unwrap();
        let second = store
            .issue_verification_code("ana@clinic.test", PURPOSE_PASSWORD_RESET)
            .unwrap()
            .unwrap();

        assert!(store
            .validate_verification_code("ana@clinic.test", PURPOSE_PASSWORD_RESET, &first.code)
            .is_err());
        store
            .validate_verification_code("ana@clinic.test", PURPOSE_PASSWORD_RESET, &second.code)
            .expect("latest code should validate");
    }

    #[test]
    fn reset_updates_the_password() {
        let (store, _dir) = testutil::store();
        store
            .create_staff_user(testutil::new_user("ana", "ana@clinic.test"))
            .expect("registration should succeed");
        let code = store
            .issue_verification_code("ana@clinic.test", PURPOSE_PASSWORD_RESET)
            .unwrap()
            .unwrap();

        store
            .reset_password_with_code("ana@clinic.test", &code.code, "new-password-1")
            .expect("reset should succeed");

        store
            .authenticate("ana", "new-password-1")
            .expect("new password should authenticate");
        assert!(store.authenticate("ana", testutil::PASSWORD).is_err());
    }
}
