//! Shared test fixtures.
//!
//! Every test gets its own temporary database; the bcrypt cost is lowered
//! so hashing does not dominate the suite's runtime.

use crate::config::CoreConfig;
use crate::repositories::patients::NewPatient;
use crate::repositories::staff::NewStaffUser;
use crate::scope::AccessContext;
use crate::store::Store;
use chrono::{DateTime, Utc};
use clinica_types::{Role, Sex};
use rusqlite::params;
use std::sync::Arc;
use tempfile::TempDir;

pub const PASSWORD: &str = "secret-123";

/// Fresh store over a throwaway database.
pub fn store() -> (Store, TempDir) {
    store_with(|cfg| cfg)
}

/// Fresh store with a tweaked configuration.
pub fn store_with(f: impl FnOnce(CoreConfig) -> CoreConfig) -> (Store, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let cfg = CoreConfig::new(dir.path().join("clinic.db"))
        .expect("config should build")
        .with_bcrypt_cost(4);
    let store = Store::open(Arc::new(f(cfg))).expect("store should open");
    (store, dir)
}

pub fn new_user(username: &str, email: &str) -> NewStaffUser {
    NewStaffUser {
        full_name: format!("{} Test", username),
        username: username.to_string(),
        email: Some(email.to_string()),
        password: PASSWORD.to_string(),
    }
}

/// Bootstraps the first administrator.
///
/// There is no admin yet to authorize the promotion, so the role is set
/// directly, mirroring the operational first-admin step.
pub fn seed_admin(store: &Store) -> AccessContext {
    let user = store
        .create_staff_user(new_user("admin", "admin@clinic.test"))
        .expect("admin registration should succeed");
    let conn = store.conn().expect("conn should open");
    conn.execute(
        "UPDATE staff_users SET role = ?1 WHERE id = ?2",
        params![Role::Admin.as_str(), user.id],
    )
    .expect("admin promotion should succeed");
    store
        .access_context(user.id)
        .expect("admin context should resolve")
}

/// Registers a user, promotes them to physician, and optionally assigns a
/// current clinic, all through the regular admin operations.
pub fn seed_physician(
    store: &Store,
    admin: &AccessContext,
    username: &str,
    clinic_id: Option<i64>,
) -> AccessContext {
    let user = store
        .create_staff_user(new_user(username, &format!("{}@clinic.test", username)))
        .expect("physician registration should succeed");
    store
        .change_role(admin, user.id, Role::Physician)
        .expect("promotion should succeed");
    if clinic_id.is_some() {
        store
            .assign_clinic(admin, user.id, clinic_id)
            .expect("clinic assignment should succeed");
    }
    store
        .access_context(user.id)
        .expect("physician context should resolve")
}

pub fn seed_clinic(store: &Store, name: &str) -> i64 {
    let admin = AccessContext {
        user_id: 0,
        role: Role::Admin,
        current_clinic: None,
    };
    store
        .create_clinic(&admin, name)
        .expect("clinic creation should succeed")
        .id
}

pub fn seed_patient(store: &Store, ctx: &AccessContext, name: &str, age: Option<i64>) -> i64 {
    store
        .register_patient(
            ctx,
            NewPatient {
                full_name: name.to_string(),
                age,
                ..Default::default()
            },
        )
        .expect("patient registration should succeed")
        .id
}

pub fn seed_patient_with_sex(
    store: &Store,
    ctx: &AccessContext,
    name: &str,
    sex: Option<Sex>,
) -> i64 {
    store
        .register_patient(
            ctx,
            NewPatient {
                full_name: name.to_string(),
                sex,
                ..Default::default()
            },
        )
        .expect("patient registration should succeed")
        .id
}

/// Backdates a consultation's `updated_at`, bypassing the section-save
/// refresh, so time-bucketed statistics can be pinned to a known instant.
pub fn set_consultation_updated_at(store: &Store, consultation_id: i64, at: DateTime<Utc>) {
    let conn = store.conn().expect("conn should open");
    conn.execute(
        "UPDATE consultations SET updated_at = ?1 WHERE id = ?2",
        params![at, consultation_id],
    )
    .expect("timestamp update should succeed");
}
