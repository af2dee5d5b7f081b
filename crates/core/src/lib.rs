//! Core domain logic for the clinic management system.
//!
//! Everything stateful goes through [`Store`], an SQLite-backed handle
//! whose operations are grouped by entity under [`repositories`]. Access
//! control is resolved once per request into an [`AccessContext`] and
//! passed down; the store never reads ambient state.

pub mod classify;
pub mod config;
pub mod error;
pub mod models;
pub mod notify;
pub mod repositories;
pub mod scope;
pub mod stats;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::CoreConfig;
pub use error::{ClinicError, ClinicResult};
pub use notify::{deliver_code, LogNotifier, Notifier, NotifyError};
pub use repositories::consultations::ConsultationSection;
pub use repositories::patients::NewPatient;
pub use repositories::staff::NewStaffUser;
pub use repositories::verification::{PURPOSE_EMAIL_VERIFY, PURPOSE_PASSWORD_RESET};
pub use repositories::vitals::NewVitals;
pub use scope::{AccessContext, Visibility};
pub use stats::{CountBucket, AGE_RANGES, TREND_MONTHS};
pub use store::Store;
