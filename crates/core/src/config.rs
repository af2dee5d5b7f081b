//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into the
//! store and services. Request handlers never read process-wide environment
//! variables; that keeps behaviour consistent across multi-threaded runtimes
//! and test harnesses.

use crate::{ClinicError, ClinicResult};
use std::path::{Path, PathBuf};

/// Default lifetime of a verification code.
pub const DEFAULT_CODE_TTL_MINUTES: i64 = 30;

/// Maximum failed attempts before a verification code is invalidated.
pub const DEFAULT_CODE_MAX_ATTEMPTS: i64 = 3;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    database_path: PathBuf,
    code_ttl_minutes: i64,
    code_max_attempts: i64,
    bcrypt_cost: u32,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    pub fn new(database_path: PathBuf) -> ClinicResult<Self> {
        if database_path.as_os_str().is_empty() {
            return Err(ClinicError::InvalidInput(
                "database path cannot be empty".into(),
            ));
        }

        Ok(Self {
            database_path,
            code_ttl_minutes: DEFAULT_CODE_TTL_MINUTES,
            code_max_attempts: DEFAULT_CODE_MAX_ATTEMPTS,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        })
    }

    /// Override the verification-code lifetime, mainly for tests.
    pub fn with_code_ttl_minutes(mut self, minutes: i64) -> Self {
        self.code_ttl_minutes = minutes;
        self
    }

    /// Override the bcrypt cost. Tests lower it to keep hashing fast.
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn code_ttl_minutes(&self) -> i64 {
        self.code_ttl_minutes
    }

    pub fn code_max_attempts(&self) -> i64 {
        self.code_max_attempts
    }

    pub fn bcrypt_cost(&self) -> u32 {
        self.bcrypt_cost
    }
}
