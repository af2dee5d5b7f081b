//! Shared domain types for the Clinica workspace.
//!
//! This crate holds the small closed vocabularies used by every other crate:
//! staff roles and their capabilities, consultation states, and patient sex.
//! Keeping them here means the storage layer, the core services, and the HTTP
//! surface all agree on the same spellings and the same privilege table.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors that can occur when parsing a domain vocabulary value.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unknown role: {0}")]
    UnknownRole(String),
    #[error("unknown consultation state: {0}")]
    UnknownState(String),
    #[error("unknown sex: {0}")]
    UnknownSex(String),
}

/// Staff roles, ordered roughly by privilege.
///
/// `Pending` is the post-registration holding state: the account exists but
/// has no operating privileges until an administrator approves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Pending,
    Physician,
    SupervisingPhysician,
    Admin,
}

/// Privileged actions a role may perform.
///
/// The role/capability table is declared once here. Route guards and core
/// services check capabilities, never role equality, so the equivalence of
/// admin and supervising physician is a single line rather than a convention
/// scattered per-route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Access clinical screens at all (patients, consultations, stats).
    ClinicalAccess,
    /// Change another user's role or clinic assignment.
    ManageRoles,
    /// Administer clinic rooms (create, rename, force availability).
    ManageClinics,
    /// See every record regardless of clinic scoping.
    ViewAllRecords,
    /// Destructive record operations (cascading patient delete).
    ManageRecords,
}

impl Role {
    /// Central capability table.
    pub fn has_capability(self, cap: Capability) -> bool {
        match self {
            Role::Pending => false,
            Role::Physician => matches!(cap, Capability::ClinicalAccess),
            Role::SupervisingPhysician | Role::Admin => matches!(
                cap,
                Capability::ClinicalAccess
                    | Capability::ManageRoles
                    | Capability::ManageClinics
                    | Capability::ViewAllRecords
                    | Capability::ManageRecords
            ),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Pending => "pending",
            Role::Physician => "physician",
            Role::SupervisingPhysician => "supervising_physician",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Role::Pending),
            "physician" => Ok(Role::Physician),
            "supervising_physician" => Ok(Role::SupervisingPhysician),
            "admin" => Ok(Role::Admin),
            other => Err(ParseError::UnknownRole(other.to_string())),
        }
    }
}

/// Consultation lifecycle states.
///
/// There is no cancelled state: an abandoned draft simply remains
/// `InProgress` forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationState {
    InProgress,
    Completed,
}

impl ConsultationState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConsultationState::InProgress => "in_progress",
            ConsultationState::Completed => "completed",
        }
    }
}

impl fmt::Display for ConsultationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsultationState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(ConsultationState::InProgress),
            "completed" => Ok(ConsultationState::Completed),
            other => Err(ParseError::UnknownState(other.to_string())),
        }
    }
}

/// Patient sex as recorded at intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub fn as_str(self) -> &'static str {
        match self {
            Sex::Male => "male",
            Sex::Female => "female",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sex {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Sex::Male),
            "female" => Ok(Sex::Female),
            other => Err(ParseError::UnknownSex(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_has_no_capabilities() {
        for cap in [
            Capability::ClinicalAccess,
            Capability::ManageRoles,
            Capability::ManageClinics,
            Capability::ViewAllRecords,
            Capability::ManageRecords,
        ] {
            assert!(!Role::Pending.has_capability(cap));
        }
    }

    #[test]
    fn supervising_physician_matches_admin() {
        for cap in [
            Capability::ClinicalAccess,
            Capability::ManageRoles,
            Capability::ManageClinics,
            Capability::ViewAllRecords,
            Capability::ManageRecords,
        ] {
            assert_eq!(
                Role::SupervisingPhysician.has_capability(cap),
                Role::Admin.has_capability(cap),
                "supervising physician and admin must agree on {cap:?}"
            );
        }
    }

    #[test]
    fn physician_has_clinical_access_only() {
        assert!(Role::Physician.has_capability(Capability::ClinicalAccess));
        assert!(!Role::Physician.has_capability(Capability::ManageRoles));
        assert!(!Role::Physician.has_capability(Capability::ViewAllRecords));
    }

    #[test]
    fn roles_round_trip_through_strings() {
        for role in [
            Role::Pending,
            Role::Physician,
            Role::SupervisingPhysician,
            Role::Admin,
        ] {
            let parsed: Role = role.as_str().parse().expect("role string should parse");
            assert_eq!(parsed, role);
        }
        assert!("receptionist".parse::<Role>().is_err());
    }
}
