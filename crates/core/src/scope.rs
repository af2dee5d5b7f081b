//! Access scoping.
//!
//! Every read of patients, consultations, and statistics is restricted by
//! the caller's role and, for physicians, their current clinic. The rules:
//!
//! - admin / supervising physician: global visibility;
//! - physician with a current clinic: that clinic's consultations, plus any
//!   consultation they personally authored (ownership overrides clinic
//!   scoping);
//! - physician without a clinic: clinic-scoped screens send them to clinic
//!   selection first; personally-owned consultations stay reachable;
//! - pending accounts: blocked from all clinical screens.
//!
//! Listings return filtered sets. Direct access by id to something outside
//! scope is a hard [`ClinicError::Forbidden`], never an empty success.

use crate::models::Consultation;
use crate::{ClinicError, ClinicResult};
use clinica_types::{Capability, Role};

/// The caller's identity as supplied by the session layer.
#[derive(Debug, Clone, Copy)]
pub struct AccessContext {
    pub user_id: i64,
    pub role: Role,
    pub current_clinic: Option<i64>,
}

/// Resolved visibility over the record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Unrestricted.
    Global,
    /// Consultations in `clinic_id`, plus anything authored by
    /// `physician_id`.
    Clinic { clinic_id: i64, physician_id: i64 },
    /// Only consultations authored by `physician_id`.
    OwnOnly { physician_id: i64 },
}

impl AccessContext {
    /// Requires a capability, failing hard when absent.
    pub fn require(&self, cap: Capability) -> ClinicResult<()> {
        if self.role == Role::Pending {
            return Err(ClinicError::AwaitingApproval);
        }
        if self.role.has_capability(cap) {
            Ok(())
        } else {
            Err(ClinicError::Forbidden(format!(
                "role {} lacks {:?}",
                self.role, cap
            )))
        }
    }

    /// Visibility for direct record access.
    ///
    /// A physician without a clinic still reaches records they authored, so
    /// this resolves to [`Visibility::OwnOnly`] rather than an error.
    pub fn visibility(&self) -> ClinicResult<Visibility> {
        match self.role {
            Role::Pending => Err(ClinicError::AwaitingApproval),
            Role::Admin | Role::SupervisingPhysician => Ok(Visibility::Global),
            Role::Physician => Ok(match self.current_clinic {
                Some(clinic_id) => Visibility::Clinic {
                    clinic_id,
                    physician_id: self.user_id,
                },
                None => Visibility::OwnOnly {
                    physician_id: self.user_id,
                },
            }),
        }
    }

    /// Visibility for clinic-scoped listing screens.
    ///
    /// Unlike [`visibility`](Self::visibility), a physician without a
    /// current clinic is sent to clinic selection here.
    pub fn listing_visibility(&self) -> ClinicResult<Visibility> {
        match self.visibility()? {
            Visibility::OwnOnly { .. } => Err(ClinicError::NeedsClinicSelection),
            vis => Ok(vis),
        }
    }

    /// Checks whether a specific consultation is within the caller's scope.
    pub fn check_consultation(&self, consultation: &Consultation) -> ClinicResult<()> {
        match self.visibility()? {
            Visibility::Global => Ok(()),
            Visibility::Clinic {
                clinic_id,
                physician_id,
            } => {
                if consultation.physician_id == Some(physician_id)
                    || consultation.clinic_id == Some(clinic_id)
                {
                    Ok(())
                } else {
                    Err(ClinicError::Forbidden(format!(
                        "consultation {} is outside clinic {}",
                        consultation.id, clinic_id
                    )))
                }
            }
            Visibility::OwnOnly { physician_id } => {
                if consultation.physician_id == Some(physician_id) {
                    Ok(())
                } else {
                    Err(ClinicError::Forbidden(format!(
                        "consultation {} is not owned by the caller",
                        consultation.id
                    )))
                }
            }
        }
    }
}

/// SQL fragment restricting a consultations query (aliased `c`) to the
/// given visibility. The fragment binds `?1` and `?2` as described by the
/// returned parameter list.
pub(crate) fn consultation_filter(vis: Visibility) -> (&'static str, Vec<i64>) {
    match vis {
        Visibility::Global => ("1 = 1", vec![]),
        Visibility::Clinic {
            clinic_id,
            physician_id,
        } => (
            "(c.clinic_id = ?1 OR c.physician_id = ?2)",
            vec![clinic_id, physician_id],
        ),
        Visibility::OwnOnly { physician_id } => ("c.physician_id = ?1", vec![physician_id]),
    }
}
