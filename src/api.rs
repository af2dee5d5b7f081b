//! JSON API handlers and the error-to-status mapping.

use crate::identity::Identity;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Redirect, Response};
use chrono::Utc;
use clinica_core::models::{
    Clinic, ClinicAssignmentAudit, Consultation, Patient, RoleChangeAudit, StaffUser, VitalSigns,
};
use clinica_core::{
    deliver_code, ClinicError, ConsultationSection, CountBucket, NewPatient, NewStaffUser,
    NewVitals, PURPOSE_PASSWORD_RESET,
};
use clinica_types::{Role, Sex};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Domain error carried out to HTTP.
///
/// Redirect-flavoured signals become 303s because the callers of those
/// flows are browser screens; everything else is a JSON error body.
pub struct ApiError(ClinicError);

impl From<ClinicError> for ApiError {
    fn from(e: ClinicError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            ClinicError::NeedsClinicSelection => Redirect::to("/clinics/select").into_response(),
            ClinicError::AwaitingApproval => Redirect::to("/awaiting-approval").into_response(),
            ClinicError::InvalidInput(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "error": msg }))).into_response()
            }
            ClinicError::CodeInvalid => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": "invalid or expired verification code" })),
            )
                .into_response(),
            ClinicError::Forbidden(msg) => {
                (StatusCode::FORBIDDEN, Json(json!({ "error": msg }))).into_response()
            }
            ClinicError::NotFound { entity, id } => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("{} {} not found", entity, id) })),
            )
                .into_response(),
            ClinicError::DuplicateNationalId(id) => (
                StatusCode::CONFLICT,
                Json(json!({ "error": format!("a patient with national id {} already exists", id) })),
            )
                .into_response(),
            ClinicError::DuplicateUsername(name) => (
                StatusCode::CONFLICT,
                Json(json!({ "error": format!("username {} is already taken", name) })),
            )
                .into_response(),
            ClinicError::DuplicateEmail(email) => (
                StatusCode::CONFLICT,
                Json(json!({ "error": format!("email {} is already registered", email) })),
            )
                .into_response(),
            e @ (ClinicError::Storage(_) | ClinicError::PasswordHash(_) | ClinicError::Parse(_)) => {
                tracing::error!(error = %e, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ---- patients -----------------------------------------------------------

#[derive(Deserialize)]
pub struct PatientQuery {
    pub search: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list_patients(
    State(state): State<AppState>,
    Identity(ctx): Identity,
    Query(q): Query<PatientQuery>,
) -> ApiResult<Json<Vec<Patient>>> {
    if let Some(term) = q.search {
        let rows = state.store.search_patients(&term, q.limit.unwrap_or(20))?;
        return Ok(Json(rows));
    }
    let vis = ctx.listing_visibility()?;
    Ok(Json(state.store.list_patients(vis)?))
}

#[derive(Deserialize)]
pub struct PatientBody {
    pub full_name: String,
    pub age: Option<i64>,
    pub sex: Option<Sex>,
    pub national_id: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub occupation: Option<String>,
    pub marital_status: Option<String>,
    #[serde(default)]
    pub has_chart: bool,
}

impl From<PatientBody> for NewPatient {
    fn from(b: PatientBody) -> Self {
        NewPatient {
            full_name: b.full_name,
            age: b.age,
            sex: b.sex,
            national_id: b.national_id,
            phone: b.phone,
            address: b.address,
            occupation: b.occupation,
            marital_status: b.marital_status,
            has_chart: b.has_chart,
        }
    }
}

pub async fn create_patient(
    State(state): State<AppState>,
    Identity(ctx): Identity,
    Json(body): Json<PatientBody>,
) -> ApiResult<(StatusCode, Json<Patient>)> {
    let patient = state.store.register_patient(&ctx, body.into())?;
    Ok((StatusCode::CREATED, Json(patient)))
}

pub async fn get_patient(
    State(state): State<AppState>,
    Identity(ctx): Identity,
    Path(id): Path<i64>,
) -> ApiResult<Json<Patient>> {
    Ok(Json(state.store.patient_scoped(&ctx, id)?))
}

pub async fn update_patient(
    State(state): State<AppState>,
    Identity(ctx): Identity,
    Path(id): Path<i64>,
    Json(body): Json<PatientBody>,
) -> ApiResult<Json<Patient>> {
    Ok(Json(state.store.update_patient(&ctx, id, body.into())?))
}

pub async fn delete_patient(
    State(state): State<AppState>,
    Identity(ctx): Identity,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.store.delete_patient(&ctx, id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- vitals -------------------------------------------------------------

#[derive(Deserialize)]
pub struct VitalsBody {
    pub blood_pressure: Option<String>,
    pub heart_rate: Option<i64>,
    pub respiratory_rate: Option<i64>,
    pub temperature: Option<f64>,
    pub oxygen_saturation: Option<i64>,
    pub glucose: Option<i64>,
}

impl From<VitalsBody> for NewVitals {
    fn from(b: VitalsBody) -> Self {
        NewVitals {
            blood_pressure: b.blood_pressure,
            heart_rate: b.heart_rate,
            respiratory_rate: b.respiratory_rate,
            temperature: b.temperature,
            oxygen_saturation: b.oxygen_saturation,
            glucose: b.glucose,
        }
    }
}

pub async fn record_intake_vitals(
    State(state): State<AppState>,
    Identity(ctx): Identity,
    Path(patient_id): Path<i64>,
    Json(body): Json<VitalsBody>,
) -> ApiResult<(StatusCode, Json<VitalSigns>)> {
    let vitals = state
        .store
        .record_intake_vitals(&ctx, patient_id, body.into())?;
    Ok((StatusCode::CREATED, Json(vitals)))
}

pub async fn latest_patient_vitals(
    State(state): State<AppState>,
    Identity(ctx): Identity,
    Path(patient_id): Path<i64>,
) -> ApiResult<Json<Option<VitalSigns>>> {
    state.store.patient_scoped(&ctx, patient_id)?;
    Ok(Json(state.store.latest_vitals_for_patient(patient_id)?))
}

pub async fn save_consultation_vitals(
    State(state): State<AppState>,
    Identity(ctx): Identity,
    Path(consultation_id): Path<i64>,
    Json(body): Json<VitalsBody>,
) -> ApiResult<Json<VitalSigns>> {
    let vitals = state
        .store
        .save_consultation_vitals(&ctx, consultation_id, body.into())?;
    Ok(Json(vitals))
}

// ---- consultations ------------------------------------------------------

#[derive(Deserialize)]
pub struct BeginConsultationBody {
    pub clinic_id: Option<i64>,
    pub consultation_type: Option<String>,
}

pub async fn begin_consultation(
    State(state): State<AppState>,
    Identity(ctx): Identity,
    Path(patient_id): Path<i64>,
    Json(body): Json<BeginConsultationBody>,
) -> ApiResult<(StatusCode, Json<Consultation>)> {
    let consultation = state.store.begin_consultation(
        &ctx,
        patient_id,
        body.clinic_id,
        body.consultation_type.as_deref(),
    )?;
    Ok((StatusCode::CREATED, Json(consultation)))
}

pub async fn list_consultations(
    State(state): State<AppState>,
    Identity(ctx): Identity,
) -> ApiResult<Json<Vec<Consultation>>> {
    let vis = ctx.listing_visibility()?;
    Ok(Json(state.store.list_consultations(vis)?))
}

pub async fn get_consultation(
    State(state): State<AppState>,
    Identity(ctx): Identity,
    Path(id): Path<i64>,
) -> ApiResult<Json<Consultation>> {
    Ok(Json(state.store.consultation_scoped(&ctx, id)?))
}

/// Mirror of [`ConsultationSection`] with a wire-level tag.
#[derive(Deserialize)]
#[serde(tag = "section", rename_all = "snake_case")]
pub enum SectionBody {
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

impl From<SectionBody> for ConsultationSection {
    fn from(b: SectionBody) -> Self {
        match b {
            SectionBody::VisitReason {
                visit_reason,
                history,
            } => ConsultationSection::VisitReason {
                visit_reason,
                history,
            },
            SectionBody::SystemsReview {
                systems_review,
                obstetric_history,
            } => ConsultationSection::SystemsReview {
                systems_review,
                obstetric_history,
            },
            SectionBody::PhysicalExam { physical_exam } => {
                ConsultationSection::PhysicalExam { physical_exam }
            }
            SectionBody::Diagnosis {
                diagnosis,
                lab_orders,
            } => ConsultationSection::Diagnosis {
                diagnosis,
                lab_orders,
            },
            SectionBody::Treatment {
                treatment,
                instructions,
            } => ConsultationSection::Treatment {
                treatment,
                instructions,
            },
        }
    }
}

pub async fn save_section(
    State(state): State<AppState>,
    Identity(ctx): Identity,
    Path(id): Path<i64>,
    Json(body): Json<SectionBody>,
) -> ApiResult<Json<Consultation>> {
    Ok(Json(state.store.update_section(&ctx, id, body.into())?))
}

pub async fn finalize_consultation(
    State(state): State<AppState>,
    Identity(ctx): Identity,
    Path(id): Path<i64>,
) -> ApiResult<(StatusCode, Json<Consultation>)> {
    let snapshot = state.store.finalize_consultation(&ctx, id)?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

#[derive(Deserialize)]
pub struct TransferBody {
    pub clinic_id: i64,
}

pub async fn transfer_consultation(
    State(state): State<AppState>,
    Identity(ctx): Identity,
    Path(id): Path<i64>,
    Json(body): Json<TransferBody>,
) -> ApiResult<Json<Consultation>> {
    Ok(Json(
        state.store.transfer_consultation(&ctx, id, body.clinic_id)?,
    ))
}

pub async fn consultation_history(
    State(state): State<AppState>,
    Identity(ctx): Identity,
    Path(patient_id): Path<i64>,
) -> ApiResult<Json<Vec<Consultation>>> {
    Ok(Json(state.store.consultation_history(&ctx, patient_id)?))
}

// ---- clinics ------------------------------------------------------------

pub async fn list_clinics(
    State(state): State<AppState>,
    Identity(ctx): Identity,
) -> ApiResult<Json<Vec<Clinic>>> {
    ctx.require(clinica_types::Capability::ClinicalAccess)?;
    Ok(Json(state.store.list_clinics()?))
}

#[derive(Deserialize)]
pub struct ClinicBody {
    pub name: String,
}

pub async fn create_clinic(
    State(state): State<AppState>,
    Identity(ctx): Identity,
    Json(body): Json<ClinicBody>,
) -> ApiResult<(StatusCode, Json<Clinic>)> {
    let clinic = state.store.create_clinic(&ctx, &body.name)?;
    Ok((StatusCode::CREATED, Json(clinic)))
}

#[derive(Deserialize)]
pub struct AvailabilityBody {
    pub available: bool,
}

pub async fn set_clinic_availability(
    State(state): State<AppState>,
    Identity(ctx): Identity,
    Path(id): Path<i64>,
    Json(body): Json<AvailabilityBody>,
) -> ApiResult<Json<Clinic>> {
    Ok(Json(
        state.store.set_clinic_availability(&ctx, id, body.available)?,
    ))
}

// ---- staff & administration ---------------------------------------------

pub async fn list_staff(
    State(state): State<AppState>,
    Identity(ctx): Identity,
) -> ApiResult<Json<Vec<StaffUser>>> {
    ctx.require(clinica_types::Capability::ManageRoles)?;
    Ok(Json(state.store.list_staff()?))
}

#[derive(Deserialize)]
pub struct RegisterBody {
    pub full_name: String,
    pub username: String,
    pub email: Option<String>,
    pub password: String,
}

/// Open registration: the account lands in the `pending` role and waits
/// for an administrator's approval.
pub async fn register_staff(
    State(state): State<AppState>,
    Json(body): Json<RegisterBody>,
) -> ApiResult<(StatusCode, Json<StaffUser>)> {
    let user = state.store.create_staff_user(NewStaffUser {
        full_name: body.full_name,
        username: body.username,
        email: body.email,
        password: body.password,
    })?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[derive(Deserialize)]
pub struct RoleBody {
    pub role: Role,
}

pub async fn change_role(
    State(state): State<AppState>,
    Identity(ctx): Identity,
    Path(id): Path<i64>,
    Json(body): Json<RoleBody>,
) -> ApiResult<StatusCode> {
    state.store.change_role(&ctx, id, body.role)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct AssignClinicBody {
    pub clinic_id: Option<i64>,
}

pub async fn assign_clinic(
    State(state): State<AppState>,
    Identity(ctx): Identity,
    Path(id): Path<i64>,
    Json(body): Json<AssignClinicBody>,
) -> ApiResult<StatusCode> {
    state.store.assign_clinic(&ctx, id, body.clinic_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn deactivate_staff(
    State(state): State<AppState>,
    Identity(ctx): Identity,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.store.unassign_and_deactivate(&ctx, id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct AuditTrail {
    pub role_changes: Vec<RoleChangeAudit>,
    pub clinic_assignments: Vec<ClinicAssignmentAudit>,
}

pub async fn staff_audit(
    State(state): State<AppState>,
    Identity(ctx): Identity,
    Path(id): Path<i64>,
) -> ApiResult<Json<AuditTrail>> {
    ctx.require(clinica_types::Capability::ManageRoles)?;
    Ok(Json(AuditTrail {
        role_changes: state.store.role_changes_for(id)?,
        clinic_assignments: state.store.clinic_assignments_for(id)?,
    }))
}

// ---- statistics ---------------------------------------------------------

#[derive(Serialize)]
pub struct GenderBucket {
    pub sex: Sex,
    pub count: i64,
}

pub async fn stats_gender(
    State(state): State<AppState>,
    Identity(ctx): Identity,
) -> ApiResult<Json<Vec<GenderBucket>>> {
    let vis = ctx.listing_visibility()?;
    let buckets = state
        .store
        .stats_gender(vis)?
        .into_iter()
        .map(|(sex, count)| GenderBucket { sex, count })
        .collect();
    Ok(Json(buckets))
}

pub async fn stats_ages(
    State(state): State<AppState>,
    Identity(ctx): Identity,
) -> ApiResult<Json<Vec<CountBucket>>> {
    let vis = ctx.listing_visibility()?;
    Ok(Json(state.store.stats_age_histogram(vis)?))
}

pub async fn stats_monthly(
    State(state): State<AppState>,
    Identity(ctx): Identity,
) -> ApiResult<Json<Vec<CountBucket>>> {
    let vis = ctx.listing_visibility()?;
    Ok(Json(state.store.stats_monthly_consultations(vis, Utc::now())?))
}

#[derive(Deserialize)]
pub struct TopQuery {
    pub top: Option<usize>,
}

pub async fn stats_diagnoses(
    State(state): State<AppState>,
    Identity(ctx): Identity,
    Query(q): Query<TopQuery>,
) -> ApiResult<Json<Vec<CountBucket>>> {
    let vis = ctx.listing_visibility()?;
    Ok(Json(
        state.store.stats_common_diagnoses(vis, q.top.unwrap_or(10))?,
    ))
}

pub async fn stats_systems(
    State(state): State<AppState>,
    Identity(ctx): Identity,
) -> ApiResult<Json<Vec<CountBucket>>> {
    let vis = ctx.listing_visibility()?;
    Ok(Json(state.store.stats_systems(vis)?))
}

// ---- password reset -----------------------------------------------------

#[derive(Deserialize)]
pub struct ResetRequestBody {
    pub email: String,
}

/// Starts a password reset.
///
/// The response is identical whether or not the account exists, and
/// delivery failure does not change it either; a code that was issued
/// stays valid regardless.
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(body): Json<ResetRequestBody>,
) -> ApiResult<Json<serde_json::Value>> {
    if let Some(code) = state
        .store
        .issue_verification_code(&body.email, PURPOSE_PASSWORD_RESET)?
    {
        let full_name = state
            .store
            .staff_user_by_email(&body.email)?
            .map(|u| u.full_name)
            .unwrap_or_default();
        deliver_code(state.notifier.as_ref(), &body.email, &full_name, &code.code);
    }
    Ok(Json(json!({
        "message": "if the account exists, a verification code has been sent"
    })))
}

#[derive(Deserialize)]
pub struct ResetConfirmBody {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(body): Json<ResetConfirmBody>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .store
        .reset_password_with_code(&body.email, &body.code, &body.new_password)?;
    Ok(Json(json!({ "message": "password updated" })))
}
