//! Clinic management HTTP server.
//!
//! Serves the JSON API consumed by the front-desk and consultation screens.
//! Identity arrives per request in an `X-Staff-User` header (the session
//! layer in front resolves logins); all authorization decisions happen in
//! the core against the resolved [`clinica_core::AccessContext`].
//!
//! # Environment Variables
//! - `CLINICA_ADDR`: HTTP listen address (default: "0.0.0.0:3000")
//! - `CLINICA_DB`: SQLite database path (default: "clinica.db")

use axum::routing::{get, post, put};
use axum::{response::Json, Router};
use clinica_core::{CoreConfig, LogNotifier, Notifier, Store};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod identity;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Serialize, utoipa::ToSchema)]
struct HealthRes {
    status: String,
}

#[derive(OpenApi)]
#[openapi(paths(health), components(schemas(HealthRes)))]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clinica=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("CLINICA_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let db_path: PathBuf = std::env::var("CLINICA_DB")
        .unwrap_or_else(|_| "clinica.db".into())
        .into();

    let cfg = Arc::new(CoreConfig::new(db_path)?);
    let store = Store::open(cfg)?;
    let state = AppState {
        store,
        notifier: Arc::new(LogNotifier),
    };

    tracing::info!("++ Starting clinica on {}", addr);

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/patients", get(api::list_patients).post(api::create_patient))
        .route(
            "/api/patients/:id",
            get(api::get_patient)
                .put(api::update_patient)
                .delete(api::delete_patient),
        )
        .route(
            "/api/patients/:id/vitals",
            get(api::latest_patient_vitals).post(api::record_intake_vitals),
        )
        .route("/api/patients/:id/history", get(api::consultation_history))
        .route("/api/patients/:id/consultations", post(api::begin_consultation))
        .route("/api/consultations", get(api::list_consultations))
        .route("/api/consultations/:id", get(api::get_consultation))
        .route("/api/consultations/:id/section", put(api::save_section))
        .route("/api/consultations/:id/vitals", put(api::save_consultation_vitals))
        .route("/api/consultations/:id/finalize", post(api::finalize_consultation))
        .route("/api/consultations/:id/transfer", post(api::transfer_consultation))
        .route("/api/clinics", get(api::list_clinics).post(api::create_clinic))
        .route("/api/clinics/:id/availability", put(api::set_clinic_availability))
        .route("/api/staff", get(api::list_staff).post(api::register_staff))
        .route("/api/staff/:id/role", put(api::change_role))
        .route("/api/staff/:id/clinic", put(api::assign_clinic))
        .route("/api/staff/:id/deactivate", post(api::deactivate_staff))
        .route("/api/staff/:id/audit", get(api::staff_audit))
        .route("/api/stats/gender", get(api::stats_gender))
        .route("/api/stats/ages", get(api::stats_ages))
        .route("/api/stats/monthly", get(api::stats_monthly))
        .route("/api/stats/diagnoses", get(api::stats_diagnoses))
        .route("/api/stats/systems", get(api::stats_systems))
        .route("/api/password-reset/request", post(api::request_password_reset))
        .route("/api/password-reset/confirm", post(api::confirm_password_reset))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint used by monitoring and load balancers.
async fn health() -> Json<HealthRes> {
    Json(HealthRes {
        status: "ok".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_state() -> (AppState, TempDir) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = Arc::new(
            CoreConfig::new(dir.path().join("clinic.db"))
                .expect("config should build")
                .with_bcrypt_cost(4),
        );
        let store = Store::open(cfg).expect("store should open");
        (
            AppState {
                store,
                notifier: Arc::new(LogNotifier),
            },
            dir,
        )
    }

    #[tokio::test]
    async fn health_answers_ok() {
        let (state, _dir) = test_state();
        let response = router(state)
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should run");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_identity_header_is_unauthorized() {
        let (state, _dir) = test_state();
        let response = router(state)
            .oneshot(
                Request::builder()
                    .uri("/api/patients")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should run");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn staff_registration_is_open_and_starts_pending() {
        let (state, _dir) = test_state();
        let response = router(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/staff")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"full_name":"Ana Test","username":"ana","password":"secret-123"}"#,
                    ))
                    .expect("request should build"),
            )
            .await
            .expect("request should run");
        assert_eq!(response.status(), StatusCode::CREATED);

        let user = state
            .store
            .staff_user_by_username("ana")
            .expect("lookup should succeed")
            .expect("account exists");
        assert_eq!(user.role, clinica_types::Role::Pending);
    }

    #[tokio::test]
    async fn pending_accounts_are_redirected_off_clinical_screens() {
        let (state, _dir) = test_state();
        let pending = state
            .store
            .create_staff_user(clinica_core::NewStaffUser {
                full_name: "Carla Test".into(),
                username: "carla".into(),
                email: None,
                password: "secret-123".into(),
            })
            .expect("registration should succeed");
        let admin = clinica_core::AccessContext {
            user_id: 99,
            role: clinica_types::Role::Admin,
            current_clinic: None,
        };
        let patient = state
            .store
            .register_patient(
                &admin,
                clinica_core::NewPatient {
                    full_name: "Ana Morales".into(),
                    ..Default::default()
                },
            )
            .expect("patient registration should succeed");

        for uri in [format!("/api/patients/{}", patient.id), "/api/clinics".into()] {
            let response = router(state.clone())
                .oneshot(
                    Request::builder()
                        .uri(uri.as_str())
                        .header("x-staff-user", pending.id.to_string())
                        .body(Body::empty())
                        .expect("request should build"),
                )
                .await
                .expect("request should run");
            assert_eq!(
                response.status(),
                StatusCode::SEE_OTHER,
                "pending account must be sent to approval, got {} for {}",
                response.status(),
                uri
            );
        }
    }

    #[tokio::test]
    async fn password_reset_answers_uniformly_for_unknown_accounts() {
        let (state, _dir) = test_state();
        let response = router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/password-reset/request")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"email":"nobody@clinic.test"}"#))
                    .expect("request should build"),
            )
            .await
            .expect("request should run");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
