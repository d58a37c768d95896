//! REST API handlers.
//!
//! Ingest goes through the compose decoder into the `StateStore`; the
//! listing joins store contents with what the runtime reports.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use dockgrid_compose::decode_project;
use dockgrid_state::{Project, Service, StateError, Volume};

use crate::ApiState;

/// Status reported for services the runtime knows nothing about.
pub const UNKNOWN_STATUS: &str = "unknown";

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    ApiResponse::ok("ok")
}

// ── Ingest ─────────────────────────────────────────────────────

/// Query parameters of `POST /create`.
#[derive(Debug, Deserialize)]
pub struct CreateParams {
    pub project: Option<String>,
    /// URL-safe base64 compose text.
    pub compose: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateResponse {
    pub msg: String,
}

/// POST /create?project=&compose=
pub async fn create_project(
    State(state): State<ApiState>,
    Query(params): Query<CreateParams>,
) -> impl IntoResponse {
    let Some(project) = params.project.filter(|p| !p.trim().is_empty()) else {
        return error_response("missing query parameter 'project'", StatusCode::BAD_REQUEST)
            .into_response();
    };
    let Some(compose) = params.compose.filter(|c| !c.trim().is_empty()) else {
        return error_response("missing query parameter 'compose'", StatusCode::BAD_REQUEST)
            .into_response();
    };

    let definition = match decode_project(&project, &compose) {
        Ok(definition) => definition,
        Err(e) => {
            warn!(%project, error = %e, "rejected compose definition");
            return error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response();
        }
    };

    match state.store.ingest_project(&definition) {
        Ok(created) => {
            info!(project = %created.name, id = created.id, "project created");
            let body = CreateResponse {
                msg: format!("Project '{}' created", created.name),
            };
            (StatusCode::CREATED, ApiResponse::ok(body)).into_response()
        }
        Err(e) => {
            warn!(%project, error = %e, "project ingest failed");
            error_response(&e.to_string(), ingest_error_status(&e)).into_response()
        }
    }
}

/// Duplicate names are conflicts; every other ingest failure is blamed on
/// the submitted definition.
fn ingest_error_status(err: &StateError) -> StatusCode {
    match err {
        StateError::Conflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::BAD_REQUEST,
    }
}

// ── Listing ────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatusEntry {
    pub name: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct FleetListing {
    pub projects: Vec<Project>,
    pub services: Vec<Service>,
    pub volumes: Vec<Volume>,
    pub statuses: Vec<ServiceStatusEntry>,
}

/// GET /ps
pub async fn list_fleet(State(state): State<ApiState>) -> impl IntoResponse {
    let (projects, services, volumes) = match load_desired_state(&state) {
        Ok(listing) => listing,
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    };

    let mut statuses = Vec::with_capacity(services.len());
    for service in &services {
        // Build-based services never get a container.
        let status = if service.is_build_based() {
            None
        } else {
            match state.runtime.container_status(service.name()).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(service = %service.name(), error = %e, "status query failed");
                    return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                        .into_response();
                }
            }
        };
        statuses.push(ServiceStatusEntry {
            name: service.name().to_string(),
            status: status.unwrap_or_else(|| UNKNOWN_STATUS.to_string()),
        });
    }

    ApiResponse::ok(FleetListing {
        projects,
        services,
        volumes,
        statuses,
    })
    .into_response()
}

fn load_desired_state(
    state: &ApiState,
) -> Result<(Vec<Project>, Vec<Service>, Vec<Volume>), StateError> {
    Ok((
        state.store.list_projects()?,
        state.store.list_services()?,
        state.store.list_volumes()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use base64::Engine as _;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use dockgrid_runtime::ObservedState;
    use dockgrid_runtime::fake::FakeRuntime;
    use dockgrid_state::StateStore;

    const COMPOSE: &str = "services:\n  web:\n    image: nginx:alpine\n  app:\n    build: .\n";

    fn test_state() -> (ApiState, Arc<FakeRuntime>) {
        let store = StateStore::open_in_memory().unwrap();
        let runtime = Arc::new(FakeRuntime::new());
        (
            ApiState {
                store,
                runtime: runtime.clone(),
            },
            runtime,
        )
    }

    fn params(project: Option<&str>, compose: Option<&str>) -> Query<CreateParams> {
        Query(CreateParams {
            project: project.map(str::to_string),
            compose: compose.map(str::to_string),
        })
    }

    fn encoded() -> String {
        URL_SAFE_NO_PAD.encode(COMPOSE)
    }

    #[tokio::test]
    async fn healthz_ok() {
        let resp = healthz().await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_then_conflict() {
        let (state, _) = test_state();
        let compose = encoded();

        let resp = create_project(State(state.clone()), params(Some("demo"), Some(&compose)))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert!(state.store.get_project("demo").unwrap().is_some());

        let resp = create_project(State(state), params(Some("demo"), Some(&compose)))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn create_requires_both_parameters() {
        let (state, _) = test_state();
        let compose = encoded();

        let resp = create_project(State(state.clone()), params(None, Some(&compose)))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = create_project(State(state), params(Some("demo"), None))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_rejects_bad_compose() {
        let (state, _) = test_state();
        let resp = create_project(State(state.clone()), params(Some("demo"), Some("%%%")))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(state.store.list_projects().unwrap().is_empty());
    }

    #[tokio::test]
    async fn other_ingest_failures_are_bad_requests() {
        let (state, _) = test_state();
        create_project(State(state.clone()), params(Some("first"), Some(&encoded()))).await;

        // Same service names under a different project.
        let resp = create_project(State(state), params(Some("second"), Some(&encoded())))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn listing_reports_unknown_for_missing_containers() {
        let (state, runtime) = test_state();
        create_project(State(state.clone()), params(Some("demo"), Some(&encoded()))).await;

        let body = listing_body(State(state.clone())).await;
        assert_eq!(status_of(&body, "web"), "unknown");
        assert_eq!(status_of(&body, "app"), "unknown");

        runtime.insert_container("web", "nginx:alpine", ObservedState::running());
        let body = listing_body(State(state)).await;
        assert_eq!(body["success"], true);
        assert_eq!(status_of(&body, "web"), "running");
        assert_eq!(status_of(&body, "app"), "unknown");
    }

    async fn listing_body(state: State<ApiState>) -> serde_json::Value {
        let resp = list_fleet(state).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn status_of(body: &serde_json::Value, name: &str) -> String {
        body["data"]["statuses"]
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["name"] == name)
            .and_then(|s| s["status"].as_str())
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn listing_fails_when_runtime_fails() {
        let (state, runtime) = test_state();
        create_project(State(state.clone()), params(Some("demo"), Some(&encoded()))).await;
        runtime.fail_find("web");

        let resp = list_fleet(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn ingest_status_mapping() {
        assert_eq!(
            ingest_error_status(&StateError::Conflict("demo".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ingest_error_status(&StateError::Validation("dup".to_string())),
            StatusCode::BAD_REQUEST
        );
    }
}
