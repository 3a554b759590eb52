use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{AgentId, CallCenterId, LeadId, LeadSubmission};
use super::notifier::LeadEventSink;
use super::repository::{DirectoryRepository, LeadRepository, RepositoryError};
use super::service::{LeadService, LeadServiceError};
use super::status::LeadStatus;

const DEFAULT_BATCH_LIMIT: usize = 100;

/// HTTP surface for capture forms, agents and supervisors.
pub fn lead_router<R, D, E>(service: Arc<LeadService<R, D, E>>) -> Router
where
    R: LeadRepository + 'static,
    D: DirectoryRepository + 'static,
    E: LeadEventSink + 'static,
{
    Router::new()
        .route("/api/v1/leads", post(submit_handler::<R, D, E>))
        .route("/api/v1/leads/:lead_id", get(status_handler::<R, D, E>))
        .route(
            "/api/v1/confirmations/:token",
            get(confirm_handler::<R, D, E>),
        )
        .route(
            "/api/v1/leads/:lead_id/outcome",
            post(outcome_handler::<R, D, E>),
        )
        .route(
            "/api/v1/leads/:lead_id/assign",
            post(assign_handler::<R, D, E>),
        )
        .route(
            "/api/v1/agents/:agent_id/deactivate",
            post(deactivate_handler::<R, D, E>),
        )
        .route(
            "/api/v1/agents/:agent_id/activate",
            post(activate_handler::<R, D, E>),
        )
        .route(
            "/api/v1/distribution/run",
            post(distribute_handler::<R, D, E>),
        )
        .route(
            "/api/v1/call-centers/:call_center_id/statistics",
            get(statistics_handler::<R, D, E>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct OutcomeRequest {
    pub status: LeadStatus,
    #[serde(default)]
    pub agent_id: Option<AgentId>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssignRequest {
    pub agent_id: AgentId,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct BatchQuery {
    pub limit: Option<usize>,
}

impl LeadServiceError {
    /// HTTP status a caller sees for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            LeadServiceError::NotFound(_)
            | LeadServiceError::UnknownToken
            | LeadServiceError::UnknownAgent(_)
            | LeadServiceError::UnknownForm(_) => StatusCode::NOT_FOUND,
            LeadServiceError::TokenExpired(_) => StatusCode::GONE,
            LeadServiceError::Validation(_)
            | LeadServiceError::InactiveForm(_)
            | LeadServiceError::AgentInactive(_)
            | LeadServiceError::AgentOutsideCallCenter { .. }
            | LeadServiceError::NotAssigned(_)
            | LeadServiceError::EmailNotConfirmed(_)
            | LeadServiceError::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            LeadServiceError::NotAssignee { .. } => StatusCode::FORBIDDEN,
            LeadServiceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
            LeadServiceError::Repository(_)
            | LeadServiceError::Distribution(_)
            | LeadServiceError::ConfirmationWindow(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

fn error_response(error: LeadServiceError) -> Response {
    let payload = json!({
        "error": error.to_string(),
    });
    (error.status_code(), axum::Json(payload)).into_response()
}

pub(crate) async fn submit_handler<R, D, E>(
    State(service): State<Arc<LeadService<R, D, E>>>,
    axum::Json(submission): axum::Json<LeadSubmission>,
) -> Response
where
    R: LeadRepository + 'static,
    D: DirectoryRepository + 'static,
    E: LeadEventSink + 'static,
{
    match service.submit(submission) {
        Ok(lead) => (StatusCode::ACCEPTED, axum::Json(lead.status_view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn status_handler<R, D, E>(
    State(service): State<Arc<LeadService<R, D, E>>>,
    Path(lead_id): Path<String>,
) -> Response
where
    R: LeadRepository + 'static,
    D: DirectoryRepository + 'static,
    E: LeadEventSink + 'static,
{
    match service.get(&LeadId(lead_id)) {
        Ok(lead) => (StatusCode::OK, axum::Json(lead.status_view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn confirm_handler<R, D, E>(
    State(service): State<Arc<LeadService<R, D, E>>>,
    Path(token): Path<String>,
) -> Response
where
    R: LeadRepository + 'static,
    D: DirectoryRepository + 'static,
    E: LeadEventSink + 'static,
{
    match service.confirm_email(&token) {
        Ok(lead) => (StatusCode::OK, axum::Json(lead.status_view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn outcome_handler<R, D, E>(
    State(service): State<Arc<LeadService<R, D, E>>>,
    Path(lead_id): Path<String>,
    axum::Json(request): axum::Json<OutcomeRequest>,
) -> Response
where
    R: LeadRepository + 'static,
    D: DirectoryRepository + 'static,
    E: LeadEventSink + 'static,
{
    let lead_id = LeadId(lead_id);
    match service.record_call_outcome(&lead_id, request.status, request.agent_id.as_ref()) {
        Ok(lead) => (StatusCode::OK, axum::Json(lead.status_view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn assign_handler<R, D, E>(
    State(service): State<Arc<LeadService<R, D, E>>>,
    Path(lead_id): Path<String>,
    axum::Json(request): axum::Json<AssignRequest>,
) -> Response
where
    R: LeadRepository + 'static,
    D: DirectoryRepository + 'static,
    E: LeadEventSink + 'static,
{
    match service.assign_manually(&LeadId(lead_id), &request.agent_id) {
        Ok(lead) => (StatusCode::OK, axum::Json(lead.status_view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn deactivate_handler<R, D, E>(
    State(service): State<Arc<LeadService<R, D, E>>>,
    Path(agent_id): Path<String>,
) -> Response
where
    R: LeadRepository + 'static,
    D: DirectoryRepository + 'static,
    E: LeadEventSink + 'static,
{
    match service.deactivate_agent(&AgentId(agent_id)) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn activate_handler<R, D, E>(
    State(service): State<Arc<LeadService<R, D, E>>>,
    Path(agent_id): Path<String>,
) -> Response
where
    R: LeadRepository + 'static,
    D: DirectoryRepository + 'static,
    E: LeadEventSink + 'static,
{
    match service.activate_agent(&AgentId(agent_id)) {
        Ok(agent) => {
            let payload = json!({
                "agent_id": agent.id,
                "is_active": agent.is_active,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn distribute_handler<R, D, E>(
    State(service): State<Arc<LeadService<R, D, E>>>,
    Query(query): Query<BatchQuery>,
) -> Response
where
    R: LeadRepository + 'static,
    D: DirectoryRepository + 'static,
    E: LeadEventSink + 'static,
{
    let limit = query.limit.unwrap_or(DEFAULT_BATCH_LIMIT);
    match service.distribute_unassigned(limit) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn statistics_handler<R, D, E>(
    State(service): State<Arc<LeadService<R, D, E>>>,
    Path(call_center_id): Path<String>,
) -> Response
where
    R: LeadRepository + 'static,
    D: DirectoryRepository + 'static,
    E: LeadEventSink + 'static,
{
    match service.statistics(&CallCenterId(call_center_id)) {
        Ok(stats) => (StatusCode::OK, axum::Json(stats)).into_response(),
        Err(err) => error_response(err),
    }
}
