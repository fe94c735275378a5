//! # Pipeline API
//!
//! HTTP surface over a running orchestrator dispatcher. Every mutating
//! request becomes a [`PipelineEvent`] submitted through the shared
//! [`OrchestratorHandle`], so requests never race on the master document.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::{get, post},
    Router,
};
use futures::stream::{self, Stream};
use keel_core::skills::DecisionStatus;
use keel_core::state::{DocumentStore, MasterDocument, NlpCommand};
use keel_core::swarm::{AgentEvent, EventOutcome, OrchestratorHandle, PipelineEvent};
use keel_core::PipelineError;
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::broadcast;
use utoipa::{OpenApi, ToSchema};

const HEARTBEAT: Duration = Duration::from_secs(15);

/// Application state
pub struct AppState {
    pub handle: OrchestratorHandle,
    pub store: DocumentStore,
    pub event_tx: broadcast::Sender<AgentEvent>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    fn actor(&self, named: Option<String>) -> String {
        named.unwrap_or_else(|| self.store.default_actor().to_string())
    }
}

// === Request / Response Types ===

/// Raw pipeline event, tagged by `type`
#[derive(Deserialize, ToSchema)]
pub struct SubmitEventRequest {
    #[schema(value_type = Object)]
    pub event: PipelineEvent,
}

#[derive(Deserialize, ToSchema)]
pub struct UploadRequest {
    pub project_id: String,
    #[schema(value_type = String)]
    pub document_path: PathBuf,
    pub uploaded_by: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CommandRequest {
    pub command: String,
    pub issued_by: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct DecisionRequest {
    /// `approved` or `rejected`
    #[schema(value_type = String)]
    pub status: DecisionStatus,
    pub decided_by: Option<String>,
}

#[derive(Deserialize, Default, ToSchema)]
pub struct RunFeatureRequest {
    pub issued_by: Option<String>,
    pub instructions: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct OutcomeResponse {
    #[schema(value_type = Object)]
    pub outcome: EventOutcome,
}

#[derive(Serialize, ToSchema)]
pub struct DocumentResponse {
    #[schema(value_type = Object)]
    pub document: MasterDocument,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Pipeline failure mapped onto an HTTP status
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            PipelineError::MissingDocument { .. } => (StatusCode::NOT_FOUND, "missing_document"),
            PipelineError::FeatureNotFound(_) => (StatusCode::NOT_FOUND, "feature_not_found"),
            PipelineError::TaskNotFound(_) => (StatusCode::NOT_FOUND, "task_not_found"),
            PipelineError::ProposalNotFound(_) => (StatusCode::NOT_FOUND, "proposal_not_found"),
            PipelineError::ProposalAlreadyDecided { .. } => {
                (StatusCode::CONFLICT, "proposal_already_decided")
            }
            PipelineError::StaleDocument { .. } => (StatusCode::CONFLICT, "stale_document"),
            PipelineError::PatchValidation { .. }
            | PipelineError::PatchTargetMissing { .. }
            | PipelineError::PatchOutsideWorkspace { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "patch_rejected")
            }
            PipelineError::DispatcherClosed => {
                (StatusCode::SERVICE_UNAVAILABLE, "dispatcher_closed")
            }
            PipelineError::Io { .. }
            | PipelineError::Serialization(_)
            | PipelineError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::warn!(error = %self.0, "Request rejected");
        }
        let body = ErrorResponse {
            error: error.to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

async fn submit(state: &AppState, event: PipelineEvent) -> ApiResult<OutcomeResponse> {
    let outcome = state.handle.submit(event).await?;
    Ok(Json(OutcomeResponse { outcome }))
}

// === OpenAPI ===

#[derive(OpenApi)]
#[openapi(
    info(title = "Keel API", description = "Document-driven agent pipeline"),
    paths(
        submit_event,
        upload_document,
        submit_command,
        decide_proposal,
        run_feature,
        get_document,
        events_stream,
    ),
    components(schemas(
        SubmitEventRequest,
        UploadRequest,
        CommandRequest,
        DecisionRequest,
        RunFeatureRequest,
        OutcomeResponse,
        DocumentResponse,
        ErrorResponse,
    )),
    tags(
        (name = "events", description = "Pipeline event intake"),
        (name = "document", description = "Master document access")
    )
)]
pub struct ApiDoc;

// === API Handlers ===

/// Submit any pipeline event
#[utoipa::path(
    post,
    path = "/api/v1/events",
    tag = "events",
    request_body = SubmitEventRequest,
    responses(
        (status = 200, description = "Event handled", body = OutcomeResponse),
        (status = 404, description = "Referenced entity missing", body = ErrorResponse),
        (status = 409, description = "Conflicting decision or stale write", body = ErrorResponse)
    )
)]
pub async fn submit_event(
    State(state): State<SharedState>,
    Json(req): Json<SubmitEventRequest>,
) -> ApiResult<OutcomeResponse> {
    submit(&state, req.event).await
}

/// Split an uploaded specification into a new master document
#[utoipa::path(
    post,
    path = "/api/v1/documents",
    tag = "events",
    request_body = UploadRequest,
    responses(
        (status = 200, description = "Document split", body = OutcomeResponse),
        (status = 500, description = "Specification unreadable", body = ErrorResponse)
    )
)]
pub async fn upload_document(
    State(state): State<SharedState>,
    Json(req): Json<UploadRequest>,
) -> ApiResult<OutcomeResponse> {
    let event = PipelineEvent::DocumentUploaded {
        project_id: req.project_id,
        document_path: req.document_path,
        uploaded_by: state.actor(req.uploaded_by),
    };
    submit(&state, event).await
}

/// Route a natural-language command
#[utoipa::path(
    post,
    path = "/api/v1/commands",
    tag = "events",
    request_body = CommandRequest,
    responses(
        (status = 200, description = "Command routed", body = OutcomeResponse),
        (status = 404, description = "No master document yet", body = ErrorResponse)
    )
)]
pub async fn submit_command(
    State(state): State<SharedState>,
    Json(req): Json<CommandRequest>,
) -> ApiResult<OutcomeResponse> {
    let command = NlpCommand::new(req.command, state.actor(req.issued_by));
    submit(&state, PipelineEvent::NlpCommandReceived { command }).await
}

/// Approve or reject a proposal
#[utoipa::path(
    post,
    path = "/api/v1/proposals/{id}/decision",
    tag = "events",
    params(("id" = String, Path, description = "Proposal id")),
    request_body = DecisionRequest,
    responses(
        (status = 200, description = "Decision recorded", body = OutcomeResponse),
        (status = 404, description = "Unknown proposal", body = ErrorResponse),
        (status = 409, description = "Proposal already decided", body = ErrorResponse)
    )
)]
pub async fn decide_proposal(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<DecisionRequest>,
) -> ApiResult<OutcomeResponse> {
    let event = PipelineEvent::ProposalDecided {
        proposal_id: id,
        status: req.status,
        decided_by: state.actor(req.decided_by),
    };
    submit(&state, event).await
}

/// Run the worker against an existing feature
#[utoipa::path(
    post,
    path = "/api/v1/features/{id}/run",
    tag = "events",
    params(("id" = String, Path, description = "Feature id")),
    request_body = RunFeatureRequest,
    responses(
        (status = 200, description = "Feature run finished", body = OutcomeResponse),
        (status = 404, description = "Unknown feature", body = ErrorResponse),
        (status = 422, description = "Patch rejected", body = ErrorResponse)
    )
)]
pub async fn run_feature(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<RunFeatureRequest>,
) -> ApiResult<OutcomeResponse> {
    let event = PipelineEvent::FeatureRun {
        feature_id: id,
        issued_by: state.actor(req.issued_by),
        instructions: req.instructions,
    };
    submit(&state, event).await
}

/// Current master document
#[utoipa::path(
    get,
    path = "/api/v1/document",
    tag = "document",
    responses(
        (status = 200, description = "Master document", body = DocumentResponse),
        (status = 404, description = "No master document yet", body = ErrorResponse)
    )
)]
pub async fn get_document(State(state): State<SharedState>) -> ApiResult<DocumentResponse> {
    let document = state.store.require().await?;
    Ok(Json(DocumentResponse { document }))
}

/// SSE stream of agent progress events with heartbeat
#[utoipa::path(
    get,
    path = "/api/v1/events/stream",
    tag = "events",
    responses((status = 200, description = "Server-sent agent events"))
)]
pub async fn events_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();

    let stream = stream::unfold(rx, |mut rx| async move {
        loop {
            match tokio::time::timeout(HEARTBEAT, rx.recv()).await {
                Ok(Ok(event)) => {
                    let json = serde_json::to_string(&event).unwrap_or_default();
                    return Some((Ok(Event::default().event("agent").data(json)), rx));
                }
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "SSE subscriber lagged behind");
                    continue;
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => return None,
                Err(_) => return Some((Ok(Event::default().comment("heartbeat")), rx)),
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn routes(state: SharedState) -> Router {
    let api = Router::new()
        .route("/events", post(submit_event))
        .route("/events/stream", get(events_stream))
        .route("/documents", post(upload_document))
        .route("/commands", post(submit_command))
        .route("/proposals/:id/decision", post(decide_proposal))
        .route("/features/:id/run", post(run_feature))
        .route("/document", get(get_document))
        .route("/openapi.json", get(openapi_json));

    Router::new().nest("/api/v1", api).with_state(state)
}
