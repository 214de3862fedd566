use axum::extract::{Extension, Path, Query, State};
use axum::{
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use sambung_domain::{
    connections::{ConnectionRequestCreate, RequestDirection, ResponseDecision},
    error::DomainError,
    identity::{ActorIdentity, ProjectId, RequestId, UserId},
    ports::replay::{ClaimOutcome, ReplayKey, StoredResponse},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use crate::middleware::AuthContext;
use crate::observability;
use crate::{error::ApiError, middleware as app_middleware, state::AppState};

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/v1/connections",
            post(create_connection).get(list_connections),
        )
        .route("/v1/connections/mentees", get(list_mentees))
        .route("/v1/connections/status/:user_id", get(connection_status))
        .route(
            "/v1/connections/:request_id",
            get(get_connection).delete(cancel_connection),
        )
        .route(
            "/v1/connections/:request_id/respond",
            post(respond_connection),
        )
        .route_layer(middleware::from_fn(app_middleware::require_auth_middleware));

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .merge(protected)
        .layer(app_middleware::timeout_layer())
        .layer(app_middleware::trace_layer())
        .layer(app_middleware::set_request_id_layer())
        .layer(app_middleware::propagate_request_id_layer())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::auth_middleware,
        ))
        .layer(middleware::from_fn(
            app_middleware::correlation_id_middleware,
        ))
        .layer(middleware::from_fn(app_middleware::metrics_layer));

    if !state.config.app_env.eq_ignore_ascii_case("test") {
        app = app.layer(app_middleware::rate_limit_layer());
    }

    app.with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.app_env.clone(),
    })
}

async fn metrics() -> Response {
    let body = observability::render_metrics().unwrap_or_default();
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}

#[derive(Debug, Deserialize, Validate)]
struct CreateConnectionRequest {
    #[validate(length(min = 1, max = 128))]
    recipient_id: String,
    #[validate(length(max = 500))]
    message: Option<String>,
    #[validate(length(max = 128))]
    project_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
struct RespondConnectionRequest {
    decision: ResponseDecision,
    #[validate(length(max = 500))]
    response_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListConnectionsQuery {
    #[serde(default)]
    direction: RequestDirection,
}

async fn create_connection(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    Json(payload): Json<CreateConnectionRequest>,
) -> Result<Response, ApiError> {
    payload.validate()?;
    let actor = actor_identity(&auth)?;
    let request_id = request_id_from_headers(&headers)?;
    let key = ReplayKey::new(
        "connection_create",
        actor.user_id.as_str().to_string(),
        request_id,
    );

    match begin_replay(&state, &key).await? {
        ClaimOutcome::Replay(response) => Ok(to_response(response)),
        ClaimOutcome::InProgress => Err(ApiError::Conflict),
        ClaimOutcome::Claimed => {
            let service = state.connection_service();
            let view = service
                .create(
                    &actor,
                    ConnectionRequestCreate {
                        recipient_id: UserId::new(payload.recipient_id),
                        message: payload.message,
                        project_id: payload.project_id.map(ProjectId::new),
                    },
                )
                .await
                .map_err(map_domain_error)?;
            let response = stored_response(StatusCode::CREATED, &view)?;
            complete_replay(&state, &key, &response).await?;
            Ok(to_response(response))
        }
    }
}

async fn list_connections(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListConnectionsQuery>,
) -> Result<Response, ApiError> {
    let actor = actor_identity(&auth)?;
    let views = state
        .connection_service()
        .list(&actor, query.direction)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(json!({ "requests": views })).into_response())
}

async fn get_connection(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(request_id): Path<String>,
) -> Result<Response, ApiError> {
    let actor = actor_identity(&auth)?;
    let view = state
        .connection_service()
        .get(&actor, &RequestId::new(request_id))
        .await
        .map_err(map_domain_error)?;
    Ok(Json(view).into_response())
}

async fn connection_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<String>,
) -> Result<Response, ApiError> {
    let actor = actor_identity(&auth)?;
    let status = state
        .connection_service()
        .status_with(&actor, &UserId::new(user_id))
        .await
        .map_err(map_domain_error)?;
    Ok(Json(status).into_response())
}

async fn list_mentees(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Response, ApiError> {
    let actor = actor_identity(&auth)?;
    let mentees = state
        .connection_service()
        .mentees(&actor)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(json!({ "mentees": mentees })).into_response())
}

async fn respond_connection(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<RespondConnectionRequest>,
) -> Result<Response, ApiError> {
    payload.validate()?;
    let actor = actor_identity(&auth)?;
    let replay_request_id = request_id_from_headers(&headers)?;
    let key = ReplayKey::new("connection_respond", request_id.clone(), replay_request_id);

    match begin_replay(&state, &key).await? {
        ClaimOutcome::Replay(response) => Ok(to_response(response)),
        ClaimOutcome::InProgress => Err(ApiError::Conflict),
        ClaimOutcome::Claimed => {
            let service = state.connection_service();
            let view = service
                .respond(
                    &actor,
                    &RequestId::new(request_id),
                    payload.decision,
                    payload.response_message,
                )
                .await
                .map_err(map_domain_error)?;
            let response = stored_response(StatusCode::OK, &view)?;
            complete_replay(&state, &key, &response).await?;
            Ok(to_response(response))
        }
    }
}

async fn cancel_connection(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(request_id): Path<String>,
) -> Result<Response, ApiError> {
    let actor = actor_identity(&auth)?;
    let cancelled = state
        .connection_service()
        .cancel(&actor, &RequestId::new(request_id))
        .await
        .map_err(map_domain_error)?;
    Ok(Json(cancelled).into_response())
}

fn actor_identity(auth: &AuthContext) -> Result<ActorIdentity, ApiError> {
    let user_id = auth
        .user_id
        .as_ref()
        .filter(|user_id| !user_id.trim().is_empty())
        .ok_or(ApiError::Unauthorized)?;
    Ok(ActorIdentity {
        user_id: UserId::new(user_id.clone()),
        username: auth.username.clone().unwrap_or_else(|| user_id.clone()),
    })
}

fn request_id_from_headers(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(std::string::ToString::to_string)
        .ok_or_else(|| ApiError::Validation("missing request id".into()))
}

fn map_domain_error(err: DomainError) -> ApiError {
    match err {
        DomainError::Validation(message) => ApiError::Validation(message),
        DomainError::NotFound => ApiError::NotFound,
        DomainError::Forbidden => ApiError::Forbidden,
        DomainError::DuplicateRequest => ApiError::DuplicateRequest,
        DomainError::AlreadyResolved => ApiError::AlreadyResolved,
        DomainError::Store(message) => {
            tracing::error!(error = %message, "storage failure");
            ApiError::Internal
        }
    }
}

async fn begin_replay(state: &AppState, key: &ReplayKey) -> Result<ClaimOutcome, ApiError> {
    state.replay.begin(key).await.map_err(|err| {
        tracing::error!(error = %err, "replay begin failed");
        ApiError::Internal
    })
}

async fn complete_replay(
    state: &AppState,
    key: &ReplayKey,
    response: &StoredResponse,
) -> Result<(), ApiError> {
    state.replay.complete(key, response).await.map_err(|err| {
        tracing::error!(error = %err, "replay complete failed");
        ApiError::Internal
    })
}

fn stored_response<T: Serialize>(
    status: StatusCode,
    body: &T,
) -> Result<StoredResponse, ApiError> {
    let body = serde_json::to_value(body).map_err(|err| {
        tracing::error!(error = %err, "response serialization failed");
        ApiError::Internal
    })?;
    Ok(StoredResponse {
        status_code: status.as_u16(),
        body,
    })
}

fn to_response(response: StoredResponse) -> Response {
    let status = StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::OK);
    (status, Json(response.body)).into_response()
}
