use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use contracts::{ApiError, ErrorCode, IntentRecord};
use engine_core::LayerRegistry;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::{EngineApi, InitError, PersistenceError};

#[derive(Debug)]
pub enum ServerError {
    Io(std::io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "server io error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

#[derive(Debug)]
struct HttpApiError {
    status: StatusCode,
    error: ApiError,
}

impl HttpApiError {
    fn game_not_found(requested_game_id: &str, active_game_id: Option<&str>) -> Self {
        let details = active_game_id
            .map(|active| format!("requested_game_id={requested_game_id} active_game_id={active}"));
        Self {
            status: StatusCode::NOT_FOUND,
            error: ApiError::new(
                ErrorCode::GameNotFound,
                "game_id does not match an active game",
                details,
            ),
        }
    }

    fn invalid_query(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: ApiError::new(ErrorCode::InvalidQuery, message, details),
        }
    }

    fn internal(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: ApiError::new(ErrorCode::InternalError, message, details),
        }
    }

    fn from_init(err: InitError) -> Self {
        match err {
            InitError::Rejected(issues) => Self {
                status: StatusCode::BAD_REQUEST,
                error: ApiError::new(
                    ErrorCode::InvalidDefinition,
                    "definition failed validation",
                    serde_json::to_string(&issues).ok(),
                ),
            },
            InitError::Parse(reason) => Self {
                status: StatusCode::BAD_REQUEST,
                error: ApiError::new(
                    ErrorCode::InvalidDefinition,
                    "definition does not deserialize",
                    Some(reason),
                ),
            },
            InitError::Engine(err) => Self::internal("engine initialization failed", Some(err.to_string())),
        }
    }

    fn from_persistence(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotAttached => {
                Self::invalid_query("save store is not attached", None)
            }
            other => Self::internal("persistence operation failed", Some(other.to_string())),
        }
    }
}

impl IntoResponse for HttpApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}

#[derive(Clone, Default)]
struct AppState {
    api: Arc<Mutex<Option<EngineApi>>>,
}

impl AppState {
    fn new() -> Self {
        Self::default()
    }
}

pub async fn serve(addr: SocketAddr) -> Result<(), ServerError> {
    let state = AppState::new();
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/games", post(create_game))
        .route("/api/v1/games/{game_id}/status", get(get_status))
        .route("/api/v1/games/{game_id}/intents", post(submit_intent))
        .route("/api/v1/games/{game_id}/tick", post(step_game))
        .route("/api/v1/games/{game_id}/ui", get(get_ui))
        .route("/api/v1/games/{game_id}/state", get(get_state))
        .route("/api/v1/games/{game_id}/save", post(save_game))
        .with_state(state)
}

async fn create_game(
    State(state): State<AppState>,
    Json(raw): Json<Value>,
) -> Result<Json<Value>, HttpApiError> {
    let registry = LayerRegistry::with_builtin_layers();
    let api = EngineApi::initialize(raw, &registry).map_err(HttpApiError::from_init)?;
    let status = api.status();
    *state.api.lock().await = Some(api);
    Ok(Json(status))
}

fn check_game<'a>(
    slot: &'a mut Option<EngineApi>,
    game_id: &str,
) -> Result<&'a mut EngineApi, HttpApiError> {
    match slot.as_mut() {
        Some(api) if api.game_id() == game_id => Ok(api),
        Some(api) => {
            let active = api.game_id().to_string();
            Err(HttpApiError::game_not_found(game_id, Some(&active)))
        }
        None => Err(HttpApiError::game_not_found(game_id, None)),
    }
}

async fn get_status(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
) -> Result<Json<Value>, HttpApiError> {
    let mut slot = state.api.lock().await;
    let api = check_game(&mut slot, &game_id)?;
    Ok(Json(api.status()))
}

async fn submit_intent(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    Json(intent): Json<IntentRecord>,
) -> Result<Json<Value>, HttpApiError> {
    let mut slot = state.api.lock().await;
    let api = check_game(&mut slot, &game_id)?;
    api.enqueue_intent(intent);
    Ok(Json(json!({"queued": true})))
}

#[derive(Debug, Deserialize)]
struct StepRequest {
    #[serde(default)]
    steps: Option<u64>,
}

async fn step_game(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    Json(request): Json<StepRequest>,
) -> Result<Json<Value>, HttpApiError> {
    let mut slot = state.api.lock().await;
    let api = check_game(&mut slot, &game_id)?;
    let summary = api
        .tick(request.steps.unwrap_or(1))
        .map_err(|err| HttpApiError::internal("tick failed", Some(err.to_string())))?;
    let summary = serde_json::to_value(summary)
        .map_err(|err| HttpApiError::internal("summary serialization failed", Some(err.to_string())))?;
    Ok(Json(summary))
}

async fn get_ui(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
) -> Result<Json<Value>, HttpApiError> {
    let mut slot = state.api.lock().await;
    let api = check_game(&mut slot, &game_id)?;
    match api.ui() {
        Some(ui) => serde_json::to_value(ui)
            .map(Json)
            .map_err(|err| HttpApiError::internal("ui serialization failed", Some(err.to_string()))),
        None => Err(HttpApiError::invalid_query(
            "no tick has rendered a ui tree yet",
            None,
        )),
    }
}

async fn get_state(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
) -> Result<Json<Value>, HttpApiError> {
    let mut slot = state.api.lock().await;
    let api = check_game(&mut slot, &game_id)?;
    let snapshot = api.snapshot();
    serde_json::to_value(snapshot)
        .map(Json)
        .map_err(|err| HttpApiError::internal("snapshot serialization failed", Some(err.to_string())))
}

#[derive(Debug, Deserialize)]
struct SaveRequest {
    #[serde(default)]
    path: Option<String>,
}

async fn save_game(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    Json(request): Json<SaveRequest>,
) -> Result<Json<Value>, HttpApiError> {
    let mut slot = state.api.lock().await;
    let api = check_game(&mut slot, &game_id)?;
    if let Some(path) = request.path {
        api.attach_save_store(path)
            .map_err(HttpApiError::from_persistence)?;
    }
    api.save().map_err(HttpApiError::from_persistence)?;
    Ok(Json(json!({"saved": true, "tick": api.status()["tick"]})))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> Value {
        json!({
            "meta": {"schemaVersion": "1.0", "gameId": "server-tests"},
            "state": {"resources": {"xp": 0}},
            "layers": [{"id": "idle", "type": "progressLayer"}]
        })
    }

    #[tokio::test]
    async fn create_then_status_and_tick() {
        let state = AppState::new();
        let created = create_game(State(state.clone()), Json(definition()))
            .await
            .expect("creates");
        assert_eq!(created.0["game_id"], json!("server-tests"));

        let status = get_status(State(state.clone()), Path("server-tests".to_string()))
            .await
            .expect("status");
        assert_eq!(status.0["tick"], json!(0));

        let stepped = step_game(
            State(state.clone()),
            Path("server-tests".to_string()),
            Json(StepRequest { steps: Some(2) }),
        )
        .await
        .expect("steps");
        assert_eq!(stepped.0["tick"], json!(2));
    }

    #[tokio::test]
    async fn unknown_game_is_not_found() {
        let state = AppState::new();
        let err = get_status(State(state), Path("ghost".to_string()))
            .await
            .expect_err("not found");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_definition_is_a_bad_request() {
        let state = AppState::new();
        let mut raw = definition();
        raw["meta"]["schemaVersion"] = json!("7.2");
        let err = create_game(State(state), Json(raw))
            .await
            .expect_err("rejected");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn router_builds_with_every_route() {
        let _ = router(AppState::new());
    }
}
