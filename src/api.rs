//! HTTP control surface.
//!
//! JSON API polled by the browser control page, plus a separate static file
//! server for the page itself. Handlers hold no business logic: they read or
//! mutate `SharedState`, snapshot the event log, and delegate session starts
//! to the `SessionManager`.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, MethodRouter};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{info, warn};

use crate::event_log::{EventLog, EventRecord};
use crate::session::SessionManager;
use crate::state::{ListName, SessionStatus, Settings, SettingsUpdate, SharedState};

#[derive(Clone)]
pub struct ApiState {
    pub shared: Arc<SharedState>,
    pub log: Arc<EventLog>,
    pub sessions: Arc<SessionManager>,
}

// --- Request/Response types ---

#[derive(Deserialize)]
struct StartRequest {
    #[serde(default)]
    username: String,
}

#[derive(Deserialize)]
struct ListAddRequest {
    #[serde(default)]
    username: String,
}

#[derive(Deserialize)]
struct ListRemoveQuery {
    #[serde(default)]
    username: String,
}

#[derive(Serialize)]
struct StatusResponse {
    status: SessionStatus,
    host_nickname: String,
    last_update: f64,
    settings: Settings,
    log_items: Vec<EventRecord>,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct ListResponse {
    users: Vec<String>,
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

// --- Router ---

/// Build the control API router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/status", get(handle_status))
        .route("/api/start", axum::routing::post(handle_start))
        .route("/api/settings", get(handle_get_settings).post(handle_update_settings))
        .route("/api/blacklist", list_routes(ListName::Blacklist))
        .route("/api/whitelist", list_routes(ListName::Whitelist))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// Each list gets its own explicit route; unmatched /api paths fall through
// to a plain 404 instead of a list-lookup error.
fn list_routes(list: ListName) -> MethodRouter<ApiState> {
    get(move |state: State<ApiState>| handle_list_get(state, list))
        .post(move |state: State<ApiState>, req: Json<ListAddRequest>| {
            handle_list_add(state, list, req)
        })
        .delete(move |state: State<ApiState>, query: Query<ListRemoveQuery>| {
            handle_list_remove(state, list, query)
        })
}

/// Serve the control API on `addr` until the process exits.
pub async fn serve_api(state: ApiState, addr: &str) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Control API listening on {addr}");
    axum::serve(listener, router(state)).await
}

/// Start the static control-page server as a background task.
pub async fn start_static_server(root: &str, addr: &str) {
    let app = Router::new().fallback_service(ServeDir::new(root));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            warn!("Failed to bind static server on {addr}: {e}");
            return;
        }
    };
    info!("Control page served on {addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!("Static server error: {e}");
        }
    });
}

// --- Handlers ---

async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let view = state.shared.view();
    Json(StatusResponse {
        status: view.status,
        host_nickname: view.host_nickname,
        last_update: view.last_update,
        settings: view.settings,
        log_items: state.log.snapshot(),
    })
}

async fn handle_start(
    State(state): State<ApiState>,
    Json(req): Json<StartRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.sessions.start(&req.username) {
        Ok(()) => {
            let username = req.username.trim().trim_start_matches('@');
            Ok(Json(MessageResponse {
                message: format!("Connecting to @{username}..."),
            }))
        }
        Err(e) => Err(bad_request(e.to_string())),
    }
}

async fn handle_get_settings(State(state): State<ApiState>) -> Json<Settings> {
    Json(state.shared.settings())
}

async fn handle_update_settings(
    State(state): State<ApiState>,
    Json(update): Json<SettingsUpdate>,
) -> Json<Settings> {
    Json(state.shared.update_settings(update))
}

async fn handle_list_get(State(state): State<ApiState>, list: ListName) -> Json<ListResponse> {
    Json(ListResponse {
        users: state.shared.list_entries(list),
    })
}

async fn handle_list_add(
    State(state): State<ApiState>,
    list: ListName,
    Json(req): Json<ListAddRequest>,
) -> Result<Json<ListResponse>, (StatusCode, Json<ErrorResponse>)> {
    let username = req.username.trim();
    if username.is_empty() {
        return Err(bad_request("username required"));
    }
    state.shared.list_add(list, username);
    Ok(Json(ListResponse {
        users: state.shared.list_entries(list),
    }))
}

async fn handle_list_remove(
    State(state): State<ApiState>,
    list: ListName,
    Query(query): Query<ListRemoveQuery>,
) -> Result<Json<ListResponse>, (StatusCode, Json<ErrorResponse>)> {
    let username = query.username.trim();
    if username.is_empty() {
        return Err(bad_request("username required"));
    }
    state.shared.list_remove(list, username);
    Ok(Json(ListResponse {
        users: state.shared.list_entries(list),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::ai::AiResponder;
    use crate::config::AiConfig;
    use crate::narrator::{Narrate, Priority};
    use crate::session::SessionDeps;
    use crate::source::{ChatEvent, ChatSource, RoomInfo, SourceError};
    use crate::state::Settings;

    struct NullNarrator;
    impl Narrate for NullNarrator {
        fn enqueue(&self, _text: &str, _priority: Priority) {}
    }

    struct OfflineSource;
    #[async_trait::async_trait]
    impl ChatSource for OfflineSource {
        async fn room_info(&self, _room: &str) -> Result<RoomInfo, SourceError> {
            Err(SourceError::Stream("offline".into()))
        }

        async fn connect(
            &self,
            _room: &str,
        ) -> Result<
            tokio::sync::mpsc::Receiver<Result<ChatEvent, SourceError>>,
            SourceError,
        > {
            Err(SourceError::Stream("offline".into()))
        }
    }

    fn test_app() -> Router {
        let shared = Arc::new(SharedState::new(Settings::default()));
        let log = Arc::new(EventLog::new(10));
        let sessions = Arc::new(SessionManager::new(SessionDeps {
            shared: shared.clone(),
            log: log.clone(),
            narrator: Arc::new(NullNarrator),
            ai: Arc::new(AiResponder::new(&AiConfig::default())),
            source: Arc::new(OfflineSource),
            quiet_window: Duration::from_secs(300),
        }));
        router(ApiState {
            shared,
            log,
            sessions,
        })
    }

    async fn send_get(app: Router, uri: &str) -> axum::response::Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn list_endpoints_answer_on_explicit_paths() {
        assert_eq!(
            send_get(test_app(), "/api/blacklist").await.status(),
            StatusCode::OK
        );
        assert_eq!(
            send_get(test_app(), "/api/whitelist").await.status(),
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn unknown_api_path_gets_plain_404() {
        let resp = send_get(test_app(), "/api/greylist").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(resp.into_body(), 1024).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn wrong_method_on_start_is_method_not_allowed() {
        assert_eq!(
            send_get(test_app(), "/api/start").await.status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }
}
