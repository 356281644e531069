//! Version 1 of the HTTP API.
//!
//! Handlers stay thin: validate the body, call into the generator or the
//! session handle, and shape the JSON the presentation layer expects.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::db::DbPool;
use crate::errors::{GameError, GenerationErrorKind};
use crate::generation::{GenerationRequest, WordGenerator};
use crate::logging::{spawn_event, Event};
use crate::model::{Difficulty, Language};
use crate::session::{default_labels, GameState, SessionError, SessionHandle};

const CACHE_CONTROL: &str = "public, s-maxage=1800, stale-while-revalidate=3600";
const GENERIC_FAILURE: &str = "Failed to generate words. Please try again.";

/// Shared state injected into each handler.
#[derive(Clone)]
pub struct ApiState {
    pub db: DbPool,
    pub generator: WordGenerator,
    pub session: Arc<SessionHandle>,
}

type SharedState = Arc<ApiState>;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .merge(generation_routes())
        .merge(session_routes())
        .with_state(Arc::new(state))
}

fn generation_routes() -> Router<SharedState> {
    Router::new().route("/api/generate-words", post(generate_words).get(health))
}

fn session_routes() -> Router<SharedState> {
    Router::new()
        .route("/api/session", get(session_state))
        .route("/api/session/players", post(set_players))
        .route("/api/session/players/name", post(set_player_name))
        .route("/api/session/impostors", post(set_impostors))
        .route("/api/session/settings", post(update_settings))
        .route("/api/session/categories/toggle", post(toggle_category))
        .route(
            "/api/session/categories/custom",
            post(add_custom_category).delete(remove_custom_category),
        )
        .route("/api/session/start", post(start_game))
        .route("/api/session/reveal/next", post(next_reveal))
        .route("/api/session/discussion", post(start_discussion))
        .route("/api/session/end", post(end_game))
        .route("/api/session/new", post(new_game))
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

/// Error body shared by the session routes.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let status = match &err {
            SessionError::CouldNotStart(_) => StatusCode::SERVICE_UNAVAILABLE,
            SessionError::StartInProgress => StatusCode::CONFLICT,
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "word-generation",
        "timestamp": now_rfc3339(),
    }))
}

async fn generate_words(
    State(state): State<SharedState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request = match payload {
        Ok(Json(body)) => GenerationRequest::from_json(&body),
        Err(rejection) => Err(GameError::Validation(rejection.body_text())),
    };
    let request = match request {
        Ok(request) => request,
        Err(err) => return ApiError::bad_request(err.to_string()).into_response(),
    };

    match state.generator.generate(&request).await {
        Ok(words) => {
            let elapsed = started.elapsed().as_millis() as u64;
            let body = json!({
                "wordsWithHints": words,
                "metadata": {
                    "category": request.category,
                    "language": request.language,
                    "difficulty": request.difficulty,
                    "generatedAt": now_rfc3339(),
                    "responseTime": elapsed,
                    "requestedCount": request.count,
                    "actualCount": words.len(),
                },
            });
            (
                StatusCode::OK,
                [
                    (header::CACHE_CONTROL, CACHE_CONTROL.to_string()),
                    (HeaderName::from_static("x-response-time"), format!("{elapsed}ms")),
                ],
                Json(body),
            )
                .into_response()
        }
        Err(err) => generation_failure(&state, &request, err, started),
    }
}

fn generation_failure(
    state: &ApiState,
    request: &GenerationRequest,
    err: GameError,
    started: Instant,
) -> Response {
    let elapsed = started.elapsed().as_millis() as u64;
    let kind = err.kind();
    let (status, message) = match kind {
        GenerationErrorKind::ApiError => (StatusCode::BAD_GATEWAY, err.to_string()),
        GenerationErrorKind::RateLimit => (StatusCode::TOO_MANY_REQUESTS, err.to_string()),
        GenerationErrorKind::GenerationError => {
            (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE.to_string())
        }
    };

    spawn_event(
        &state.db,
        Event::new(log::Level::Error, "api.generate", "Word generation request failed")
            .code(err.code())
            .explain(err.explain())
            .data(json!({
                "category": request.category,
                "language": request.language,
                "provider": state.generator.provider_name(),
                "errorType": kind.as_str(),
                "error": err.to_string(),
                "responseTime": elapsed,
            })),
    );

    (
        status,
        Json(json!({
            "error": message,
            "fallback": true,
            "metadata": {
                "responseTime": elapsed,
                "timestamp": now_rfc3339(),
                "errorType": kind.as_str(),
            },
        })),
    )
        .into_response()
}

#[derive(Deserialize)]
struct CountBody {
    count: usize,
}

#[derive(Deserialize)]
struct PlayerNameBody {
    index: usize,
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsBody {
    difficulty: Option<Difficulty>,
    language: Option<String>,
    show_hints_to_impostors: Option<bool>,
    custom_category: Option<String>,
}

#[derive(Deserialize)]
struct CategoryBody {
    category: String,
}

type SessionResult = Result<Json<GameState>, ApiError>;

async fn session_state(State(state): State<SharedState>) -> Json<GameState> {
    Json(state.session.state().await)
}

async fn set_players(
    State(state): State<SharedState>,
    payload: Result<Json<CountBody>, JsonRejection>,
) -> SessionResult {
    let Json(body) = payload?;
    let updated = state
        .session
        .update(|s| {
            s.set_player_count(body.count, &default_labels)?;
            Ok(s.state().clone())
        })
        .await?;
    Ok(Json(updated))
}

async fn set_player_name(
    State(state): State<SharedState>,
    payload: Result<Json<PlayerNameBody>, JsonRejection>,
) -> SessionResult {
    let Json(body) = payload?;
    let updated = state
        .session
        .update(|s| {
            s.set_player_name(body.index, body.name);
            Ok(s.state().clone())
        })
        .await?;
    Ok(Json(updated))
}

async fn set_impostors(
    State(state): State<SharedState>,
    payload: Result<Json<CountBody>, JsonRejection>,
) -> SessionResult {
    let Json(body) = payload?;
    let updated = state
        .session
        .update(|s| {
            s.set_impostor_count(body.count)?;
            Ok(s.state().clone())
        })
        .await?;
    Ok(Json(updated))
}

async fn update_settings(
    State(state): State<SharedState>,
    payload: Result<Json<SettingsBody>, JsonRejection>,
) -> SessionResult {
    let Json(body) = payload?;
    let language = body
        .language
        .as_deref()
        .map(str::parse::<Language>)
        .transpose()
        .map_err(ApiError::bad_request)?;

    let updated = state
        .session
        .update(|s| {
            if let Some(difficulty) = body.difficulty {
                s.set_difficulty(difficulty);
            }
            if let Some(language) = language {
                s.set_language(language);
            }
            if let Some(show) = body.show_hints_to_impostors {
                if s.state().show_hints_to_impostors != show {
                    s.toggle_hints();
                }
            }
            if let Some(draft) = body.custom_category {
                s.set_custom_category(draft);
            }
            Ok(s.state().clone())
        })
        .await?;
    Ok(Json(updated))
}

async fn toggle_category(
    State(state): State<SharedState>,
    payload: Result<Json<CategoryBody>, JsonRejection>,
) -> SessionResult {
    let Json(body) = payload?;
    let updated = state
        .session
        .update(|s| {
            s.toggle_category(&body.category);
            Ok(s.state().clone())
        })
        .await?;
    Ok(Json(updated))
}

async fn add_custom_category(
    State(state): State<SharedState>,
    payload: Result<Json<CategoryBody>, JsonRejection>,
) -> SessionResult {
    let Json(body) = payload?;
    let updated = state
        .session
        .update(|s| {
            s.add_custom_category(&body.category);
            Ok(s.state().clone())
        })
        .await?;
    Ok(Json(updated))
}

async fn remove_custom_category(
    State(state): State<SharedState>,
    payload: Result<Json<CategoryBody>, JsonRejection>,
) -> SessionResult {
    let Json(body) = payload?;
    let updated = state
        .session
        .update(|s| {
            s.remove_custom_category(&body.category);
            Ok(s.state().clone())
        })
        .await?;
    Ok(Json(updated))
}

async fn start_game(State(state): State<SharedState>) -> SessionResult {
    Ok(Json(state.session.start_game(&default_labels).await?))
}

async fn new_game(State(state): State<SharedState>) -> SessionResult {
    Ok(Json(state.session.new_game().await?))
}

async fn next_reveal(State(state): State<SharedState>) -> Json<GameState> {
    Json(state.session.transition(|s| s.next_reveal_player()).await)
}

async fn start_discussion(State(state): State<SharedState>) -> Json<GameState> {
    Json(state.session.transition(|s| s.start_discussion()).await)
}

async fn end_game(State(state): State<SharedState>) -> Json<GameState> {
    Json(state.session.transition(|s| s.end_game()).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_db;
    use crate::generation::testing::{batch, StubProvider};
    use crate::session::GameSession;
    use crate::snapshot::SqliteSnapshotStore;
    use crate::word_service::{HttpWordSource, WordSource, WordSupplyService};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_app(provider: StubProvider) -> Router {
        let db = init_memory_db().unwrap();
        let generator = WordGenerator::new(Arc::new(provider));
        let supply = WordSupplyService::new(db.clone(), Arc::new(generator.clone()));
        let store = Arc::new(SqliteSnapshotStore::new(db.clone()));
        let session = Arc::new(SessionHandle::new(GameSession::with_seed(5), supply, store));
        router(ApiState {
            db,
            generator,
            session,
        })
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value, Response) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(match body {
                Some(body) => Body::from(body.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let (parts, body) = response.into_parts();
        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json, Response::from_parts(parts, Body::empty()))
    }

    #[tokio::test]
    async fn oversized_count_is_rejected() {
        let app = test_app(StubProvider::returning(batch(15, 0)));
        let (status, body, _) = call(
            &app,
            "POST",
            "/api/generate-words",
            Some(json!({ "category": "animals", "language": "en", "count": 20 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Count must be a number between 1 and 15");
    }

    #[tokio::test]
    async fn unsupported_language_is_rejected() {
        let app = test_app(StubProvider::returning(batch(15, 0)));
        let (status, body, _) = call(
            &app,
            "POST",
            "/api/generate-words",
            Some(json!({ "category": "animals", "language": "fr", "count": 5 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Unsupported language: fr");
    }

    #[tokio::test]
    async fn health_check_reports_service() {
        let app = test_app(StubProvider::returning(batch(15, 0)));
        let (status, body, _) = call(&app, "GET", "/api/generate-words", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "word-generation");
    }

    #[tokio::test]
    async fn successful_generation_carries_metadata_and_cache_headers() {
        let app = test_app(StubProvider::returning(batch(9, 1)));
        let (status, body, response) = call(
            &app,
            "POST",
            "/api/generate-words",
            Some(json!({ "category": " Animals ", "language": "de", "count": 10, "difficulty": "hard" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["wordsWithHints"].as_array().unwrap().len(), 9);
        assert_eq!(body["metadata"]["category"], "animals");
        assert_eq!(body["metadata"]["requestedCount"], 10);
        assert_eq!(body["metadata"]["actualCount"], 9);
        assert_eq!(body["metadata"]["difficulty"], "hard");
        assert_eq!(response.headers()[header::CACHE_CONTROL], CACHE_CONTROL);
        assert!(response.headers().contains_key("x-response-time"));
    }

    #[tokio::test]
    async fn upstream_failures_map_to_status_codes() {
        let app = test_app(StubProvider::failing(429, "Too many requests"));
        let request = json!({ "category": "food", "language": "en", "count": 5 });
        let (status, body, _) = call(&app, "POST", "/api/generate-words", Some(request.clone())).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["fallback"], true);
        assert_eq!(body["metadata"]["errorType"], "rate_limit");

        let app = test_app(StubProvider::failing(500, "boom"));
        let (status, body, _) = call(&app, "POST", "/api/generate-words", Some(request.clone())).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["metadata"]["errorType"], "api_error");

        let app = test_app(StubProvider::returning(batch(3, 2)));
        let (status, body, _) = call(&app, "POST", "/api/generate-words", Some(request)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], GENERIC_FAILURE);
    }

    #[tokio::test]
    async fn session_routes_drive_a_round() {
        let app = test_app(StubProvider::returning(batch(15, 0)));
        let (status, body, _) = call(&app, "POST", "/api/session/players", Some(json!({ "count": 6 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalPlayers"], 6);

        let (status, _, _) = call(&app, "POST", "/api/session/impostors", Some(json!({ "count": 6 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body, _) = call(
            &app,
            "POST",
            "/api/session/settings",
            Some(json!({ "language": "sv", "showHintsToImpostors": false })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["language"], "sv");
        assert_eq!(body["showHintsToImpostors"], false);

        let (status, body, _) = call(&app, "POST", "/api/session/start", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phase"], "wordreveal");
        assert_eq!(body["players"].as_array().unwrap().len(), 6);

        let (_, body, _) = call(&app, "POST", "/api/session/reveal/next", None).await;
        assert_eq!(body["currentRevealIndex"], 1);
        let (_, body, _) = call(&app, "POST", "/api/session/end", None).await;
        assert_eq!(body["phase"], "results");
        let (status, body, _) = call(&app, "POST", "/api/session/new", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["currentRevealIndex"], 0);
    }

    #[tokio::test]
    async fn settings_reject_unknown_language() {
        let app = test_app(StubProvider::returning(batch(15, 0)));
        let (status, body, _) =
            call(&app, "POST", "/api/session/settings", Some(json!({ "language": "fr" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Unsupported language: fr");
    }

    #[tokio::test]
    async fn failed_start_is_service_unavailable() {
        let app = test_app(StubProvider::failing(500, "down"));
        let (status, body, _) = call(&app, "POST", "/api/session/start", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "could not start game");

        let (_, body, _) = call(&app, "GET", "/api/session", None).await;
        assert_eq!(body["phase"], "setup");
    }

    #[tokio::test]
    async fn http_word_source_talks_to_a_served_router() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let served = test_app(StubProvider::returning(batch(15, 0)));
        tokio::spawn(async move { axum::serve(listener, served).await });

        let source = HttpWordSource::new(format!("http://{addr}/api/generate-words")).unwrap();
        let request = GenerationRequest {
            category: "places".into(),
            language: Language::Sv,
            count: 15,
            difficulty: Difficulty::Easy,
        };
        let words = source.fetch_words(&request).await.unwrap();
        assert_eq!(words.len(), 15);
    }
}
