//! HTTP surface: `POST /chat` (alias `/api/chat`), `GET /health` and the
//! static site fallback.
//!
//! A global rate limit on chat requests can be switched on with
//! `--rate-limit-per-second`. It is off by default; when enabled, requests
//! over the quota get 429 `{ "error": "Too many requests. Please slow down." }`
//! before the message is validated.

use crate::chat::{ ChatError, ChatService, MSG_INVALID_BODY };
use crate::models::chat::{ ChatRequest, ChatResponse, ErrorBody, HealthResponse };
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;
use axum::{
    routing::{ get, post },
    Router,
    Json,
    extract::{ Request, State, rejection::JsonRejection },
    middleware::{ self, Next },
    response::{ IntoResponse, Response },
};
use chrono::{ SecondsFormat, Utc };
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };
use tower_http::cors::{ Any, CorsLayer };
use tower_http::services::ServeDir;
use log::{ info, warn, debug };

pub type ChatLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Clone)]
pub struct AppState {
    pub chat: ChatService,
    pub limiter: Option<Arc<ChatLimiter>>,
}

impl AppState {
    pub fn new(chat: ChatService, requests_per_second: u32) -> Self {
        let limiter = NonZeroU32::new(requests_per_second).map(|rps|
            Arc::new(RateLimiter::direct(Quota::per_second(rps)))
        );
        Self { chat, limiter }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let body = ErrorBody { error: self.to_string() };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Builds the HTTP surface. Unknown paths fall through to the static site in
/// `public_dir` when one is given.
pub fn router(state: AppState, public_dir: Option<&str>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let mut app = Router::new()
        .route("/chat", post(chat_handler))
        .route("/api/chat", post(chat_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    if let Some(dir) = public_dir {
        app = app.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
    }

    app.layer(middleware::from_fn(log_request)).layer(cors)
}

async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let started = Instant::now();
    let response = next.run(req).await;
    let status = response.status();
    if status.is_server_error() {
        warn!("{} {} -> {} ({:?})", method, path, status, started.elapsed());
    } else {
        debug!("{} {} -> {} ({:?})", method, path, status, started.elapsed());
    }
    response
}

async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>
) -> Result<Json<ChatResponse>, ChatError> {
    if let Some(limiter) = &state.limiter {
        if limiter.check().is_err() {
            warn!("Chat rate limit exceeded. Rejecting request.");
            return Err(ChatError::RateLimited);
        }
    }

    let Json(request) = payload.map_err(|e| {
        info!("Rejected chat body: {}", e);
        ChatError::InvalidRequest(MSG_INVALID_BODY)
    })?;

    state.chat.handle(request).await.map(Json)
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}
