//! HTTP contract of the chat service, driven through the axum router.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{ Request, StatusCode };
use portfolio_chat::chat::{ ChatService, ChatSettings };
use portfolio_chat::config::prompt::SystemPrompt;
use portfolio_chat::history::{ HistoryStore, InMemoryHistoryStore };
use portfolio_chat::llm::chat::{ ChatClient, CompletionRequest, CompletionResponse, LlmError };
use portfolio_chat::models::chat::Turn;
use portfolio_chat::server::api::{ router, AppState };
use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::sync::{ Arc, Mutex };
use tower::ServiceExt;

/// Pops queued outcomes; once empty, echoes the latest user turn.
#[derive(Default)]
struct StubClient {
    outcomes: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: AtomicUsize,
}

impl StubClient {
    fn with(outcomes: Vec<Result<String, LlmError>>) -> Self {
        Self { outcomes: Mutex::new(outcomes.into()), calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl ChatClient for StubClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.outcomes.lock().unwrap().pop_front();
        match next {
            Some(outcome) => outcome.map(|response| CompletionResponse { response }),
            None => {
                let last = request.messages.last().unwrap();
                Ok(CompletionResponse { response: format!("re: {}", last.content) })
            }
        }
    }

    fn get_model(&self) -> String {
        "stub".into()
    }

    fn get_base_url(&self) -> Option<String> {
        None
    }
}

struct Harness {
    state: AppState,
    store: Arc<InMemoryHistoryStore>,
    client: Arc<StubClient>,
}

impl Harness {
    fn new(client: StubClient) -> Self {
        Self::build(true, client, 0)
    }

    fn without_api_key() -> Self {
        Self::build(false, StubClient::default(), 0)
    }

    fn build(with_api_key: bool, client: StubClient, rate_limit: u32) -> Self {
        let store = Arc::new(InMemoryHistoryStore::unbounded());
        let client = Arc::new(client);
        let chat_client = if with_api_key {
            Some(client.clone() as Arc<dyn ChatClient>)
        } else {
            None
        };
        let chat = ChatService::new(
            store.clone(),
            chat_client,
            SystemPrompt::new("persona"),
            ChatSettings::default()
        );
        Self { state: AppState::new(chat, rate_limit), store, client }
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let app = router(self.state.clone(), None);
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    async fn post_chat(&self, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        self.send(post_json("/chat", &body.to_string())).await
    }
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_owned()))
        .unwrap()
}

fn quota_error() -> LlmError {
    LlmError::Api {
        status: 429,
        code: Some("insufficient_quota".into()),
        message: "You exceeded your current quota".into(),
    }
}

#[tokio::test]
async fn chat_returns_reply_and_conversation_id() {
    let h = Harness::new(StubClient::default());
    let (status, json) = h.post_chat(
        serde_json::json!({ "message": "Hello", "conversationId": "abc" })
    ).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["response"], "re: Hello");
    assert_eq!(json["conversationId"], "abc");
}

#[tokio::test]
async fn api_chat_alias_behaves_like_chat() {
    let h = Harness::new(StubClient::default());
    let (status, json) = h.send(post_json("/api/chat", r#"{"message":"Hi"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["conversationId"], "default");
}

#[tokio::test]
async fn omitted_conversation_id_defaults() {
    let h = Harness::new(StubClient::default());
    let (status, json) = h.post_chat(
        serde_json::json!({ "message": "What is Anthony's role?" })
    ).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["conversationId"], "default");
}

#[tokio::test]
async fn fresh_conversation_holds_the_exact_user_turn() {
    let h = Harness::new(StubClient::default());
    h.post_chat(serde_json::json!({ "message": "Hello", "conversationId": "fresh" })).await;

    let turns = h.store.get("fresh").await.turns;
    assert_eq!(turns[0], Turn::user("Hello"));
    assert_eq!(turns.len(), 2);
}

#[tokio::test]
async fn missing_message_is_400_and_mutates_nothing() {
    let h = Harness::new(StubClient::default());
    for body in [serde_json::json!({}), serde_json::json!({ "message": "" })] {
        let (status, json) = h.post_chat(body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Message is required");
    }
    assert!(h.store.is_empty().await);
    assert_eq!(h.client.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn whitespace_and_long_messages_are_answered() {
    let h = Harness::new(StubClient::default());
    let long = "x".repeat(2001);
    for message in ["   ".to_string(), long] {
        let (status, json) = h.post_chat(
            serde_json::json!({ "message": message, "conversationId": "lenient" })
        ).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["response"], format!("re: {}", message));
    }
    assert_eq!(h.store.get("lenient").await.turns.len(), 4);
}

#[tokio::test]
async fn empty_conversation_id_is_echoed_back() {
    let h = Harness::new(StubClient::default());
    let (status, json) = h.post_chat(
        serde_json::json!({ "message": "Hello", "conversationId": "" })
    ).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["conversationId"], "");
    assert_eq!(h.store.get("").await.turns.len(), 2);
}

#[tokio::test]
async fn malformed_json_is_a_json_400() {
    let h = Harness::new(StubClient::default());
    let (status, json) = h.send(post_json("/chat", "{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid request body");
}

#[tokio::test]
async fn missing_api_key_is_500_without_upstream_call() {
    let h = Harness::without_api_key();
    let (status, json) = h.post_chat(serde_json::json!({ "message": "Hello" })).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "OpenAI API key not configured");
    assert_eq!(h.client.calls.load(Ordering::SeqCst), 0);
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn quota_exceeded_is_429_and_keeps_only_user_turn() {
    let h = Harness::new(StubClient::with(vec![Err(quota_error())]));
    let (status, json) = h.post_chat(
        serde_json::json!({ "message": "Hello", "conversationId": "q" })
    ).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["error"], "OpenAI API quota exceeded. Please try again later.");
    assert_eq!(h.store.get("q").await.turns, vec![Turn::user("Hello")]);
}

#[tokio::test]
async fn invalid_key_and_generic_failures_map_to_401_and_500() {
    let h = Harness::new(
        StubClient::with(
            vec![
                Err(LlmError::Api {
                    status: 401,
                    code: Some("invalid_api_key".into()),
                    message: "Incorrect API key provided".into(),
                }),
                Err(LlmError::EmptyResponse)
            ]
        )
    );

    let (status, json) = h.post_chat(serde_json::json!({ "message": "one" })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "Invalid OpenAI API key configured.");

    let (status, json) = h.post_chat(serde_json::json!({ "message": "two" })).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "An error occurred while processing your request.");
}

#[tokio::test]
async fn conversations_do_not_share_history() {
    let h = Harness::new(StubClient::default());
    h.post_chat(serde_json::json!({ "message": "only in a", "conversationId": "a" })).await;
    h.post_chat(serde_json::json!({ "message": "only in b", "conversationId": "b" })).await;

    let b = h.store.get("b").await.turns;
    assert!(b.iter().all(|t| !t.content.contains("only in a")));
    assert_eq!(b.len(), 2);
}

#[tokio::test]
async fn twenty_five_exchanges_retain_the_last_ten_pairs() {
    let h = Harness::new(StubClient::default());
    for i in 1..=25 {
        let (status, _) = h.post_chat(
            serde_json::json!({ "message": format!("turn {}", i), "conversationId": "long" })
        ).await;
        assert_eq!(status, StatusCode::OK);
    }

    let turns = h.store.get("long").await.turns;
    assert_eq!(turns.len(), 20);
    assert_eq!(turns[0], Turn::user("turn 16"));
    assert_eq!(turns[19], Turn::assistant("re: turn 25"));
}

#[tokio::test]
async fn rate_limit_rejects_burst_with_429() {
    let h = Harness::build(true, StubClient::default(), 1);
    let (first, _) = h.post_chat(serde_json::json!({ "message": "one" })).await;
    let (second, json) = h.post_chat(serde_json::json!({ "message": "two" })).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["error"], "Too many requests. Please slow down.");
}

#[tokio::test]
async fn health_reports_ok_with_timestamp() {
    let h = Harness::new(StubClient::default());
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, json) = h.send(req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "OK");
    let ts = json["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn static_site_is_served_from_public_dir() {
    let dir = tempfile::tempdir().unwrap();
    let mut index = std::fs::File::create(dir.path().join("index.html")).unwrap();
    write!(index, "<h1>Portfolio</h1>").unwrap();

    let h = Harness::new(StubClient::default());
    let app = router(h.state.clone(), dir.path().to_str());
    let resp = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap()).await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
    assert_eq!(&body[..], b"<h1>Portfolio</h1>");
}
