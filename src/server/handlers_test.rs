use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use super::*;
use crate::{
    backend::{MockProvider, TextStream},
    chat::ChatService,
    config::{Configuration, ContextConfig},
    context::{ContextAssembler, TokenEstimator},
    retrieval::MockRetriever,
    server::router,
    storage::{ArcStorage, sqlite::Sqlite},
};

fn fragments(items: Vec<eyre::Result<String>>) -> TextStream {
    Box::pin(futures::stream::iter(items))
}

fn mock_provider() -> MockProvider {
    let mut provider = MockProvider::new();
    provider.expect_supports_moderation().return_const(false);
    provider.expect_supports_titles().return_const(false);
    provider
        .expect_complete()
        .returning(|_, _| Box::pin(async { Ok("Pulsars are neutron stars.".to_string()) }));
    provider.expect_complete_stream().returning(|_, _| {
        Box::pin(async {
            Ok(fragments(vec![
                Ok("Hel".to_string()),
                Ok("lo".to_string()),
            ]))
        })
    });
    provider
}

async fn setup() -> AppState {
    let storage: ArcStorage = Arc::new(Sqlite::new(None).await.expect("open database"));
    let mut retriever = MockRetriever::new();
    retriever
        .expect_retrieve()
        .returning(|_, _| Box::pin(async { vec![] }));

    let config = Configuration::default();
    let chat = ChatService::new(
        storage.clone(),
        Arc::new(mock_provider()),
        Arc::new(retriever),
        ContextAssembler::new(&ContextConfig::default(), TokenEstimator::default()),
        &config.context,
    );
    AppState::new(storage, Arc::new(chat), Arc::new(config))
}

fn request(method: &str, uri: &str, user: Option<i64>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user.to_string());
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn call(state: &AppState, req: Request<Body>) -> (StatusCode, String) {
    let resp = router(state.clone()).oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 1_000_000)
        .await
        .unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

async fn call_json(state: &AppState, req: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = call(state, req).await;
    let json = match body.is_empty() {
        true => Value::Null,
        false => serde_json::from_str(&body).unwrap(),
    };
    (status, json)
}

async fn create_convo(state: &AppState, user: i64) -> i64 {
    let (status, json) = call_json(state, request("POST", "/convo", Some(user), None)).await;
    assert_eq!(status, StatusCode::CREATED);
    json["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health() {
    let state = setup().await;
    let (status, json) = call_json(&state, request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["provider"], "hosted");
    assert_eq!(json["model"], "gpt-4o-mini");
}

#[tokio::test]
async fn test_identity_is_required() {
    let state = setup().await;

    let (status, json) = call_json(&state, request("GET", "/convos", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json["error"].is_string());

    let req = Request::builder()
        .uri("/convos")
        .header("x-user-id", "not-a-number")
        .body(Body::empty())
        .unwrap();
    let (status, _) = call(&state, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_conversation_crud() {
    let state = setup().await;

    let (status, json) = call_json(
        &state,
        request("POST", "/convo", Some(1), Some(json!({ "title": "  Stars  " }))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["title"], "Stars");

    let id = create_convo(&state, 1).await;
    let (_, json) = call_json(&state, request("GET", &format!("/convo/{}", id), Some(1), None)).await;
    assert_eq!(json["convo"]["title"], "New Chat");
    assert_eq!(json["messages"], json!([]));

    let (_, json) = call_json(&state, request("GET", "/convos", Some(1), None)).await;
    assert_eq!(json.as_array().unwrap().len(), 2);

    let (status, json) = call_json(
        &state,
        request("PUT", &format!("/convo/{}", id), Some(1), Some(json!({ "title": "Renamed" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["title"], "Renamed");

    let (status, _) = call(
        &state,
        request("PUT", &format!("/convo/{}", id), Some(1), Some(json!({ "title": "  " }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&state, request("GET", &format!("/convo/{}", id), Some(2), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&state, request("DELETE", &format!("/convo/{}", id), Some(1), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&state, request("GET", &format!("/convo/{}", id), Some(1), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_share_flow() {
    let state = setup().await;
    let id = create_convo(&state, 1).await;

    let (status, _) = call(
        &state,
        request("POST", &format!("/send/{}", id), Some(1), Some(json!({ "message": "Hi", "stream": false }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = call_json(&state, request("POST", &format!("/convo/{}/share", id), Some(1), None)).await;
    assert_eq!(status, StatusCode::OK);
    let token = json["shareToken"].as_str().unwrap().to_string();
    assert!(json["sharedAt"].is_string());

    let (status, json) = call_json(&state, request("GET", &format!("/share/{}", token), None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["title"], "New Chat");
    assert_eq!(json["messages"].as_array().unwrap().len(), 2);
    assert!(json.get("ownerId").is_none());

    let (status, _) = call(&state, request("POST", &format!("/convo/{}/share", id), Some(2), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&state, request("DELETE", &format!("/convo/{}/share", id), Some(1), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&state, request("GET", &format!("/share/{}", token), None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_send_without_stream() {
    let state = setup().await;
    let id = create_convo(&state, 1).await;

    let (status, json) = call_json(
        &state,
        request("POST", &format!("/send/{}", id), Some(1), Some(json!({ "message": "What is a pulsar?", "stream": false }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["response"], "Pulsars are neutron stars.");
    assert!(json["userMessageId"].is_i64());
    assert!(json["assistantMessageId"].is_i64());
    assert!(json.get("newTitle").is_none());
}

#[tokio::test]
async fn test_send_streams_events() {
    let state = setup().await;
    let id = create_convo(&state, 1).await;

    let (status, body) = call(
        &state,
        request("POST", &format!("/send/{}", id), Some(1), Some(json!({ "message": "Say hello" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let events = body
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str::<Value>(data).unwrap())
        .collect::<Vec<_>>();
    let types = events
        .iter()
        .map(|e| e["type"].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(types, vec!["userMessage", "chunk", "chunk", "final", "done"]);
    assert_eq!(events[0]["content"], "Say hello");
    assert_eq!(events[3]["content"], "Hello");
    assert!(events[3]["messageId"].is_i64());
}

#[tokio::test]
async fn test_send_rejects_bad_requests() {
    let state = setup().await;
    let id = create_convo(&state, 1).await;

    let (status, json) = call_json(
        &state,
        request("POST", &format!("/send/{}", id), Some(1), Some(json!({ "message": "   " }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("empty"));

    let (status, _) = call(
        &state,
        request("POST", &format!("/send/{}", id), Some(2), Some(json!({ "message": "Hi" }))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let req = Request::builder()
        .method("POST")
        .uri(format!("/send/{}", id))
        .header("x-user-id", "1")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = call(&state, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, json) = call_json(&state, request("GET", &format!("/convo/{}", id), Some(1), None)).await;
    assert_eq!(json["messages"], json!([]));
}

#[tokio::test]
async fn test_non_numeric_id_is_a_json_error() {
    let state = setup().await;

    for (method, uri) in [("GET", "/convo/abc"), ("DELETE", "/convo/abc"), ("POST", "/convo/abc/share")] {
        let (status, json) = call_json(&state, request(method, uri, Some(1), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{} {}", method, uri);
        assert!(json["error"].as_str().unwrap().contains("abc"));
    }

    let (status, json) = call_json(
        &state,
        request("POST", "/send/abc", Some(1), Some(json!({ "message": "Hi" }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}
