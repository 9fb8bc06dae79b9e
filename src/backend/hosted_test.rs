use futures::TryStreamExt;
use mockito::Matcher;
use serde_json::json;

use super::*;

fn setup_backend(url: &str, model: &str) -> Hosted {
    Hosted::default()
        .with_endpoint(url)
        .with_api_key("test_token")
        .with_model(model)
}

fn completion_body(content: &str) -> String {
    json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] }).to_string()
}

fn stream_body(fragments: &[&str]) -> String {
    let mut lines = fragments
        .iter()
        .map(|text| CompletionChunk {
            choices: vec![CompletionChunkChoice {
                delta: CompletionDeltaResponse {
                    content: Some(text.to_string()),
                },
                finish_reason: None,
            }],
        })
        .chain(std::iter::once(CompletionChunk {
            choices: vec![CompletionChunkChoice {
                delta: CompletionDeltaResponse { content: None },
                finish_reason: Some("stop".to_string()),
            }],
        }))
        .map(|chunk| {
            format!(
                "data: {}\n",
                serde_json::to_string(&chunk).expect("Failed to serialize")
            )
        })
        .collect::<Vec<_>>();
    lines.push("data: [DONE]\n".to_string());
    lines.join("\n")
}

#[tokio::test]
async fn test_complete() {
    let mut server = mockito::Server::new_async().await;
    let handler = server
        .mock("POST", "/v1/chat/completions")
        .match_header("Authorization", "Bearer test_token")
        .match_body(Matcher::PartialJson(json!({
            "model": "gpt-4o-mini",
            "stream": false,
            "messages": [{ "role": "user", "content": "Hello" }],
        })))
        .with_status(200)
        .with_body(completion_body("Hi there!"))
        .create_async()
        .await;

    let backend = setup_backend(&server.url(), "gpt-4o-mini");
    let res = backend
        .complete(vec![PromptMessage::user("Hello")], CompletionOptions::default())
        .await
        .expect("Failed to complete");

    assert_eq!(res, "Hi there!");
    handler.assert_async().await;
}

#[tokio::test]
async fn test_complete_stream() {
    let mut server = mockito::Server::new_async().await;
    let handler = server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::PartialJson(json!({ "stream": true })))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(stream_body(&["Hel", "lo", " world"]))
        .create_async()
        .await;

    let backend = setup_backend(&server.url(), "gpt-4o-mini");
    let stream = backend
        .complete_stream(vec![PromptMessage::user("Hello")], CompletionOptions::default())
        .await
        .expect("Failed to open stream");
    let fragments = stream
        .try_collect::<Vec<_>>()
        .await
        .expect("Failed to read stream");

    assert_eq!(fragments, vec!["Hel", "lo", " world"]);
    handler.assert_async().await;
}

#[tokio::test]
async fn test_complete_surfaces_provider_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/chat/completions")
        .with_status(429)
        .with_body(
            json!({ "error": { "message": "Rate limit reached", "type": "requests" } }).to_string(),
        )
        .create_async()
        .await;

    let backend = setup_backend(&server.url(), "gpt-4o-mini");
    let err = backend
        .complete(vec![PromptMessage::user("Hello")], CompletionOptions::default())
        .await
        .expect_err("request should fail");

    let err = err.downcast_ref::<HostedError>().expect("typed error");
    assert_eq!(err.http_code, 429);
    assert_eq!(err.message, "Rate limit reached");
    assert_eq!(err.err_type.as_deref(), Some("requests"));
}

#[tokio::test]
async fn test_reasoning_model_rewrites_system_role() {
    let mut server = mockito::Server::new_async().await;
    let handler = server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::PartialJson(json!({
            "model": "o3-mini",
            "messages": [
                { "role": "developer", "content": "Formatting re-enabled\nBe brief." },
                { "role": "user", "content": "Hello" },
            ],
        })))
        .with_status(200)
        .with_body(completion_body("ok"))
        .create_async()
        .await;

    let backend = setup_backend(&server.url(), "o3-mini");
    let res = backend
        .complete(
            vec![PromptMessage::system("Be brief."), PromptMessage::user("Hello")],
            CompletionOptions::default().with_temperature(0.2),
        )
        .await
        .expect("Failed to complete");

    assert_eq!(res, "ok");
    handler.assert_async().await;
}

#[test]
fn test_is_reasoning_model() {
    assert!(is_reasoning_model("o1"));
    assert!(is_reasoning_model("o3-mini"));
    assert!(is_reasoning_model("o3-mini-2025-01-31"));
    assert!(is_reasoning_model("o4-mini"));
    assert!(!is_reasoning_model("gpt-4o-mini"));
    assert!(!is_reasoning_model("o1-preview"));
    assert!(!is_reasoning_model("o3-pro"));
}

#[test]
fn test_completion_request_options() {
    let messages = vec![PromptMessage::system("sys"), PromptMessage::user("hi")];
    let options = CompletionOptions::default()
        .with_max_response_tokens(321)
        .with_temperature(0.2);

    let req = setup_backend("http://localhost", "gpt-4o-mini").completion_request(
        &messages, &options, false,
    );
    let value = serde_json::to_value(&req).expect("Failed to serialize");
    assert_eq!(value["max_completion_tokens"], 321);
    assert_eq!(value["messages"][0]["role"], "system");
    assert!((value["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);

    let req = setup_backend("http://localhost", "o1").completion_request(&messages, &options, true);
    let value = serde_json::to_value(&req).expect("Failed to serialize");
    assert_eq!(value["max_completion_tokens"], 321);
    assert!(value.get("temperature").is_none());
    assert_eq!(value["messages"][0]["role"], "developer");

    let req = setup_backend("http://localhost", "gpt-4o-mini").completion_request(
        &messages,
        &CompletionOptions::default(),
        false,
    );
    let value = serde_json::to_value(&req).expect("Failed to serialize");
    assert!(value.get("max_completion_tokens").is_none());
}

#[tokio::test]
async fn test_moderate() {
    let mut server = mockito::Server::new_async().await;
    let handler = server
        .mock("POST", "/v1/moderations")
        .match_body(Matcher::PartialJson(json!({ "input": "something bad" })))
        .with_status(200)
        .with_body(json!({ "results": [{ "flagged": true }] }).to_string())
        .create_async()
        .await;

    let backend = setup_backend(&server.url(), "gpt-4o-mini");
    assert!(backend.supports_moderation());
    assert!(backend.moderate("something bad".to_string()).await);
    handler.assert_async().await;
}

#[tokio::test]
async fn test_moderate_fails_open() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/moderations")
        .with_status(500)
        .with_body("internal error")
        .create_async()
        .await;

    let backend = setup_backend(&server.url(), "gpt-4o-mini");
    assert!(!backend.moderate("anything".to_string()).await);
}

#[tokio::test]
async fn test_generate_title() {
    let mut server = mockito::Server::new_async().await;
    let handler = server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::PartialJson(json!({ "max_completion_tokens": 20 })))
        .with_status(200)
        .with_body(completion_body("\"Neutron Star Basics.\""))
        .create_async()
        .await;

    let backend = setup_backend(&server.url(), "gpt-4o-mini");
    let title = backend
        .generate_title("Tell me about neutron stars".to_string())
        .await;

    assert_eq!(title, "Neutron Star Basics");
    handler.assert_async().await;
}

#[tokio::test]
async fn test_generate_title_for_reasoning_model() {
    let mut server = mockito::Server::new_async().await;
    let handler = server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::PartialJson(json!({
            "model": "o3-mini",
            "max_completion_tokens": REASONING_TITLE_MAX_TOKENS,
        })))
        .with_status(200)
        .with_body(completion_body("What's New in Rust 2.0"))
        .create_async()
        .await;

    let backend = setup_backend(&server.url(), "o3-mini");
    let title = backend
        .generate_title("What changed in the latest Rust?".to_string())
        .await;

    assert_eq!(title, "What's New in Rust 2.0");
    handler.assert_async().await;
}

#[tokio::test]
async fn test_generate_title_falls_back() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/chat/completions")
        .with_status(500)
        .with_body("boom")
        .create_async()
        .await;

    let backend = setup_backend(&server.url(), "gpt-4o-mini");
    let title = backend.generate_title("Hello".to_string()).await;
    assert_eq!(title, FALLBACK_TITLE);
}
