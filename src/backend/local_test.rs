use futures::TryStreamExt;
use mockito::Matcher;
use serde_json::json;

use super::*;

fn setup_backend(url: &str) -> Local {
    Local::default().with_endpoint(url).with_model("llama3")
}

#[tokio::test]
async fn test_complete() {
    let mut server = mockito::Server::new_async().await;
    let handler = server
        .mock("POST", "/api/generate")
        .match_body(Matcher::PartialJson(json!({
            "model": "llama3",
            "prompt": "System: Be brief.\n\nUser: Hello\n\nAssistant:",
            "stream": false,
            "options": { "num_predict": 64 },
        })))
        .with_status(200)
        .with_body(json!({ "response": "Hi!", "done": true }).to_string())
        .create_async()
        .await;

    let backend = setup_backend(&server.url());
    let res = backend
        .complete(
            vec![PromptMessage::system("Be brief."), PromptMessage::user("Hello")],
            CompletionOptions::default().with_max_response_tokens(64),
        )
        .await
        .expect("Failed to complete");

    assert_eq!(res, "Hi!");
    handler.assert_async().await;
}

#[tokio::test]
async fn test_complete_stream() {
    let body = [
        json!({ "response": "Hel", "done": false }),
        json!({ "response": "lo", "done": false }),
        json!({ "response": "", "done": false }),
        json!({ "response": " world", "done": false }),
        json!({ "response": "", "done": true }),
    ]
    .iter()
    .map(|v| v.to_string())
    .collect::<Vec<_>>()
    .join("\n");

    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/generate")
        .match_body(Matcher::PartialJson(json!({ "stream": true })))
        .with_status(200)
        .with_header("content-type", "application/x-ndjson")
        .with_body(body)
        .create_async()
        .await;

    let backend = setup_backend(&server.url());
    let fragments = backend
        .complete_stream(vec![PromptMessage::user("Hello")], CompletionOptions::default())
        .await
        .expect("Failed to open stream")
        .try_collect::<Vec<_>>()
        .await
        .expect("Failed to read stream");

    assert_eq!(fragments, vec!["Hel", "lo", " world"]);
}

#[tokio::test]
async fn test_complete_stream_error_line() {
    let body = [
        json!({ "response": "partial", "done": false }),
        json!({ "error": "model crashed" }),
    ]
    .iter()
    .map(|v| v.to_string())
    .collect::<Vec<_>>()
    .join("\n");

    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/generate")
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;

    let backend = setup_backend(&server.url());
    let mut stream = backend
        .complete_stream(vec![PromptMessage::user("Hello")], CompletionOptions::default())
        .await
        .expect("Failed to open stream");

    assert_eq!(stream.try_next().await.unwrap().as_deref(), Some("partial"));
    let err = stream.try_next().await.expect_err("stream should fail");
    assert!(err.to_string().contains("model crashed"));
}

#[tokio::test]
async fn test_complete_surfaces_http_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/generate")
        .with_status(404)
        .with_body(json!({ "error": "model 'llama3' not found" }).to_string())
        .create_async()
        .await;

    let backend = setup_backend(&server.url());
    let err = backend
        .complete(vec![PromptMessage::user("Hello")], CompletionOptions::default())
        .await
        .expect_err("request should fail");
    assert!(err.to_string().contains("(404)"));
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn test_capabilities() {
    let backend = Local::default();
    assert!(!backend.supports_moderation());
    assert!(!backend.moderate("anything".to_string()).await);
    assert!(backend.supports_titles());
}

#[tokio::test]
async fn test_generate_title() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/generate")
        .with_status(200)
        .with_body(json!({ "response": "Pulsar Questions.\nExtra line", "done": true }).to_string())
        .create_async()
        .await;

    let backend = setup_backend(&server.url());
    let title = backend.generate_title("What is a pulsar?".to_string()).await;
    assert_eq!(title, "Pulsar Questions");
}
