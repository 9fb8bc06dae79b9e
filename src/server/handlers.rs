#[cfg(test)]
#[path = "handlers_test.rs"]
mod tests;

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{AppState, error::ApiError, identity::Identity};
use crate::{
    chat::SendRequest,
    models::{ChatEvent, Conversation, Message},
};

/// Events buffered between the generation task and a slow client
const EVENT_BUFFER: usize = 64;

#[derive(Debug, Default, Deserialize)]
pub struct CreateConversation {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameConversation {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConversationDetail {
    convo: Conversation,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ShareInfo {
    share_token: String,
    shared_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SharedConversation {
    title: String,
    shared_at: Option<chrono::DateTime<chrono::Utc>>,
    messages: Vec<Message>,
}

fn conversation_not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("conversation {} not found", id))
}

fn bad_json(rejection: JsonRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}

fn bad_path(rejection: PathRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let provider = &state.config.provider;
    Json(serde_json::json!({
        "status": "ok",
        "provider": provider.kind.to_string(),
        "model": provider.model,
    }))
}

/// Runs one chat turn. Validation and persistence of the user message
/// happen before the response starts, so rejected requests get a plain
/// error status instead of an event stream.
pub async fn send_message(
    State(state): State<AppState>,
    Identity(user): Identity,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Path(id) = path.map_err(bad_path)?;
    let Json(req) = payload.map_err(bad_json)?;
    let turn = state.chat.prepare(user, id, &req).await?;

    if !req.stream {
        let outcome = state.chat.generate(turn).await?;
        return Ok(Json(outcome).into_response());
    }

    let (tx, rx) = mpsc::channel::<ChatEvent>(EVENT_BUFFER);
    let chat = state.chat.clone();
    tokio::spawn(async move {
        chat.generate_streaming(turn, Arc::new(tx)).await;
    });

    let events = ReceiverStream::new(rx).map(|event| Event::default().json_data(event));
    Ok(Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response())
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Identity(user): Identity,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    Ok(Json(state.storage.get_conversations(user).await?))
}

pub async fn create_conversation(
    State(state): State<AppState>,
    Identity(user): Identity,
    body: Bytes,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    let req = match body.is_empty() {
        true => CreateConversation::default(),
        false => serde_json::from_slice::<CreateConversation>(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid request body: {}", e)))?,
    };

    let mut convo = Conversation::new(user);
    if let Some(title) = req.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        convo = convo.with_title(title);
    }
    let convo = state.storage.create_conversation(convo).await?;
    log::debug!("User {} created conversation {}", user, convo.id());
    Ok((StatusCode::CREATED, Json(convo)))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Identity(user): Identity,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<impl Serialize>, ApiError> {
    let Path(id) = path.map_err(bad_path)?;
    let convo = state
        .storage
        .get_conversation(id, user)
        .await?
        .ok_or_else(|| conversation_not_found(id))?;
    let messages = state.storage.get_messages(id).await?;
    Ok(Json(ConversationDetail { convo, messages }))
}

pub async fn rename_conversation(
    State(state): State<AppState>,
    Identity(user): Identity,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<RenameConversation>, JsonRejection>,
) -> Result<Json<Conversation>, ApiError> {
    let Path(id) = path.map_err(bad_path)?;
    let Json(req) = payload.map_err(bad_json)?;
    let title = req.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }

    if !state
        .storage
        .update_title(id, user, title.to_string())
        .await?
    {
        return Err(conversation_not_found(id));
    }

    let convo = state
        .storage
        .get_conversation(id, user)
        .await?
        .ok_or_else(|| conversation_not_found(id))?;
    Ok(Json(convo))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    Identity(user): Identity,
    path: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = path.map_err(bad_path)?;
    match state.storage.delete_conversation(id, user).await? {
        true => Ok(StatusCode::NO_CONTENT),
        false => Err(conversation_not_found(id)),
    }
}

pub async fn share_conversation(
    State(state): State<AppState>,
    Identity(user): Identity,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<impl Serialize>, ApiError> {
    let Path(id) = path.map_err(bad_path)?;
    let convo = state
        .storage
        .share_conversation(id, user, chrono::Utc::now())
        .await?
        .ok_or_else(|| conversation_not_found(id))?;

    match (convo.share_token(), convo.shared_at()) {
        (Some(token), Some(shared_at)) => Ok(Json(ShareInfo {
            share_token: token.to_string(),
            shared_at,
        })),
        _ => Err(ApiError::Internal(format!(
            "conversation {} has no share token after sharing",
            id
        ))),
    }
}

pub async fn unshare_conversation(
    State(state): State<AppState>,
    Identity(user): Identity,
    path: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = path.map_err(bad_path)?;
    match state.storage.unshare_conversation(id, user).await? {
        true => Ok(StatusCode::NO_CONTENT),
        false => Err(conversation_not_found(id)),
    }
}

/// Public, unauthenticated view of a shared conversation.
pub async fn get_shared(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<impl Serialize>, ApiError> {
    let (convo, messages) = state
        .storage
        .get_shared(token)
        .await?
        .ok_or_else(|| ApiError::NotFound("shared conversation not found".to_string()))?;

    let messages = convo.shared_view(&messages).into_iter().cloned().collect();
    Ok(Json(SharedConversation {
        title: convo.title().to_string(),
        shared_at: convo.shared_at(),
        messages,
    }))
}
