#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;

use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::{
    backend::ArcProvider,
    config::ContextConfig,
    context::ContextAssembler,
    models::{
        ArcEventTx, ChatError, ChatEvent, CompletionOptions, Conversation, Message, PromptMessage,
        Role,
    },
    retrieval::{ArcRetriever, build_query},
    storage::ArcStorage,
};

/// Content of the final event when the model produced nothing.
pub const EMPTY_RESPONSE: &str = "(no response)";

/// Body of a send-message request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub exclusive: bool,
    #[serde(default)]
    pub response_length: Option<i64>,
    #[serde(default = "stream_by_default")]
    pub stream: bool,
}

fn stream_by_default() -> bool {
    true
}

/// Result of a non-streaming turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub response: String,
    pub user_message_id: i64,
    pub assistant_message_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convo_id: Option<i64>,
}

/// A validated turn whose user message is already persisted and whose
/// prompt fits the model window.
#[derive(Debug, Clone)]
pub struct PreparedTurn {
    conversation: Conversation,
    user_message: Message,
    prompt: Vec<PromptMessage>,
    options: CompletionOptions,
    first_user_turn: bool,
}

impl PreparedTurn {
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn user_message(&self) -> &Message {
        &self.user_message
    }

    pub fn prompt(&self) -> &[PromptMessage] {
        &self.prompt
    }

    pub fn is_first_user_turn(&self) -> bool {
        self.first_user_turn
    }
}

/// Runs one chat turn: validate, retrieve, assemble, generate, persist and
/// title.
///
/// Sends to the same conversation are not serialized. Two concurrent first
/// turns may both generate a title.
pub struct ChatService {
    storage: ArcStorage,
    provider: ArcProvider,
    retriever: ArcRetriever,
    assembler: ContextAssembler,
    system_prompt: String,
    reach: usize,
    moderation: bool,
}

impl ChatService {
    pub fn new(
        storage: ArcStorage,
        provider: ArcProvider,
        retriever: ArcRetriever,
        assembler: ContextAssembler,
        context: &ContextConfig,
    ) -> Self {
        Self {
            storage,
            provider,
            retriever,
            assembler,
            system_prompt: context.system_prompt.clone(),
            reach: context.reach,
            moderation: true,
        }
    }

    pub fn with_moderation(mut self, enabled: bool) -> Self {
        self.moderation = enabled;
        self
    }

    /// Everything up to the model call. Fails without side effects unless
    /// the user message has been persisted, which is the last step.
    pub async fn prepare(
        &self,
        owner_id: i64,
        convo_id: i64,
        req: &SendRequest,
    ) -> Result<PreparedTurn, ChatError> {
        if req.message.trim().is_empty() {
            return Err(ChatError::invalid_input("message must not be empty"));
        }
        let requested_response = match req.response_length {
            Some(len) if len <= 0 => {
                return Err(ChatError::invalid_input("responseLength must be positive"));
            }
            Some(len) => Some(len as usize),
            None => None,
        };

        let conversation = self
            .storage
            .get_conversation(convo_id, owner_id)
            .await?
            .ok_or_else(|| ChatError::not_found(format!("conversation {} not found", convo_id)))?;

        if self.moderation
            && self.provider.supports_moderation()
            && self.provider.moderate(req.message.clone()).await
        {
            log::info!("Rejected flagged message in conversation {}", convo_id);
            return Err(ChatError::invalid_input("message was flagged by moderation"));
        }

        let history = self.storage.get_messages(convo_id).await?;
        let first_user_turn = !history.iter().any(Message::is_user);

        let query = build_query(
            &history,
            &req.message,
            req.subject.as_deref(),
            req.exclusive,
        );
        let passages = self.retriever.retrieve(query, self.reach).await;

        let assembled = self.assembler.assemble(
            &self.system_prompt,
            &history,
            &req.message,
            &passages,
            requested_response,
        );
        log::debug!(
            "Conversation {}: {} of {} passages included ({} tokens)",
            convo_id,
            assembled.included,
            passages.len(),
            assembled.passage_tokens
        );

        let user_message = self
            .storage
            .add_message(convo_id, Message::new_user(req.message.clone()))
            .await?;

        let mut prompt = Vec::with_capacity(history.len() + 3);
        prompt.push(PromptMessage::system(self.system_prompt.clone()));
        prompt.push(assembled.message);
        prompt.extend(history.iter().map(PromptMessage::from));
        prompt.push(PromptMessage::from(&user_message));

        let options =
            CompletionOptions::default().with_max_response_tokens(assembled.budget.reserved_response);

        Ok(PreparedTurn {
            conversation,
            user_message,
            prompt,
            options,
            first_user_turn,
        })
    }

    /// Awaits the whole response. Generation failures still persist the
    /// user message and still run titling on a first turn.
    pub async fn generate(&self, turn: PreparedTurn) -> Result<TurnOutcome, ChatError> {
        let result = self
            .provider
            .complete(turn.prompt.clone(), turn.options.clone())
            .await;

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                log::error!(
                    "Completion failed for conversation {}: {:#}",
                    turn.conversation.id(),
                    err
                );
                self.update_title(&turn).await;
                return Err(ChatError::Generation(format!("{:#}", err)));
            }
        };

        let assistant = self.persist_response(&turn, &response).await?;
        let new_title = self.update_title(&turn).await;

        Ok(TurnOutcome {
            response: assistant
                .as_ref()
                .map(|msg| msg.content().to_string())
                .unwrap_or_else(|| EMPTY_RESPONSE.to_string()),
            user_message_id: turn.user_message.id(),
            assistant_message_id: assistant.map(|msg| msg.id()),
            convo_id: new_title.as_ref().map(|_| turn.conversation.id()),
            new_title,
        })
    }

    /// Streams the response as chat events and always finishes with a
    /// done event. Closed receivers are ignored; whatever text arrived is
    /// still persisted.
    pub async fn generate_streaming(&self, turn: PreparedTurn, tx: ArcEventTx) {
        let convo_id = turn.conversation.id();
        emit(
            &tx,
            ChatEvent::UserMessage {
                message_id: turn.user_message.id(),
                role: Role::User,
                content: turn.user_message.content().to_string(),
            },
        )
        .await;

        let mut text = String::new();
        let mut failure = None;
        match self
            .provider
            .complete_stream(turn.prompt.clone(), turn.options.clone())
            .await
        {
            Ok(mut stream) => {
                while let Some(fragment) = stream.next().await {
                    match fragment {
                        Ok(fragment) if fragment.is_empty() => continue,
                        Ok(fragment) => {
                            text.push_str(&fragment);
                            emit(&tx, ChatEvent::Chunk { content: fragment }).await;
                        }
                        Err(err) => {
                            failure = Some(err);
                            break;
                        }
                    }
                }
            }
            Err(err) => failure = Some(err),
        }

        match failure {
            None => match self.persist_response(&turn, &text).await {
                Ok(assistant) => {
                    let (message_id, content) = match assistant {
                        Some(msg) => (Some(msg.id()), msg.content().to_string()),
                        None => (None, EMPTY_RESPONSE.to_string()),
                    };
                    emit(
                        &tx,
                        ChatEvent::Final {
                            message_id,
                            role: Role::Assistant,
                            content,
                        },
                    )
                    .await;
                }
                Err(err) => {
                    log::error!("Failed to persist response: {}", err);
                    emit(
                        &tx,
                        ChatEvent::Error {
                            message: err.to_string(),
                        },
                    )
                    .await;
                }
            },
            Some(err) => {
                let message = format!("{:#}", err);
                log::error!(
                    "Completion stream failed for conversation {}: {}",
                    convo_id,
                    message
                );
                if !text.trim().is_empty() {
                    text.push_str(&format!("\n\n[error: {}]", message));
                    if let Err(err) = self.persist_response(&turn, &text).await {
                        log::error!("Failed to persist partial response: {}", err);
                    }
                }
                emit(
                    &tx,
                    ChatEvent::Error {
                        message: ChatError::Generation(message).to_string(),
                    },
                )
                .await;
            }
        }

        if let Some(new_title) = self.update_title(&turn).await {
            emit(
                &tx,
                ChatEvent::TitleUpdate {
                    convo_id,
                    new_title,
                },
            )
            .await;
        }
        emit(&tx, ChatEvent::Done).await;
    }

    /// Stores the assistant message unless the text is blank.
    async fn persist_response(
        &self,
        turn: &PreparedTurn,
        text: &str,
    ) -> Result<Option<Message>, ChatError> {
        if text.trim().is_empty() {
            log::warn!(
                "Empty response for conversation {}, nothing persisted",
                turn.conversation.id()
            );
            return Ok(None);
        }
        let message = self
            .storage
            .add_message(turn.conversation.id(), Message::new_assistant(text))
            .await?;
        Ok(Some(message))
    }

    /// Titles the conversation on its first user turn. Returns the new title
    /// only when it was stored and differs from the current one.
    async fn update_title(&self, turn: &PreparedTurn) -> Option<String> {
        if !turn.first_user_turn || !self.provider.supports_titles() {
            return None;
        }

        let title = self
            .provider
            .generate_title(turn.user_message.content().to_string())
            .await;
        if title == turn.conversation.title() {
            return None;
        }

        let convo = &turn.conversation;
        match self
            .storage
            .update_title(convo.id(), convo.owner_id(), title.clone())
            .await
        {
            Ok(true) => Some(title),
            Ok(false) => None,
            Err(err) => {
                log::warn!("Failed to store title for conversation {}: {:#}", convo.id(), err);
                None
            }
        }
    }
}

async fn emit(tx: &ArcEventTx, event: ChatEvent) {
    if tx.send(event).await.is_err() {
        log::trace!("Event receiver closed, dropping event");
    }
}
