pub mod orchestrator;

pub use orchestrator::{ChatService, PreparedTurn, SendRequest, TurnOutcome};

use std::sync::Arc;

pub type ArcChatService = Arc<ChatService>;
