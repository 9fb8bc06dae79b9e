pub mod backend;
pub mod conversation;
pub mod error;
pub mod event;
pub mod message;

pub use backend::*;
pub use conversation::Conversation;
pub use error::ChatError;
pub use event::{ArcEventTx, ChatEvent, EventTx};
pub use message::{Message, Role};
