pub mod hosted;
pub mod local;
pub(crate) mod utils;

pub use hosted::Hosted;
pub use local::Local;

#[cfg(test)]
use mockall::automock;

use crate::{
    config::{ProviderConfig, ProviderKind, constants::FALLBACK_TITLE},
    models::{CompletionOptions, PromptMessage},
};
use async_trait::async_trait;
use eyre::Result;
use futures::Stream;
use std::{pin::Pin, sync::Arc};

/// Forward-only sequence of generated text fragments. It ends when the
/// backend signals completion and may yield an error mid-way; it cannot be
/// restarted.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A completion backend.
///
/// Moderation and titling are optional capabilities: callers check
/// `supports_moderation`/`supports_titles` before using them.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait Provider {
    fn name(&self) -> &str;

    async fn complete(
        &self,
        messages: Vec<PromptMessage>,
        options: CompletionOptions,
    ) -> Result<String>;

    async fn complete_stream(
        &self,
        messages: Vec<PromptMessage>,
        options: CompletionOptions,
    ) -> Result<TextStream>;

    fn supports_moderation(&self) -> bool {
        false
    }

    /// Whether `text` is flagged. Fails open: any transport failure
    /// reports not flagged.
    async fn moderate(&self, _text: String) -> bool {
        false
    }

    fn supports_titles(&self) -> bool {
        false
    }

    /// A short title for a conversation opening with `first_message`.
    /// Never fails; falls back to a fixed title.
    async fn generate_title(&self, _first_message: String) -> String {
        FALLBACK_TITLE.to_string()
    }
}

pub type ArcProvider = Arc<dyn Provider + Send + Sync>;

pub fn new_provider(config: &ProviderConfig) -> Result<ArcProvider> {
    if config.model.trim().is_empty() {
        eyre::bail!("no model is set");
    }

    let provider: ArcProvider = match config.kind {
        ProviderKind::Hosted => Arc::new(Hosted::from(config)),
        ProviderKind::Local => Arc::new(Local::from(config)),
    };

    log::info!(
        "Using {} provider {} at {} (model {})",
        config.kind,
        provider.name(),
        config.endpoint(),
        config.model
    );
    Ok(provider)
}
