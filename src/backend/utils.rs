#[cfg(test)]
#[path = "utils_test.rs"]
mod tests;

use crate::{
    config::constants::{FALLBACK_TITLE, MAX_TITLE_CHARS},
    models::{CompletionOptions, PromptMessage, Role},
};

pub(crate) const TITLE_TEMPERATURE: f32 = 0.2;
pub(crate) const TITLE_MAX_TOKENS: usize = 20;
/// Reasoning models spend hidden tokens before the visible title.
pub(crate) const REASONING_TITLE_MAX_TOKENS: usize = 1024;

const TITLE_QUOTES: &[char] = &['"', '\'', '`', '“', '”', '‘', '’'];

const TITLE_INSTRUCTION: &str = "You name conversations. Reply with a 3-5 word title for a \
conversation that starts with the user's message below. Reply with the title only, without \
quotes or trailing punctuation.";

pub(crate) fn title_prompt(first_message: &str) -> Vec<PromptMessage> {
    vec![
        PromptMessage::system(TITLE_INSTRUCTION),
        PromptMessage::user(first_message),
    ]
}

pub(crate) fn title_options() -> CompletionOptions {
    CompletionOptions::default()
        .with_max_response_tokens(TITLE_MAX_TOKENS)
        .with_temperature(TITLE_TEMPERATURE)
}

/// Keeps the first line of a generated title, strips quotes and periods
/// around it and caps it at 50 characters.
pub(crate) fn clean_title(raw: &str) -> String {
    let line = raw
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();

    let title = line
        .trim_start_matches('#')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let title =
        title.trim_matches(|c: char| TITLE_QUOTES.contains(&c) || c == '.' || c.is_whitespace());

    if title.is_empty() {
        return FALLBACK_TITLE.to_string();
    }
    title.chars().take(MAX_TITLE_CHARS).collect::<String>().trim_end().to_string()
}

/// Renders a role/content sequence as one prompt string for backends that
/// take a single prompt.
pub(crate) fn flatten_prompt(messages: &[PromptMessage]) -> String {
    let mut prompt = messages
        .iter()
        .map(|msg| {
            let speaker = match msg.role {
                Role::System => "System",
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            format!("{}: {}", speaker, msg.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    prompt.push_str("\n\nAssistant:");
    prompt
}
