#[cfg(test)]
#[path = "assembler_test.rs"]
mod tests;

use crate::{
    config::ContextConfig,
    context::TokenEstimator,
    models::{Message, Passage, PromptMessage},
};

/// Role and formatting cost of one message not captured by its text tokens
pub const PER_MESSAGE_OVERHEAD: usize = 5;

pub const PASSAGE_DELIMITER: &str = "\n\n---\n\n";

pub const CONTEXT_PREFIX: &str = "The following passages were retrieved from the knowledge base \
for the user's next message. Passages are separated by \"---\" and listed from most to least relevant.";

pub const TASK_SUFFIX: &str = "\n\n---\n\nEnd of context. Answer the user's next message. Use the \
passages above when they are relevant; if they do not cover the question, say so and answer from \
general knowledge.";

/// Token accounting for one assembled prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub reserved_response: usize,
    pub max_input_tokens: usize,
    pub fixed_tokens: usize,
    pub passage_budget: usize,
}

#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub message: PromptMessage,
    pub included: usize,
    pub passage_tokens: usize,
    pub budget: Budget,
}

/// Fits retrieved passages into what is left of the model's input window
/// once the system prompt, history and new message are accounted for.
///
/// Passages are taken greedily in rank order and selection stops at the
/// first one that does not fit. Later, smaller passages are never
/// considered, so the outcome only depends on the passage order.
#[derive(Clone)]
pub struct ContextAssembler {
    model_max_tokens: usize,
    default_response_tokens: usize,
    estimator: TokenEstimator,
}

impl ContextAssembler {
    pub fn new(config: &ContextConfig, estimator: TokenEstimator) -> Self {
        Self {
            model_max_tokens: config.model_max_tokens,
            default_response_tokens: config.default_response_tokens,
            estimator,
        }
    }

    pub fn budget(
        &self,
        system_prompt: &str,
        history: &[Message],
        new_message: &str,
        requested_response: Option<usize>,
    ) -> Budget {
        let reserved_response = requested_response
            .unwrap_or(self.default_response_tokens)
            .min(self.model_max_tokens / 2);
        let max_input_tokens = self.model_max_tokens - reserved_response;

        let history_tokens = history
            .iter()
            .map(|msg| self.estimator.estimate(msg.content()) + PER_MESSAGE_OVERHEAD)
            .sum::<usize>();

        let fixed_tokens = self.estimator.estimate(system_prompt)
            + self.estimator.estimate(CONTEXT_PREFIX)
            + self.estimator.estimate(TASK_SUFFIX)
            + history_tokens
            + self.estimator.estimate(new_message)
            + PER_MESSAGE_OVERHEAD;

        Budget {
            reserved_response,
            max_input_tokens,
            fixed_tokens,
            passage_budget: max_input_tokens.saturating_sub(fixed_tokens),
        }
    }

    pub fn assemble(
        &self,
        system_prompt: &str,
        history: &[Message],
        new_message: &str,
        passages: &[Passage],
        requested_response: Option<usize>,
    ) -> AssembledContext {
        let budget = self.budget(system_prompt, history, new_message, requested_response);
        let selection = select_passages(passages, budget.passage_budget, &self.estimator);

        let mut content = String::from(CONTEXT_PREFIX);
        content.push_str(&selection.body);
        content.push_str(TASK_SUFFIX);

        log::debug!(
            "Assembled context: {}/{} passages, {} passage tokens, budget {} (fixed {}, max input {}, reserved {})",
            selection.included,
            passages.len(),
            selection.tokens,
            budget.passage_budget,
            budget.fixed_tokens,
            budget.max_input_tokens,
            budget.reserved_response,
        );

        AssembledContext {
            message: PromptMessage::system(content),
            included: selection.included,
            passage_tokens: selection.tokens,
            budget,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Selection {
    pub body: String,
    pub included: usize,
    pub tokens: usize,
}

pub(crate) fn select_passages(
    passages: &[Passage],
    budget: usize,
    estimator: &TokenEstimator,
) -> Selection {
    let mut selection = Selection::default();
    for passage in passages {
        let formatted = format!("{}{}", PASSAGE_DELIMITER, passage.text);
        let tokens = estimator.estimate(&formatted);
        if selection.tokens + tokens > budget {
            break;
        }
        selection.body.push_str(&formatted);
        selection.tokens += tokens;
        selection.included += 1;
    }
    selection
}
