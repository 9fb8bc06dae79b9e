/// Title given to a conversation until the first turn names it
pub const PLACEHOLDER_TITLE: &str = "New Chat";

/// Title used whenever automatic titling cannot produce one
pub const FALLBACK_TITLE: &str = "Chat";

pub const MAX_TITLE_CHARS: usize = 50;

pub const DEFAULT_BIND: &str = "127.0.0.1:3000";

pub const DEFAULT_IDENTITY_HEADER: &str = "x-user-id";

pub const DEFAULT_HOSTED_ENDPOINT: &str = "https://api.openai.com";

pub const DEFAULT_LOCAL_ENDPOINT: &str = "http://localhost:11434";

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Context window of the configured model
pub const MODEL_MAX_TOKENS: usize = 128 * 1000; // 128k tokens

/// Response tokens reserved when the request does not ask for a length
pub const DEFAULT_RESPONSE_TOKENS: usize = 4096;

/// Passages requested from the retrieval service per turn
pub const DEFAULT_REACH: usize = 10;

pub const RETRIEVAL_TIMEOUT_SECS: u64 = 15;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer accurately and concisely. \
When the provided context is relevant, ground your answer in it; when it is not, say so and \
answer from general knowledge.";
