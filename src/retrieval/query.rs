#[cfg(test)]
#[path = "query_test.rs"]
mod tests;

use crate::models::Message;

/// Prior user messages folded into the retrieval query
pub const QUERY_HISTORY: usize = 4;

pub const QUERY_DELIMITER: &str = "\n\n---\n\n";

/// Builds the retrieval query for a new message.
///
/// By default the query is the last few user messages followed by the new
/// one. A subject hint replaces that text entirely when `exclusive` is set,
/// otherwise it is prepended as keywords.
pub fn build_query(
    history: &[Message],
    new_message: &str,
    subject: Option<&str>,
    exclusive: bool,
) -> String {
    let subject = subject.map(str::trim).filter(|s| !s.is_empty());
    if let (Some(subject), true) = (subject, exclusive) {
        return subject.to_string();
    }

    let mut recent = history
        .iter()
        .rev()
        .filter(|msg| msg.is_user())
        .take(QUERY_HISTORY)
        .map(|msg| msg.content())
        .collect::<Vec<_>>();
    recent.reverse();
    recent.push(new_message);
    let combined = recent.join(QUERY_DELIMITER);

    match subject {
        Some(subject) => format!("Keywords: {}{}{}", subject, QUERY_DELIMITER, combined),
        None => combined,
    }
}
