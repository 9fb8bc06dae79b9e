use super::*;

#[test]
fn test_clean_title() {
    assert_eq!(clean_title("\"Exploring Neutron Stars.\""), "Exploring Neutron Stars");
    assert_eq!(clean_title("  # Pulsar Basics\n\nextra text"), "Pulsar Basics");
    assert_eq!(clean_title("“Quantum  Tunneling”"), "Quantum Tunneling");
    assert_eq!(clean_title("Don't Panic"), "Don't Panic");
    assert_eq!(clean_title("'What's new in Rust 2.0'"), "What's new in Rust 2.0");
    assert_eq!(clean_title("`Dark Matter`."), "Dark Matter");
}

#[test]
fn test_clean_title_truncates_to_fifty_chars() {
    let raw = "A ".repeat(40);
    let title = clean_title(&raw);
    assert!(title.chars().count() <= MAX_TITLE_CHARS);
    assert!(title.starts_with("A A A"));
    assert!(!title.ends_with(' '));
}

#[test]
fn test_empty_title_falls_back() {
    assert_eq!(clean_title(""), FALLBACK_TITLE);
    assert_eq!(clean_title(" \"...\" "), FALLBACK_TITLE);
}

#[test]
fn test_flatten_prompt() {
    let prompt = flatten_prompt(&[
        PromptMessage::system("Be brief."),
        PromptMessage::user("Hi"),
        PromptMessage::new(Role::Assistant, "Hello!"),
        PromptMessage::user("What is a pulsar?"),
    ]);
    assert_eq!(
        prompt,
        "System: Be brief.\n\nUser: Hi\n\nAssistant: Hello!\n\nUser: What is a pulsar?\n\nAssistant:"
    );
}

#[test]
fn test_title_prompt() {
    let prompt = title_prompt("Tell me about pulsars");
    assert_eq!(prompt.len(), 2);
    assert_eq!(prompt[0].role, Role::System);
    assert_eq!(prompt[1].content, "Tell me about pulsars");

    let options = title_options();
    assert_eq!(options.max_response_tokens, Some(TITLE_MAX_TOKENS));
    assert_eq!(options.temperature, Some(TITLE_TEMPERATURE));
}
