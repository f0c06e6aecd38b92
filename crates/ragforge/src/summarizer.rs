//! Cluster summarization for tree construction.
//!
//! Joins a cluster's member texts, asks the chat LLM for a short
//! summary, and falls back to a truncated concatenation when the LLM
//! call fails or returns something unusable.

use crate::llm::LLMProvider;

const MAX_INPUT_CHARS: usize = 4000;
const MAX_SUMMARY_CHARS: usize = 200;
const MIN_SUMMARY_CHARS: usize = 20;

const SUMMARY_SYSTEM_PROMPT: &str =
    "Summarize the following passages in at most 200 characters. Respond with only the summary, in Chinese.";

/// Summarizes `contents`, falling back to a truncated join when the
/// LLM is unavailable or returns an unusable summary.
pub async fn summarize(llm: &dyn LLMProvider, contents: &[String]) -> String {
    let joined = contents.join("\n\n");
    let truncated_input = truncate_chars(&joined, MAX_INPUT_CHARS);

    match llm.generate(&truncated_input, SUMMARY_SYSTEM_PROMPT).await {
        Ok(resp) if is_valid_summary(&resp.content) => resp.content.trim().to_string(),
        _ => fallback_summary(&joined),
    }
}

fn is_valid_summary(text: &str) -> bool {
    let trimmed = text.trim();
    let len = trimmed.chars().count();
    (MIN_SUMMARY_CHARS..=250).contains(&len) && trimmed.chars().any(|c| !c.is_whitespace())
}

fn fallback_summary(joined: &str) -> String {
    let truncated = truncate_chars(joined, MAX_SUMMARY_CHARS);
    if ends_with_terminal_punctuation(&truncated) {
        truncated
    } else {
        format!("{truncated}…")
    }
}

fn ends_with_terminal_punctuation(text: &str) -> bool {
    matches!(text.chars().last(), Some('.' | '!' | '?' | '。' | '!' | '?' | '…'))
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
