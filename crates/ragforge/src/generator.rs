//! Prompt assembly and final-answer generation.
//!
//! Grounded on the teacher's prompt-construction style in `llm.rs`'s
//! `build_prompt` helper (join retrieved context into a numbered
//! block, substitute into a template, call the chat/completion
//! endpoint), adapted to the `{{context}}`/`{{question}}` placeholder
//! convention and the numbered `[i] From <doc> - <section>:` citation
//! format this spec calls for.

use ragforge_core::models::{ChunkSource, QueryResult, SearchResult};

use crate::config::Config;
use crate::llm::{LLMProvider, TokenUsage};

/// Builds the numbered context block: `[i] From <doc> - <section>:\n<content>\n\n`.
fn build_context_block(results: &[SearchResult]) -> String {
    let mut block = String::new();
    for (i, result) in results.iter().enumerate() {
        block.push_str(&format!(
            "[{}] From {} - {}:\n{}\n\n",
            i + 1,
            result.document_name,
            result.section,
            result.content
        ));
    }
    block
}

/// Generates an answer grounded in `results`. Returns a fixed sentinel
/// without calling the LLM when `results` is empty. The second element
/// of the returned tuple carries the provider's token-usage counts,
/// when it supplies them, for the caller to record into metrics.
pub async fn generate(
    config: &Config,
    llm: &dyn LLMProvider,
    question: &str,
    results: &[SearchResult],
) -> (QueryResult, Option<TokenUsage>) {
    if results.is_empty() {
        return (
            QueryResult {
                answer: config.generator.no_context_answer.clone(),
                sources: Vec::new(),
            },
            None,
        );
    }

    let context = build_context_block(results);
    let prompt = config
        .generator
        .system_prompt_template
        .replace("{{context}}", &context)
        .replace("{{question}}", question);

    let sources: Vec<ChunkSource> = results.iter().cloned().map(ChunkSource::from).collect();

    match llm.generate(&prompt, "").await {
        Ok(response) => (QueryResult { answer: response.content, sources }, response.usage),
        Err(err) => {
            tracing::warn!(error = %err, "generation failed");
            (
                QueryResult {
                    answer: "I encountered an error while generating an answer.".to_string(),
                    sources,
                },
                None,
            )
        }
    }
}
