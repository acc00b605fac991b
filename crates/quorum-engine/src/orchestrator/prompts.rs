//! Coordinator prompts and stage payload formatting

use quorum_search::SearchHit;
use serde::Serialize;

pub const ANALYSIS_PREFIX: &str = "You are a task coordinator";
pub const SUMMARY_PREFIX: &str = "You are a search results summarizer";
pub const ANSWER_PREFIX: &str = "You are an AI assistant with perfect memory";
pub const REVIEW_PREFIX: &str = "Review the solution";

/// Context key under which the latest search summary is remembered
pub const SEARCH_SUMMARY_KEY: &str = "latest_search_summary";

/// True if any vocabulary term occurs in `text`, ignoring case.
#[must_use]
pub fn needs_search<S: AsRef<str>>(text: &str, vocabulary: &[S]) -> bool {
    let text = text.to_lowercase();
    vocabulary.iter().any(|term| {
        let term = term.as_ref().trim();
        !term.is_empty() && text.contains(&term.to_lowercase())
    })
}

pub fn analysis_prompt(marker: &str) -> String {
    format!(
        "{ANALYSIS_PREFIX} with web search capabilities and perfect memory. \
         You can see the conversation history and recent code changes through the memory system. \
         Search results are gathered for you when a task needs current information, \
         technical documentation, or specific details.\n\n\
         For simple questions, respond with '{marker}'. \
         For coding tasks, provide a detailed analysis covering requirements, constraints, \
         and helpful context. Reference relevant past interactions and code changes when applicable."
    )
}

pub fn summary_prompt() -> String {
    format!(
        "{SUMMARY_PREFIX} with perfect memory. \
         Given a list of search results, extract and summarize the most relevant information. \
         Focus on key facts, recent developments, and important details. \
         Keep specific technical details, since they may matter for coding tasks. \
         Use the conversation history and previous code changes to judge relevance."
    )
}

pub fn answer_prompt(search_summary: Option<&str>) -> String {
    let mut prompt = format!(
        "{ANSWER_PREFIX} of our conversation. \
         Answer questions clearly and concisely, using information from our conversation history. \
         If asked about preferences or previous statements, refer to the conversation history."
    );
    if let Some(summary) = search_summary {
        prompt.push_str("\n\nRelevant search information:\n");
        prompt.push_str(summary);
    }
    prompt
}

pub fn review_prompt() -> String {
    format!(
        "{REVIEW_PREFIX} with perfect memory of all previous interactions and code changes. \
         Consider correctness, efficiency, and best practices. \
         If the solution references search results or previous code changes, verify that \
         the information has been properly incorporated. \
         Reference relevant past decisions and changes in your review."
    )
}

/// System message handed to every coder alongside the request messages.
pub fn coder_context(analysis: &str, search_summary: Option<&str>) -> String {
    let mut context = format!("Task Analysis:\n{analysis}\n\n");
    if let Some(summary) = search_summary {
        context.push_str(&format!("Search Information:\n{summary}\n\n"));
    }
    context
}

#[derive(Serialize)]
struct HitForSummary<'a> {
    title: &'a str,
    content: &'a str,
    url: &'a str,
}

/// Search hits rendered as the summarizer's user message.
pub fn format_hits(hits: &[SearchHit]) -> String {
    let view: Vec<HitForSummary<'_>> = hits
        .iter()
        .map(|h| HitForSummary {
            title: &h.title,
            content: h.content.trim(),
            url: &h.url,
        })
        .collect();
    serde_json::to_string_pretty(&view).unwrap_or_default()
}

pub fn analysis_payload(analysis: &str) -> String {
    format!("🤖 Coordinator Analysis:\n{analysis}\n\n")
}

pub fn search_payload(summary: &str) -> String {
    format!("🔍 Search Results:\n{summary}\n\n")
}

pub fn answer_payload(answer: &str) -> String {
    format!("🤖 Answer:\n{answer}\n\n")
}

pub fn solution_payload(backend: &str, body: &str) -> String {
    format!("💻 {}'s Solution:\n{body}\n\n", capitalize(backend))
}

pub fn review_payload(review: &str) -> String {
    format!("🤖 Final Review:\n{review}\n\n")
}

pub fn error_payload(error: &str) -> String {
    format!("❌ Error: Error processing task: {error}\n\n")
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
