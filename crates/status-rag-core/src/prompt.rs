//! Prompt rendering and absence-claim detection.
//!
//! The generation prompt is a user-supplied template with three
//! placeholders, substituted in a single pass (substituted text is never
//! re-scanned, so a query containing `{{CONTEXT}}` stays literal):
//!
//! | Placeholder    | Value                                   |
//! |----------------|-----------------------------------------|
//! | `{{QUERY}}`    | the trimmed user question               |
//! | `{{CONTEXT}}`  | the rendered [`ContextSelection`]       |
//! | `{{FALLBACK}}` | the canned "not in the updates" answer  |
//!
//! A template without `{{CONTEXT}}` gets the context appended. The
//! mention/absence directives are always appended last.

use regex::Regex;
use std::sync::LazyLock;

use crate::context::ContextSelection;
use crate::mention::{AbsenceFlag, MentionResult};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(QUERY|CONTEXT|FALLBACK)\}\}").unwrap());

/// Phrases by which an answer claims the context lacks the information.
static ABSENCE_CLAIM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(not found|no (?:updates?|sources?|entries|context) (?:mentions?|contains?|discuss(?:es)?|refers? to)|(?:does|do) not (?:contain|mention|include|provide)|doesn't (?:contain|mention|include)|no (?:relevant )?(?:information|mention|data) (?:about|on|regarding)|not mentioned|no information)\b",
    )
    .unwrap()
});

/// Render the full generation prompt.
pub fn render_prompt(
    template: &str,
    query: &str,
    selection: &ContextSelection,
    mentions: &MentionResult,
    fallback: &str,
) -> String {
    let mut prompt = PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures| match &caps[1] {
            "QUERY" => query.to_string(),
            "CONTEXT" => selection.rendered_text.clone(),
            _ => fallback.to_string(),
        })
        .into_owned();

    if !template.contains("{{CONTEXT}}") {
        prompt.push_str("\n\nContext (each source numbered):\n");
        prompt.push_str(&selection.rendered_text);
    }

    prompt.push_str("\n\n");
    prompt.push_str(&mention_directives(selection, mentions, fallback));
    prompt
}

/// The directive block derived from the mention check.
pub fn mention_directives(
    selection: &ContextSelection,
    mentions: &MentionResult,
    fallback: &str,
) -> String {
    let mut out = String::from("Verification directives:\n");
    out.push_str(&format!(
        "- Sources available: 1-{} only. Cite as [n] or [n,m].\n",
        selection.len()
    ));
    match mentions.absence_flag {
        AbsenceFlag::No => {
            out.push_str(&format!(
                "- Sources verified to mention the query terms: {}.\n",
                format_numbers(&mentions.mentioned_indices)
            ));
            out.push_str(
                "- ABSENCE_FLAG: NO. The context DOES contain information about this query. \
                 Do not state that it is missing. Answer from the verified sources and cite them.",
            );
        }
        AbsenceFlag::Yes => {
            out.push_str(&format!(
                "- ABSENCE_FLAG: YES. No source mentions the query terms{}. \
                 If the context does not answer the question, reply exactly: {}",
                if mentions.terms.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", mentions.terms.join(", "))
                },
                fallback
            ));
        }
    }
    out
}

/// Prompt for the one corrective rewrite after a false absence claim.
pub fn rewrite_prompt(
    query: &str,
    selection: &ContextSelection,
    mentions: &MentionResult,
    previous_answer: &str,
) -> String {
    format!(
        "Your previous answer claimed the context has no information, but sources {numbers} \
         explicitly mention the query terms.\n\
         Rewrite the answer using ONLY those sources, citing them as [n]. \
         Do not say the information is missing.\n\n\
         User question: \"{query}\"\n\n\
         Previous answer:\n{previous_answer}\n\n\
         Context (each source numbered):\n{context}\n\n\
         Answer:",
        numbers = format_numbers(&mentions.mentioned_indices),
        query = query,
        previous_answer = previous_answer,
        context = selection.rendered_text,
    )
}

/// Whether `answer` claims the context lacks the requested information.
pub fn claims_absence(answer: &str, fallback: &str) -> bool {
    let fallback = fallback.trim().trim_end_matches('.').to_lowercase();
    if !fallback.is_empty() && answer.to_lowercase().contains(&fallback) {
        return true;
    }
    ABSENCE_CLAIM.is_match(answer)
}

fn format_numbers(numbers: &[usize]) -> String {
    let inner: Vec<String> = numbers.iter().map(|n| n.to_string()).collect();
    format!("[{}]", inner.join(", "))
}
