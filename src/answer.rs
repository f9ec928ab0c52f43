//! Answer generation with timeout, classification, trim-and-retry, and
//! absence-claim correction.
//!
//! ```text
//! START ─▶ GENERATE ─┬─▶ SUCCESS ─(false absence claim)─▶ REWRITE ─▶ done
//!             ▲      ├─▶ RETRIABLE_FAIL ─▶ TRIM ─┐
//!             └──────┼───────────────────────────┘
//!                    ├─▶ TERMINAL_FAIL
//!                    └─▶ FALLBACK (no answer, and nothing in context mentions the query)
//! ```
//!
//! Each attempt re-runs the mention check against the context actually
//! sent, so the directives never cite a source that was trimmed away.
//! Only `INVALID_REQUEST` and `TIMEOUT` failures are retried; attempts are
//! sequential. A timed-out call is dropped, which cancels its HTTP request.

use serde::Serialize;
use std::time::{Duration, Instant};

use crate::config::Config;
use status_rag_core::context::{trim_selection, ContextSelection};
use status_rag_core::error::{classify_error, ErrorKind};
use status_rag_core::generation::GenerationProvider;
use status_rag_core::mention::{detect_mentions, AbsenceFlag, MentionPolicy, MentionResult};
use status_rag_core::prompt::{claims_absence, render_prompt, rewrite_prompt};

#[derive(Debug, Clone)]
pub struct AnswerSettings {
    pub template: String,
    pub fallback: String,
    pub timeout: Duration,
    pub max_attempts: usize,
    pub min_trim_entries: usize,
    pub trim_entry_chars: usize,
    pub mention_policy: MentionPolicy,
}

impl AnswerSettings {
    pub fn from_config(config: &Config, template: String) -> Self {
        Self {
            template,
            fallback: config.generation.fallback_answer.clone(),
            timeout: Duration::from_secs(config.generation.timeout_secs),
            max_attempts: config.generation.max_attempts,
            min_trim_entries: config.retrieval.min_trim_entries,
            trim_entry_chars: config.retrieval.trim_entry_chars,
            mention_policy: config.retrieval.mention_policy,
        }
    }
}

/// One generation call, as reported in debug output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationAttempt {
    pub attempt_number: usize,
    pub context_entries: usize,
    pub context_chars: usize,
    pub prompt_chars: usize,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    pub answer: String,
    /// Context of the final attempt.
    pub selection: ContextSelection,
    /// Mention check of the final attempt.
    pub mentions: MentionResult,
    pub attempts: Vec<GenerationAttempt>,
    pub trimmed: bool,
    pub fallback_used: bool,
    pub rewrite_applied: bool,
    /// An answer was given although no source mentions the query.
    pub unverified_claim: bool,
}

#[derive(Debug, Clone)]
pub struct GenerationFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub selection: ContextSelection,
    pub attempts: Vec<GenerationAttempt>,
    pub trimmed: bool,
}

struct CallFailure {
    kind: ErrorKind,
    message: String,
}

/// A single time-boxed call. Blank output is a failure.
async fn call_once(
    provider: &dyn GenerationProvider,
    prompt: &str,
    timeout: Duration,
) -> Result<String, CallFailure> {
    match tokio::time::timeout(timeout, provider.generate(prompt)).await {
        Err(_) => Err(CallFailure {
            kind: ErrorKind::Timeout,
            message: format!("generation timed out after {}ms", timeout.as_millis()),
        }),
        Ok(Err(e)) => {
            let message = format!("{:#}", e);
            Err(CallFailure {
                kind: classify_error(&message),
                message,
            })
        }
        Ok(Ok(text)) => {
            let text = text.trim();
            if text.is_empty() {
                Err(CallFailure {
                    kind: ErrorKind::EmptyAnswer,
                    message: "empty answer from model".to_string(),
                })
            } else {
                Ok(text.to_string())
            }
        }
    }
}

/// Run the generation state machine over `selection`.
pub async fn generate_answer(
    provider: &dyn GenerationProvider,
    settings: &AnswerSettings,
    query: &str,
    selection: ContextSelection,
) -> Result<AnswerOutcome, GenerationFailure> {
    let max_attempts = settings.max_attempts.max(1);
    let mut selection = selection;
    let mut attempts: Vec<GenerationAttempt> = Vec::new();
    let mut trimmed = false;

    loop {
        let attempt_number = attempts.len() + 1;
        let mentions = detect_mentions(query, &selection, settings.mention_policy);
        let prompt = render_prompt(
            &settings.template,
            query,
            &selection,
            &mentions,
            &settings.fallback,
        );

        let started = Instant::now();
        let result = call_once(provider, &prompt, settings.timeout).await;
        let mut attempt = GenerationAttempt {
            attempt_number,
            context_entries: selection.len(),
            context_chars: selection.char_count,
            prompt_chars: prompt.chars().count(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            error_kind: None,
            error: None,
        };

        match result {
            Ok(answer) => {
                attempts.push(attempt);
                let (answer, rewrite_applied) =
                    correct_false_absence(provider, settings, query, &selection, &mentions, answer)
                        .await;
                let unverified_claim = mentions.absence_flag == AbsenceFlag::Yes
                    && !claims_absence(&answer, &settings.fallback);
                if unverified_claim {
                    tracing::warn!(
                        terms = ?mentions.terms,
                        "answer given although no source mentions the query terms"
                    );
                }
                tracing::info!(attempt = attempt_number, trimmed, rewrite_applied, "answer generated");
                return Ok(AnswerOutcome {
                    answer,
                    selection,
                    mentions,
                    attempts,
                    trimmed,
                    fallback_used: false,
                    rewrite_applied,
                    unverified_claim,
                });
            }
            Err(failure) => {
                tracing::warn!(
                    attempt = attempt_number,
                    kind = %failure.kind,
                    error = %failure.message,
                    context_entries = selection.len(),
                    "generation attempt failed"
                );
                attempt.error_kind = Some(failure.kind);
                attempt.error = Some(failure.message.clone());
                attempts.push(attempt);

                if attempt_number < max_attempts && failure.kind.is_retriable() {
                    let before = selection.len();
                    selection = trim_selection(
                        &selection,
                        settings.min_trim_entries,
                        settings.trim_entry_chars,
                    );
                    trimmed = true;
                    tracing::info!(
                        from = before,
                        to = selection.len(),
                        "trimmed context for retry"
                    );
                    continue;
                }

                if mentions.absence_flag == AbsenceFlag::Yes {
                    tracing::warn!(
                        kind = %failure.kind,
                        "no answer produced and query terms absent; using fallback answer"
                    );
                    return Ok(AnswerOutcome {
                        answer: settings.fallback.clone(),
                        selection,
                        mentions,
                        attempts,
                        trimmed,
                        fallback_used: true,
                        rewrite_applied: false,
                        unverified_claim: false,
                    });
                }

                return Err(GenerationFailure {
                    kind: failure.kind,
                    message: failure.message,
                    selection,
                    attempts,
                    trimmed,
                });
            }
        }
    }
}

/// One corrective rewrite when the answer denies information the context
/// verifiably holds. Returns the answer to use and whether it was rewritten.
async fn correct_false_absence(
    provider: &dyn GenerationProvider,
    settings: &AnswerSettings,
    query: &str,
    selection: &ContextSelection,
    mentions: &MentionResult,
    answer: String,
) -> (String, bool) {
    if mentions.absence_flag != AbsenceFlag::No || !claims_absence(&answer, &settings.fallback) {
        return (answer, false);
    }

    tracing::info!(
        mentioned = ?mentions.mentioned_indices,
        "answer claims absence but sources mention the query; requesting rewrite"
    );
    let prompt = rewrite_prompt(query, selection, mentions, &answer);
    match call_once(provider, &prompt, settings.timeout).await {
        Ok(rewritten) => (rewritten, true),
        Err(failure) => {
            tracing::warn!(
                kind = %failure.kind,
                error = %failure.message,
                "rewrite failed; keeping original answer"
            );
            (answer, false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use status_rag_core::context::select_context;
    use status_rag_core::models::CorpusEntry;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const FALLBACK: &str = "The provided updates do not contain information about this.";

    enum Step {
        Answer(&'static str),
        Fail(&'static str),
        Hang,
    }

    struct Scripted {
        steps: Mutex<VecDeque<Step>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: Mutex::new(steps.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerationProvider for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Answer(text)) => Ok(text.to_string()),
                Some(Step::Fail(msg)) => Err(anyhow::anyhow!(msg)),
                Some(Step::Hang) => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok("too late".to_string())
                }
                None => Err(anyhow::anyhow!("script exhausted")),
            }
        }
    }

    fn settings(max_attempts: usize) -> AnswerSettings {
        AnswerSettings {
            template: "Question: {{QUERY}}\n{{CONTEXT}}".to_string(),
            fallback: FALLBACK.to_string(),
            timeout: Duration::from_millis(50),
            max_attempts,
            min_trim_entries: 8,
            trim_entry_chars: 1200,
            mention_policy: MentionPolicy::All,
        }
    }

    fn scenario() -> ContextSelection {
        let entries: Vec<CorpusEntry> = [
            ("A", "budget shortfall in Q2"),
            ("B", "shipped v2 release"),
            ("C", "no update"),
        ]
        .iter()
        .enumerate()
        .map(|(i, (p, t))| CorpusEntry {
            id: format!("upd-{}", i),
            project: p.to_string(),
            date: "2024-05-01".to_string(),
            text: t.to_string(),
        })
        .collect();
        select_context(&entries, 60, 45_000)
    }

    fn large(n: usize) -> ContextSelection {
        let entries: Vec<CorpusEntry> = (0..n)
            .map(|i| CorpusEntry {
                id: format!("upd-{}", i),
                project: format!("P{}", i),
                date: "2024-05-01".to_string(),
                text: format!("budget line {} {}", i, "x".repeat(2000)),
            })
            .collect();
        select_context(&entries, 60, usize::MAX)
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let gen = Scripted::new(vec![Step::Answer("  A reports a budget shortfall [1].  ")]);
        let out = generate_answer(&gen, &settings(2), "budget shortfall", scenario())
            .await
            .unwrap();
        assert_eq!(out.answer, "A reports a budget shortfall [1].");
        assert_eq!(out.attempts.len(), 1);
        assert!(!out.trimmed && !out.fallback_used && !out.rewrite_applied);
        assert_eq!(out.mentions.mentioned_indices, vec![1]);
        assert!(gen.prompts()[0].contains("ABSENCE_FLAG: NO"));
    }

    #[tokio::test]
    async fn test_timeout_then_trimmed_retry() {
        let gen = Scripted::new(vec![Step::Hang, Step::Answer("Budget lines [1].")]);
        let out = generate_answer(&gen, &settings(2), "budget", large(40))
            .await
            .unwrap();
        assert!(out.trimmed);
        assert_eq!(out.attempts.len(), 2);
        assert_eq!(out.attempts[0].error_kind, Some(ErrorKind::Timeout));
        assert_eq!(out.attempts[0].context_entries, 40);
        assert_eq!(out.attempts[1].context_entries, 20);
        assert!(out.attempts[1].context_chars < out.attempts[0].context_chars);
        assert!(out.selection.entries.iter().all(|e| e.text.chars().count() <= 1200));
    }

    #[tokio::test]
    async fn test_trim_respects_floor() {
        let gen = Scripted::new(vec![
            Step::Fail("OpenAI API error 400 Bad Request: context_length_exceeded"),
            Step::Answer("Budget [1]."),
        ]);
        let out = generate_answer(&gen, &settings(2), "budget", large(10))
            .await
            .unwrap();
        assert_eq!(out.attempts[0].error_kind, Some(ErrorKind::InvalidRequest));
        assert_eq!(out.attempts[1].context_entries, 8);
    }

    #[tokio::test]
    async fn test_non_retriable_failure_is_terminal() {
        let gen = Scripted::new(vec![
            Step::Fail("OpenAI API error 429 Too Many Requests: slow down"),
            Step::Answer("never used"),
        ]);
        let failure = generate_answer(&gen, &settings(2), "budget shortfall", scenario())
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::RateLimit);
        assert_eq!(failure.attempts.len(), 1);
        assert!(!failure.trimmed);
        assert_eq!(gen.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let gen = Scripted::new(vec![Step::Hang, Step::Hang, Step::Hang]);
        let failure = generate_answer(&gen, &settings(2), "budget shortfall", scenario())
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::Timeout);
        assert_eq!(failure.attempts.len(), 2);
        assert!(failure.trimmed);
    }

    #[tokio::test]
    async fn test_single_attempt_never_trims() {
        let gen = Scripted::new(vec![Step::Hang]);
        let failure = generate_answer(&gen, &settings(1), "budget shortfall", scenario())
            .await
            .unwrap_err();
        assert_eq!(failure.attempts.len(), 1);
        assert!(!failure.trimmed);
    }

    #[tokio::test]
    async fn test_blank_answer_is_empty_answer_failure() {
        let gen = Scripted::new(vec![Step::Answer("   ")]);
        let failure = generate_answer(&gen, &settings(2), "budget shortfall", scenario())
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::EmptyAnswer);
    }

    #[tokio::test]
    async fn test_false_absence_claim_is_rewritten() {
        let gen = Scripted::new(vec![
            Step::Answer("No updates mention a budget shortfall."),
            Step::Answer("A reports a budget shortfall in Q2 [1]."),
        ]);
        let out = generate_answer(&gen, &settings(2), "budget shortfall", scenario())
            .await
            .unwrap();
        assert!(out.rewrite_applied);
        assert_eq!(out.answer, "A reports a budget shortfall in Q2 [1].");
        assert_eq!(out.attempts.len(), 1);
        let prompts = gen.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("Previous answer:\nNo updates mention a budget shortfall."));
    }

    #[tokio::test]
    async fn test_empty_rewrite_keeps_original() {
        let gen = Scripted::new(vec![Step::Answer(FALLBACK), Step::Answer("")]);
        let out = generate_answer(&gen, &settings(2), "budget shortfall", scenario())
            .await
            .unwrap();
        assert!(!out.rewrite_applied);
        assert_eq!(out.answer, FALLBACK);
    }

    #[tokio::test]
    async fn test_absent_terms_fall_back_on_failure() {
        let gen = Scripted::new(vec![Step::Fail("OpenAI API error 401 Unauthorized: bad key")]);
        let out = generate_answer(&gen, &settings(2), "xylophone", scenario())
            .await
            .unwrap();
        assert!(out.fallback_used);
        assert_eq!(out.answer, FALLBACK);
        assert_eq!(out.mentions.absence_flag, AbsenceFlag::Yes);
    }

    #[tokio::test]
    async fn test_absent_terms_with_claimed_answer_is_flagged() {
        let gen = Scripted::new(vec![Step::Answer("The xylophone program shipped [2].")]);
        let out = generate_answer(&gen, &settings(2), "xylophone", scenario())
            .await
            .unwrap();
        assert!(out.unverified_claim);
        assert!(!out.rewrite_applied);
        assert!(gen.prompts()[0].contains("ABSENCE_FLAG: YES"));
    }

    #[tokio::test]
    async fn test_absent_terms_with_fallback_answer_not_flagged() {
        let gen = Scripted::new(vec![Step::Answer(FALLBACK)]);
        let out = generate_answer(&gen, &settings(2), "xylophone", scenario())
            .await
            .unwrap();
        assert!(!out.unverified_claim);
        assert!(!out.fallback_used);
        assert_eq!(gen.prompts().len(), 1);
    }
}
