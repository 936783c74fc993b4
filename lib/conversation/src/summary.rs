//! Rolling conversation summaries.
//!
//! A summarizing session keeps its history under a token budget by folding
//! the oldest messages into a single leading system message. The latest
//! exchange is never folded, so the model always sees it verbatim.

use parley_ai::{ModelHandle, ProviderError};
use parley_core::{Message, MessageRole};
use rootcause::Report;
use tracing::{debug, instrument, warn};

const SUMMARY_SYSTEM_PROMPT: &str = r#"Summarize the conversation segment you are given concisely. Preserve:
1. Facts the user stated about themselves
2. Key decisions and conclusions
3. The user's current goals and any unresolved questions

If an earlier summary is provided, merge it with the new segment into one summary.
Write in third person (e.g., "The user said their name is...")."#;

/// Number of trailing messages that are never folded into the summary.
const LATEST_EXCHANGE: usize = 2;

/// Estimates the token cost of `messages`.
///
/// Four characters per token, plus a fixed per-message overhead for the
/// role framing.
#[must_use]
pub fn estimate_tokens(messages: &[Message]) -> usize {
    messages
        .iter()
        .map(|m| m.content.chars().count().div_ceil(4) + 4)
        .sum()
}

/// Produces summaries with a model.
#[derive(Debug, Clone)]
pub struct Summarizer {
    model: ModelHandle,
}

impl Summarizer {
    /// Creates a summarizer backed by `model`.
    #[must_use]
    pub fn new(model: ModelHandle) -> Self {
        Self { model }
    }

    /// Returns the model used for summaries.
    #[must_use]
    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    /// Summarizes `run`, merging in `previous` when there is one.
    ///
    /// # Errors
    ///
    /// Returns an error if the model call fails.
    #[instrument(
        name = "summarize_history",
        skip(self, previous, run),
        fields(model_id = %self.model.model_id(), message_count = run.len())
    )]
    pub async fn summarize(
        &self,
        previous: Option<&str>,
        run: &[Message],
    ) -> Result<String, Report<ProviderError>> {
        let transcript = run
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut prompt = String::new();
        if let Some(previous) = previous {
            prompt.push_str(&format!("<summary>\n{previous}\n</summary>\n\n"));
        }
        prompt.push_str(&format!(
            "Please summarize this conversation:\n\n<conversation>\n{transcript}\n</conversation>"
        ));

        let turn = self
            .model
            .complete(
                vec![Message::system(SUMMARY_SYSTEM_PROMPT), Message::user(prompt)],
                None,
            )
            .await?;
        Ok(turn.text.trim().to_string())
    }
}

/// Folds the oldest messages into the leading summary until `messages`
/// fits in `budget` tokens.
///
/// Each pass takes the shortest run of oldest non-summary messages whose
/// cost covers the overflow and replaces it, together with the previous
/// summary, by a new summary. If the model fails, the run is dropped and
/// the previous summary kept. Compaction stops once only the summary and
/// the latest exchange remain, even if that is still over budget.
pub async fn compact(
    mut messages: Vec<Message>,
    summarizer: &Summarizer,
    budget: usize,
) -> Vec<Message> {
    loop {
        let total = estimate_tokens(&messages);
        if total <= budget {
            break;
        }

        let has_summary = messages
            .first()
            .is_some_and(|m| m.role == MessageRole::System);
        let body_start = usize::from(has_summary);
        let body_end = messages.len().saturating_sub(LATEST_EXCHANGE);
        if body_start >= body_end {
            break;
        }

        let overflow = total - budget;
        let mut run_end = body_start;
        let mut covered = 0;
        while run_end < body_end && covered < overflow {
            covered += estimate_tokens(std::slice::from_ref(&messages[run_end]));
            run_end += 1;
        }

        let previous = has_summary.then(|| messages[0].content.clone());
        match summarizer
            .summarize(previous.as_deref(), &messages[body_start..run_end])
            .await
        {
            Ok(summary) => {
                debug!(
                    folded = run_end - body_start,
                    total, budget, "folded history into summary"
                );
                messages.splice(0..run_end, [Message::system(summary)]);
            }
            Err(e) => {
                warn!(
                    error = %e.current_context(),
                    dropped = run_end - body_start,
                    "summarization failed, dropping oldest messages"
                );
                messages.drain(body_start..run_end);
            }
        }
    }
    messages
}
