//! Theme summarization over retrieved chunks.

use super::types::QueryHit;
use crate::summarization::{SummarizationClient, SummarizationClientError, SummarizationRequest};

/// Returned instead of a summary when the retrieved text is blank.
pub const NO_CONTENT_MESSAGE: &str = "No valid content found to summarize.";
/// Characters per summarized window, a rough stand-in for the model's input limit.
pub const SUMMARY_WINDOW_CHARS: usize = 1000;
/// Lower word bound requested from the summarizer.
pub const MIN_SUMMARY_LENGTH: usize = 20;
const MIN_TARGET_LENGTH: usize = 30;
const MAX_TARGET_LENGTH: usize = 150;

/// Join hit contents with newlines, in rank order.
pub fn join_contents(hits: &[QueryHit]) -> String {
    hits.iter()
        .map(|hit| hit.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split `text` into consecutive windows of at most `window_chars` characters.
pub fn split_windows(text: &str, window_chars: usize) -> Vec<&str> {
    if window_chars == 0 || text.is_empty() {
        return Vec::new();
    }

    let mut windows = Vec::new();
    let mut start = 0;
    let mut chars = 0;
    for (idx, _) in text.char_indices() {
        if chars == window_chars {
            windows.push(&text[start..idx]);
            start = idx;
            chars = 0;
        }
        chars += 1;
    }
    windows.push(&text[start..]);
    windows
}

/// Summary length target: 70% of the window's word count, clamped to `[30, 150]`.
pub fn summary_length_target(window: &str) -> usize {
    let words = window.split_whitespace().count();
    (words * 7 / 10).clamp(MIN_TARGET_LENGTH, MAX_TARGET_LENGTH)
}

/// Summarize `text` window by window and join the partial summaries with newlines.
///
/// Blank input short-circuits to [`NO_CONTENT_MESSAGE`] without calling the summarizer.
pub async fn summarize_text(
    summarizer: &dyn SummarizationClient,
    text: &str,
) -> Result<String, SummarizationClientError> {
    if text.trim().is_empty() {
        return Ok(NO_CONTENT_MESSAGE.to_string());
    }

    let windows = split_windows(text, SUMMARY_WINDOW_CHARS);
    let mut summaries = Vec::with_capacity(windows.len());
    for (index, window) in windows.iter().enumerate() {
        let max_length = summary_length_target(window);
        tracing::debug!(
            window = index,
            chars = window.chars().count(),
            max_length,
            "Summarizing window"
        );
        let summary = summarizer
            .generate_summary(SummarizationRequest {
                text: (*window).to_string(),
                max_length,
                min_length: MIN_SUMMARY_LENGTH,
            })
            .await?;
        summaries.push(summary);
    }

    Ok(summaries.join("\n"))
}
