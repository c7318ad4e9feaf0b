//! Token-event extraction from a server-sent event line stream.

use crate::error::Error;
use crate::stats::StatsRecord;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::time::Instant;
use tracing::warn;

const DATA_PREFIX: &[u8] = b"data:";
const DONE_MARKER: &str = "[DONE]";

/// What a single body line turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    /// Not a `data:` line (comment, keep-alive, other SSE field, blank).
    Ignored,
    /// The `[DONE]` sentinel.
    Done,
    /// A token event; `true` if a text delta was extracted.
    Token { delta: bool },
    /// A token event whose payload was not valid UTF-8 JSON.
    Malformed,
}

/// Single-pass parser feeding token events into a [`StatsRecord`].
///
/// `[DONE]` is not a token event. Every other `data:` line is, whether or not it
/// carries text.
#[derive(Debug, Default)]
pub struct StreamParser {
    content: String,
    malformed: u32,
    /// Scratch buffer for JSON parsing to avoid allocations.
    #[cfg(feature = "simd-json")]
    scratch: Vec<u8>,
}

impl StreamParser {
    pub fn new() -> Self {
        Self {
            content: String::with_capacity(4096),
            malformed: 0,
            #[cfg(feature = "simd-json")]
            scratch: Vec::with_capacity(4096),
        }
    }

    /// Drain `lines`, stamping token events into `stats`.
    ///
    /// On clean end of stream sets `response_end_time` and `generated_text`. A body
    /// error stops consumption and is returned; fields recorded so far stay set.
    pub async fn consume<S>(&mut self, lines: S, stats: &mut StatsRecord) -> Result<(), Error>
    where
        S: Stream<Item = Result<Bytes, Error>>,
    {
        let mut lines = std::pin::pin!(lines);
        while let Some(line) = lines.next().await {
            self.feed_line(&line?, stats);
        }
        self.finish(stats);
        Ok(())
    }

    /// Process one line.
    pub fn feed_line(&mut self, line: &[u8], stats: &mut StatsRecord) -> LineOutcome {
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return LineOutcome::Ignored;
        };
        let payload = match std::str::from_utf8(payload) {
            Ok(payload) => payload.trim(),
            Err(e) => {
                stats.record_token(Instant::now());
                self.malformed += 1;
                warn!(error = %e, "stream payload is not valid UTF-8");
                return LineOutcome::Malformed;
            }
        };
        if payload == DONE_MARKER {
            return LineOutcome::Done;
        }

        stats.record_token(Instant::now());

        if payload.is_empty() {
            return LineOutcome::Token { delta: false };
        }
        match self.parse_delta(payload) {
            Ok(Some(text)) => {
                self.content.push_str(&text);
                LineOutcome::Token { delta: true }
            }
            Ok(None) => LineOutcome::Token { delta: false },
            Err(e) => {
                self.malformed += 1;
                warn!(error = %e, line = payload, "failed to parse stream payload");
                LineOutcome::Malformed
            }
        }
    }

    /// Mark the stream drained.
    pub fn finish(&mut self, stats: &mut StatsRecord) {
        stats.generated_text = Some(std::mem::take(&mut self.content));
        stats.response_end_time = Some(Instant::now());
    }

    /// Lines skipped because their payload was not valid UTF-8 JSON.
    pub fn malformed_lines(&self) -> u32 {
        self.malformed
    }

    /// Text accumulated so far.
    pub fn current_content(&self) -> &str {
        &self.content
    }

    fn parse_delta(&mut self, payload: &str) -> Result<Option<String>, Error> {
        #[cfg(feature = "simd-json")]
        let chunk: ChatChunk = {
            self.scratch.clear();
            self.scratch.extend_from_slice(payload.as_bytes());
            simd_json::from_slice(&mut self.scratch).map_err(|e| Error::parse(e.to_string()))?
        };

        #[cfg(not(feature = "simd-json"))]
        let chunk: ChatChunk =
            serde_json::from_str(payload).map_err(|e| Error::parse(e.to_string()))?;

        Ok(chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content))
    }
}

// --- Serde types for the chat-completions chunk shape ---

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&'static str]) -> impl Stream<Item = Result<Bytes, Error>> {
        futures::stream::iter(
            raw.iter()
                .copied()
                .map(|l| Ok(Bytes::from_static(l.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    async fn parse(raw: &[&'static str]) -> StatsRecord {
        let mut stats = StatsRecord::new();
        StreamParser::new()
            .consume(lines(raw), &mut stats)
            .await
            .unwrap();
        stats
    }

    #[tokio::test]
    async fn test_text_accumulation() {
        let stats = parse(&[
            r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":" world"}}]}"#,
            "data: [DONE]",
        ])
        .await;

        assert_eq!(stats.generated_text.as_deref(), Some("Hello world"));
        assert_eq!(stats.generated_tokens, Some(2));
        assert!(stats.first_token_time.unwrap() <= stats.response_end_time.unwrap());
    }

    #[tokio::test]
    async fn test_malformed_json_skipped() {
        let stats = parse(&[
            "data: {not json}",
            r#"data: {"choices":[{"delta":{"content":"x"}}]}"#,
        ])
        .await;

        assert_eq!(stats.generated_text.as_deref(), Some("x"));
        assert_eq!(stats.generated_tokens, Some(2));
    }

    #[test]
    fn test_invalid_utf8_skipped() {
        let mut parser = StreamParser::new();
        let mut stats = StatsRecord::new();

        let outcome = parser.feed_line(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"a\xff\"}}]}",
            &mut stats,
        );
        parser.finish(&mut stats);

        assert_eq!(outcome, LineOutcome::Malformed);
        assert_eq!(parser.malformed_lines(), 1);
        assert_eq!(stats.generated_tokens, Some(1));
        assert_eq!(stats.generated_text.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_only_malformed_lines() {
        let stats = parse(&["data: {", "data: nope"]).await;
        assert_eq!(stats.generated_text.as_deref(), Some(""));
        assert_eq!(stats.generated_tokens, Some(2));
        assert!(stats.response_end_time.is_some());
    }

    #[tokio::test]
    async fn test_no_token_events() {
        let stats = parse(&[": keep-alive", "", "event: ping"]).await;
        assert!(stats.generated_tokens.is_none());
        assert!(stats.first_token_time.is_none());
        assert_eq!(stats.generated_text.as_deref(), Some(""));
        assert!(stats.response_end_time.is_some());
    }

    #[tokio::test]
    async fn test_empty_delta_still_counts() {
        let stats = parse(&[
            r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":""}}]}"#,
            r#"data: {"choices":[],"usage":{"completion_tokens":1}}"#,
            "data:",
        ])
        .await;
        assert_eq!(stats.generated_tokens, Some(4));
        assert_eq!(stats.generated_text.as_deref(), Some(""));
    }

    #[test]
    fn test_line_outcomes() {
        let mut parser = StreamParser::new();
        let mut stats = StatsRecord::new();

        assert_eq!(parser.feed_line(b": comment", &mut stats), LineOutcome::Ignored);
        assert_eq!(parser.feed_line(b"data: [DONE]", &mut stats), LineOutcome::Done);
        assert!(stats.generated_tokens.is_none());

        assert_eq!(
            parser.feed_line(br#"data:{"choices":[{"delta":{"content":"a"}}]}"#, &mut stats),
            LineOutcome::Token { delta: true }
        );
        assert_eq!(parser.feed_line(b"data: [1,2", &mut stats), LineOutcome::Malformed);
        assert_eq!(parser.malformed_lines(), 1);
        assert_eq!(parser.current_content(), "a");
        assert_eq!(stats.generated_tokens, Some(2));
    }

    #[tokio::test]
    async fn test_independent_parsers_agree() {
        let raw = [
            r#"data: {"choices":[{"delta":{"content":"one"}}]}"#,
            "data: garbage",
            r#"data: {"choices":[{"delta":{"content":" two"}}]}"#,
            "data: [DONE]",
        ];
        let a = parse(&raw).await;
        let b = parse(&raw).await;
        assert_eq!(a.generated_text, b.generated_text);
        assert_eq!(a.generated_tokens, b.generated_tokens);
    }

    #[tokio::test]
    async fn test_body_error_keeps_partial_stats() {
        let body = futures::stream::iter(vec![
            Ok(Bytes::from_static(br#"data: {"choices":[{"delta":{"content":"a"}}]}"#)),
            Err(Error::transport("connection reset")),
        ]);
        let mut stats = StatsRecord::new();
        let mut parser = StreamParser::new();

        let result = parser.consume(body, &mut stats).await;

        assert!(matches!(result, Err(Error::Transport(_))));
        assert_eq!(stats.generated_tokens, Some(1));
        assert!(stats.first_token_time.is_some());
        assert!(stats.response_end_time.is_none());
        assert!(stats.generated_text.is_none());
    }
}
