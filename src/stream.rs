//! Incremental consumption of chunked text responses.
//!
//! The consumer reads a [`ChunkSource`] to exhaustion, decoding UTF-8
//! incrementally: bytes that end mid-character are buffered until the rest of
//! the sequence arrives, so chunk boundaries can never corrupt output. After
//! every chunk the callback receives the full accumulated text (not a delta),
//! which lets the caller perform an idempotent replace of the target message
//! content.

use crate::api::ChunkSource;
use tracing::debug;

/// Marker appended to partial content when the reader fails mid-stream.
pub const STREAM_INTERRUPTED_MARKER: &str = "[stream interrupted]";

/// Terminal outcome of one consume run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    /// Final accumulated text; includes the interruption marker when the read
    /// failed partway.
    pub text: String,
    /// True when the source errored before exhaustion.
    pub interrupted: bool,
}

/// Read `source` to exhaustion, invoking `on_text` with the full accumulated
/// text after every chunk that grows it.
///
/// Exactly one terminal outcome is produced per invocation and no callback
/// fires after it. Accumulated length is monotonically non-decreasing.
pub async fn consume(
    source: &mut dyn ChunkSource,
    mut on_text: impl FnMut(&str),
) -> StreamOutcome {
    let mut acc = Utf8Accumulator::default();
    loop {
        match source.next_chunk().await {
            Ok(Some(chunk)) => {
                if acc.push(&chunk) {
                    on_text(acc.text());
                }
            }
            Ok(None) => {
                if acc.finish() {
                    on_text(acc.text());
                }
                return StreamOutcome {
                    text: acc.into_text(),
                    interrupted: false,
                };
            }
            Err(err) => {
                debug!(error = %err, "stream read failed; keeping partial content");
                let mut text = acc.into_text();
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(STREAM_INTERRUPTED_MARKER);
                return StreamOutcome {
                    text,
                    interrupted: true,
                };
            }
        }
    }
}

/// Grow-only text accumulator that tolerates chunk boundaries inside
/// multi-byte UTF-8 sequences.
#[derive(Debug, Default)]
struct Utf8Accumulator {
    text: String,
    /// Undecodable tail bytes carried over to the next chunk.
    pending: Vec<u8>,
}

impl Utf8Accumulator {
    /// Append raw bytes; returns true when decodable text was added.
    fn push(&mut self, chunk: &[u8]) -> bool {
        self.pending.extend_from_slice(chunk);
        let before = self.text.len();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    self.pending.clear();
                    break;
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    if valid_up_to > 0 {
                        // Safe: from_utf8 validated this prefix.
                        let valid = std::str::from_utf8(&self.pending[..valid_up_to])
                            .unwrap_or_default();
                        self.text.push_str(valid);
                    }
                    match err.error_len() {
                        // Genuinely invalid sequence: substitute and move on.
                        Some(invalid_len) => {
                            self.text.push('\u{FFFD}');
                            self.pending.drain(..valid_up_to + invalid_len);
                        }
                        // Incomplete tail: keep it buffered for the next chunk.
                        None => {
                            self.pending.drain(..valid_up_to);
                            break;
                        }
                    }
                }
            }
        }
        self.text.len() > before
    }

    /// Flush an incomplete tail at end-of-stream; returns true if text grew.
    fn finish(&mut self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        self.pending.clear();
        self.text.push('\u{FFFD}');
        true
    }

    fn text(&self) -> &str {
        &self.text
    }

    fn into_text(self) -> String {
        self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::ScriptedChunkSource;

    /// Feed `text` split into `chunk_len`-byte chunks and return the outcome
    /// plus every callback observation.
    async fn consume_split(text: &str, chunk_len: usize) -> (StreamOutcome, Vec<String>) {
        let bytes = text.as_bytes();
        let chunks: Vec<Vec<u8>> = bytes.chunks(chunk_len.max(1)).map(<[u8]>::to_vec).collect();
        let mut source = ScriptedChunkSource::from_chunks(chunks);
        let mut seen = Vec::new();
        let outcome = consume(&mut source, |text| seen.push(text.to_string())).await;
        (outcome, seen)
    }

    #[tokio::test]
    async fn single_chunk_round_trips() {
        let (outcome, seen) = consume_split("Hi there!", 64).await;
        assert_eq!(outcome.text, "Hi there!");
        assert!(!outcome.interrupted);
        assert_eq!(seen.last().map(String::as_str), Some("Hi there!"));
    }

    #[tokio::test]
    async fn accumulation_is_invariant_under_chunk_boundaries() {
        // Multi-byte characters land on every possible split point.
        let text = "h\u{e9}llo w\u{f6}rld \u{1f389} fin";
        let whole = consume_split(text, text.len()).await.0;
        for chunk_len in 1..=text.len() {
            let split = consume_split(text, chunk_len).await.0;
            assert_eq!(split, whole, "chunk_len={chunk_len}");
        }
    }

    #[tokio::test]
    async fn callbacks_receive_monotonically_growing_full_text() {
        let (_, seen) = consume_split("stream me please", 3).await;
        assert!(!seen.is_empty());
        for window in seen.windows(2) {
            assert!(window[1].len() >= window[0].len());
            assert!(window[1].starts_with(window[0].as_str()));
        }
    }

    #[tokio::test]
    async fn read_error_keeps_partial_content_with_marker() {
        let mut source =
            ScriptedChunkSource::from_chunks(vec![b"partial answer".to_vec()]).then_error();
        let mut seen = Vec::new();
        let outcome = consume(&mut source, |text| seen.push(text.to_string())).await;
        assert!(outcome.interrupted);
        assert_eq!(
            outcome.text,
            format!("partial answer\n{STREAM_INTERRUPTED_MARKER}")
        );
        // No callback fires after the terminal outcome.
        assert_eq!(seen, vec!["partial answer".to_string()]);
    }

    #[tokio::test]
    async fn immediate_error_yields_bare_marker() {
        let mut source = ScriptedChunkSource::from_chunks(Vec::new()).then_error();
        let outcome = consume(&mut source, |_| {}).await;
        assert!(outcome.interrupted);
        assert_eq!(outcome.text, STREAM_INTERRUPTED_MARKER);
    }

    #[tokio::test]
    async fn empty_stream_completes_with_empty_text() {
        let mut source = ScriptedChunkSource::from_chunks(Vec::new());
        let mut calls = 0usize;
        let outcome = consume(&mut source, |_| calls += 1).await;
        assert_eq!(outcome.text, "");
        assert!(!outcome.interrupted);
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn truncated_multibyte_tail_is_substituted_at_eof() {
        // First two bytes of a three-byte sequence, then EOF.
        let mut source = ScriptedChunkSource::from_chunks(vec![vec![0xE2, 0x82]]);
        let outcome = consume(&mut source, |_| {}).await;
        assert_eq!(outcome.text, "\u{FFFD}");
    }

    #[tokio::test]
    async fn invalid_bytes_are_replaced_not_fatal() {
        let mut source =
            ScriptedChunkSource::from_chunks(vec![vec![b'o', b'k', 0xFF, b'!', b'\n']]);
        let outcome = consume(&mut source, |_| {}).await;
        assert_eq!(outcome.text, "ok\u{FFFD}!\n");
        assert!(!outcome.interrupted);
    }

    #[cfg(feature = "fuzz-tests")]
    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn arbitrary_chunk_boundaries_preserve_content(
                text in "\\PC{0,120}",
                splits in proptest::collection::vec(0usize..256, 0..12)
            ) {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .build()
                    .expect("runtime");
                runtime.block_on(async {
                    let bytes = text.as_bytes().to_vec();
                    // Derive deterministic cut points from the seed values.
                    let mut cuts: Vec<usize> = splits
                        .iter()
                        .map(|s| if bytes.is_empty() { 0 } else { s % bytes.len().max(1) })
                        .collect();
                    cuts.sort_unstable();
                    cuts.dedup();
                    let mut chunks = Vec::new();
                    let mut start = 0usize;
                    for cut in cuts {
                        if cut > start {
                            chunks.push(bytes[start..cut].to_vec());
                            start = cut;
                        }
                    }
                    if start < bytes.len() {
                        chunks.push(bytes[start..].to_vec());
                    }
                    let mut source = ScriptedChunkSource::from_chunks(chunks);
                    let outcome = consume(&mut source, |_| {}).await;
                    assert_eq!(outcome.text, text);
                });
            }
        }
    }
}
