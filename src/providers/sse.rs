//! Parser for streamed completion responses
//!
//! The endpoint answers a streaming request with a line-oriented event
//! stream. Lines of the form `data: {json}` carry an incremental content
//! delta at `choices[0].delta.content`; a line containing `[DONE]` marks the
//! end of the stream.

use crate::error::{ReaderError, Result};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;

const DONE_MARKER: &str = "[DONE]";

/// Outcome of processing one line
#[derive(Debug, PartialEq)]
enum LineEvent {
    Delta(String),
    Done,
    Skip,
}

/// Forward content deltas from a raw response body to `delta_tx`
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across chunks are decoded intact. A trailing line
/// without a newline is processed once the body ends. Malformed JSON is
/// skipped. A transport error is forwarded and ends parsing.
///
/// There is no limit on the total length of a reply. Only a gap between
/// chunks longer than `idle_timeout` fails the stream, with
/// [`ReaderError::StreamStalled`].
///
/// Returns early once the receiver has been dropped.
///
/// # Arguments
///
/// * `byte_stream` - The raw HTTP response body as a stream of byte chunks
/// * `delta_tx` - Channel receiving each non-empty content delta
/// * `idle_timeout` - Longest wait allowed for the next chunk
pub async fn parse_completion_stream<E>(
    byte_stream: impl Stream<Item = std::result::Result<Bytes, E>>,
    delta_tx: mpsc::UnboundedSender<Result<String>>,
    idle_timeout: Duration,
) where
    E: std::error::Error + Send + Sync + 'static,
{
    let mut buffer: Vec<u8> = Vec::new();

    tokio::pin!(byte_stream);

    loop {
        let chunk_result = match tokio::time::timeout(idle_timeout, byte_stream.next()).await {
            Ok(Some(result)) => result,
            Ok(None) => break,
            Err(_) => {
                tracing::warn!(
                    "Completion stream idle for {}s, giving up",
                    idle_timeout.as_secs()
                );
                let _ = delta_tx.send(Err(
                    ReaderError::StreamStalled(idle_timeout.as_secs()).into()
                ));
                return;
            }
        };
        let chunk = match chunk_result {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!("Completion stream interrupted: {}", e);
                let _ = delta_tx.send(Err(anyhow::Error::from(e)));
                return;
            }
        };

        buffer.extend_from_slice(&chunk);

        while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=pos).collect();
            match process_line(&String::from_utf8_lossy(&line)) {
                LineEvent::Delta(delta) => {
                    if delta_tx.send(Ok(delta)).is_err() {
                        return;
                    }
                }
                LineEvent::Done => return,
                LineEvent::Skip => {}
            }
        }
    }

    if !buffer.is_empty() {
        if let LineEvent::Delta(delta) = process_line(&String::from_utf8_lossy(&buffer)) {
            let _ = delta_tx.send(Ok(delta));
        }
    }
}

fn process_line(raw: &str) -> LineEvent {
    let line = raw.trim();
    if line.is_empty() {
        return LineEvent::Skip;
    }
    if line.contains(DONE_MARKER) {
        return LineEvent::Done;
    }

    let Some(payload) = line.strip_prefix("data:") else {
        return LineEvent::Skip;
    };

    let value: serde_json::Value = match serde_json::from_str(payload.trim()) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("Skipping malformed stream fragment: {}", e);
            return LineEvent::Skip;
        }
    };

    match value["choices"][0]["delta"]["content"].as_str() {
        Some(content) if !content.is_empty() => LineEvent::Delta(content.to_string()),
        _ => LineEvent::Skip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&str]) -> impl Stream<Item = std::result::Result<Bytes, std::io::Error>> {
        let owned: Vec<_> = parts
            .iter()
            .map(|p| Ok(Bytes::from(p.as_bytes().to_vec())))
            .collect();
        futures::stream::iter(owned)
    }

    async fn collect(
        stream: impl Stream<Item = std::result::Result<Bytes, std::io::Error>>,
    ) -> Vec<String> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        parse_completion_stream(stream, tx, Duration::from_secs(5)).await;
        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            out.push(item.unwrap());
        }
        out
    }

    fn delta(content: &str) -> String {
        format!(
            "data: {}\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    #[test]
    fn test_process_line_variants() {
        assert_eq!(process_line(""), LineEvent::Skip);
        assert_eq!(process_line("data: [DONE]"), LineEvent::Done);
        assert_eq!(process_line(": keep-alive"), LineEvent::Skip);
        assert_eq!(process_line("data: {broken"), LineEvent::Skip);
        assert_eq!(
            process_line(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#),
            LineEvent::Delta("Hi".into())
        );
        assert_eq!(
            process_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            LineEvent::Skip
        );
    }

    #[tokio::test]
    async fn test_deltas_in_order() {
        let body = format!("{}{}data: [DONE]\n", delta("Hel"), delta("lo"));
        assert_eq!(collect(chunks(&[&body])).await, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_line_split_across_chunks() {
        let line = delta("你好");
        let bytes = line.as_bytes();
        // Split inside the multi-byte character.
        let split = line.find('你').unwrap() + 1;
        let first = Bytes::from(bytes[..split].to_vec());
        let second = Bytes::from(bytes[split..].to_vec());
        let stream = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(first),
            Ok(second),
        ]);
        assert_eq!(collect(stream).await, vec!["你好"]);
    }

    #[tokio::test]
    async fn test_malformed_fragment_is_skipped() {
        let body = format!("{}data: {{nope\n{}", delta("a"), delta("b"));
        assert_eq!(collect(chunks(&[&body])).await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_done_ends_stream() {
        let body = format!("{}data: [DONE]\n{}", delta("a"), delta("ignored"));
        assert_eq!(collect(chunks(&[&body])).await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_trailing_line_without_newline() {
        let body = delta("tail");
        let trimmed = body.trim_end();
        assert_eq!(collect(chunks(&[trimmed])).await, vec!["tail"]);
    }

    #[tokio::test]
    async fn test_transport_error_is_forwarded() {
        let stream = futures::stream::iter(vec![
            Ok(Bytes::from(delta("x"))),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        parse_completion_stream(stream, tx, Duration::from_secs(5)).await;
        assert_eq!(rx.recv().await.unwrap().unwrap(), "x");
        assert!(rx.recv().await.unwrap().is_err());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_slow_chunks_within_idle_timeout_complete() {
        let parts = vec![delta("a"), delta("b"), delta("c"), "data: [DONE]\n".to_string()];
        let stream = futures::stream::iter(parts).then(|part| async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            Ok::<_, std::io::Error>(Bytes::from(part))
        });

        // Total duration is well past the idle timeout, every gap is below it.
        let (tx, mut rx) = mpsc::unbounded_channel();
        parse_completion_stream(stream, tx, Duration::from_millis(150)).await;

        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            out.push(item.unwrap());
        }
        assert_eq!(out, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_stalled_stream_reports_error_after_partial_text() {
        let first = futures::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from(delta("x")))]);
        let stream = first.chain(futures::stream::pending());

        let (tx, mut rx) = mpsc::unbounded_channel();
        parse_completion_stream(stream, tx, Duration::from_millis(50)).await;

        assert_eq!(rx.recv().await.unwrap().unwrap(), "x");
        let err = rx.recv().await.unwrap().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReaderError>(),
            Some(ReaderError::StreamStalled(_))
        ));
        assert!(rx.recv().await.is_none());
    }
}
