//! Incremental decoding of the provider's SSE response into fragments.
//!
//! SSE format: `data: {"choices":[{"delta":{"content":"hi"}}]}\n\n`, ending
//! with `data: [DONE]`. Lines may be split across network chunks.

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use relaychat_core::{StreamFragment, UpstreamError};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One `data:` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SseData {
    Done,
    Payload(String),
}

/// Line buffer over raw body chunks.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buf: BytesMut,
}

impl SseDecoder {
    pub(crate) fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Terminate a trailing line that arrived without a newline.
    pub(crate) fn finish(&mut self) {
        if !self.buf.is_empty() {
            self.buf.extend_from_slice(b"\n");
        }
    }

    /// Next complete `data:` payload, skipping blank lines, comments and
    /// other fields.
    pub(crate) fn next_data(&mut self) -> Option<SseData> {
        while let Some(line_end) = find_newline(&self.buf) {
            let line = self.buf.split_to(line_end);
            let line = String::from_utf8_lossy(&line);
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with(':') {
                continue;
            }

            if let Some(data) = trimmed.strip_prefix("data:") {
                let data = data.trim();
                if data == "[DONE]" {
                    return Some(SseData::Done);
                }
                return Some(SseData::Payload(data.to_string()));
            }
        }
        None
    }
}

/// Map one JSON chunk to a fragment. `None` means nothing to forward.
///
/// A chunk that is not JSON ends the stream with an error, so a truncated
/// reply is never passed off as complete.
pub(crate) fn parse_chunk(data: &str) -> Option<StreamFragment> {
    let chunk: serde_json::Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(e) => {
            warn!("Unparseable upstream chunk: {e}");
            return Some(StreamFragment::Error(UpstreamError::Stream(format!(
                "Unparseable chunk from provider: {e}"
            ))));
        }
    };

    if let Some(error) = chunk.get("error").filter(|e| !e.is_null()) {
        let message = error
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| error.to_string(), str::to_string);
        return Some(StreamFragment::Error(UpstreamError::Provider(message)));
    }

    let content = chunk["choices"][0]["delta"]["content"].as_str()?;
    if content.is_empty() {
        return None;
    }
    Some(StreamFragment::Content(content.to_string()))
}

/// Drive a response body to completion, sending fragments into `tx`.
///
/// Stops early when the receiver is dropped.
pub(crate) async fn pump<S>(body: S, tx: &mpsc::Sender<StreamFragment>)
where
    S: Stream<Item = Result<Bytes, UpstreamError>> + Send,
{
    let mut body = std::pin::pin!(body);
    let mut decoder = SseDecoder::default();
    let mut exhausted = false;

    loop {
        while let Some(data) = decoder.next_data() {
            let fragment = match data {
                SseData::Done => StreamFragment::Done,
                SseData::Payload(payload) => match parse_chunk(&payload) {
                    Some(fragment) => fragment,
                    None => continue,
                },
            };

            let terminal = fragment.is_terminal();
            if tx.send(fragment).await.is_err() {
                debug!("Fragment receiver dropped, abandoning upstream stream");
                return;
            }
            if terminal {
                return;
            }
        }

        if exhausted {
            let _ = tx.send(StreamFragment::Done).await;
            return;
        }

        match body.next().await {
            Some(Ok(chunk)) => decoder.push(&chunk),
            Some(Err(e)) => {
                warn!("Upstream stream error: {e}");
                let _ = tx.send(StreamFragment::Error(e)).await;
                return;
            }
            None => {
                decoder.finish();
                exhausted = true;
            }
        }
    }
}

/// Position just past the next `\n`.
fn find_newline(buf: &BytesMut) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n').map(|pos| pos + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn chunk(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    async fn collect(parts: Vec<Result<Bytes, UpstreamError>>) -> Vec<StreamFragment> {
        let (tx, mut rx) = mpsc::channel(64);
        pump(stream::iter(parts), &tx).await;
        drop(tx);

        let mut out = Vec::new();
        while let Some(fragment) = rx.recv().await {
            out.push(fragment);
        }
        out
    }

    #[test]
    fn test_decoder_handles_split_lines() {
        let mut decoder = SseDecoder::default();
        decoder.push(b"data: {\"a\"");
        assert_eq!(decoder.next_data(), None);
        decoder.push(b":1}\n\n: keep-alive\n\ndata: [DONE]\n");
        assert_eq!(
            decoder.next_data(),
            Some(SseData::Payload("{\"a\":1}".to_string()))
        );
        assert_eq!(decoder.next_data(), Some(SseData::Done));
        assert_eq!(decoder.next_data(), None);
    }

    #[test]
    fn test_parse_chunk_skips_empty_and_choiceless() {
        assert_eq!(parse_chunk(r#"{"choices":[]}"#), None);
        assert_eq!(parse_chunk(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#), None);
        assert_eq!(parse_chunk(r#"{"choices":[{"delta":{"content":""}}]}"#), None);
        assert_eq!(
            parse_chunk(r#"{"choices":[{"delta":{"content":"hi"}}]}"#),
            Some(StreamFragment::Content("hi".to_string()))
        );
    }

    #[test]
    fn test_parse_chunk_error_payload() {
        let fragment = parse_chunk(r#"{"error":{"message":"content filtered"}}"#);
        assert_eq!(
            fragment,
            Some(StreamFragment::Error(UpstreamError::Provider(
                "content filtered".to_string()
            )))
        );
    }

    #[test]
    fn test_parse_chunk_invalid_json_is_stream_error() {
        let fragment = parse_chunk("{\"choices\": [");
        assert!(matches!(
            fragment,
            Some(StreamFragment::Error(UpstreamError::Stream(ref message)))
                if message.starts_with("Unparseable chunk")
        ));
    }

    #[tokio::test]
    async fn test_pump_stops_at_unparseable_chunk() {
        let body = format!("{}data: not json\n\n{}", chunk("he"), chunk("llo"));
        let fragments = collect(vec![Ok(Bytes::from(body))]).await;
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0], StreamFragment::Content("he".to_string()));
        assert!(matches!(
            fragments[1],
            StreamFragment::Error(UpstreamError::Stream(_))
        ));
    }

    #[tokio::test]
    async fn test_pump_full_stream() {
        let body = format!("{}{}data: [DONE]\n\n", chunk("he"), chunk("llo"));
        let fragments = collect(vec![Ok(Bytes::from(body))]).await;
        assert_eq!(
            fragments,
            vec![
                StreamFragment::Content("he".to_string()),
                StreamFragment::Content("llo".to_string()),
                StreamFragment::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_pump_exhaustion_without_done() {
        let body = chunk("only");
        let trimmed = body.trim_end().to_string();
        let fragments = collect(vec![Ok(Bytes::from(trimmed))]).await;
        assert_eq!(
            fragments,
            vec![
                StreamFragment::Content("only".to_string()),
                StreamFragment::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_pump_mid_stream_error_keeps_earlier_fragments() {
        let fragments = collect(vec![
            Ok(Bytes::from(chunk("partial"))),
            Err(UpstreamError::Stream("connection reset".to_string())),
            Ok(Bytes::from(chunk("never"))),
        ])
        .await;
        assert_eq!(
            fragments,
            vec![
                StreamFragment::Content("partial".to_string()),
                StreamFragment::Error(UpstreamError::Stream("connection reset".to_string())),
            ]
        );
    }
}
