//! Newline-delimited response decoding
//!
//! Bulk endpoints (`export/data.json`, `lists/getUsers`) answer with one item
//! per line. Lines are decoded lazily as the body arrives.

use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{IterableError, Result};
use crate::transport::ByteStream;

/// Lazily decoded items of a streamed response
pub type LineStream = BoxStream<'static, Result<Value>>;

/// What to do with a line that is not valid JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinePolicy {
    /// Every line must be JSON; a bad line fails the stream
    Json,
    /// Bad lines become JSON strings (list membership lines are bare emails)
    JsonOrRaw,
}

struct LineReader {
    body: Option<ByteStream>,
    buf: BytesMut,
    bytes_read: u64,
    max_bytes: Option<u64>,
    truncated: bool,
    line_no: u64,
    policy: LinePolicy,
    context: String,
}

impl LineReader {
    /// Next complete line, or the unterminated tail once the body is done
    fn take_line(&mut self) -> Option<Bytes> {
        if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            return Some(self.buf.split_to(pos + 1).freeze());
        }
        if self.body.is_none() && !self.buf.is_empty() {
            let tail = self.buf.split().freeze();
            if self.truncated {
                debug!(
                    context = %self.context,
                    bytes = tail.len(),
                    "dropping partial line after byte cap"
                );
                return None;
            }
            return Some(tail);
        }
        None
    }

    fn push_chunk(&mut self, chunk: Bytes) {
        self.bytes_read += chunk.len() as u64;
        self.buf.extend_from_slice(&chunk);

        if let Some(max) = self.max_bytes
            && self.bytes_read > max
        {
            warn!(
                context = %self.context,
                bytes_read = self.bytes_read,
                max_bytes = max,
                "streamed response exceeded byte cap, closing connection"
            );
            self.body = None;
            self.truncated = true;
        }
    }

    fn decode(&self, line: &[u8]) -> Result<Value> {
        match serde_json::from_slice(line) {
            Ok(value) => Ok(value),
            Err(e) => match self.policy {
                LinePolicy::Json => Err(IterableError::decode(
                    format!("{} line {}", self.context, self.line_no),
                    e,
                )),
                LinePolicy::JsonOrRaw => {
                    Ok(Value::String(String::from_utf8_lossy(line).into_owned()))
                }
            },
        }
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |p| p + 1);
    &line[start..end]
}

/// Split a response body into decoded lines
///
/// Blank lines are skipped. With `max_bytes` set, the body is dropped (closing
/// the connection) once more than `max_bytes` have been read; complete lines
/// already buffered are still yielded, a trailing partial line is discarded.
pub fn decode_lines(
    body: ByteStream,
    policy: LinePolicy,
    context: impl Into<String>,
    max_bytes: Option<u64>,
) -> LineStream {
    let reader = LineReader {
        body: Some(body),
        buf: BytesMut::new(),
        bytes_read: 0,
        max_bytes,
        truncated: false,
        line_no: 0,
        policy,
        context: context.into(),
    };

    stream::try_unfold(reader, |mut reader| async move {
        loop {
            if let Some(line) = reader.take_line() {
                reader.line_no += 1;
                let line = trim_line(&line);
                if line.is_empty() {
                    continue;
                }
                let value = reader.decode(line)?;
                return Ok(Some((value, reader)));
            }

            let Some(body) = reader.body.as_mut() else {
                return Ok(None);
            };
            match body.next().await {
                Some(Ok(chunk)) => reader.push_chunk(chunk),
                Some(Err(e)) => return Err(e),
                None => reader.body = None,
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;
    use serde_json::json;

    fn body(chunks: &[&str]) -> ByteStream {
        let chunks: Vec<Result<Bytes>> = chunks
            .iter()
            .map(|c| Ok(Bytes::from(c.to_string())))
            .collect();
        stream::iter(chunks).boxed()
    }

    async fn collect(stream: LineStream) -> Result<Vec<Value>> {
        stream.try_collect().await
    }

    #[tokio::test]
    async fn test_lines_split_across_chunks() {
        let stream = decode_lines(
            body(&["{\"a\":", "1}\n{\"a\"", ":2}\n", "{\"a\":3}"]),
            LinePolicy::Json,
            "export",
            None,
        );
        let values = collect(stream).await.unwrap();
        assert_eq!(values, vec![json!({"a": 1}), json!({"a": 2}), json!({"a": 3})]);
    }

    #[tokio::test]
    async fn test_blank_lines_and_crlf_skipped() {
        let stream = decode_lines(
            body(&["{\"a\":1}\r\n\r\n\n{\"a\":2}\r\n"]),
            LinePolicy::Json,
            "export",
            None,
        );
        let values = collect(stream).await.unwrap();
        assert_eq!(values, vec![json!({"a": 1}), json!({"a": 2})]);
    }

    #[tokio::test]
    async fn test_json_policy_fails_on_bad_line() {
        let stream = decode_lines(
            body(&["{\"a\":1}\nnot json\n{\"a\":3}\n"]),
            LinePolicy::Json,
            "export/data.json",
            None,
        );
        let mut stream = stream;
        assert_eq!(stream.next().await.unwrap().unwrap(), json!({"a": 1}));
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, IterableError::Decode { .. }));
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn test_raw_policy_wraps_bare_strings() {
        let stream = decode_lines(
            body(&["alice@example.com\n\"bob@example.com\"\ncarol@example.com"]),
            LinePolicy::JsonOrRaw,
            "lists/getUsers",
            None,
        );
        let values = collect(stream).await.unwrap();
        assert_eq!(
            values,
            vec![
                json!("alice@example.com"),
                json!("bob@example.com"),
                json!("carol@example.com"),
            ]
        );
    }

    #[tokio::test]
    async fn test_byte_cap_stops_reading() {
        let stream = decode_lines(
            body(&["{\"n\":1}\n{\"n\":2}\n{\"n\"", ":3}\n", "{\"n\":4}\n"]),
            LinePolicy::Json,
            "export",
            Some(10),
        );
        let values = collect(stream).await.unwrap();
        // Third line was incomplete when the cap hit, fourth never read
        assert_eq!(values, vec![json!({"n": 1}), json!({"n": 2})]);
    }

    #[tokio::test]
    async fn test_body_error_propagates() {
        let chunks: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"{\"a\":1}\n")),
            Err(IterableError::Http {
                status: 502,
                url: "export".into(),
            }),
        ];
        let mut stream = decode_lines(stream::iter(chunks).boxed(), LinePolicy::Json, "x", None);
        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.unwrap().is_err());
    }

    #[test]
    fn test_trim_line() {
        assert_eq!(trim_line(b"  {}\r\n"), b"{}");
        assert_eq!(trim_line(b"\r\n"), b"");
        assert_eq!(trim_line(b""), b"");
    }
}
