//! Async streaming fronts for the scanner, the value builder, and the
//! markdown extractor.
//!
//! Each function wraps exactly one parser instance around an `AsyncRead` or a
//! bytes stream and yields its output as a `futures` `Stream`. Chunks that are
//! not valid UTF-8 are skipped (the payloads these parsers target are UTF-8).

use std::pin::Pin;
use std::sync::{Arc, Mutex};

use async_stream::stream;
use bytes::Bytes;
use futures_core::stream::Stream;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::builder::{Delta, StreamingValueBuilder};
use crate::error::{ExtractError, PatternError};
use crate::markdown::{CodeBlock, StreamingMarkdownExtractor};
use crate::scanner::{JsonScanner, Token};

/// Raw byte streams as produced by transport layers.
pub type RawByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Stream completed top-level tokens from an `AsyncRead`, force-closing any
/// open structure at end-of-stream.
pub fn stream_tokens_from_async_read<R>(mut reader: R, buf_size: usize) -> impl Stream<Item = Token>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    stream! {
        let mut scanner = JsonScanner::new();
        let mut buf = vec![0u8; buf_size.max(1024)];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if let Ok(s) = std::str::from_utf8(&buf[..n]) {
                        for token in scanner.feed(s) {
                            yield token;
                        }
                    } else {
                        debug!(target = "stream_extract::stream", "skipping non-utf8 chunk");
                    }
                }
                Err(e) => {
                    debug!(target = "stream_extract::stream", error = %e, "read error");
                    break;
                }
            }
        }
        for token in scanner.end() {
            yield token;
        }
    }
}

/// As [`stream_tokens_from_async_read`], for a raw bytes stream.
pub fn stream_tokens_from_bytes(
    byte_stream: RawByteStream,
    buf_size: usize,
) -> impl Stream<Item = Token> {
    stream_tokens_from_async_read(StreamReader::new(byte_stream), buf_size)
}

/// Stream [`Delta`] updates for a schema-validated value built from an
/// `AsyncRead`. Schema compilation errors surface eagerly; a validation
/// failure at end-of-stream is logged by the builder and ends the stream.
pub fn stream_deltas_from_async_read<R>(
    mut reader: R,
    schema: &Value,
    buf_size: usize,
) -> Result<impl Stream<Item = Delta>, PatternError>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let queue: Arc<Mutex<Vec<Delta>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&queue);
    let mut builder = StreamingValueBuilder::new(schema, move |delta| {
        sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(delta);
    })?;

    Ok(stream! {
        let mut buf = vec![0u8; buf_size.max(1024)];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if let Ok(s) = std::str::from_utf8(&buf[..n]) {
                        builder.feed(s);
                        for delta in drain(&queue) {
                            yield delta;
                        }
                    }
                }
                Err(_) => break,
            }
        }
        let _ = builder.end();
        for delta in drain(&queue) {
            yield delta;
        }
    })
}

/// As [`stream_deltas_from_async_read`], for a raw bytes stream, with
/// transport errors forwarded in-band.
pub fn stream_deltas_from_bytes(
    byte_stream: RawByteStream,
    schema: &Value,
) -> Result<impl Stream<Item = Result<Delta, ExtractError>>, PatternError> {
    let queue: Arc<Mutex<Vec<Delta>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&queue);
    let mut builder = StreamingValueBuilder::new(schema, move |delta| {
        sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(delta);
    })?;

    Ok(stream! {
        let mut byte_stream = byte_stream;
        while let Some(chunk) = byte_stream.next().await {
            match chunk {
                Ok(bytes) => match std::str::from_utf8(&bytes) {
                    Ok(s) => {
                        builder.feed(s);
                        for delta in drain(&queue) {
                            yield Ok(delta);
                        }
                    }
                    Err(e) => {
                        yield Err(ExtractError::ByteStream(format!("UTF-8 decode error: {e}")));
                        break;
                    }
                },
                Err(e) => {
                    yield Err(ExtractError::ByteStream(e.to_string()));
                    break;
                }
            }
        }
        let _ = builder.end();
        for delta in drain(&queue) {
            yield Ok(delta);
        }
    })
}

/// Stream de-duplicated fenced-code-block updates from an `AsyncRead`.
pub fn stream_code_blocks_from_async_read<R>(
    mut reader: R,
    buf_size: usize,
) -> impl Stream<Item = CodeBlock>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    stream! {
        let queue: Arc<Mutex<Vec<CodeBlock>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&queue);
        let mut extractor = StreamingMarkdownExtractor::new(move |block| {
            sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(block);
        });

        let mut buf = vec![0u8; buf_size.max(1024)];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if let Ok(s) = std::str::from_utf8(&buf[..n]) {
                        extractor.feed(s);
                        for block in drain(&queue) {
                            yield block;
                        }
                    }
                }
                Err(_) => break,
            }
        }
    }
}

fn drain<T>(queue: &Arc<Mutex<Vec<T>>>) -> Vec<T> {
    std::mem::take(&mut *queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
}
