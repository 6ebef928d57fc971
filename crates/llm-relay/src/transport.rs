use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures::StreamExt as _;
use futures::stream;

use crate::errors::TransportError;

type ByteStream = Pin<Box<dyn futures::Stream<Item = Result<Bytes, TransportError>> + Send + 'static>>;

/// Source of raw response bytes.
///
/// `Ok(None)` is the definite end-of-data signal. Chunk boundaries are
/// arbitrary and may split lines and UTF-8 sequences.
#[async_trait::async_trait]
pub trait Transport: Send {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransportError>;
}

/// Transport over any stream of byte chunks (for example an HTTP response body).
pub struct ByteStreamTransport {
    inner: ByteStream,
}

impl ByteStreamTransport {
    pub fn new<S, E>(stream: S) -> Self
    where
        S: futures::Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: fmt::Display,
    {
        Self {
            inner: Box::pin(stream.map(|item| item.map_err(|e| TransportError::read(e.to_string())))),
        }
    }

    /// Streams the body of an HTTP response.
    pub fn from_response(response: reqwest::Response) -> Self {
        Self::new(response.bytes_stream())
    }

    /// Replays fixed chunks, then signals end-of-data.
    pub fn from_chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        let chunks: Vec<Result<Bytes, TransportError>> =
            chunks.into_iter().map(|c| Ok(c.into())).collect();
        Self {
            inner: Box::pin(stream::iter(chunks)),
        }
    }

    /// Replays `data` in chunks of at most `chunk_size` bytes.
    pub fn from_bytes_chunked(data: impl Into<Bytes>, chunk_size: usize) -> Self {
        let data: Bytes = data.into();
        let size = chunk_size.max(1);
        let chunks = (0..data.len())
            .step_by(size)
            .map(|start| data.slice(start..(start + size).min(data.len())))
            .collect::<Vec<_>>();
        Self::from_chunks(chunks)
    }
}

#[async_trait::async_trait]
impl Transport for ByteStreamTransport {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        self.inner.next().await.transpose()
    }
}

/// Incremental UTF-8 decoder that carries incomplete multi-byte sequences
/// over to the next chunk instead of replacing them.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes as much of `pending + chunk` as forms complete characters.
    ///
    /// Invalid sequences are replaced with U+FFFD; an incomplete trailing
    /// sequence is held back.
    pub fn push(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match err.error_len() {
                        Some(invalid) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + invalid);
                        }
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }

    /// Flushes held-back bytes at end of data, lossily.
    pub fn finish(&mut self) -> String {
        let out = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        out
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_decoder_holds_split_multibyte_sequence() {
        let text = "héllo 世界";
        let bytes = text.as_bytes();
        let mut decoder = Utf8ChunkDecoder::new();
        let mut out = String::new();
        for split in bytes.chunks(1) {
            out.push_str(&decoder.push(split));
        }
        out.push_str(&decoder.finish());
        assert_eq!(out, text);
    }

    #[test]
    fn utf8_decoder_reports_pending_tail() {
        let mut decoder = Utf8ChunkDecoder::new();
        let euro = "€".as_bytes();
        assert_eq!(decoder.push(&euro[..2]), "");
        assert!(decoder.has_pending());
        assert_eq!(decoder.push(&euro[2..]), "€");
        assert!(!decoder.has_pending());
    }

    #[test]
    fn utf8_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8ChunkDecoder::new();
        assert_eq!(decoder.push(&[b'a', 0xFF, b'b']), "a\u{FFFD}b");
    }

    #[tokio::test]
    async fn chunked_transport_replays_all_bytes_then_ends() {
        let mut transport = ByteStreamTransport::from_bytes_chunked("abcdefg", 3);
        let mut seen = Vec::new();
        while let Some(chunk) = transport.next_chunk().await.expect("chunk") {
            seen.push(chunk);
        }
        assert_eq!(seen, vec![Bytes::from("abc"), Bytes::from("def"), Bytes::from("g")]);
    }

    #[tokio::test]
    async fn stream_errors_are_mapped_to_transport_errors() {
        let items: Vec<Result<Bytes, String>> = vec![Ok(Bytes::from("a")), Err("reset".into())];
        let mut transport = ByteStreamTransport::new(stream::iter(items));
        assert!(transport.next_chunk().await.is_ok());
        assert_eq!(
            transport.next_chunk().await,
            Err(TransportError::read("reset"))
        );
    }
}
