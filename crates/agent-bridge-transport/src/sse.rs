//! Event-stream collaborator and `text/event-stream` decoding.

use std::fmt::Display;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt, stream::BoxStream};

use crate::TransportError;

/// Event name used when a stream event has no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// One decoded stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    /// Event name.
    pub event: String,
    /// Raw data, multi-line data joined with `\n`.
    pub data: String,
    /// Last event id, when the server sent one.
    pub id: Option<String>,
}

impl StreamEvent {
    /// Create an event without an id.
    #[must_use]
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
            id: None,
        }
    }
}

/// Stream of events from one open connection. An `Err` item or the end of
/// the stream means the connection is gone.
pub type EventStream = BoxStream<'static, Result<StreamEvent, TransportError>>;

/// Opens event-stream connections.
#[async_trait]
pub trait EventStreamConnector: Send + Sync {
    /// Open a connection. Resolves once the stream is established.
    async fn connect(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<EventStream, TransportError>;
}

/// Longest line accepted from a stream before the connection is failed.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Decode a `text/event-stream` body into [`StreamEvent`]s.
///
/// Chunks may split lines or UTF-8 sequences anywhere. A leading byte order
/// mark is dropped, `\r\n`, `\r` and `\n` all end a line, and a line longer
/// than [`MAX_LINE_BYTES`] yields an `Err` item.
#[must_use]
pub fn decode_event_stream<S, B, E>(bytes: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut guard = LineGuard::default();
    bytes
        .map(move |chunk| match chunk {
            Ok(chunk) => guard.push(chunk.as_ref()),
            Err(e) => Err(format!("read failed: {e}")),
        })
        .eventsource()
        .map(|item| match item {
            Ok(event) => Ok(StreamEvent {
                event: if event.event.is_empty() {
                    DEFAULT_EVENT.to_string()
                } else {
                    event.event
                },
                data: event.data,
                id: (!event.id.is_empty()).then_some(event.id),
            }),
            Err(e) => Err(TransportError::stream(format!("Event stream {e}"))),
        })
        .boxed()
}

/// Byte-level preparation ahead of the event parser: BOM removal, line
/// ending normalisation to `\n` and the line length cap.
#[derive(Debug)]
struct LineGuard {
    /// Bytes held back while the stream might still start with a BOM.
    head: Option<Vec<u8>>,
    after_cr: bool,
    line_len: usize,
}

impl Default for LineGuard {
    fn default() -> Self {
        Self {
            head: Some(Vec::new()),
            after_cr: false,
            line_len: 0,
        }
    }
}

impl LineGuard {
    fn push(&mut self, chunk: &[u8]) -> Result<Vec<u8>, String> {
        let Some(mut head) = self.head.take() else {
            return self.normalise(chunk);
        };
        head.extend_from_slice(chunk);
        if head.len() < BOM.len() && BOM.starts_with(&head) {
            self.head = Some(head);
            return Ok(Vec::new());
        }
        let body = head.strip_prefix(BOM).unwrap_or(&head);
        self.normalise(body)
    }

    fn normalise(&mut self, bytes: &[u8]) -> Result<Vec<u8>, String> {
        let mut out = Vec::with_capacity(bytes.len());
        for &byte in bytes {
            let after_cr = std::mem::replace(&mut self.after_cr, byte == b'\r');
            match byte {
                b'\n' if after_cr => {}
                b'\r' | b'\n' => {
                    out.push(b'\n');
                    self.line_len = 0;
                }
                _ => {
                    self.line_len += 1;
                    if self.line_len > MAX_LINE_BYTES {
                        return Err(format!("line exceeds {MAX_LINE_BYTES} bytes"));
                    }
                    out.push(byte);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(feature = "reqwest")]
pub use self::reqwest_stream::ReqwestEventStream;

#[cfg(feature = "reqwest")]
mod reqwest_stream {
    use async_trait::async_trait;
    use reqwest::{
        Client,
        header::{ACCEPT, CACHE_CONTROL, HeaderValue},
    };

    use super::{EventStream, EventStreamConnector, decode_event_stream};
    use crate::{BridgeConfig, TransportError, http::reqwest_client::header_map};

    /// [`EventStreamConnector`] backed by a streaming `reqwest` GET.
    #[derive(Debug, Clone)]
    pub struct ReqwestEventStream {
        client: Client,
    }

    impl ReqwestEventStream {
        /// Build a connector. Only the connect timeout applies; the stream
        /// itself stays open indefinitely.
        pub fn new(config: &BridgeConfig) -> Result<Self, TransportError> {
            let client = Client::builder()
                .connect_timeout(config.connect_timeout)
                .build()
                .map_err(|e| {
                    TransportError::config(format!("Failed to create stream client: {e}"))
                })?;
            Ok(Self { client })
        }
    }

    #[async_trait]
    impl EventStreamConnector for ReqwestEventStream {
        async fn connect(
            &self,
            url: &str,
            headers: &[(String, String)],
        ) -> Result<EventStream, TransportError> {
            let mut headers = header_map(headers)?;
            headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

            let response = self
                .client
                .get(url)
                .headers(headers)
                .send()
                .await
                .map_err(|e| {
                    TransportError::stream(format!("Failed to connect to {url}: {e}"))
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::stream(format!(
                    "Event stream {url} answered {status}"
                )));
            }

            Ok(decode_event_stream(response.bytes_stream()))
        }
    }
}
