//! Network transport for the agent bridge.
//!
//! Provides:
//! - Request path: endpoint table, HTTP collaborator, response envelope
//! - Push channels over `text/event-stream` with backoff reconnection
//! - [`BackendTransport`], the [`Transport`](agent_bridge_core::Transport)
//!   implementation tying both together
//!
//! The default `reqwest` feature supplies the HTTP and event-stream
//! collaborators; without it, inject your own through
//! [`BackendTransportBuilder`].

pub mod channel;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod envelope;
pub mod error;
pub mod http;
pub mod sse;

pub use channel::{ChannelController, ChannelKind, ChannelPhase, ChannelSnapshot};
pub use client::{BackendTransport, BackendTransportBuilder};
pub use config::{BridgeConfig, ReconnectPolicy};
pub use endpoint::{EndpointDescriptor, HttpMethod};
pub use error::TransportError;
pub use http::{HttpClient, HttpRequest, HttpResponse};
pub use sse::{EventStream, EventStreamConnector, StreamEvent, decode_event_stream};

#[cfg(feature = "reqwest")]
pub use http::ReqwestHttpClient;
#[cfg(feature = "reqwest")]
pub use sse::ReqwestEventStream;
