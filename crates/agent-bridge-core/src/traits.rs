//! Transport trait shared by the in-process and network variants.

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    DispatchError, Dispatcher, Message,
    protocol::{InboundMessage, OutboundMessage},
};

/// A duplex message transport.
///
/// Inbound registration always goes through the local [`Dispatcher`];
/// implementations decide how outbound requests reach the other side.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Error surfaced to request callers.
    type Error: std::error::Error + From<DispatchError> + Send + Sync + 'static;

    /// Dispatcher that owns the handler registries.
    fn dispatcher(&self) -> &Dispatcher;

    /// Send a request and await its typed response.
    async fn request<M: OutboundMessage>(&self, payload: M) -> Result<M::Response, Self::Error>;

    /// Send a request without waiting for the response.
    fn send<M: OutboundMessage>(&self, payload: M) -> Result<(), Self::Error>;

    /// Register the handler for an inbound message type.
    fn on<M, F>(&self, handler: F)
    where
        M: InboundMessage,
        F: Fn(Message<M>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.dispatcher().on::<M, F>(handler);
    }

    /// Observe every dispatch failure.
    fn on_error<F>(&self, observer: F)
    where
        F: Fn(&Message<Value>, &DispatchError) + Send + Sync + 'static,
    {
        self.dispatcher().on_error(observer);
    }
}

/// The dispatcher alone is the in-process transport: requests are answered
/// by listeners registered with [`Dispatcher::handle`].
#[async_trait]
impl Transport for Dispatcher {
    type Error = DispatchError;

    fn dispatcher(&self) -> &Dispatcher {
        self
    }

    async fn request<M: OutboundMessage>(&self, payload: M) -> Result<M::Response, DispatchError> {
        Self::request(self, payload).await
    }

    fn send<M: OutboundMessage>(&self, payload: M) -> Result<(), DispatchError> {
        Self::send(self, payload, None)
    }
}
