//! In-process pub/sub core.
//!
//! Inbound handlers run synchronously inside [`Dispatcher::invoke`]. The
//! outbound listener table lets a process play the backend's part, which is
//! how the in-process transport and the tests answer requests without a
//! network.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, PoisonError, RwLock},
};

use futures::{FutureExt, future::BoxFuture};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    DispatchError, Message,
    protocol::{InboundMessage, InboundType, OutboundMessage, OutboundType},
};

type InboundHandler = Arc<dyn Fn(&Message<Value>) -> Result<(), DispatchError> + Send + Sync>;

type OutboundListener =
    Arc<dyn Fn(Message<Value>) -> BoxFuture<'static, Result<Value, DispatchError>> + Send + Sync>;

/// Observer notified of every dispatch failure.
pub type ErrorObserver = Arc<dyn Fn(&Message<Value>, &DispatchError) + Send + Sync>;

/// Local dispatcher owning the handler registries of one transport instance.
#[derive(Default)]
pub struct Dispatcher {
    inbound: RwLock<HashMap<InboundType, InboundHandler>>,
    outbound: RwLock<HashMap<OutboundType, OutboundListener>>,
    observers: Arc<RwLock<Vec<ErrorObserver>>>,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for an inbound message type.
    ///
    /// A later registration for the same type replaces this one.
    pub fn on<M, F>(&self, handler: F)
    where
        M: InboundMessage,
        F: Fn(Message<M>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let erased: InboundHandler = Arc::new(move |msg: &Message<Value>| {
            let data = M::deserialize(&msg.data)
                .map_err(|e| DispatchError::decode(msg.message_type.clone(), e))?;
            handler(Message {
                message_type: msg.message_type.clone(),
                message_id: msg.message_id.clone(),
                data,
            })
            .map_err(|source| DispatchError::Handler {
                message_type: msg.message_type.clone(),
                source,
            })
        });

        let replaced = self
            .inbound
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(M::TYPE, erased);
        if replaced.is_some() {
            tracing::debug!(message_type = %M::TYPE, "Replaced inbound handler");
        }
    }

    /// Whether a handler is registered for `message_type`.
    #[must_use]
    pub fn has_handler(&self, message_type: InboundType) -> bool {
        self.inbound
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&message_type)
    }

    /// Deliver an inbound message to its handler.
    ///
    /// Messages nobody listens for are dropped. A failing handler is
    /// reported to every error observer and the error is returned.
    pub fn invoke(
        &self,
        message_type: InboundType,
        data: Value,
        message_id: Option<String>,
    ) -> Result<(), DispatchError> {
        let message = Message::new(message_type.as_str(), data, message_id);

        let handler = self
            .inbound
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&message_type)
            .cloned();

        let Some(handler) = handler else {
            tracing::trace!(message_type = %message_type, "No inbound handler, dropping message");
            return Ok(());
        };

        handler(&message).inspect_err(|err| self.notify(&message, err))
    }

    /// Register the in-process answer for an outbound message type.
    pub fn handle<M, F, Fut>(&self, listener: F)
    where
        M: OutboundMessage,
        F: Fn(Message<M>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<M::Response>> + Send + 'static,
    {
        let erased: OutboundListener = Arc::new(move |msg: Message<Value>| {
            let message_type = msg.message_type.clone();
            let data = match M::deserialize(&msg.data) {
                Ok(data) => data,
                Err(e) => {
                    return futures::future::ready(Err(DispatchError::decode(message_type, e)))
                        .boxed();
                }
            };
            let reply = listener(msg.map(|_| data));
            async move {
                let response = reply.await.map_err(|source| DispatchError::Handler {
                    message_type: message_type.clone(),
                    source,
                })?;
                serde_json::to_value(response).map_err(|e| DispatchError::encode(message_type, e))
            }
            .boxed()
        });

        self.outbound
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(M::TYPE, erased);
    }

    /// Send a request to the in-process listener and await its reply.
    pub async fn request<M: OutboundMessage>(
        &self,
        payload: M,
    ) -> Result<M::Response, DispatchError> {
        let (message, listener) = self.prepare(&payload, None)?;

        let result = listener(message.clone()).await.and_then(|value| {
            serde_json::from_value(value).map_err(|e| DispatchError::decode(M::TYPE.as_str(), e))
        });

        result.inspect_err(|err| self.notify(&message, err))
    }

    /// Fire-and-forget variant of [`Dispatcher::request`].
    ///
    /// Only a missing listener or an unencodable payload is reported to the
    /// caller; the listener runs on a spawned task and its failures reach
    /// the error observers alone. Must be called within a tokio runtime.
    pub fn send<M: OutboundMessage>(
        &self,
        payload: M,
        message_id: Option<String>,
    ) -> Result<(), DispatchError> {
        let (message, listener) = self.prepare(&payload, message_id)?;
        let observers = Arc::clone(&self.observers);

        tokio::spawn(async move {
            if let Err(err) = listener(message.clone()).await {
                notify_all(&observers, &message, &err);
            }
        });

        Ok(())
    }

    /// Append an error observer. Observers live as long as the dispatcher
    /// and run in registration order.
    pub fn on_error<F>(&self, observer: F)
    where
        F: Fn(&Message<Value>, &DispatchError) + Send + Sync + 'static,
    {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(observer));
    }

    fn prepare<M: OutboundMessage>(
        &self,
        payload: &M,
        message_id: Option<String>,
    ) -> Result<(Message<Value>, OutboundListener), DispatchError> {
        let listener = self
            .outbound
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&M::TYPE)
            .cloned()
            .ok_or_else(|| DispatchError::NoHandler(M::TYPE.to_string()))?;

        let data =
            serde_json::to_value(payload).map_err(|e| DispatchError::encode(M::TYPE.as_str(), e))?;

        Ok((Message::new(M::TYPE.as_str(), data, message_id), listener))
    }

    fn notify(&self, message: &Message<Value>, err: &DispatchError) {
        notify_all(&self.observers, message, err);
    }
}

fn notify_all(
    observers: &RwLock<Vec<ErrorObserver>>,
    message: &Message<Value>,
    err: &DispatchError,
) {
    // Snapshot so an observer may register further observers.
    let snapshot: Vec<ErrorObserver> = observers
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();

    tracing::debug!(
        message_type = %message.message_type,
        message_id = %message.message_id,
        error = %err,
        "Dispatch failed"
    );

    for observer in snapshot {
        observer(message, err);
    }
}
