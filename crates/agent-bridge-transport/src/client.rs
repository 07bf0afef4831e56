//! Network transport: HTTP for requests, event streams for pushes.

use std::sync::Arc;

use agent_bridge_core::{Dispatcher, OutboundMessage, OutboundType, Transport};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    BridgeConfig, TransportError,
    channel::{ChannelController, ChannelKind},
    endpoint::{EndpointDescriptor, endpoint, endpoint_for_name},
    envelope::decode_response,
    http::{HttpClient, HttpRequest},
    sse::EventStreamConnector,
};

/// Transport backed by the agent backend.
///
/// Requests go out as one HTTP call each and resolve with the unwrapped
/// envelope payload. Push events arrive on two independent channels, the
/// primary one and the workflow one, and are dispatched to the handlers
/// registered with [`Transport::on`].
pub struct BackendTransport {
    dispatcher: Arc<Dispatcher>,
    requests: Arc<RequestPath>,
    primary: ChannelController,
    workflow: ChannelController,
}

struct RequestPath {
    config: BridgeConfig,
    headers: Vec<(String, String)>,
    http: Arc<dyn HttpClient>,
}

impl BackendTransport {
    /// Create a transport with the default `reqwest` collaborators.
    pub fn new(config: BridgeConfig) -> Result<Self, TransportError> {
        Self::builder(config).build()
    }

    /// Start building a transport with custom collaborators.
    #[must_use]
    pub fn builder(config: BridgeConfig) -> BackendTransportBuilder {
        BackendTransportBuilder::new(config)
    }

    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.requests.config
    }

    /// Shared handle to the dispatcher.
    #[must_use]
    pub fn dispatcher_handle(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Send a typed request and await the typed response.
    pub async fn request<M: OutboundMessage>(
        &self,
        payload: M,
    ) -> Result<M::Response, TransportError> {
        let data = encode(&payload)?;
        let value = self
            .requests
            .execute(M::TYPE, endpoint(M::TYPE), data)
            .await?;
        serde_json::from_value(value)
            .map_err(|e| TransportError::decode(format!("{} response", M::TYPE), e))
    }

    /// Send a request by wire name with an untyped payload.
    pub async fn request_raw(
        &self,
        message_type: &str,
        payload: Value,
    ) -> Result<Value, TransportError> {
        let (message_type, descriptor) = endpoint_for_name(message_type)?;
        self.requests.execute(message_type, descriptor, payload).await
    }

    /// Send a request without waiting for the reply. Failures are logged.
    ///
    /// Must be called within a tokio runtime.
    pub fn send<M: OutboundMessage>(&self, payload: M) -> Result<(), TransportError> {
        let data = encode(&payload)?;
        let requests = Arc::clone(&self.requests);
        tokio::spawn(async move {
            if let Err(e) = requests.execute(M::TYPE, endpoint(M::TYPE), data).await {
                warn!(message_type = %M::TYPE, error = %e, "Unawaited request failed");
            }
        });
        Ok(())
    }

    /// Open the primary channel.
    pub fn connect(&self) {
        self.primary.connect();
    }

    /// Open the workflow channel.
    pub fn connect_workflow(&self) {
        self.workflow.connect();
    }

    /// Close both channels and cancel pending reconnects. Idempotent.
    pub fn disconnect(&self) {
        self.primary.disconnect();
        self.workflow.disconnect();
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.primary.is_connected()
    }

    #[must_use]
    pub fn is_workflow_connected(&self) -> bool {
        self.workflow.is_connected()
    }

    /// Controller of one channel, for state inspection.
    #[must_use]
    pub const fn channel(&self, kind: ChannelKind) -> &ChannelController {
        match kind {
            ChannelKind::Primary => &self.primary,
            ChannelKind::Workflow => &self.workflow,
        }
    }
}

impl std::fmt::Debug for BackendTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendTransport")
            .field("base_url", &self.requests.config.base_url)
            .field("primary", &self.primary)
            .field("workflow", &self.workflow)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for BackendTransport {
    type Error = TransportError;

    fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    async fn request<M: OutboundMessage>(&self, payload: M) -> Result<M::Response, TransportError> {
        Self::request(self, payload).await
    }

    fn send<M: OutboundMessage>(&self, payload: M) -> Result<(), TransportError> {
        Self::send(self, payload)
    }
}

impl RequestPath {
    async fn execute(
        &self,
        message_type: OutboundType,
        descriptor: EndpointDescriptor,
        payload: Value,
    ) -> Result<Value, TransportError> {
        let resolved = descriptor.resolve(payload);
        let body = resolved
            .body
            .map(|body| serde_json::to_string(&body))
            .transpose()
            .map_err(|source| TransportError::Encode {
                message_type: message_type.to_string(),
                source,
            })?;

        let request = HttpRequest {
            method: resolved.method,
            url: self.config.url(&resolved.path),
            headers: self.headers.clone(),
            body,
        };
        debug!(
            message_type = %message_type,
            method = %request.method,
            url = %request.url,
            "Sending request"
        );

        let response = self.http.execute(request).await?;
        decode_response(&response).inspect_err(|e| {
            debug!(message_type = %message_type, error = %e, "Request failed");
        })
    }
}

fn encode<M: OutboundMessage>(payload: &M) -> Result<Value, TransportError> {
    serde_json::to_value(payload).map_err(|source| TransportError::Encode {
        message_type: M::TYPE.to_string(),
        source,
    })
}

/// Builder for [`BackendTransport`].
///
/// Collaborators left unset fall back to the `reqwest` implementations.
pub struct BackendTransportBuilder {
    config: BridgeConfig,
    dispatcher: Option<Arc<Dispatcher>>,
    http: Option<Arc<dyn HttpClient>>,
    connector: Option<Arc<dyn EventStreamConnector>>,
}

impl BackendTransportBuilder {
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            dispatcher: None,
            http: None,
            connector: None,
        }
    }

    /// Share an existing dispatcher.
    #[must_use]
    pub fn dispatcher(mut self, dispatcher: Arc<Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Use a custom HTTP client.
    #[must_use]
    pub fn http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    /// Use a custom event-stream connector for both channels.
    #[must_use]
    pub fn event_stream(mut self, connector: Arc<dyn EventStreamConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Build the transport. Both channels start closed.
    pub fn build(self) -> Result<BackendTransport, TransportError> {
        url::Url::parse(&self.config.base_url).map_err(|e| {
            TransportError::config(format!("Invalid base URL '{}': {e}", self.config.base_url))
        })?;

        let http = match self.http {
            Some(http) => http,
            None => default_http(&self.config)?,
        };
        let connector = match self.connector {
            Some(connector) => connector,
            None => default_connector(&self.config)?,
        };
        let dispatcher = self.dispatcher.unwrap_or_default();

        let primary = ChannelController::new(
            ChannelKind::Primary,
            &self.config,
            Arc::clone(&connector),
            Arc::clone(&dispatcher),
        );
        let workflow = ChannelController::new(
            ChannelKind::Workflow,
            &self.config,
            connector,
            Arc::clone(&dispatcher),
        );

        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        headers.extend(self.config.common_headers());

        Ok(BackendTransport {
            dispatcher,
            requests: Arc::new(RequestPath {
                config: self.config,
                headers,
                http,
            }),
            primary,
            workflow,
        })
    }
}

#[cfg(feature = "reqwest")]
fn default_http(config: &BridgeConfig) -> Result<Arc<dyn HttpClient>, TransportError> {
    Ok(Arc::new(crate::http::ReqwestHttpClient::new(config)?))
}

#[cfg(not(feature = "reqwest"))]
fn default_http(_config: &BridgeConfig) -> Result<Arc<dyn HttpClient>, TransportError> {
    Err(TransportError::config(
        "no HTTP client given and the `reqwest` feature is disabled",
    ))
}

#[cfg(feature = "reqwest")]
fn default_connector(
    config: &BridgeConfig,
) -> Result<Arc<dyn EventStreamConnector>, TransportError> {
    Ok(Arc::new(crate::sse::ReqwestEventStream::new(config)?))
}

#[cfg(not(feature = "reqwest"))]
fn default_connector(
    _config: &BridgeConfig,
) -> Result<Arc<dyn EventStreamConnector>, TransportError> {
    Err(TransportError::config(
        "no event-stream connector given and the `reqwest` feature is disabled",
    ))
}
