//! Endpoint table: outbound message type → HTTP method and path.

use std::fmt;

use agent_bridge_core::OutboundType;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde_json::{Map, Value};

use crate::TransportError;

/// HTTP method of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Upper-case method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// GET and HEAD never carry a body; their payload goes in the query.
    #[must_use]
    pub const fn carries_body(self) -> bool {
        !matches!(self, Self::Get | Self::Head)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a payload becomes the HTTP body.
#[derive(Debug, Clone, Copy)]
pub enum BodyTransform {
    /// Send the payload as is.
    Identity,
    /// Send only the named field of the payload object.
    NestedField(&'static str),
    /// Arbitrary reshaping.
    Custom(fn(Value) -> Value),
}

impl BodyTransform {
    /// Apply the transform to a payload.
    #[must_use]
    pub fn apply(self, payload: Value) -> Value {
        match self {
            Self::Identity => payload,
            Self::NestedField(field) => match payload {
                Value::Object(mut map) if map.contains_key(field) => {
                    map.remove(field).unwrap_or(Value::Null)
                }
                other => other,
            },
            Self::Custom(f) => f(payload),
        }
    }
}

/// Method, path template and body rule for one outbound message type.
#[derive(Debug, Clone, Copy)]
pub struct EndpointDescriptor {
    pub method: HttpMethod,
    /// Path relative to the base URL, with `:name` placeholders.
    pub path_template: &'static str,
    pub body: BodyTransform,
}

impl EndpointDescriptor {
    const fn new(method: HttpMethod, path_template: &'static str) -> Self {
        Self {
            method,
            path_template,
            body: BodyTransform::Identity,
        }
    }

    const fn with_body(mut self, body: BodyTransform) -> Self {
        self.body = body;
        self
    }
}

/// Look up the endpoint of an outbound message type.
#[must_use]
pub const fn endpoint(message_type: OutboundType) -> EndpointDescriptor {
    use HttpMethod::{Delete, Get, Head, Post};

    match message_type {
        OutboundType::CreateSession => EndpointDescriptor::new(Post, "/chat/sessions"),
        OutboundType::ListSessions => EndpointDescriptor::new(Get, "/chat/sessions"),
        OutboundType::GetSession => EndpointDescriptor::new(Get, "/chat/sessions/:sessionId"),
        OutboundType::DeleteSession => {
            EndpointDescriptor::new(Delete, "/chat/sessions/:sessionId")
        }
        OutboundType::SendMessage => {
            EndpointDescriptor::new(Post, "/chat/sessions/:sessionId/messages")
                .with_body(BodyTransform::NestedField("request"))
        }
        OutboundType::GetMessages => {
            EndpointDescriptor::new(Get, "/chat/sessions/:sessionId/messages")
        }
        OutboundType::ListTools => EndpointDescriptor::new(Get, "/tools"),
        OutboundType::ExecuteTool => EndpointDescriptor::new(Post, "/tools/execute"),
        OutboundType::ListApprovals => EndpointDescriptor::new(Get, "/approvals"),
        OutboundType::Approve => EndpointDescriptor::new(Post, "/approvals/:executionId/approve"),
        OutboundType::Reject => EndpointDescriptor::new(Post, "/approvals/:executionId/reject"),
        OutboundType::GetWorkflowState => {
            EndpointDescriptor::new(Get, "/workflow/sessions/:sessionId")
        }
        OutboundType::SubmitWorkflowFeedback => {
            EndpointDescriptor::new(Post, "/workflow/sessions/:sessionId/feedback")
        }
        OutboundType::GetDomainGraph => EndpointDescriptor::new(Get, "/domain-graph"),
        OutboundType::HealthCheck => EndpointDescriptor::new(Head, "/health"),
    }
}

/// Look up an endpoint by wire name.
pub fn endpoint_for_name(name: &str) -> Result<(OutboundType, EndpointDescriptor), TransportError> {
    let message_type: OutboundType = name
        .parse()
        .map_err(|_| TransportError::UnknownMessageType(name.to_string()))?;
    Ok((message_type, endpoint(message_type)))
}

/// Method, path (with query) and body ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRequest {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Value>,
}

impl EndpointDescriptor {
    /// Substitute path parameters and place the rest of the payload in the
    /// body or, for GET/HEAD, the query string.
    ///
    /// Placeholders without a matching payload key are left in the path.
    #[must_use]
    pub fn resolve(&self, payload: Value) -> ResolvedRequest {
        let (path, consumed) = substitute(self.path_template, &payload);

        if self.method.carries_body() {
            return ResolvedRequest {
                method: self.method,
                path,
                body: Some(self.body.apply(payload)),
            };
        }

        let query = match &payload {
            Value::Object(map) => encode_query(map, &consumed),
            _ => String::new(),
        };
        let path = if query.is_empty() {
            path
        } else {
            format!("{path}?{query}")
        };

        ResolvedRequest {
            method: self.method,
            path,
            body: None,
        }
    }
}

/// Characters escaped in a substituted path segment: the URL path set plus
/// `/` and `%`, so a value always stays one segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'%');

fn substitute(template: &str, payload: &Value) -> (String, Vec<String>) {
    let mut consumed = Vec::new();
    let segments: Vec<String> = template
        .split('/')
        .map(|segment| {
            let Some(name) = segment.strip_prefix(':') else {
                return segment.to_string();
            };
            match payload.get(name).and_then(scalar_to_string) {
                Some(value) => {
                    consumed.push(name.to_string());
                    utf8_percent_encode(&value, PATH_SEGMENT).to_string()
                }
                None => {
                    tracing::debug!(placeholder = name, "No payload value for path placeholder");
                    segment.to_string()
                }
            }
        })
        .collect();
    (segments.join("/"), consumed)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn encode_query(map: &Map<String, Value>, consumed: &[String]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in map {
        if consumed.iter().any(|c| c == key) {
            continue;
        }
        match value {
            Value::Null => {}
            Value::Array(_) | Value::Object(_) => {
                serializer.append_pair(key, &value.to_string());
            }
            scalar => {
                if let Some(s) = scalar_to_string(scalar) {
                    serializer.append_pair(key, &s);
                }
            }
        }
    }
    serializer.finish()
}
