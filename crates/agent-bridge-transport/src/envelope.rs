//! Backend response envelope: `{success, data}` / `{success: false, error}`.

use serde_json::Value;

use crate::{TransportError, http::HttpResponse};

/// Turn an HTTP response into the payload it carries.
///
/// Bodies without the envelope shape are returned unchanged, so endpoints
/// that do not wrap their replies still work.
pub fn decode_response(response: &HttpResponse) -> Result<Value, TransportError> {
    if !response.is_success() {
        return Err(http_error(response));
    }

    if response.body.trim().is_empty() {
        return Ok(Value::Null);
    }

    let body: Value = serde_json::from_str(&response.body)
        .map_err(|e| TransportError::decode("response body", e))?;

    unwrap_envelope(body)
}

/// Apply the envelope rules to an already parsed body.
pub fn unwrap_envelope(body: Value) -> Result<Value, TransportError> {
    let mut map = match body {
        Value::Object(map) => map,
        other => return Ok(other),
    };

    if map.get("success") == Some(&Value::Bool(true)) {
        return Ok(map.remove("data").unwrap_or(Value::Null));
    }

    if let Some(error) = map.get("error") {
        return Err(application_error(error));
    }

    Ok(Value::Object(map))
}

fn application_error(error: &Value) -> TransportError {
    let code = error.get("code").and_then(Value::as_str).map(str::to_string);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| code.clone())
        .unwrap_or_else(|| match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
    TransportError::Application { code, message }
}

fn http_error(response: &HttpResponse) -> TransportError {
    let parsed = serde_json::from_str::<Value>(&response.body).ok();
    let message = parsed
        .as_ref()
        .and_then(|body| {
            body.get("message")
                .or_else(|| body.get("error").and_then(|e| e.get("message")))
        })
        .and_then(Value::as_str)
        .map_or_else(|| response.status_text.clone(), str::to_string);

    TransportError::Http {
        status: response.status,
        message,
    }
}
