//! HTTP backend: a templated request whose response becomes the result.

use serde_json::Value;
use tracing::{debug, warn};

use opentolk_adapters::{HttpBody, HttpCall, send_http};
use opentolk_plugins::HttpConfig;

use crate::error::{EngineError, Result};
use crate::json_path::extract_path;
use crate::output::{Outcome, parse_output};
use crate::runner::Invocation;

pub(crate) async fn run(invocation: &Invocation<'_>, config: &HttpConfig) -> Result<Outcome> {
    if config.url.trim().is_empty() {
        return Err(EngineError::missing(invocation.plugin_id(), "url"));
    }

    let template = invocation.template();
    let mut call = HttpCall::new(config.method().to_uppercase(), template.resolve(&config.url))
        .with_timeout(config.timeout());
    for (name, value) in &config.headers {
        call = call.with_header(name, template.resolve(value));
    }
    if let Some(body) = &config.body {
        call = call.with_body(match template.resolve_value(body) {
            Value::String(text) => HttpBody::Text(text),
            other => HttpBody::Json(other),
        });
    }

    debug!(method = %call.method, url = %call.url, "sending http request");
    let response = send_http(&invocation.runner.http, &call)
        .await
        .map_err(|e| EngineError::from_adapter(e, format!("http request to `{}`", call.url)))?;

    if !response.is_success() {
        warn!(status = response.status, "http backend received an error status");
        return Err(EngineError::http_failed(response.status, &response.body));
    }

    let text = match &config.response_path {
        Some(path) => {
            let json: Value =
                serde_json::from_str(&response.body).map_err(|e| EngineError::InvalidResponse {
                    reason: format!("response is not JSON: {e}"),
                })?;
            extract_path(&json, path).ok_or_else(|| EngineError::InvalidResponse {
                reason: format!("response has no value at `{path}`"),
            })?
        }
        None => response.body,
    };

    Ok(Outcome::Complete(parse_output(&text)))
}
