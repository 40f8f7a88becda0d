//! The REST evaluation engine.
//!
//! Ships expression graphs to the remote computation service in their JSON
//! wire encoding and deserializes the materialized result. Everything the
//! client could not validate while building the graph surfaces here, with
//! the service's own message.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use eetools_core::{Expr, Value};

use crate::error::{CloudError, Result};
use crate::users::Credentials;

const DEFAULT_ENDPOINT: &str = "https://earthengine.googleapis.com/v1/expressions:compute";

/// Configuration for [`RestEngine`].
pub struct RestEngineOptions {
    /// Evaluation endpoint URL.
    pub endpoint: String,
    /// Per-request timeout (default 120 s; terminal fetches can be slow).
    pub request_timeout: Duration,
}

impl Default for RestEngineOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Deserialize)]
struct EvaluateResponse {
    result: Value,
}

/// Async client of the remote evaluation service.
///
/// One engine is one session: it is built from an explicit credential
/// record and holds no process-wide state.
pub struct RestEngine {
    client: reqwest::Client,
    credentials: Credentials,
    options: RestEngineOptions,
}

impl RestEngine {
    pub fn new(credentials: Credentials, options: RestEngineOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| CloudError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            credentials,
            options,
        })
    }

    /// Evaluate the graph remotely and materialize the result.
    ///
    /// Service-side failures are not retried: a rejected graph fails the
    /// same way every time, and the caller decides whether a transport
    /// failure is worth re-submitting a potentially expensive computation.
    pub async fn evaluate(&self, expr: &Expr) -> Result<Value> {
        let body = serde_json::json!({ "expression": expr.to_json() });
        debug!(endpoint = %self.options.endpoint, "evaluate");

        let resp = self
            .client
            .post(&self.options.endpoint)
            .bearer_auth(&self.credentials.refresh_token)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CloudError::Network(format!(
                "evaluation returned HTTP {}: {}",
                status,
                body.chars().take(500).collect::<String>()
            )));
        }

        let parsed: EvaluateResponse = resp
            .json()
            .await
            .map_err(|e| CloudError::Network(format!("parsing evaluation response: {e}")))?;
        Ok(parsed.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_deserializes_nested_values() {
        let parsed: EvaluateResponse =
            serde_json::from_str(r#"{ "result": { "a": [1, 2.5, null] } }"#).unwrap();
        assert_eq!(
            parsed.result,
            Value::Dict(
                [(
                    "a".to_string(),
                    Value::List(vec![Value::Int(1), Value::Float(2.5), Value::Null])
                )]
                .into_iter()
                .collect()
            )
        );
    }
}
