//! Node transport and RPC endpoint rotation.
//!
//! Every chain is configured with an ordered endpoint list. A unit of work
//! (height query, block fetch) is tried against each endpoint exactly once
//! per call, in list order, with a short delay between attempts so a
//! struggling node is not hammered. Transport failures rotate to the next
//! endpoint; decode failures on a well-formed response are adapter bugs and
//! abort immediately instead of being retried.
//!
//! The rotator is stateless across calls — no endpoint health memory.

use std::time::Duration;

use serde_json::{Value, json};
use thiserror::Error;

/// Per-request timeout for node calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay between consecutive endpoint attempts.
const ROTATE_DELAY: Duration = Duration::from_secs(1);

/// A structurally valid response whose payload did not match the expected
/// shape. Never retried — retrying a decode bug just re-decodes the bug.
#[derive(Debug, Error)]
#[error("malformed {what} payload: {message}")]
pub struct DecodeError {
    /// What was being decoded, e.g. `block`.
    pub what: &'static str,
    /// Underlying decode failure.
    pub message: String,
}

/// Outcome of one unit of work against one endpoint.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// Network error, timeout, non-2xx status, unparsable body, RPC error
    /// member or empty result. Recoverable by rotating endpoints.
    #[error("{0}")]
    Transport(String),

    /// The endpoint answered but the payload shape is wrong.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Failure of a whole rotation pass.
#[derive(Debug, Error)]
pub enum RotateError {
    /// Every configured endpoint failed. Distinct from a decoded-but-empty
    /// result, which is a valid success.
    #[error("all configured rpc endpoints failed")]
    Exhausted,

    /// A payload decode failed; rotation was aborted.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Run `work` against each endpoint in order until one succeeds.
///
/// Transport failures are logged as warnings tagged with the service, chain
/// and endpoint, then the next endpoint is tried after [`ROTATE_DELAY`].
///
/// # Errors
///
/// [`RotateError::Exhausted`] when every endpoint failed;
/// [`RotateError::Decode`] as soon as any endpoint returns a malformed
/// payload.
pub async fn rotate<T>(
    service: &'static str,
    chain: &str,
    endpoints: &[String],
    work: impl AsyncFn(&str) -> Result<T, AttemptError>,
) -> Result<T, RotateError> {
    for (index, rpc) in endpoints.iter().enumerate() {
        match work(rpc.as_str()).await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Decode(error)) => return Err(RotateError::Decode(error)),
            Err(AttemptError::Transport(error)) => {
                tracing::warn!(service, chain, rpc = %rpc, %error, "failed to get data from rpc");
                if index + 1 < endpoints.len() {
                    tokio::time::sleep(ROTATE_DELAY).await;
                }
            }
        }
    }

    Err(RotateError::Exhausted)
}

/// Thin HTTP client speaking JSON-RPC 2.0 and plain REST.
#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
}

impl RpcClient {
    /// Build a client with the fixed per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns the underlying builder error when the TLS backend cannot be
    /// initialized.
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?,
        })
    }

    /// Issue one JSON-RPC 2.0 call and return its `result` member.
    ///
    /// # Errors
    ///
    /// [`AttemptError::Transport`] for network failures, non-2xx statuses,
    /// unparsable bodies, RPC `error` members and missing/null results.
    pub async fn call(&self, url: &str, method: &str, params: Value) -> Result<Value, AttemptError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Transport(format!("http status {status}")));
        }

        let body: Value = response.json().await.map_err(transport)?;
        if let Some(error) = body.get("error").filter(|error| !error.is_null()) {
            return Err(AttemptError::Transport(format!("rpc error: {error}")));
        }

        match body.get("result") {
            Some(result) if !result.is_null() => Ok(result.clone()),
            _ => Err(AttemptError::Transport("empty rpc result".to_owned())),
        }
    }

    /// Issue one REST GET and return the JSON body (Aptos node API).
    ///
    /// # Errors
    ///
    /// [`AttemptError::Transport`] for network failures, non-2xx statuses
    /// and unparsable bodies.
    pub async fn get(&self, url: &str) -> Result<Value, AttemptError> {
        let response = self.http.get(url).send().await.map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Transport(format!("http status {status}")));
        }

        response.json().await.map_err(transport)
    }
}

fn transport(error: reqwest::Error) -> AttemptError {
    AttemptError::Transport(error.to_string())
}
