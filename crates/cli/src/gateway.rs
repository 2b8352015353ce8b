// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Remote gateway abstraction.
//!
//! Provides a trait-based boundary to the remote service that enables:
//! - An HTTP gateway for production
//! - Scripted gateways for unit testing
//!
//! Every call resolves to an [`Outcome`]. Transport failures never escape
//! as errors; they are classified so the caller can decide between
//! queueing, retrying and surfacing.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use fl_core::{duration_ms, MutationKind, MutationOperation};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::RemoteConfig;
use crate::error::{Error, Result};

/// Header carrying the operation id so the remote can drop duplicate replays.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Boxed future returned by gateway calls.
pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Classified result of a remote call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The remote accepted the call. Carries the response body, or
    /// `Value::Null` when the remote sent none.
    Success(Value),
    /// No usable answer: refused connection, timeout or broken transport.
    ConnectivityFailure,
    /// The remote rejected our credentials.
    AuthFailure,
    /// The remote answered with a non-auth error status.
    RemoteFailure(u16),
}

impl Outcome {
    /// Converts a non-success outcome into the matching error.
    pub fn into_result(self) -> Result<Value> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::ConnectivityFailure => Err(Error::Connectivity),
            Outcome::AuthFailure => Err(Error::Auth { id: None }),
            Outcome::RemoteFailure(code) => Err(Error::Remote { code }),
        }
    }
}

/// Classifies an HTTP status code.
///
/// 2xx is success, 401/403 are auth failures, 408 and 429 are treated as
/// connectivity trouble, and everything else is a remote failure.
pub fn classify_status(code: u16, body: Value) -> Outcome {
    match code {
        200..=299 => Outcome::Success(body),
        401 | 403 => Outcome::AuthFailure,
        408 | 429 => Outcome::ConnectivityFailure,
        _ => Outcome::RemoteFailure(code),
    }
}

/// Remote service boundary.
///
/// This trait abstracts over the actual transport, allowing the sync
/// engine and offline client to be tested with scripted implementations.
pub trait Gateway: Send + Sync {
    /// Apply a mutation to the remote.
    fn apply<'a>(&'a self, op: &'a MutationOperation) -> GatewayFuture<'a, Outcome>;

    /// Fetch the current remote value for a key.
    fn read<'a>(&'a self, key: &'a str) -> GatewayFuture<'a, Outcome>;

    /// Cheap reachability check. Returns true if the remote answered.
    fn probe(&self) -> GatewayFuture<'_, bool>;
}

/// HTTP gateway built on reqwest.
///
/// Mutations map to `POST`/`PUT`/`DELETE` on `{url}/{target}`, reads to
/// `GET {url}/{key}`, and probes to `GET {url}/{probe_path}`.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    probe_path: String,
    timeout: Duration,
}

impl HttpGateway {
    /// Create a gateway from the remote configuration.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        if let Some(msg) = config.validate_url() {
            return Err(Error::Config(msg));
        }
        let timeout = config.request_timeout();
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(concat!("fitlog/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(HttpGateway {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            probe_path: config.probe_path.clone(),
            timeout,
        })
    }

    /// Returns the full URL for a resource path.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.request(method, self.url_for(path));
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Outcome {
        let response = match tokio::time::timeout(self.timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                debug!(error = %e, "request failed");
                return Outcome::ConnectivityFailure;
            }
            Err(_) => {
                debug!(timeout_ms = duration_ms(self.timeout), "request timed out");
                return Outcome::ConnectivityFailure;
            }
        };

        let code = response.status().as_u16();
        if !response.status().is_success() {
            return classify_status(code, Value::Null);
        }

        match tokio::time::timeout(self.timeout, response.bytes()).await {
            Ok(Ok(bytes)) => classify_status(code, decode_body(&bytes)),
            Ok(Err(e)) => {
                debug!(error = %e, "failed to read response body");
                Outcome::ConnectivityFailure
            }
            Err(_) => Outcome::ConnectivityFailure,
        }
    }
}

/// Decodes a response body. Empty bodies become `Null`; bodies that are not
/// JSON are kept as a string.
pub(crate) fn decode_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

impl Gateway for HttpGateway {
    fn apply<'a>(&'a self, op: &'a MutationOperation) -> GatewayFuture<'a, Outcome> {
        Box::pin(async move {
            let method = match op.kind {
                MutationKind::Create => reqwest::Method::POST,
                MutationKind::Update => reqwest::Method::PUT,
                MutationKind::Delete => reqwest::Method::DELETE,
            };
            let mut request = self
                .request(method, &op.target)
                .header(IDEMPOTENCY_HEADER, op.id.as_str());
            if let Some(payload) = &op.payload {
                request = request.json(payload);
            }
            let outcome = self.send(request).await;
            if let Outcome::RemoteFailure(code) = outcome {
                warn!(id = %op.id, resource = %op.target, code, "remote rejected mutation");
            }
            outcome
        })
    }

    fn read<'a>(&'a self, key: &'a str) -> GatewayFuture<'a, Outcome> {
        Box::pin(async move { self.send(self.request(reqwest::Method::GET, key)).await })
    }

    fn probe(&self) -> GatewayFuture<'_, bool> {
        Box::pin(async move {
            let outcome = self
                .send(self.request(reqwest::Method::GET, &self.probe_path))
                .await;
            // Any answer below 5xx means the service is up.
            match outcome {
                Outcome::Success(_) | Outcome::AuthFailure => true,
                Outcome::RemoteFailure(code) => code < 500,
                Outcome::ConnectivityFailure => false,
            }
        })
    }
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;
