//! Channel handlers: one per provider.
//!
//! A handler turns inbound webhook requests into canonical events (`receive`) and
//! drives outgoing messages through the provider's HTTP API (`send`). Handlers hold
//! no per-request state so one instance serves every channel of its type.

mod clicksend;
mod tembachat;

pub use clicksend::ClickSendHandler;
pub use tembachat::TembaChatHandler;

use crate::error::{Error, Result};
use crate::msg::{Channel, ChannelType, Event, IncomingMessage, OutgoingMessage};
use crate::status::{StatusErrorKind, StatusUpdate};
use crate::urn::{Urn, TEL_SCHEME};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Inbound action every handler serves.
pub const ACTION_RECEIVE: &str = "receive";
/// Inbound action for delivery receipts.
pub const ACTION_STATUS: &str = "status";

pub const CONFIG_USERNAME: &str = "username";
pub const CONFIG_PASSWORD: &str = "password";
pub const CONFIG_SEND_URL: &str = "send_url";

const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ERROR_BODY: usize = 256;

/// Provider integration contract.
#[async_trait]
pub trait ChannelHandler: Send + Sync {
    /// Channel type code this handler serves (e.g. "CS").
    fn channel_type(&self) -> ChannelType;

    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// Inbound actions this handler accepts (path segment after the channel uuid).
    fn actions(&self) -> &[&'static str] {
        &[ACTION_RECEIVE]
    }

    /// Parse an inbound request. Unknown payload shapes fail with `UnrecognizedPayload`.
    async fn receive(
        &self,
        channel: &Channel,
        action: &str,
        request: &InboundRequest,
    ) -> Result<Vec<Event>>;

    /// Make one send attempt. Provider failures are reported in the returned status;
    /// `Err` is reserved for missing configuration and malformed requests.
    async fn send(
        &self,
        ctx: &SendContext,
        channel: &Channel,
        msg: &OutgoingMessage,
    ) -> Result<StatusUpdate>;
}

/// Every built-in handler.
pub fn builtin() -> Vec<Arc<dyn ChannelHandler>> {
    vec![
        Arc::new(ClickSendHandler::new()),
        Arc::new(TembaChatHandler::new()),
    ]
}

/// Raw inbound webhook request as handed over by the HTTP layer.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub query: Option<String>,
    pub body: Vec<u8>,
}

impl InboundRequest {
    pub fn new(method: Method, headers: HeaderMap, query: Option<String>, body: Vec<u8>) -> Self {
        Self {
            method,
            headers,
            query,
            body,
        }
    }

    /// POST with a JSON body.
    pub fn json(body: impl Into<Vec<u8>>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self::new(Method::POST, headers, None, body.into())
    }

    /// POST with a form-encoded body.
    pub fn form(body: impl Into<Vec<u8>>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        Self::new(Method::POST, headers, None, body.into())
    }

    /// GET with only a query string.
    pub fn query(query: impl Into<String>) -> Self {
        Self::new(Method::GET, HeaderMap::new(), Some(query.into()), Vec::new())
    }

    fn is_json(&self) -> bool {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"))
    }

    /// Look up a form field in the body, then in the query string.
    pub fn form_value(&self, key: &str) -> Option<String> {
        let from_body = if self.is_json() {
            None
        } else {
            find_form_value(&self.body, key)
        };
        from_body
            .or_else(|| {
                self.query
                    .as_deref()
                    .and_then(|q| find_form_value(q.as_bytes(), key))
            })
            .filter(|v| !v.is_empty())
    }

    /// Decode the body as JSON; a shape mismatch is an unrecognized payload.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| Error::unrecognized(format!("unable to parse request JSON: {}", e)))
    }
}

fn find_form_value(raw: &[u8], key: &str) -> Option<String> {
    url::form_urlencoded::parse(raw)
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.trim().to_string())
}

/// Bounds on one send attempt: a timeout per provider call and a cancellation token
/// owned by the caller.
#[derive(Debug, Clone)]
pub struct SendContext {
    timeout: Duration,
    cancel: CancellationToken,
}

impl Default for SendContext {
    fn default() -> Self {
        Self::new(DEFAULT_SEND_TIMEOUT)
    }
}

impl SendContext {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A completed provider exchange with a 2xx status.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn json<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Why a provider call did not produce a usable response.
#[derive(Debug, Clone)]
pub struct TransportFailure {
    pub kind: StatusErrorKind,
    pub detail: String,
}

impl TransportFailure {
    fn new(kind: StatusErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Record this failure on the attempt's status.
    pub fn record(self, status: &mut StatusUpdate) {
        status.record_error(self.kind, self.detail);
    }
}

/// Issue a provider request under the context's timeout and cancellation.
///
/// Cancellation wins over a response that is ready at the same time. Non-2xx
/// responses are transport failures.
pub async fn request_http(
    ctx: &SendContext,
    client: &reqwest::Client,
    request: reqwest::Request,
) -> std::result::Result<HttpResponse, TransportFailure> {
    let method = request.method().clone();
    let url = request.url().clone();
    let exchange = async {
        let resp = client.execute(request).await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        Ok::<_, reqwest::Error>((status, body.to_vec()))
    };

    let outcome = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => {
            return Err(TransportFailure::new(StatusErrorKind::Canceled, format!("request to {} canceled", url)));
        }
        r = tokio::time::timeout(ctx.timeout, exchange) => r,
    };

    let (status, body) = match outcome {
        Err(_) => {
            return Err(TransportFailure::new(
                StatusErrorKind::Timeout,
                format!("request to {} timed out after {:?}", url, ctx.timeout),
            ))
        }
        Ok(Err(e)) => {
            return Err(TransportFailure::new(
                StatusErrorKind::TransportFailure,
                format!("request to {} failed: {}", url, e),
            ))
        }
        Ok(Ok(r)) => r,
    };

    log::debug!("{} {} -> {}", method, url, status);
    if !status.is_success() {
        let text = String::from_utf8_lossy(&body);
        let snippet: String = text.chars().take(MAX_ERROR_BODY).collect();
        return Err(TransportFailure::new(
            StatusErrorKind::TransportFailure,
            format!("{} returned {}: {}", url, status, snippet),
        ));
    }
    Ok(HttpResponse { status, body })
}

/// Shared receive path for SMS-style providers posting a sender number and a text field.
pub fn receive_tel_message(
    channel: &Channel,
    request: &InboundRequest,
    from_field: &str,
    body_field: &str,
) -> Result<Vec<Event>> {
    let from = request
        .form_value(from_field)
        .ok_or_else(|| Error::invalid_address(format!("missing required field '{}'", from_field)))?;
    let urn = Urn::from_parts(TEL_SCHEME, &from)?;
    let text = request.form_value(body_field).unwrap_or_default();
    Ok(vec![Event::Message(IncomingMessage::new(channel, urn, text))])
}
