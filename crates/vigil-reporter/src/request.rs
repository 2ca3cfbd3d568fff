//! Timed HTTP requests against the collector.
//!
//! A single attempt per call: the transport future is bounded by a deadline
//! and dropped (aborting the in-flight request) once it elapses. Non-success
//! responses are turned into [`ReporterError::Http`] carrying a readable
//! message.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Request, Response};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};
use hyper::ext::ReasonPhrase;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

use crate::error::ReporterError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body of a collector response, left unread on success.
pub type ResponseBody = UnsyncBoxBody<Bytes, BoxError>;

pub type HttpResponse = Response<ResponseBody>;

/// Turns a failed response into an error message.
pub type FormatErrorFn = Arc<dyn Fn(HttpResponse) -> BoxFuture<'static, String> + Send + Sync>;

/// Sends one HTTP request and yields the response head with its body.
pub trait Transport: Send + Sync {
    fn send(&self, request: Request<Bytes>) -> BoxFuture<'_, Result<HttpResponse, ReporterError>>;
}

/// Wrap an in-memory payload as a [`ResponseBody`].
pub fn full_body(bytes: impl Into<Bytes>) -> ResponseBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Default transport: hyper's pooled HTTP/1 client.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HyperTransport {
    pub fn new() -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HyperTransport {
    fn send(&self, request: Request<Bytes>) -> BoxFuture<'_, Result<HttpResponse, ReporterError>> {
        let request = request.map(Full::new);
        Box::pin(async move {
            let response = self.client.request(request).await.map_err(|e| {
                let detail = match std::error::Error::source(&e) {
                    Some(source) => format!("{e}: {source}"),
                    None => e.to_string(),
                };
                ReporterError::Request(detail)
            })?;
            Ok(response.map(|body| body.map_err(|e| Box::new(e) as BoxError).boxed_unsync()))
        })
    }
}

/// Execute `request` through `transport`, failing once `timeout` elapses.
///
/// 2xx and 3xx responses are returned untouched. Anything else becomes an
/// [`ReporterError::Http`] whose message comes from `format_error`, or from
/// [`default_format_error`] when none is given.
pub async fn execute(
    transport: &dyn Transport,
    request: Request<Bytes>,
    timeout: Duration,
    format_error: Option<&FormatErrorFn>,
) -> Result<HttpResponse, ReporterError> {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = match tokio::time::timeout(timeout, transport.send(request)).await {
        Ok(result) => result?,
        Err(_) => {
            debug!(%method, %uri, timeout_ms = timeout.as_millis() as u64, "collector request timed out");
            return Err(ReporterError::Timeout(timeout));
        }
    };

    let status = response.status();
    if status.is_success() || status.is_redirection() {
        return Ok(response);
    }

    debug!(%method, %uri, %status, "collector rejected request");
    let message = match format_error {
        Some(format) => format(response).await,
        None => default_format_error(response).await,
    };
    Err(ReporterError::Http { status, message })
}

/// `"{reason} ({code})"`, followed by `": {body}"` unless the response is HTML.
///
/// The reason is the phrase sent by the server, else the canonical one for
/// the status. The body is read best-effort; a read failure drops the detail.
pub async fn default_format_error(response: HttpResponse) -> String {
    let status = response.status();
    let reason = match response.extensions().get::<ReasonPhrase>() {
        Some(phrase) => String::from_utf8_lossy(phrase.as_bytes()).into_owned(),
        None => status.canonical_reason().unwrap_or_default().to_string(),
    };
    let mut message = if reason.is_empty() {
        format!("({})", status.as_u16())
    } else {
        format!("{reason} ({})", status.as_u16())
    };

    let is_html = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("text/html"));
    if is_html {
        return message;
    }

    match response.into_body().collect().await {
        Ok(collected) => {
            message.push_str(": ");
            message.push_str(&String::from_utf8_lossy(&collected.to_bytes()));
        }
        Err(e) => debug!(error = %e, "failed to read collector error body"),
    }
    message
}
