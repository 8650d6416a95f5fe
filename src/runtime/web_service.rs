//! Asynchronous web service built on an oracle.
//!
//! Each request becomes a [`WebServiceCommand`]: the HTTP exchange happens
//! in `execute` on a worker thread, and the success or failure callback
//! fires from `commit`. Callbacks typically forward the result to the
//! application's own event loop.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use thiserror::Error;

use crate::core::{AppResult, Command, Oracle, OracleError, WorkerContext};

/// HTTP headers, ordered for stable logging.
pub type Headers = BTreeMap<String, String>;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET.
    Get,
    /// POST.
    Post,
    /// PUT.
    Put,
    /// DELETE.
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// A request to be performed by an [`HttpTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: HttpMethod,
    /// Absolute URI.
    pub uri: String,
    /// Request headers.
    pub headers: Headers,
    /// Request body; empty for GET and DELETE.
    pub body: Vec<u8>,
    /// Timeout the transport should enforce.
    pub timeout: Duration,
}

impl HttpRequest {
    /// Request with no headers, an empty body and the default timeout.
    pub fn new(method: HttpMethod, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Headers::new(),
            body: Vec::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Merge a header map; existing keys are overwritten.
    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Response returned by an [`HttpTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers.
    pub headers: Headers,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Response with the given status and body and no headers.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: body.into(),
        }
    }

    /// True for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Why a request did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpFailure {
    /// The transport could not complete the exchange.
    #[error("{method} {uri} failed: {message}")]
    Transport {
        /// Method of the request.
        method: HttpMethod,
        /// URI of the request.
        uri: String,
        /// Transport error text.
        message: String,
    },
    /// The server answered with a non-2xx status.
    #[error("{method} {uri} returned HTTP {status}")]
    Status {
        /// Method of the request.
        method: HttpMethod,
        /// URI of the request.
        uri: String,
        /// Status code.
        status: u16,
        /// Response body.
        body: Vec<u8>,
    },
    /// The request was never sent because the oracle stopped first.
    #[error("{method} {uri} abandoned before it was sent")]
    Abandoned {
        /// Method of the request.
        method: HttpMethod,
        /// URI of the request.
        uri: String,
    },
}

/// Blocking HTTP client used by worker threads.
///
/// One transport is shared by all workers of an oracle, so it must be
/// thread-safe. Implementations should honour [`HttpRequest::timeout`].
pub trait HttpTransport: Send + Sync + 'static {
    /// Perform the exchange.
    ///
    /// # Errors
    ///
    /// Network, protocol or timeout failures. Non-2xx answers are not errors.
    fn send(&self, request: &HttpRequest) -> AppResult<HttpResponse>;
}

type SuccessCallback = Box<dyn FnOnce(HttpResponse) + Send>;
type FailureCallback = Box<dyn FnOnce(HttpFailure) + Send>;

/// Command performing one HTTP request.
pub struct WebServiceCommand {
    transport: Arc<dyn HttpTransport>,
    request: HttpRequest,
    label: String,
    on_success: SuccessCallback,
    on_failure: Option<FailureCallback>,
    result: Option<Result<HttpResponse, HttpFailure>>,
}

impl WebServiceCommand {
    /// Build a command. Without a failure callback, failures are only logged
    /// by the worker.
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        request: HttpRequest,
        on_success: impl FnOnce(HttpResponse) + Send + 'static,
        on_failure: Option<Box<dyn FnOnce(HttpFailure) + Send>>,
    ) -> Self {
        let label = format!("{} {}", request.method, request.uri);
        Self {
            transport,
            request,
            label,
            on_success: Box::new(on_success),
            on_failure,
            result: None,
        }
    }

    /// The request this command performs.
    #[must_use]
    pub const fn request(&self) -> &HttpRequest {
        &self.request
    }
}

impl Command for WebServiceCommand {
    fn execute(&mut self, _ctx: &WorkerContext) -> AppResult<()> {
        if self.result.is_some() {
            return Err(anyhow!("{} was already executed", self.label));
        }

        let method = self.request.method;
        let uri = self.request.uri.clone();
        let outcome = match self.transport.send(&self.request) {
            Ok(response) if response.is_success() => Ok(response),
            Ok(response) => Err(HttpFailure::Status {
                method,
                uri,
                status: response.status,
                body: response.body,
            }),
            Err(e) => Err(HttpFailure::Transport {
                method,
                uri,
                message: format!("{e:#}"),
            }),
        };

        let reported = outcome.as_ref().err().map(ToString::to_string);
        self.result = Some(outcome);
        match reported {
            Some(message) => Err(anyhow!(message)),
            None => Ok(()),
        }
    }

    fn commit(self: Box<Self>) {
        let this = *self;
        match this.result {
            Some(Ok(response)) => (this.on_success)(response),
            Some(Err(failure)) => {
                if let Some(on_failure) = this.on_failure {
                    on_failure(failure);
                }
            }
            None => {
                if let Some(on_failure) = this.on_failure {
                    on_failure(HttpFailure::Transport {
                        method: this.request.method,
                        uri: this.request.uri,
                        message: "request did not complete".into(),
                    });
                }
            }
        }
    }

    fn abandon(self: Box<Self>) {
        let this = *self;
        if let Some(on_failure) = this.on_failure {
            on_failure(HttpFailure::Abandoned {
                method: this.request.method,
                uri: this.request.uri,
            });
        }
    }

    fn name(&self) -> &str {
        &self.label
    }
}

/// Web service that runs every request on an oracle's workers.
pub struct OracleWebService {
    oracle: Arc<Oracle>,
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    default_headers: Headers,
    timeout: Duration,
}

impl fmt::Debug for OracleWebService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleWebService")
            .field("oracle", &self.oracle)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl OracleWebService {
    /// Create a web service. `base_url` is prefixed to every relative URI.
    pub fn new(
        oracle: Arc<Oracle>,
        transport: Arc<dyn HttpTransport>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            oracle,
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_headers: Headers::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Headers added to every request, e.g. credentials.
    #[must_use]
    pub fn with_default_headers(mut self, headers: Headers) -> Self {
        self.default_headers = headers;
        self
    }

    /// Timeout applied to every request.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The underlying oracle.
    #[must_use]
    pub const fn oracle(&self) -> &Arc<Oracle> {
        &self.oracle
    }

    /// Start the oracle.
    ///
    /// # Errors
    ///
    /// Same as [`Oracle::start`].
    pub fn start(&self) -> Result<(), OracleError> {
        self.oracle.start()
    }

    /// Stop the oracle.
    ///
    /// # Errors
    ///
    /// Same as [`Oracle::stop`].
    pub fn stop(&self) -> Result<(), OracleError> {
        self.oracle.stop()
    }

    /// Schedule a GET request.
    pub fn get_async(
        &self,
        uri: &str,
        headers: Headers,
        on_success: impl FnOnce(HttpResponse) + Send + 'static,
        on_failure: Option<Box<dyn FnOnce(HttpFailure) + Send>>,
    ) {
        let request = self.build(HttpMethod::Get, uri, headers, Vec::new());
        self.schedule(request, on_success, on_failure);
    }

    /// Schedule a POST request.
    pub fn post_async(
        &self,
        uri: &str,
        headers: Headers,
        body: impl Into<Vec<u8>>,
        on_success: impl FnOnce(HttpResponse) + Send + 'static,
        on_failure: Option<Box<dyn FnOnce(HttpFailure) + Send>>,
    ) {
        let request = self.build(HttpMethod::Post, uri, headers, body.into());
        self.schedule(request, on_success, on_failure);
    }

    /// Schedule a PUT request.
    pub fn put_async(
        &self,
        uri: &str,
        headers: Headers,
        body: impl Into<Vec<u8>>,
        on_success: impl FnOnce(HttpResponse) + Send + 'static,
        on_failure: Option<Box<dyn FnOnce(HttpFailure) + Send>>,
    ) {
        let request = self.build(HttpMethod::Put, uri, headers, body.into());
        self.schedule(request, on_success, on_failure);
    }

    /// Schedule a DELETE request.
    pub fn delete_async(
        &self,
        uri: &str,
        headers: Headers,
        on_success: impl FnOnce(HttpResponse) + Send + 'static,
        on_failure: Option<Box<dyn FnOnce(HttpFailure) + Send>>,
    ) {
        let request = self.build(HttpMethod::Delete, uri, headers, Vec::new());
        self.schedule(request, on_success, on_failure);
    }

    fn build(&self, method: HttpMethod, uri: &str, headers: Headers, body: Vec<u8>) -> HttpRequest {
        HttpRequest::new(method, self.resolve(uri))
            .with_headers(self.default_headers.clone())
            .with_headers(headers)
            .with_body(body)
            .with_timeout(self.timeout)
    }

    fn resolve(&self, uri: &str) -> String {
        if uri.starts_with("http://") || uri.starts_with("https://") || self.base_url.is_empty() {
            uri.to_string()
        } else if uri.starts_with('/') {
            format!("{}{uri}", self.base_url)
        } else {
            format!("{}/{uri}", self.base_url)
        }
    }

    fn schedule(
        &self,
        request: HttpRequest,
        on_success: impl FnOnce(HttpResponse) + Send + 'static,
        on_failure: Option<Box<dyn FnOnce(HttpFailure) + Send>>,
    ) {
        let command =
            WebServiceCommand::new(Arc::clone(&self.transport), request, on_success, on_failure);
        self.oracle.submit(Box::new(command));
    }
}
