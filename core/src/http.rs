//! HTTP plumbing: plain-data requests and responses, a pluggable transport,
//! and the header-stamping client the service talks to.
//!
//! # Design
//! Requests and responses are described as plain owned data. A `Transport`
//! executes them; `UreqTransport` does so over the network, tests script
//! their own. `HttpClient` adds the fixed header set and turns a response
//! into a body string or raw bytes. It does not look at application error
//! codes: those arrive inside the JSON body and belong to the service.

use std::sync::Arc;

use tracing::debug;

use crate::config::ServiceConfig;
use crate::error::TransportError;

pub const USER_AGENT: &str = "user-agent";
pub const CONTENT_TYPE: &str = "content-type";
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Ordered form parameters, `(name, value)`.
pub type FormParams = Vec<(String, String)>;

/// An HTTP request described as plain data.
///
/// A `Post` sends `form` url-encoded; a `Get` ignores it.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub form: FormParams,
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes one HTTP exchange.
///
/// Implementations must be shareable between the worker threads of a
/// multi-page query. Every HTTP status counts as success here; only
/// connectivity and protocol failures are errors.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Network transport backed by a `ureq` agent.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(config: &ServiceConfig) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_connect(Some(config.connect_timeout()))
            .timeout_global(Some(config.request_timeout()))
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let connection = |e: ureq::Error| TransportError::Connection {
            url: request.url.clone(),
            message: e.to_string(),
        };

        let mut response = match request.method {
            HttpMethod::Get => {
                let mut builder = self.agent.get(&request.url);
                for (key, value) in &request.headers {
                    builder = builder.header(key.as_str(), value.as_str());
                }
                builder.call()
            }
            HttpMethod::Post => {
                let mut builder = self.agent.post(&request.url);
                // send_form sets the content type itself
                for (key, value) in request.headers.iter().filter(|(key, _)| key != CONTENT_TYPE) {
                    builder = builder.header(key.as_str(), value.as_str());
                }
                builder.send_form(request.form.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            }
        }
        .map_err(connection)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.body_mut().read_to_vec().map_err(connection)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Stamps every request with the fixed header set and hands it to the
/// transport.
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    headers: Vec<(String, String)>,
}

impl HttpClient {
    pub fn new(transport: Arc<dyn Transport>, user_agent: &str) -> Self {
        Self {
            transport,
            headers: vec![(USER_AGENT.to_string(), user_agent.to_string())],
        }
    }

    /// Build a form POST carrying the fixed headers.
    pub fn form_request(&self, url: &str, form: FormParams) -> HttpRequest {
        let mut headers = self.headers.clone();
        headers.push((CONTENT_TYPE.to_string(), FORM_URLENCODED.to_string()));
        HttpRequest {
            method: HttpMethod::Post,
            url: url.to_string(),
            headers,
            form,
        }
    }

    /// POST `form` url-encoded and return the body text, whatever the
    /// status code.
    pub fn post_form(&self, url: &str, form: FormParams) -> Result<String, TransportError> {
        let request = self.form_request(url, form);
        debug!(url, params = request.form.len(), "POST");
        let response = self.transport.execute(&request)?;
        debug!(url, status = response.status, bytes = response.body.len(), "response");
        String::from_utf8(response.body).map_err(|_| TransportError::Decode {
            url: url.to_string(),
        })
    }

    /// GET raw bytes. A non-2xx status is an error since the body is then
    /// not the requested resource.
    pub fn get_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let request = HttpRequest {
            method: HttpMethod::Get,
            url: url.to_string(),
            headers: self.headers.clone(),
            form: Vec::new(),
        };
        debug!(url, "GET");
        let response = self.transport.execute(&request)?;
        if !response.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: response.status,
            });
        }
        Ok(response.body)
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
