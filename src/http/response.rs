//! Buffered response written by registrations.
//!
//! # Responsibilities
//! - Collect status, headers and body produced by the chain
//! - Convert into an axum response for the transport
//!
//! # Design Decisions
//! - Body is buffered; the transport streams it after the chain returns
//! - `send_error` commits the response so later stages can tell it was finalized

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use tokio::io::AsyncRead;

use crate::http::date::format_http_date;

/// Response under construction.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    committed: bool,
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
            committed: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Replace a header. Values that are not valid header text are dropped.
    pub fn set_header(&mut self, name: HeaderName, value: &str) {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(_) => tracing::warn!(header = %name, "Dropping invalid header value"),
        }
    }

    pub fn set_content_type(&mut self, content_type: &str) {
        self.set_header(header::CONTENT_TYPE, content_type);
    }

    pub fn set_content_length(&mut self, length: u64) {
        self.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header(header::CONTENT_LENGTH.as_str())
            .and_then(|v| v.parse().ok())
    }

    /// Set a date header from epoch milliseconds.
    pub fn set_date_header(&mut self, name: HeaderName, millis: i64) {
        if let Some(date) = format_http_date(millis) {
            self.set_header(name, &date);
        }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    /// Drain `reader` into the body, returning the number of bytes copied.
    pub async fn write_from<R>(&mut self, reader: &mut R) -> std::io::Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        tokio::io::copy(reader, &mut self.body).await
    }

    /// Finalize with an error status and a short text body.
    pub fn send_error(&mut self, status: StatusCode) {
        self.status = status;
        self.headers.remove(axum::http::header::CONTENT_LENGTH);
        self.body.clear();
        self.body
            .extend_from_slice(status.canonical_reason().unwrap_or_default().as_bytes());
        self.set_content_type("text/plain; charset=utf-8");
        self.committed = true;
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Clear status, headers and body. Has no effect once committed.
    pub fn reset(&mut self) -> bool {
        if self.committed {
            return false;
        }
        self.status = StatusCode::OK;
        self.headers.clear();
        self.body.clear();
        true
    }

    pub fn into_http(self) -> axum::response::Response {
        let mut response = axum::response::Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}
