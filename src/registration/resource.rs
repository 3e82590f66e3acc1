//! Static resources resolved through the registration's context.
//!
//! # Responsibilities
//! - Map the path-info under the alias onto a resource name
//! - Answer conditional GETs (weak ETag first, then If-Modified-Since)
//! - Stream the body and keep `Content-Length` truthful
//!
//! # Design Decisions
//! - Only GET, POST and HEAD are served; anything else is 405
//! - Header dates have second granularity, so If-Modified-Since gets 999ms slack
//! - A zero-length resource is probed once to tell an empty file from a directory

use std::io;

use axum::http::{header, Method, StatusCode};

use crate::context::{ContainerContext, ContextFacade};
use crate::error::DispatchError;
use crate::http::date::parse_http_date;
use crate::http::{Request, Response};

/// Tolerance for sub-second modification times against second-granular headers.
const IF_MODIFIED_SINCE_SLACK_MS: i64 = 999;

/// Serves resources named `prefix + path-info`.
#[derive(Debug, Clone)]
pub struct ResourceHandler {
    prefix: String,
}

impl ResourceHandler {
    /// `/` is the empty prefix.
    pub fn new(prefix: &str) -> Self {
        let prefix = if prefix == "/" { "" } else { prefix };
        Self {
            prefix: prefix.to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn resource_name(&self, request: &Request) -> String {
        format!("{}{}", self.prefix, request.path_info().unwrap_or_default())
    }

    pub(crate) async fn serve(
        &self,
        context: &ContextFacade,
        request: &Request,
        response: &mut Response,
    ) -> Result<(), DispatchError> {
        let method = request.method();
        if method != Method::GET && method != Method::POST && method != Method::HEAD {
            return Err(DispatchError::MethodNotAllowed(method.clone()));
        }

        let name = self.resource_name(request);
        let Some(url) = context.resource(&name) else {
            tracing::debug!(resource = %name, "Resource not resolved");
            return Err(DispatchError::NotFound(name));
        };

        let connection = match context.http_context().open_resource(&url).await {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(DispatchError::NotFound(name));
            }
            Err(e) => return Err(e.into()),
        };

        let content_length = connection.content_length();
        if content_length == Some(0) {
            // an empty file opens, a directory does not
            if connection.open_stream().await.is_err() {
                return Err(DispatchError::NotFound(name));
            }
        }

        let last_modified = connection.last_modified();
        if last_modified > 0 {
            response.set_date_header(header::LAST_MODIFIED, last_modified);
        }

        let etag = content_length
            .filter(|_| last_modified > 0)
            .map(|length| format!("W/\"{length}-{last_modified}\""));
        if let Some(etag) = &etag {
            response.set_header(header::ETAG, etag);
            if request
                .header(header::IF_NONE_MATCH.as_str())
                .is_some_and(|v| v.contains(etag.as_str()))
            {
                response.set_status(StatusCode::NOT_MODIFIED);
                return Ok(());
            }
        }

        let if_modified_since = request
            .header(header::IF_MODIFIED_SINCE.as_str())
            .and_then(parse_http_date);
        if let Some(since) = if_modified_since {
            if last_modified > 0 && last_modified <= since + IF_MODIFIED_SINCE_SLACK_MS {
                response.set_status(StatusCode::NOT_MODIFIED);
                return Ok(());
            }
        }

        if let Some(content_type) = context.mime_type(&name) {
            response.set_content_type(&content_type);
        }
        if let Some(length) = content_length {
            response.set_content_length(length);
        }
        if method == Method::HEAD {
            return Ok(());
        }

        let mut stream = connection.open_stream().await?;
        let written = response.write_from(&mut stream).await?;
        if content_length != Some(written) {
            tracing::debug!(
                resource = %name,
                declared = ?content_length,
                written,
                "Correcting Content-Length"
            );
            response.set_content_length(written);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RouteMatch;

    #[test]
    fn test_resource_name() {
        let handler = ResourceHandler::new("/static");
        let mut req = Request::new(Method::GET, "/files/css/site.css");
        req.set_route(RouteMatch::new("/files", "/files/css/site.css"));
        assert_eq!(handler.resource_name(&req), "/static/css/site.css");

        let root = ResourceHandler::new("/");
        assert_eq!(root.prefix(), "");
        assert_eq!(root.resource_name(&req), "/css/site.css");
    }
}
