//! Server-side include and forward through the owning dispatch table.

use crate::error::DispatchError;
use crate::http::{Request, Response};
use crate::routing::table::DispatchTable;

/// Dispatcher bound to one path of a dispatch table.
#[derive(Clone)]
pub struct RequestDispatcher {
    table: DispatchTable,
    path: String,
    query: Option<String>,
}

impl RequestDispatcher {
    /// `path` may carry a query string. Returns `None` for paths not starting with `/`.
    pub(crate) fn new(table: DispatchTable, path: &str) -> Option<Self> {
        if !path.starts_with('/') {
            return None;
        }
        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (path, None),
        };
        Some(Self {
            table,
            path: path.to_string(),
            query,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Run the target into `response` without touching the caller's path view.
    ///
    /// The target sees the include attributes; its own servlet path and
    /// path-info come from them rather than from the outer match.
    pub async fn include(
        &self,
        request: &mut Request,
        response: &mut Response,
    ) -> Result<(), DispatchError> {
        let dispatch = self
            .table
            .lookup(&self.path)
            .ok_or_else(|| DispatchError::NotFound(self.path.clone()))?;

        let context_path = self.table.attributes().base_path().to_string();
        let request_uri = format!("{context_path}{}", self.path);
        let saved = request.begin_include(
            &request_uri,
            &context_path,
            dispatch.route(),
            self.query.as_deref(),
        );
        tracing::debug!(path = %self.path, alias = %dispatch.route().alias, "Including");

        let result = dispatch.invoke_target(request, response).await;
        request.end_include(saved);
        result
    }

    /// Hand the request over to the target, discarding anything buffered so far.
    pub async fn forward(
        &self,
        request: &mut Request,
        response: &mut Response,
    ) -> Result<(), DispatchError> {
        if !response.reset() {
            tracing::warn!(path = %self.path, "Forward after response was committed");
            return Ok(());
        }
        let dispatch = self
            .table
            .lookup(&self.path)
            .ok_or_else(|| DispatchError::NotFound(self.path.clone()))?;

        let previous = request.set_route(dispatch.route().clone());
        let result = dispatch.invoke_target(request, response).await;
        request.restore_route(previous);
        result
    }
}
