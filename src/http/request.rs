//! Request view handed to registrations.
//!
//! # Responsibilities
//! - Carry the already-parsed method, path, query, headers and body
//! - Answer servlet-path / path-info / context-path relative to the matched alias
//! - Hold per-request attributes, including the include-dispatch markers
//!
//! # Design Decisions
//! - Path components are computed once per match (`RouteMatch`), never re-derived
//! - Inside an include, the include attributes are returned as-is instead of the alias view

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{request::Parts, HeaderMap, HeaderName, HeaderValue, Method};
use bytes::Bytes;
use serde_json::Value;

use crate::context::ContextFacade;

/// Set while a request dispatcher include is in progress.
pub const INCLUDE_REQUEST_URI: &str = "alias_dispatch.include.request_uri";
pub const INCLUDE_CONTEXT_PATH: &str = "alias_dispatch.include.context_path";
pub const INCLUDE_SERVLET_PATH: &str = "alias_dispatch.include.servlet_path";
pub const INCLUDE_PATH_INFO: &str = "alias_dispatch.include.path_info";
pub const INCLUDE_QUERY_STRING: &str = "alias_dispatch.include.query_string";

pub(crate) const INCLUDE_ATTRIBUTES: [&str; 5] = [
    INCLUDE_REQUEST_URI,
    INCLUDE_CONTEXT_PATH,
    INCLUDE_SERVLET_PATH,
    INCLUDE_PATH_INFO,
    INCLUDE_QUERY_STRING,
];

/// Path split produced by a successful match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// Alias the paths are computed against (the full path for extension endpoints).
    pub alias: String,
    pub servlet_path: String,
    pub path_info: Option<String>,
}

impl RouteMatch {
    /// Split `path` relative to `alias`. `alias` must be `/` or a prefix of `path`.
    pub fn new(alias: &str, path: &str) -> Self {
        if alias == "/" {
            return Self {
                alias: alias.to_string(),
                servlet_path: String::new(),
                path_info: (!path.is_empty()).then(|| path.to_string()),
            };
        }
        let rest = path.get(alias.len()..).unwrap_or_default();
        Self {
            alias: alias.to_string(),
            servlet_path: alias.to_string(),
            path_info: (!rest.is_empty()).then(|| rest.to_string()),
        }
    }

    /// Root-alias match with an explicit path-info.
    pub fn with_path_info(alias: &str, path_info: &str) -> Self {
        Self {
            alias: alias.to_string(),
            servlet_path: String::new(),
            path_info: Some(path_info.to_string()),
        }
    }
}

/// An incoming request as seen by registrations.
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    attributes: HashMap<String, Value>,
    mount_path: String,
    context_path: String,
    route: Option<RouteMatch>,
    context: Option<Arc<ContextFacade>>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            attributes: HashMap::new(),
            mount_path: String::new(),
            context_path: String::new(),
            route: None,
            context: None,
        }
    }

    /// Build from parts already parsed by the transport.
    pub fn from_parts(parts: Parts, body: Bytes) -> Self {
        let mut req = Self::new(parts.method, parts.uri.path());
        req.query = parts.uri.query().map(str::to_string);
        req.headers = parts.headers;
        req.body = body;
        req
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Add a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Prefix under which the transport mounted the router.
    pub fn with_mount_path(mut self, mount_path: impl Into<String>) -> Self {
        self.mount_path = mount_path.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Full request path as received.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn mount_path(&self) -> &str {
        &self.mount_path
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: Value) {
        self.attributes.insert(name.into(), value);
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }

    /// True while a request dispatcher include is running.
    pub fn is_include(&self) -> bool {
        self.attributes.contains_key(INCLUDE_REQUEST_URI)
    }

    fn include_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    pub fn servlet_path(&self) -> &str {
        if self.is_include() {
            return self.include_str(INCLUDE_SERVLET_PATH).unwrap_or_default();
        }
        self.route.as_ref().map(|r| r.servlet_path.as_str()).unwrap_or_default()
    }

    pub fn path_info(&self) -> Option<&str> {
        if self.is_include() {
            return self.include_str(INCLUDE_PATH_INFO);
        }
        self.route.as_ref().and_then(|r| r.path_info.as_deref())
    }

    pub fn context_path(&self) -> &str {
        if self.is_include() {
            return self.include_str(INCLUDE_CONTEXT_PATH).unwrap_or_default();
        }
        &self.context_path
    }

    /// The path that was matched: servlet path followed by path-info.
    pub fn dispatch_path(&self) -> String {
        let mut path = self.servlet_path().to_string();
        if let Some(info) = self.path_info() {
            path.push_str(info);
        }
        path
    }

    pub fn route(&self) -> Option<&RouteMatch> {
        self.route.as_ref()
    }

    /// Context facade of the registration currently handling the request.
    pub fn context(&self) -> Option<&Arc<ContextFacade>> {
        self.context.as_ref()
    }

    pub(crate) fn set_route(&mut self, route: RouteMatch) -> Option<RouteMatch> {
        self.route.replace(route)
    }

    pub(crate) fn restore_route(&mut self, route: Option<RouteMatch>) {
        self.route = route;
    }

    pub(crate) fn set_context_path(&mut self, context_path: impl Into<String>) -> String {
        std::mem::replace(&mut self.context_path, context_path.into())
    }

    pub(crate) fn swap_context(
        &mut self,
        context: Option<Arc<ContextFacade>>,
    ) -> Option<Arc<ContextFacade>> {
        std::mem::replace(&mut self.context, context)
    }

    /// Install include attributes, returning whatever they replaced.
    pub(crate) fn begin_include(
        &mut self,
        request_uri: &str,
        context_path: &str,
        route: &RouteMatch,
        query: Option<&str>,
    ) -> Vec<(&'static str, Option<Value>)> {
        let saved = INCLUDE_ATTRIBUTES
            .iter()
            .map(|name| (*name, self.attributes.remove(*name)))
            .collect();
        self.set_attribute(INCLUDE_REQUEST_URI, Value::from(request_uri));
        self.set_attribute(INCLUDE_CONTEXT_PATH, Value::from(context_path));
        self.set_attribute(INCLUDE_SERVLET_PATH, Value::from(route.servlet_path.as_str()));
        if let Some(info) = &route.path_info {
            self.set_attribute(INCLUDE_PATH_INFO, Value::from(info.as_str()));
        }
        if let Some(query) = query {
            self.set_attribute(INCLUDE_QUERY_STRING, Value::from(query));
        }
        saved
    }

    pub(crate) fn end_include(&mut self, saved: Vec<(&'static str, Option<Value>)>) {
        for (name, value) in saved {
            match value {
                Some(value) => self.attributes.insert(name.to_string(), value),
                None => self.attributes.remove(name),
            };
        }
    }
}
