//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use futures_util::future::BoxFuture;
use url::Url;

use alias_dispatch::context::{HttpContext, ResourceConnection, ResourceStream};
use alias_dispatch::http::{Request, Response};
use alias_dispatch::registration::HandlerConfig;
use alias_dispatch::{DispatchError, Endpoint, HandlerError, Middleware, Next};

/// Ordered record of what ran, shared between handlers and the test.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Clone)]
enum Entry {
    File { bytes: Vec<u8>, last_modified: i64, declared: Option<u64> },
    Directory,
}

/// In-memory security/resource context.
#[derive(Default)]
pub struct MemoryContext {
    entries: Mutex<HashMap<String, Entry>>,
    deny: AtomicBool,
}

impl MemoryContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_file(self: Arc<Self>, name: &str, bytes: &[u8], last_modified: i64) -> Arc<Self> {
        self.insert(name, Entry::File { bytes: bytes.to_vec(), last_modified, declared: Some(bytes.len() as u64) });
        self
    }

    /// A file whose connection reports `declared` as its length.
    pub fn with_misreported_file(self: Arc<Self>, name: &str, bytes: &[u8], declared: Option<u64>) -> Arc<Self> {
        self.insert(name, Entry::File { bytes: bytes.to_vec(), last_modified: 0, declared });
        self
    }

    pub fn with_directory(self: Arc<Self>, name: &str) -> Arc<Self> {
        self.insert(name, Entry::Directory);
        self
    }

    fn insert(&self, name: &str, entry: Entry) {
        self.entries.lock().unwrap().insert(name.to_string(), entry);
    }

    /// Deny every request with 403 from now on.
    pub fn deny(&self) {
        self.deny.store(true, Ordering::SeqCst);
    }

    pub fn as_http_context(self: &Arc<Self>) -> Arc<dyn HttpContext> {
        Arc::clone(self) as Arc<dyn HttpContext>
    }
}

impl HttpContext for MemoryContext {
    fn handle_security(&self, _request: &Request, response: &mut Response) -> bool {
        if self.deny.load(Ordering::SeqCst) {
            response.send_error(StatusCode::FORBIDDEN);
            return false;
        }
        true
    }

    fn resource(&self, name: &str) -> Option<Url> {
        if !self.entries.lock().unwrap().contains_key(name) {
            return None;
        }
        Url::parse(&format!("mem://context{name}")).ok()
    }

    fn mime_type(&self, name: &str) -> Option<String> {
        name.ends_with(".txt").then(|| "text/plain".to_string())
    }

    fn open_resource<'a>(
        &'a self,
        url: &'a Url,
    ) -> BoxFuture<'a, io::Result<Box<dyn ResourceConnection>>> {
        let entry = self.entries.lock().unwrap().get(url.path()).cloned();
        Box::pin(async move {
            let entry = entry.ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
            Ok(Box::new(MemoryConnection(entry)) as Box<dyn ResourceConnection>)
        })
    }
}

struct MemoryConnection(Entry);

impl ResourceConnection for MemoryConnection {
    fn content_length(&self) -> Option<u64> {
        match &self.0 {
            Entry::File { declared, .. } => *declared,
            Entry::Directory => Some(0),
        }
    }

    fn last_modified(&self) -> i64 {
        match &self.0 {
            Entry::File { last_modified, .. } => *last_modified,
            Entry::Directory => 0,
        }
    }

    fn open_stream(&self) -> BoxFuture<'_, io::Result<ResourceStream>> {
        Box::pin(async move {
            match &self.0 {
                Entry::File { bytes, .. } => Ok(Box::new(io::Cursor::new(bytes.clone())) as ResourceStream),
                Entry::Directory => Err(io::Error::from(io::ErrorKind::NotFound)),
            }
        })
    }
}

/// Endpoint that logs its lifecycle and answers with its name and path view.
pub struct RecordingEndpoint {
    pub name: String,
    pub log: EventLog,
    pub destroyed: AtomicUsize,
    pub fail_init: bool,
}

impl RecordingEndpoint {
    pub fn new(name: &str, log: &EventLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            log: log.clone(),
            destroyed: AtomicUsize::new(0),
            fail_init: false,
        })
    }

    pub fn failing(name: &str, log: &EventLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            log: log.clone(),
            destroyed: AtomicUsize::new(0),
            fail_init: true,
        })
    }

    pub fn destroy_count(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl Endpoint for RecordingEndpoint {
    fn init(&self, config: &HandlerConfig) -> Result<(), HandlerError> {
        self.log.push(format!("init:{}:{}", self.name, config.name()));
        if self.fail_init {
            return Err("refusing to start".into());
        }
        Ok(())
    }

    fn service<'a>(
        &'a self,
        request: &'a mut Request,
        response: &'a mut Response,
    ) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(async move {
            self.log.push(self.name.clone());
            let body = format!(
                "{}|{}|{}",
                self.name,
                request.servlet_path(),
                request.path_info().unwrap_or("-")
            );
            response.write(body.as_bytes());
            Ok(())
        })
    }

    fn destroy(&self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        self.log.push(format!("destroy:{}", self.name));
    }
}

/// Middleware that logs and then continues, or stops the chain with a status.
pub struct RecordingMiddleware {
    pub name: String,
    pub log: EventLog,
    pub stop_with: Option<StatusCode>,
}

impl RecordingMiddleware {
    pub fn new(name: &str, log: &EventLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            log: log.clone(),
            stop_with: None,
        })
    }

    pub fn stopping(name: &str, log: &EventLog, status: StatusCode) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            log: log.clone(),
            stop_with: Some(status),
        })
    }
}

impl Middleware for RecordingMiddleware {
    fn handle<'a>(
        &'a self,
        request: &'a mut Request,
        response: &'a mut Response,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<(), DispatchError>> {
        Box::pin(async move {
            self.log.push(self.name.clone());
            match self.stop_with {
                Some(status) => {
                    response.send_error(status);
                    Ok(())
                }
                None => next.run(request, response).await,
            }
        })
    }

    fn destroy(&self) {
        self.log.push(format!("destroy:{}", self.name));
    }
}

pub fn body_text(response: &Response) -> String {
    String::from_utf8_lossy(response.body()).into_owned()
}

/// Fresh directory, removed when the returned handle drops.
pub fn temp_dir(label: &str) -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix(&format!("alias-dispatch-{label}-"))
        .tempdir()
        .unwrap()
}
