//! Security/resource contexts and the per-context view handed to handlers.
//!
//! # Data Flow
//! ```text
//! registration time:
//!     HttpContext (external)
//!     → attributes.rs (per-context namespace, created on first use)
//!     → facade.rs (ContextFacade over the transport's ContainerContext)
//!
//! request time:
//!     Registration::invoke → HttpContext::handle_security
//!     → handler sees ContextFacade via Request::context()
//!     → dispatcher.rs for include/forward through the owning table
//! ```
//!
//! # Design Decisions
//! - Contexts are identified by `Arc` pointer, never by value
//! - Attribute namespaces hold a `Weak` back-reference: the owner decides their lifetime

pub mod attributes;
pub mod directory;
pub mod dispatcher;
pub mod facade;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use futures_util::future::BoxFuture;
use tokio::io::AsyncRead;
use url::Url;

use crate::http::{Request, Response};

pub use attributes::{AttributeMap, SharedAttributeStore};
pub use directory::DirectoryContext;
pub use dispatcher::RequestDispatcher;
pub use facade::{ContainerContext, ContextFacade, ServerContext};

/// Readable body of a resolved resource.
pub type ResourceStream = Box<dyn AsyncRead + Send + Unpin>;

/// Security and resource capability a registration is bound to.
pub trait HttpContext: Send + Sync + 'static {
    /// Authorize the request. Returning `false` means the response was already finalized.
    fn handle_security(&self, request: &Request, response: &mut Response) -> bool;

    /// Resolve a resource name to a URL.
    fn resource(&self, name: &str) -> Option<Url>;

    fn mime_type(&self, name: &str) -> Option<String>;

    /// Open a connection to a resolved URL. Only `file:` is understood by default.
    fn open_resource<'a>(
        &'a self,
        url: &'a Url,
    ) -> BoxFuture<'a, io::Result<Box<dyn ResourceConnection>>> {
        Box::pin(async move {
            let conn = FileConnection::open(url).await?;
            Ok(Box::new(conn) as Box<dyn ResourceConnection>)
        })
    }
}

/// Metadata and content of a resolved resource.
pub trait ResourceConnection: Send + Sync {
    /// Declared length, if known.
    fn content_length(&self) -> Option<u64>;

    /// Modification time in epoch milliseconds, `0` when unknown.
    fn last_modified(&self) -> i64;

    fn open_stream(&self) -> BoxFuture<'_, io::Result<ResourceStream>>;
}

/// Identity key of a context.
pub(crate) fn context_key(context: &Arc<dyn HttpContext>) -> usize {
    Arc::as_ptr(context) as *const () as usize
}

/// Connection to a `file:` URL.
#[derive(Debug)]
pub struct FileConnection {
    path: PathBuf,
    length: u64,
    modified: i64,
    directory: bool,
}

impl FileConnection {
    pub async fn open(url: &Url) -> io::Result<Self> {
        if url.scheme() != "file" {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unsupported resource scheme `{}`", url.scheme()),
            ));
        }
        let path = url
            .to_file_path()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "malformed file URL"))?;
        let meta = tokio::fs::metadata(&path).await?;
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        let directory = meta.is_dir();
        Ok(Self {
            path,
            // directories carry no content
            length: if directory { 0 } else { meta.len() },
            modified,
            directory,
        })
    }
}

impl ResourceConnection for FileConnection {
    fn content_length(&self) -> Option<u64> {
        Some(self.length)
    }

    fn last_modified(&self) -> i64 {
        self.modified
    }

    fn open_stream(&self) -> BoxFuture<'_, io::Result<ResourceStream>> {
        Box::pin(async move {
            if self.directory {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{} is a directory", self.path.display()),
                ));
            }
            let file = tokio::fs::File::open(&self.path).await?;
            Ok(Box::new(file) as ResourceStream)
        })
    }
}
