//! Directory-backed security/resource context.
//!
//! Resolves resource names to `file:` URLs below a root directory and allows
//! every request. Used for static mounts declared in configuration.

use std::path::{Component, Path, PathBuf};

use url::Url;

use crate::context::HttpContext;
use crate::http::{Request, Response};

/// Serves files below `root`.
#[derive(Debug, Clone)]
pub struct DirectoryContext {
    root: PathBuf,
}

impl DirectoryContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn locate(&self, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name.trim_start_matches('/'));
        // no escaping the root
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return None;
        }
        let path = self.root.join(relative);
        path.exists().then_some(path)
    }
}

impl HttpContext for DirectoryContext {
    fn handle_security(&self, _request: &Request, _response: &mut Response) -> bool {
        true
    }

    fn resource(&self, name: &str) -> Option<Url> {
        let path = self.locate(name)?;
        let path = std::path::absolute(&path).ok()?;
        Url::from_file_path(path).ok()
    }

    fn mime_type(&self, name: &str) -> Option<String> {
        mime_for(name).map(str::to_string)
    }
}

/// Content type for a file name, by extension.
pub(crate) fn mime_for(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "json" => "application/json",
        "txt" => "text/plain",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "wasm" => "application/wasm",
        "pdf" => "application/pdf",
        _ => return None,
    };
    Some(mime)
}
