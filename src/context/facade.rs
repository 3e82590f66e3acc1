//! Context facade handed to registered handlers.
//!
//! [`ContainerContext`] is the transport-side context interface. Every
//! operation defaults to forwarding to [`ContainerContext::delegate`], so an
//! implementation overrides only what it intercepts. [`ContextFacade`]
//! intercepts attributes, resource and mime-type resolution and dispatcher
//! creation; everything else reaches the transport unmodified.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use url::Url;

use crate::context::{AttributeMap, HttpContext, RequestDispatcher};
use crate::routing::table::TableHandle;

/// Transport-provided context operations.
pub trait ContainerContext: Send + Sync {
    /// Context that receives every operation not overridden here.
    fn delegate(&self) -> Option<&dyn ContainerContext> {
        None
    }

    fn server_info(&self) -> String {
        match self.delegate() {
            Some(d) => d.server_info(),
            None => concat!("alias-dispatch/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    fn init_parameter(&self, name: &str) -> Option<String> {
        self.delegate().and_then(|d| d.init_parameter(name))
    }

    fn context_path(&self) -> String {
        self.delegate().map(|d| d.context_path()).unwrap_or_default()
    }

    fn attribute(&self, name: &str) -> Option<Value> {
        self.delegate().and_then(|d| d.attribute(name))
    }

    fn set_attribute(&self, name: &str, value: Value) {
        if let Some(d) = self.delegate() {
            d.set_attribute(name, value);
        }
    }

    fn remove_attribute(&self, name: &str) -> Option<Value> {
        self.delegate().and_then(|d| d.remove_attribute(name))
    }

    fn attribute_names(&self) -> Vec<String> {
        self.delegate().map(|d| d.attribute_names()).unwrap_or_default()
    }

    fn mime_type(&self, file: &str) -> Option<String> {
        self.delegate().and_then(|d| d.mime_type(file))
    }

    fn resource(&self, path: &str) -> Option<Url> {
        self.delegate().and_then(|d| d.resource(path))
    }

    fn request_dispatcher(&self, path: &str) -> Option<RequestDispatcher> {
        self.delegate().and_then(|d| d.request_dispatcher(path))
    }

    fn log(&self, message: &str) {
        match self.delegate() {
            Some(d) => d.log(message),
            None => tracing::info!(target: "alias_dispatch::context", "{}", message),
        }
    }
}

/// Minimal transport context: init parameters and one shared attribute map.
#[derive(Debug, Default)]
pub struct ServerContext {
    context_path: String,
    init_parameters: HashMap<String, String>,
    attributes: Mutex<HashMap<String, Value>>,
}

impl ServerContext {
    pub fn new(context_path: impl Into<String>) -> Self {
        Self {
            context_path: context_path.into(),
            ..Self::default()
        }
    }

    pub fn with_init_parameter(mut self, name: &str, value: &str) -> Self {
        self.init_parameters.insert(name.to_string(), value.to_string());
        self
    }
}

impl ContainerContext for ServerContext {
    fn init_parameter(&self, name: &str) -> Option<String> {
        self.init_parameters.get(name).cloned()
    }

    fn context_path(&self) -> String {
        self.context_path.clone()
    }

    fn attribute(&self, name: &str) -> Option<Value> {
        self.attributes.lock().expect("server attributes poisoned").get(name).cloned()
    }

    fn set_attribute(&self, name: &str, value: Value) {
        self.attributes
            .lock()
            .expect("server attributes poisoned")
            .insert(name.to_string(), value);
    }

    fn remove_attribute(&self, name: &str) -> Option<Value> {
        self.attributes.lock().expect("server attributes poisoned").remove(name)
    }

    fn attribute_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .attributes
            .lock()
            .expect("server attributes poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn mime_type(&self, file: &str) -> Option<String> {
        crate::context::directory::mime_for(file).map(str::to_string)
    }
}

/// Per-registration view of the transport context.
pub struct ContextFacade {
    delegate: Arc<dyn ContainerContext>,
    http_context: Arc<dyn HttpContext>,
    attributes: Arc<AttributeMap>,
    table: TableHandle,
}

impl ContextFacade {
    pub(crate) fn new(
        delegate: Arc<dyn ContainerContext>,
        http_context: Arc<dyn HttpContext>,
        attributes: Arc<AttributeMap>,
        table: TableHandle,
    ) -> Self {
        Self {
            delegate,
            http_context,
            attributes,
            table,
        }
    }

    pub fn http_context(&self) -> &Arc<dyn HttpContext> {
        &self.http_context
    }
}

impl ContainerContext for ContextFacade {
    fn delegate(&self) -> Option<&dyn ContainerContext> {
        Some(self.delegate.as_ref())
    }

    fn attribute(&self, name: &str) -> Option<Value> {
        self.attributes.get(name)
    }

    fn set_attribute(&self, name: &str, value: Value) {
        self.attributes.set(name, value);
    }

    fn remove_attribute(&self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }

    fn attribute_names(&self) -> Vec<String> {
        self.attributes.names()
    }

    fn mime_type(&self, file: &str) -> Option<String> {
        self.http_context
            .mime_type(file)
            .or_else(|| self.delegate.mime_type(file))
    }

    fn resource(&self, path: &str) -> Option<Url> {
        self.http_context.resource(path)
    }

    fn request_dispatcher(&self, path: &str) -> Option<RequestDispatcher> {
        let table = self.table.upgrade()?;
        RequestDispatcher::new(table, path)
    }
}

impl fmt::Debug for ContextFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextFacade")
            .field("attributes", &self.attributes.names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Request, Response};
    use serde_json::json;

    struct Docs;

    impl HttpContext for Docs {
        fn handle_security(&self, _: &Request, _: &mut Response) -> bool {
            true
        }
        fn resource(&self, name: &str) -> Option<Url> {
            Url::parse(&format!("file:///srv/docs{name}")).ok()
        }
        fn mime_type(&self, name: &str) -> Option<String> {
            name.ends_with(".md").then(|| "text/markdown".to_string())
        }
    }

    fn facade(server: Arc<ServerContext>) -> ContextFacade {
        ContextFacade::new(
            server,
            Arc::new(Docs),
            Arc::default(),
            TableHandle::dangling(),
        )
    }

    #[test]
    fn test_attributes_are_intercepted() {
        let server = Arc::new(ServerContext::new("/app"));
        server.set_attribute("shared", json!(true));
        let facade = facade(Arc::clone(&server));

        facade.set_attribute("local", json!(1));
        assert_eq!(facade.attribute("local"), Some(json!(1)));
        assert!(facade.attribute("shared").is_none());
        assert!(server.attribute("local").is_none());
    }

    #[test]
    fn test_everything_else_passes_through() {
        let server = Arc::new(ServerContext::new("/app").with_init_parameter("mode", "strict"));
        let facade = facade(server);

        assert_eq!(facade.init_parameter("mode").as_deref(), Some("strict"));
        assert_eq!(facade.context_path(), "/app");
        assert!(facade.server_info().starts_with("alias-dispatch/"));
    }

    #[test]
    fn test_mime_type_falls_back_to_delegate() {
        let facade = facade(Arc::new(ServerContext::default()));
        assert_eq!(facade.mime_type("/a.md").as_deref(), Some("text/markdown"));
        assert_eq!(facade.mime_type("/a.css").as_deref(), Some("text/css"));
        assert_eq!(
            facade.resource("/x.md").map(|u| u.to_string()).as_deref(),
            Some("file:///srv/docs/x.md")
        );
        assert!(facade.request_dispatcher("/x").is_none());
    }
}
