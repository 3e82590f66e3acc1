//! Apply configured mounts to a live dispatch table.
//!
//! # Responsibilities
//! - Diff the configured mounts against what is registered
//! - Unregister removed or changed mounts, register new ones
//! - Keep the last applied set for the next diff
//!
//! # Design Decisions
//! - A changed mount is unregistered before its replacement is registered;
//!   requests already inside the old registration finish against it
//! - A failing mount is reported and skipped, the rest still apply

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::MountConfig;
use crate::context::DirectoryContext;
use crate::error::RegistrationError;
use crate::routing::alias;
use crate::routing::DispatchTable;

/// What one [`MountSync::apply`] changed.
#[derive(Debug, Default)]
pub struct ReloadSummary {
    pub registered: Vec<String>,
    pub unregistered: Vec<String>,
    pub failed: Vec<(String, RegistrationError)>,
}

impl ReloadSummary {
    pub fn is_noop(&self) -> bool {
        self.registered.is_empty() && self.unregistered.is_empty() && self.failed.is_empty()
    }
}

/// Keeps a table's resource registrations in step with configuration.
pub struct MountSync {
    table: DispatchTable,
    /// Applied mounts by normalized alias.
    applied: ArcSwap<HashMap<String, MountConfig>>,
}

impl MountSync {
    pub fn new(table: DispatchTable) -> Self {
        Self {
            table,
            applied: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    pub fn applied(&self) -> Arc<HashMap<String, MountConfig>> {
        self.applied.load_full()
    }

    pub fn apply(&self, mounts: &[MountConfig]) -> ReloadSummary {
        let mut summary = ReloadSummary::default();
        let previous = self.applied.load_full();

        let mut desired = HashMap::new();
        for mount in mounts {
            match alias::normalize(&mount.alias) {
                Ok(key) => {
                    desired.insert(key, mount.clone());
                }
                Err(e) => summary.failed.push((mount.alias.clone(), e)),
            }
        }

        for (key, old) in previous.iter() {
            if desired.get(key) == Some(old) {
                continue;
            }
            match self.table.unregister(key) {
                Ok(()) => summary.unregistered.push(key.clone()),
                // removed by someone else in the meantime
                Err(RegistrationError::UnknownAlias(_)) => {}
                Err(e) => summary.failed.push((key.clone(), e)),
            }
        }

        let mut applied = HashMap::new();
        for (key, mount) in desired {
            if previous.get(&key) == Some(&mount) {
                applied.insert(key, mount);
                continue;
            }
            let context = Arc::new(DirectoryContext::new(&mount.directory));
            match self.table.register_resources(&key, &mount.prefix, context) {
                Ok(()) => {
                    summary.registered.push(key.clone());
                    applied.insert(key, mount);
                }
                Err(e) => {
                    tracing::warn!(alias = %key, error = %e, "Mount not applied");
                    summary.failed.push((key, e));
                }
            }
        }
        self.applied.store(Arc::new(applied));

        summary.registered.sort();
        summary.unregistered.sort();
        tracing::info!(
            registered = summary.registered.len(),
            unregistered = summary.unregistered.len(),
            failed = summary.failed.len(),
            "Mounts applied"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mount(alias: &str, directory: &str) -> MountConfig {
        MountConfig {
            alias: alias.to_string(),
            directory: directory.to_string(),
            prefix: "/".to_string(),
        }
    }

    #[test]
    fn test_apply_diffs_mounts() {
        let table = DispatchTable::new();
        let sync = MountSync::new(table.clone());

        let summary = sync.apply(&[mount("/a", "./a"), mount("/b/*", "./b")]);
        assert_eq!(summary.registered, vec!["/a", "/b"]);
        assert_eq!(table.aliases(), vec!["/a", "/b"]);

        let summary = sync.apply(&[mount("/a", "./a"), mount("/b", "./other"), mount("/c", "./c")]);
        assert_eq!(summary.unregistered, vec!["/b"]);
        assert_eq!(summary.registered, vec!["/b", "/c"]);
        assert_eq!(table.aliases(), vec!["/a", "/b", "/c"]);

        assert!(sync.apply(&[mount("/a", "./a"), mount("/b", "./other"), mount("/c", "./c")]).is_noop());

        let summary = sync.apply(&[]);
        assert_eq!(summary.unregistered, vec!["/a", "/b", "/c"]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_conflicting_alias_is_reported() {
        let table = DispatchTable::new();
        table
            .register(
                "/taken",
                crate::registration::from_fn(|_, _| Ok(())),
                Arc::new(DirectoryContext::new(".")),
                Default::default(),
            )
            .unwrap();
        let sync = MountSync::new(table);
        let summary = sync.apply(&[mount("/taken", "./x"), mount("bad", "./y")]);
        assert_eq!(summary.failed.len(), 2);
        assert!(sync.applied().is_empty());
    }
}
