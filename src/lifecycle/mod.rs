//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → apply mounts (reload.rs) → Start listener
//!
//! Reload (reload.rs):
//!     watcher yields config → diff mounts → unregister / register
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     Signal received → Stop accepting → Unregister all → Drain → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, then unregister, then wait for drain
//! - Shutdown has timeout: stragglers are reported, not awaited forever

pub mod reload;
pub mod shutdown;
pub mod signals;

pub use reload::{MountSync, ReloadSummary};
pub use shutdown::{drain_table, Shutdown};
