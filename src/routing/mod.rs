//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path under the router mount)
//!     → table.rs (lock: resolve + take references)
//!     → matcher.rs (exact → prefix/extension walk → root)
//!     → chain.rs (middleware in priority order → terminal registration)
//!     → references released as the dispatch drops
//!
//! Mutation (any time, concurrently with traffic):
//!     register   → init outside the lock → publish
//!     unregister → remove → teardown on drain
//! ```
//!
//! # Design Decisions
//! - Mutable at runtime, one coarse lock per table
//! - No regex in the hot path (prefix and extension matching only)
//! - Deterministic: same table and path always resolve to the same alias
//! - Middleware matches by literal prefix, endpoints by the cascade

pub mod alias;
pub mod chain;
pub mod contexts;
pub mod matcher;
pub mod table;

pub use chain::{Dispatch, Next};
pub use contexts::{ContextMatch, ContextRouter};
pub use matcher::MatchKind;
pub use table::{DispatchTable, TableHandle};
