//! Path matching.
//!
//! # Responsibilities
//! - Resolve a dispatch path to one alias with the specificity cascade
//! - Match middleware by plain alias prefix
//!
//! # Design Decisions
//! - Cascade order is fixed: exact > longest prefix > extension > root default
//! - An endpoint matched through an extension alias is viewed against the full
//!   path; a resource matched the same way keeps the stripped prefix
//! - Middleware uses `starts_with`, not the cascade

use crate::http::RouteMatch;
use crate::routing::alias::{extension_alias, parent};

/// Trait for matching dispatch paths against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    fn matches(&self, path: &str) -> bool;
}

/// Matches the dispatch path prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }
}

/// Which step of the cascade produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Prefix,
    Extension,
    Default,
    ContextRoot,
}

/// Alias lookups the cascade runs against.
pub trait AliasTable {
    type Entry;

    fn entry(&self, alias: &str) -> Option<Self::Entry>;

    /// Whether an extension match on this entry re-derives the alias as the full path.
    fn is_endpoint(entry: &Self::Entry) -> bool;
}

/// Outcome of a successful resolution.
#[derive(Debug)]
pub struct Resolution<E> {
    pub entry: E,
    pub route: RouteMatch,
    pub kind: MatchKind,
}

/// Resolve `path` against `table`.
///
/// 1. exact `path`
/// 2. extension candidate `/*.ext` from the last segment
/// 3. longest prefix, trying `prefix/*.ext` before `prefix` at each level
/// 4. root: `/*.ext`, then `/`
pub fn resolve<T: AliasTable>(table: &T, path: &str) -> Option<Resolution<T::Entry>> {
    if let Some(entry) = table.entry(path) {
        return Some(Resolution {
            entry,
            route: RouteMatch::new(path, path),
            kind: MatchKind::Exact,
        });
    }

    let extension = extension_alias(path);
    let mut prefix = parent(path);
    while let Some(current) = prefix.filter(|p| !p.is_empty()) {
        let candidate = extension.as_ref().map(|ext| format!("{current}{ext}"));
        if let Some(found) = probe(table, path, current, candidate.as_deref(), MatchKind::Prefix) {
            return Some(found);
        }
        prefix = parent(current);
    }

    // the root candidate is `/` joined with `*.ext`, i.e. the extension alias itself
    probe(table, path, "/", extension.as_deref(), MatchKind::Default)
}

fn probe<T: AliasTable>(
    table: &T,
    path: &str,
    base: &str,
    extension_candidate: Option<&str>,
    kind: MatchKind,
) -> Option<Resolution<T::Entry>> {
    if let Some(candidate) = extension_candidate {
        if let Some(entry) = table.entry(candidate) {
            let alias = if T::is_endpoint(&entry) { path } else { base };
            return Some(Resolution {
                route: RouteMatch::new(alias, path),
                entry,
                kind: MatchKind::Extension,
            });
        }
    }
    table.entry(base).map(|entry| Resolution {
        entry,
        route: RouteMatch::new(base, path),
        kind,
    })
}
