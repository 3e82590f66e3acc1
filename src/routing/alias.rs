//! Alias syntax.
//!
//! Accepted forms: `/` (root), `/a/b` (exact, also matched as a path prefix),
//! `/a/b/*` (prefix wildcard, same key as `/a/b`) and `/*.ext` or `/a/*.ext`
//! (extension wildcard).

use crate::error::RegistrationError;

/// Validate `alias` and return its table key.
pub fn normalize(alias: &str) -> Result<String, RegistrationError> {
    if alias.is_empty() {
        return Err(RegistrationError::invalid(alias, "must not be empty"));
    }
    if !alias.starts_with('/') {
        return Err(RegistrationError::invalid(alias, "must start with `/`"));
    }
    if alias != "/" && alias.ends_with('/') {
        return Err(RegistrationError::invalid(alias, "must not end with `/`"));
    }
    if alias == "/*" {
        return Ok("/".to_string());
    }
    if let Some(base) = alias.strip_suffix("/*") {
        return Ok(base.to_string());
    }
    Ok(alias.to_string())
}

/// Extension candidate `/*.ext` for the last segment of `path`, if it has one.
pub fn extension_alias(path: &str) -> Option<String> {
    let last_slash = path.rfind('/');
    let last_dot = path.rfind('.')?;
    if last_slash.is_some_and(|slash| last_dot < slash) {
        return None;
    }
    let ext = &path[last_dot + 1..];
    if ext.is_empty() {
        return None;
    }
    Some(format!("/*.{ext}"))
}

/// `path` with its last `/`-segment removed (`/a` gives the empty string).
pub fn parent(path: &str) -> Option<&str> {
    path.rfind('/').map(|i| &path[..i])
}

/// Prefixes of `path` from longest to the empty root: `/a/b`, `/a`, ``.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(Some(path), |p| parent(*p).filter(|_| !p.is_empty()))
}
