//! Configuration management.
//!
//! This module provides functions for resolving the RuleVault database
//! path and ambient defaults (checkpoint source).
//!
//! # Architecture
//!
//! RuleVault uses a **global database**: a single SQLite file at
//! `~/.rulevault/data/rulevault.db` shared by every caller on the machine
//! (CLI invocations, the MCP bridge, local API shims). One database is what
//! makes the single-active-session invariant enforceable across processes.

use std::path::{Path, PathBuf};

/// Get the global RuleVault directory location.
///
/// Always `~/.rulevault/`, so every consumer resolves the same database.
#[must_use]
pub fn global_rulevault_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".rulevault"))
}

/// Check if test mode is enabled.
///
/// Test mode is enabled by setting `RV_TEST_DB=1` (or any non-empty value).
/// This redirects all database operations to an isolated test database.
#[must_use]
pub fn is_test_mode() -> bool {
    std::env::var("RV_TEST_DB")
        .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
        .unwrap_or(false)
}

/// Get the test database path.
///
/// Returns `~/.rulevault/test/rulevault.db` for isolated testing.
#[must_use]
pub fn test_db_path() -> Option<PathBuf> {
    global_rulevault_dir().map(|dir| dir.join("test").join("rulevault.db"))
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `RV_TEST_DB` environment variable → uses test database
/// 3. `RULEVAULT_DB` environment variable
/// 4. Global location: `~/.rulevault/data/rulevault.db`
///
/// # Test Mode
///
/// Set `RV_TEST_DB=1` to use `~/.rulevault/test/rulevault.db` instead.
/// This keeps your production data safe during CLI development.
///
/// # Returns
///
/// Returns the path to the database file, or `None` if no location found.
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Explicit path from CLI flag
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: Test mode - use isolated test database
    if is_test_mode() {
        return test_db_path();
    }

    // Priority 3: RULEVAULT_DB environment variable
    if let Ok(db_path) = std::env::var("RULEVAULT_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    // Priority 4: Global database location
    global_rulevault_dir().map(|dir| dir.join("data").join("rulevault.db"))
}

/// Get the default checkpoint source.
///
/// Priority:
/// 1. `RV_SOURCE` environment variable (normalized; ignored if invalid)
/// 2. "api"
#[must_use]
pub fn default_source() -> String {
    if let Ok(source) = std::env::var("RV_SOURCE") {
        if let Ok(normalized) = crate::validate::normalize_source(&source) {
            return normalized;
        }
    }

    "api".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_db_path_with_explicit() {
        let explicit = PathBuf::from("/custom/path/db.sqlite");
        let result = resolve_db_path(Some(&explicit));
        assert_eq!(result, Some(explicit));
    }

    #[test]
    fn test_resolve_db_path_falls_back_to_global() {
        let result = resolve_db_path(None);
        assert!(result.is_some());

        let path = result.unwrap();
        assert!(path.ends_with("rulevault.db"));
    }

    #[test]
    fn test_global_rulevault_dir_returns_some() {
        let result = global_rulevault_dir();
        assert!(result.is_some());
    }

    #[test]
    fn test_test_db_path_is_separate() {
        let global = global_rulevault_dir().unwrap();
        let test = test_db_path().unwrap();

        // Test path should be under test/ subdirectory
        assert!(test.to_string_lossy().contains("/test/"));
        // Should be different from production path
        assert_ne!(global.join("data").join("rulevault.db"), test);
    }

    #[test]
    fn test_default_source_is_valid() {
        let source = default_source();
        assert!(crate::validate::VALID_SOURCES.contains(source.as_str()));
    }
}
