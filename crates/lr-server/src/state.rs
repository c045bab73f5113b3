//! Application state.
//!
//! Shared state for the content server handlers.

use std::path::PathBuf;

use crate::inject::ReloadScript;

/// State shared across all content server handlers.
pub(crate) struct AppState {
    /// Canonical root of the served directory.
    pub(crate) root: PathBuf,
    /// Reload client injected into HTML responses.
    pub(crate) script: ReloadScript,
}
