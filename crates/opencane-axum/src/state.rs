//! Shared application state type.

use std::sync::Arc;

/// Application state shared across all handlers: the single composition
/// root built by `opencane-bootstrap` (spec §9).
pub type AppState = Arc<opencane_bootstrap::RuntimeContext>;
