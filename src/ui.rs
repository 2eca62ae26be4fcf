//! Terminal output seam.
//!
//! The real terminal UI lives outside this crate; the core only needs a
//! sink for progress messages, so the seam is a two-method trait.

use std::sync::Arc;

/// Sink for user-facing progress output.
pub trait Ui: Send + Sync {
    /// Announce a new pipeline stage.
    fn header(&self, msg: &str);

    /// Emit a progress message within the current stage.
    fn message(&self, msg: &str);
}

/// Routes UI output through `tracing` at INFO level.
#[derive(Debug, Default)]
pub struct TracingUi;

impl Ui for TracingUi {
    fn header(&self, msg: &str) {
        tracing::info!(target: "appforge::ui", "==> {}", msg);
    }

    fn message(&self, msg: &str) {
        tracing::info!(target: "appforge::ui", "{}", msg);
    }
}

/// Discards all output. Used in tests.
#[derive(Debug, Default)]
pub struct NullUi;

impl Ui for NullUi {
    fn header(&self, _msg: &str) {}
    fn message(&self, _msg: &str) {}
}

/// Shared handle to a [`Ui`] implementation.
pub type UiHandle = Arc<dyn Ui>;
