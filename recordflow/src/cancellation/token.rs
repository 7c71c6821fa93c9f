use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// Reason recorded when `cancel` is called with an empty reason.
const DEFAULT_REASON: &str = "cancelled";

/// A token for cooperative cancellation.
///
/// Only the first cancellation reason is kept.
#[derive(Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Later calls are ignored.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let reason = reason.into();
            let reason = if reason.trim().is_empty() {
                DEFAULT_REASON.to_string()
            } else {
                reason
            };
            tracing::info!(reason = %reason, "Cancellation requested");
            *self.reason.write() = Some(reason);
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        if !self.is_cancelled() {
            return None;
        }
        Some(
            self.reason
                .read()
                .clone()
                .unwrap_or_else(|| DEFAULT_REASON.to_string()),
        )
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
