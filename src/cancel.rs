//! Process-wide stop signal.
//!
//! Set once (from a signal handler, an error path or normal completion) and
//! never cleared. Blocking code polls [`StopSignal::is_set`]; async code can
//! await [`StopSignal::stopped`] inside a `select!`.

use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    token: CancellationToken,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Repeated calls are harmless.
    pub fn set(&self) {
        if !self.token.is_cancelled() {
            debug!("Stop signal set");
        }
        self.token.cancel();
    }

    pub fn is_set(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal is set.
    pub async fn stopped(&self) {
        self.token.cancelled().await;
    }
}
