//! Terminal observability stage.

use std::sync::Arc;

use alloy_primitives::B256;

use crate::{
    error::AdmissionError,
    pipeline::{CheckContext, Stage},
    statedb::Backend,
    tx::Envelope,
};

/// Callback invoked once per newly admitted transaction hash, feeding
/// pending-transaction subscriptions.
pub type PendingTxListener = Arc<dyn Fn(B256) + Send + Sync>;

/// Notifies the pending-transaction listener. Must stay the last stage of
/// the chain, and fires only on first-time admission: never on re-checks and
/// never for simulated passes.
pub struct PendingTxNotifier {
    listener: Option<PendingTxListener>,
}

impl core::fmt::Debug for PendingTxNotifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PendingTxNotifier")
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

impl PendingTxNotifier {
    /// Creates the stage; `None` disables notification.
    pub fn new(listener: Option<PendingTxListener>) -> Self {
        Self { listener }
    }
}

impl<B: Backend> Stage<B> for PendingTxNotifier {
    fn check(
        &self,
        ctx: &mut CheckContext<'_, B>,
        env: &mut Envelope,
        simulate: bool,
    ) -> Result<(), AdmissionError> {
        if ctx.mode.is_recheck() {
            return Ok(());
        }
        if ctx.mode.is_admission() && !simulate {
            if let Some(listener) = &self.listener {
                for tx in env.eth_msgs()? {
                    (**listener)(tx.hash);
                }
            }
        }
        Ok(())
    }
}
