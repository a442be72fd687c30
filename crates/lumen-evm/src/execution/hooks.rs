//! Post-execution hook extension point.

use auto_impl::auto_impl;

use crate::{error::HookError, execution::TxReceipt, statedb::Backend, tx::Message};

/// Error string recorded on a result whose post-execution hooks failed.
pub const VM_ERR_POST_PROCESSING: &str = "failed to execute post transaction processing";

/// Extension point invoked after a successful execution, inside the same
/// atomic unit of work as the transaction itself.
///
/// Hooks form an ordered list; the engine iterates them and short-circuits
/// on the first error. A hook failure degrades the transaction to a no-log
/// failed receipt and discards its state changes, but never un-spends gas
/// already accounted.
#[auto_impl(&, Box, Arc)]
pub trait PostExecutionHook {
    /// Runs the hook against the transaction's isolated state view.
    fn on_post_execution(
        &self,
        backend: &mut dyn Backend,
        msg: &Message,
        receipt: &TxReceipt,
    ) -> Result<(), HookError>;
}
