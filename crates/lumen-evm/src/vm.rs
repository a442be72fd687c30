//! Black-box seam to the bytecode interpreter.
//!
//! The execution core never interprets opcodes itself; it drives an
//! implementation of [`VirtualMachine`] against a [`crate::StateDB`] view and
//! settles gas around the invocation. Interpreter errors travel back as
//! strings on [`VmOutcome`]: a VM-level revert is not an engine failure.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use alloy_primitives::{Address, Bytes};
use auto_impl::auto_impl;

use crate::{block::BlockEnv, statedb::VmState, tx::Message};

/// Interpreter error string for running out of gas. Gas estimation matches
/// against it to distinguish "needs more gas" from genuine failures.
pub const VM_ERR_OUT_OF_GAS: &str = "out of gas";

/// Interpreter error string for an explicit revert.
pub const VM_ERR_EXECUTION_REVERTED: &str = "execution reverted";

/// Outcome of one interpreter invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmOutcome {
    /// Return data of the outermost frame.
    pub ret: Bytes,
    /// Gas left after the invocation.
    pub leftover_gas: u64,
    /// Interpreter-level error, if any. The invocation still consumed gas
    /// and its surviving state changes may still commit.
    pub vm_error: Option<String>,
}

impl VmOutcome {
    /// Successful outcome.
    pub fn success(ret: Bytes, leftover_gas: u64) -> Self {
        Self { ret, leftover_gas, vm_error: None }
    }

    /// Failed outcome with an interpreter error string.
    pub fn error(leftover_gas: u64, vm_error: impl Into<String>) -> Self {
        Self { ret: Bytes::new(), leftover_gas, vm_error: Some(vm_error.into()) }
    }
}

/// Cooperative cancellation handle.
///
/// Ordinary block processing runs to completion and never sets a deadline;
/// tracing and simulation paths do. The interpreter is expected to poll
/// [`Self::is_cancelled`] at instruction boundaries and stop with an error
/// outcome when it fires.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Token that never fires on its own.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that fires once the given timeout elapses.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { deadline: Some(Instant::now() + timeout), cancelled: Arc::default() }
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether the work should stop at the next checked boundary.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Structured tracer attached to a message execution. Opcode-level hooks are
/// the interpreter's concern; the engine only reports invocation boundaries
/// with settled gas values.
pub trait Tracer {
    /// Called before the interpreter starts, with the gas handed to it.
    fn on_tx_start(&mut self, _gas_limit: u64) {}

    /// Called after gas settlement, with the final leftover gas.
    fn on_tx_end(&mut self, _leftover_gas: u64) {}
}

/// Per-invocation configuration handed to the interpreter.
#[derive(Default)]
pub struct VmConfig<'a> {
    /// Structured tracer, if any.
    pub tracer: Option<&'a mut dyn Tracer>,
    /// Cancellation handle polled at instruction boundaries.
    pub cancel: CancelToken,
}

impl core::fmt::Debug for VmConfig<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VmConfig")
            .field("tracer", &self.tracer.is_some())
            .field("cancel", &self.cancel)
            .finish()
    }
}

/// The bytecode interpreter consumed as a black box: execute bytecode given
/// a state-store view, honoring the gas handed over and the cancellation
/// token.
#[auto_impl(&mut, Box)]
pub trait VirtualMachine {
    /// Deploys the initcode carried in `msg.input`, crediting `msg.value` to
    /// the created account. The engine pins the sender nonce around this
    /// invocation.
    fn create(
        &mut self,
        state: &mut dyn VmState,
        block: &BlockEnv,
        msg: &Message,
        available_gas: u64,
        cfg: &mut VmConfig<'_>,
    ) -> VmOutcome;

    /// Executes a call of `to` with `msg.input`, transferring `msg.value`.
    fn call(
        &mut self,
        state: &mut dyn VmState,
        block: &BlockEnv,
        msg: &Message,
        to: Address,
        available_gas: u64,
        cfg: &mut VmConfig<'_>,
    ) -> VmOutcome;
}
