//! Read-only query entry points: call simulation, gas estimation and
//! tracing.
//!
//! Each query operates on its own isolated, non-committing store view and
//! never mutates block-level transient counters, so queries may run
//! concurrently with each other and with block processing as long as each
//! gets its own [`Executor`] over its own backend handle. Only these paths
//! support a timeout; block processing always runs to completion.

use std::time::Duration;

use crate::{
    block::BlockResourceState,
    constants::TX_GAS,
    error::ExecutionError,
    execution::Executor,
    statedb::{Backend, CacheBackend},
    tx::{Message, SignedTx},
    vm::{CancelToken, Tracer, VirtualMachine, VmConfig, VM_ERR_OUT_OF_GAS},
};

/// Errors surfaced by gas estimation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EstimateGasError {
    /// The transaction still runs out of gas at the highest allowance.
    #[error("gas required exceeds allowance ({0})")]
    GasCapTooLow(u64),
    /// The transaction fails regardless of gas; the interpreter error is
    /// surfaced verbatim.
    #[error("{0}")]
    VmError(String),
    /// Engine-level failure.
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl<B: Backend, V: VirtualMachine> Executor<'_, B, V> {
    /// Executes a message without committing and returns its result. The
    /// optional timeout cancels the interpreter cooperatively.
    pub fn call(
        &mut self,
        msg: &Message,
        timeout: Option<Duration>,
    ) -> Result<crate::ExecutionResult, ExecutionError> {
        let mut vm_cfg = VmConfig { tracer: None, cancel: cancel_token(timeout) };
        self.apply_message_with_config(msg, &mut vm_cfg, false)
    }

    /// Estimates the smallest gas limit the message executes with, by
    /// binary-searching between `intrinsic_gas - 1` and the given cap (or
    /// the block gas limit), probing each candidate with a non-committing
    /// [`Executor::apply_message`].
    pub fn estimate_gas(
        &mut self,
        msg: &Message,
        gas_cap: Option<u64>,
    ) -> Result<u64, EstimateGasError> {
        let mut hi = if msg.gas_limit >= TX_GAS { msg.gas_limit } else { self.block.gas_limit };
        if let Some(cap) = gas_cap {
            if cap != 0 && hi > cap {
                hi = cap;
            }
        }
        let cap = hi;
        let mut lo = TX_GAS - 1;

        // converges when hi == lo + 1
        while lo + 1 < hi {
            let mid = (hi + lo) / 2;
            let (failed, _) = self.executable(msg, mid)?;
            if failed {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        // reject as invalid if the message still fails at the highest
        // allowance
        if hi == cap {
            let (failed, res) = self.executable(msg, hi)?;
            if failed {
                if let Some(res) = res {
                    match res.vm_error.as_deref() {
                        Some(VM_ERR_OUT_OF_GAS) | None => {}
                        Some(vm_error) => {
                            return Err(EstimateGasError::VmError(vm_error.to_string()))
                        }
                    }
                }
                return Err(EstimateGasError::GasCapTooLow(cap));
            }
        }
        Ok(hi)
    }

    /// Probes whether the message executes within `gas`. Returns whether it
    /// failed and, when the probe reached the interpreter, its result.
    fn executable(
        &mut self,
        msg: &Message,
        gas: u64,
    ) -> Result<(bool, Option<crate::ExecutionResult>), EstimateGasError> {
        let mut probe = msg.clone();
        probe.gas_limit = gas;
        match self.apply_message(&probe, None, false) {
            // the probe simply needs more gas
            Err(ExecutionError::IntrinsicGas { .. }) => Ok((true, None)),
            Err(err) => Err(EstimateGasError::Execution(err)),
            Ok(res) => Ok((res.failed(), Some(res))),
        }
    }

    /// Executes a message without committing, with a structured tracer
    /// attached and under the query timeout discipline.
    pub fn trace_call(
        &mut self,
        msg: &Message,
        tracer: &mut dyn Tracer,
        timeout: Option<Duration>,
    ) -> Result<crate::ExecutionResult, ExecutionError> {
        let mut vm_cfg = VmConfig { tracer: Some(tracer), cancel: cancel_token(timeout) };
        self.apply_message_with_config(msg, &mut vm_cfg, false)
    }

    /// Replays `predecessors` of the enclosing block on a discardable view,
    /// then re-executes `tx` with the tracer attached. All replayed state is
    /// discarded afterwards.
    pub fn trace_transaction(
        &mut self,
        predecessors: &[SignedTx],
        tx: &SignedTx,
        tracer: &mut dyn Tracer,
        timeout: Option<Duration>,
    ) -> Result<crate::ExecutionResult, ExecutionError> {
        let base_fee = self.block.base_fee;
        let mut scratch = BlockResourceState::default();
        let mut cache = CacheBackend::new(&mut *self.backend);
        let mut inner = Executor {
            backend: &mut cache,
            vm: &mut *self.vm,
            params: self.params,
            chain: self.chain,
            block: self.block,
            block_state: &mut scratch,
            hooks: &[],
        };

        for predecessor in predecessors {
            inner.apply_transaction(predecessor)?;
        }

        let msg = tx
            .as_message(base_fee.as_ref())
            .ok_or(ExecutionError::MissingSender)?;
        let mut vm_cfg = VmConfig { tracer: Some(tracer), cancel: cancel_token(timeout) };
        inner.apply_message_with_config(&msg, &mut vm_cfg, true)
    }

    /// Traces every transaction of a block in order on one discardable
    /// view, sharing the timeout across the whole block.
    pub fn trace_block(
        &mut self,
        txs: &[SignedTx],
        tracer: &mut dyn Tracer,
        timeout: Option<Duration>,
    ) -> Result<Vec<crate::ExecutionResult>, ExecutionError> {
        let base_fee = self.block.base_fee;
        let cancel = cancel_token(timeout);
        let mut scratch = BlockResourceState::default();
        let mut cache = CacheBackend::new(&mut *self.backend);
        let mut inner = Executor {
            backend: &mut cache,
            vm: &mut *self.vm,
            params: self.params,
            chain: self.chain,
            block: self.block,
            block_state: &mut scratch,
            hooks: &[],
        };

        let mut results = Vec::with_capacity(txs.len());
        for tx in txs {
            let msg = tx
                .as_message(base_fee.as_ref())
                .ok_or(ExecutionError::MissingSender)?;
            let mut vm_cfg =
                VmConfig { tracer: Some(&mut *tracer), cancel: cancel.clone() };
            results.push(inner.apply_message_with_config(&msg, &mut vm_cfg, true)?);
        }
        Ok(results)
    }
}

fn cancel_token(timeout: Option<Duration>) -> CancelToken {
    timeout.map_or_else(CancelToken::new, CancelToken::with_timeout)
}
