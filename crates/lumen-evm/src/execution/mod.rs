//! State-transition engine.
//!
//! [`Executor`] turns one message into one deterministic execution result,
//! with gas accounting equivalent to the virtual machine's native semantics
//! rather than the host ledger's own metering. [`Executor::apply_message`]
//! is the low-level entry point shared with read-only queries;
//! [`Executor::apply_transaction`] layers receipts, post-execution hooks,
//! the unused-gas refund and the block-level transient counters on top.

mod hooks;
mod receipt;

pub use hooks::{PostExecutionHook, VM_ERR_POST_PROCESSING};
pub use receipt::{logs_bloom, TxReceipt};

use alloy_primitives::{Bloom, Bytes, Log, TxKind, B256, U256};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{
    block::{BlockEnv, BlockResourceState},
    constants::MAX_INIT_CODE_SIZE,
    error::ExecutionError,
    gas::{gas_to_refund, intrinsic_gas, minimum_gas_charge, refund_quotient},
    params::{ChainConfig, EvmParams},
    statedb::{Backend, CacheBackend, StateDB, VmState},
    tx::{Message, SignedTx},
    vm::{CancelToken, Tracer, VirtualMachine, VmConfig},
};
use receipt::build_receipt;

/// Deterministic result of one message execution.
///
/// A VM-level error is carried as a string: the invocation still consumed
/// gas and, for committed transactions, still produced a receipt. Engine
/// failures travel as [`ExecutionError`] instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Gas charged to the sender, including the minimum-charge floor.
    pub gas_used: u64,
    /// Interpreter-level error string, if any.
    pub vm_error: Option<String>,
    /// Return data of the outermost frame.
    pub ret: Bytes,
    /// Logs emitted by the execution, in emission order.
    pub logs: Vec<Log>,
    /// Hash of the originating transaction.
    pub tx_hash: B256,
}

impl ExecutionResult {
    /// Whether the execution failed at the VM level.
    pub fn failed(&self) -> bool {
        self.vm_error.is_some()
    }
}

/// Execution result of one transaction together with its receipt.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Deref)]
pub struct TxOutcome {
    /// The execution result.
    #[deref]
    pub result: ExecutionResult,
    /// The receipt built for the transaction.
    pub receipt: TxReceipt,
}

/// The state-transition engine for one block.
///
/// Borrows every collaborator explicitly: the committed state view, the
/// black-box interpreter, the parameter sets, the block environment, the
/// per-block transient counters and the hook registry. No process-wide
/// state.
pub struct Executor<'a, B: Backend, V: VirtualMachine> {
    pub(crate) backend: &'a mut B,
    pub(crate) vm: &'a mut V,
    pub(crate) params: &'a EvmParams,
    pub(crate) chain: &'a ChainConfig,
    pub(crate) block: &'a BlockEnv,
    pub(crate) block_state: &'a mut BlockResourceState,
    pub(crate) hooks: &'a [Box<dyn PostExecutionHook>],
}

impl<B: Backend, V: VirtualMachine> core::fmt::Debug for Executor<'_, B, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Executor")
            .field("block", &self.block.height)
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

impl<'a, B: Backend, V: VirtualMachine> Executor<'a, B, V> {
    /// Creates an engine for the given block.
    pub fn new(
        backend: &'a mut B,
        vm: &'a mut V,
        params: &'a EvmParams,
        chain: &'a ChainConfig,
        block: &'a BlockEnv,
        block_state: &'a mut BlockResourceState,
    ) -> Self {
        Self { backend, vm, params, chain, block, block_state, hooks: &[] }
    }

    /// Registers the post-execution hook list.
    pub fn with_hooks(mut self, hooks: &'a [Box<dyn PostExecutionHook>]) -> Self {
        self.hooks = hooks;
        self
    }

    /// Executes one message against the store.
    ///
    /// With `commit = false` the call has zero observable side effects,
    /// which is what read-only queries and gas estimation rely on.
    pub fn apply_message(
        &mut self,
        msg: &Message,
        tracer: Option<&mut dyn Tracer>,
        commit: bool,
    ) -> Result<ExecutionResult, ExecutionError> {
        let mut vm_cfg = VmConfig { tracer, cancel: CancelToken::new() };
        self.apply_message_with_config(msg, &mut vm_cfg, commit)
    }

    pub(crate) fn apply_message_with_config(
        &mut self,
        msg: &Message,
        vm_cfg: &mut VmConfig<'_>,
        commit: bool,
    ) -> Result<ExecutionResult, ExecutionError> {
        apply_message_with(
            &mut *self.backend,
            &mut *self.vm,
            self.params,
            self.chain,
            self.block,
            msg,
            vm_cfg,
            commit,
        )
    }

    /// Executes one signed transaction during block processing: applies the
    /// message with commit, builds the receipt, runs the registered hooks
    /// inside the same discardable scope, refunds unused gas and updates the
    /// block-level counters.
    pub fn apply_transaction(&mut self, tx: &SignedTx) -> Result<TxOutcome, ExecutionError> {
        let msg = tx
            .as_message(self.block.base_fee.as_ref())
            .ok_or(ExecutionError::MissingSender)?;
        let mut vm_cfg = VmConfig::default();

        let (res, receipt) = if self.hooks.is_empty() {
            let res = apply_message_with(
                &mut *self.backend,
                &mut *self.vm,
                self.params,
                self.chain,
                self.block,
                &msg,
                &mut vm_cfg,
                true,
            )?;
            let receipt = build_receipt(
                self.block,
                self.block_state.gas_used,
                self.block_state.tx_index,
                &msg,
                &res,
            );
            (res, receipt)
        } else {
            // Contain the transaction and its hooks in one discardable
            // scope, so a failed hook can revert the transaction's side
            // effects while the block's outer view proceeds to the next
            // transaction.
            let mut cache = CacheBackend::new(&mut *self.backend);
            let mut res = apply_message_with(
                &mut cache,
                &mut *self.vm,
                self.params,
                self.chain,
                self.block,
                &msg,
                &mut vm_cfg,
                true,
            )?;
            let mut receipt = build_receipt(
                self.block,
                self.block_state.gas_used,
                self.block_state.tx_index,
                &msg,
                &res,
            );

            if res.failed() {
                // nothing to run hooks on; drop the scope with its changes
                drop(cache);
            } else {
                let mut hook_err = None;
                for hook in self.hooks {
                    if let Err(err) = hook.on_post_execution(&mut cache, &msg, &receipt) {
                        hook_err = Some(err);
                        break;
                    }
                }
                match hook_err {
                    None => cache.commit()?,
                    Some(err) => {
                        error!(error = %err, tx_hash = %tx.hash, "tx post processing failed");
                        // Degrade to a no-log failure; gas stays accounted.
                        res.vm_error = Some(VM_ERR_POST_PROCESSING.to_string());
                        res.logs.clear();
                        receipt.status = false;
                        receipt.logs.clear();
                        receipt.bloom = Bloom::default();
                    }
                }
            }
            (res, receipt)
        };

        self.settle(&msg, &res, &receipt)?;
        Ok(TxOutcome { result: res, receipt })
    }

    /// Refunds unused gas and reconciles the block-level counters.
    fn settle(
        &mut self,
        msg: &Message,
        res: &ExecutionResult,
        receipt: &TxReceipt,
    ) -> Result<(), ExecutionError> {
        // refund unused gas in the fee currency, to match the VM's gas
        // consumption instead of the host ledger's
        self.refund_gas(msg, msg.gas_limit - res.gas_used)?;

        if !receipt.logs.is_empty() {
            self.block_state.bloom.accrue_bloom(&receipt.bloom);
            self.block_state.log_index += receipt.logs.len() as u64;
        }
        self.block_state.tx_index += 1;
        self.block_state.reconcile_gas_used(res.gas_used)?;
        Ok(())
    }

    fn refund_gas(&mut self, msg: &Message, leftover_gas: u64) -> Result<(), ExecutionError> {
        if leftover_gas == 0 {
            return Ok(());
        }
        let refund = msg
            .gas_price
            .checked_mul(U256::from(leftover_gas))
            .ok_or(ExecutionError::RefundOverflow)?;
        let mut account = self.backend.account(msg.from).unwrap_or_default();
        account.balance = account
            .balance
            .checked_add(refund)
            .ok_or(ExecutionError::RefundOverflow)?;
        self.backend.set_account(msg.from, account)?;
        Ok(())
    }
}

/// Core of [`Executor::apply_message`], generic over the backend so the
/// hook-isolation and query paths can run it against a child view.
#[allow(clippy::too_many_arguments)]
fn apply_message_with<B: Backend, V: VirtualMachine>(
    backend: &mut B,
    vm: &mut V,
    params: &EvmParams,
    chain: &ChainConfig,
    block: &BlockEnv,
    msg: &Message,
    vm_cfg: &mut VmConfig<'_>,
    commit: bool,
) -> Result<ExecutionResult, ExecutionError> {
    if !params.enable_create && msg.is_contract_creation() {
        return Err(ExecutionError::CreateDisabled);
    }
    if !params.enable_call && !msg.is_contract_creation() {
        return Err(ExecutionError::CallDisabled);
    }

    let rules = chain.rules(block.height);
    let mut state = StateDB::new(backend);
    let mut leftover_gas = msg.gas_limit;

    if let Some(tracer) = vm_cfg.tracer.as_deref_mut() {
        tracer.on_tx_start(leftover_gas);
    }

    let contract_creation = msg.is_contract_creation();

    // Checked again even though the pipeline already did: read-only query
    // paths reach this point without going through the pipeline at all.
    let intrinsic = intrinsic_gas(&msg.input, &msg.access_list, contract_creation, &rules)?;
    if leftover_gas < intrinsic {
        // gas estimation probes for this exact error
        return Err(ExecutionError::IntrinsicGas { have: leftover_gas, want: intrinsic });
    }
    leftover_gas -= intrinsic;

    if rules.is_shanghai && contract_creation && msg.input.len() > MAX_INIT_CODE_SIZE {
        return Err(ExecutionError::InitCodeTooLarge {
            size: msg.input.len(),
            limit: MAX_INIT_CODE_SIZE,
        });
    }

    // access-list preparation and transient-storage reset happen here, not
    // in the pipeline, because query paths skip the pipeline
    state.prepare(&rules, msg.from, block.coinbase, msg.to, &[], &msg.access_list);

    let outcome = match msg.to {
        TxKind::Create => {
            // take over nonce management from the interpreter: pin the
            // sender nonce to the declared one, then advance it exactly once
            // no matter how the inner call ends
            state.set_nonce(msg.from, msg.nonce);
            let outcome = vm.create(&mut state, block, msg, leftover_gas, vm_cfg);
            state.set_nonce(msg.from, msg.nonce + 1);
            outcome
        }
        TxKind::Call(to) => vm.call(&mut state, block, msg, to, leftover_gas, vm_cfg),
    };

    if msg.gas_limit < outcome.leftover_gas {
        return Err(ExecutionError::GasOverflow {
            gas_limit: msg.gas_limit,
            leftover_gas: outcome.leftover_gas,
        });
    }
    let mut leftover_gas = outcome.leftover_gas;
    let gas_used_by_vm = msg.gas_limit - leftover_gas;
    leftover_gas += gas_to_refund(state.get_refund(), gas_used_by_vm, refund_quotient(&rules));
    if msg.gas_limit < leftover_gas {
        return Err(ExecutionError::GasOverflow { gas_limit: msg.gas_limit, leftover_gas });
    }

    let logs = state.logs().to_vec();
    if commit {
        state.commit()?;
    }

    // charge a minimum amount of gas when the declared limit sits far above
    // the actual usage, to keep realized fees aligned with the host
    // ledger's own resource pricing
    let minimum_gas_used = minimum_gas_charge(msg.gas_limit, params.min_gas_multiplier_bps);
    let gas_used = minimum_gas_used.max(msg.gas_limit - leftover_gas);
    // recompute leftover for tracer consistency
    let leftover_gas = msg.gas_limit - gas_used;
    if let Some(tracer) = vm_cfg.tracer.as_deref_mut() {
        tracer.on_tx_end(leftover_gas);
    }

    Ok(ExecutionResult {
        gas_used,
        vm_error: outcome.vm_error,
        ret: outcome.ret,
        logs,
        tx_hash: msg.tx_hash,
    })
}
