//! Test helpers: stub interpreters, deterministic signature recovery,
//! transaction builders and recording hooks.

use std::sync::{Arc, Mutex};

use alloy_primitives::{keccak256, Address, Bytes, TxKind, B256, U256};

use crate::{
    block::BlockEnv,
    error::{HookError, SignatureError, StateError},
    execution::{PostExecutionHook, TxReceipt},
    statedb::{Backend, VmState},
    tx::{LegacyTx, Message, SignatureVerifier, SignedTx, TxData, TxSignature},
    vm::{Tracer, VirtualMachine, VmConfig, VmOutcome, VM_ERR_OUT_OF_GAS},
};

/// Signature verifier that reads the sender address out of the signature's
/// `r` value, where [`signature_for`] encodes it. Rejects a zero `r`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TestVerifier;

impl SignatureVerifier for TestVerifier {
    fn recover_signer(&self, tx: &SignedTx) -> Result<Address, SignatureError> {
        if tx.signature.r.is_zero() {
            return Err(SignatureError("invalid signature".to_string()));
        }
        Ok(Address::from_word(B256::from(tx.signature.r.to_be_bytes::<32>())))
    }
}

/// Encodes a sender address into a signature [`TestVerifier`] recovers.
pub fn signature_for(sender: Address) -> TxSignature {
    TxSignature { r: U256::from_be_slice(sender.as_slice()), s: U256::from(1), v: 27 }
}

/// Builds a legacy value-transfer transaction.
pub fn legacy_transfer(
    chain_id: u64,
    nonce: u64,
    to: Address,
    value: u64,
    gas_limit: u64,
    gas_price: u64,
) -> TxData {
    TxData::Legacy(LegacyTx {
        chain_id: Some(chain_id),
        nonce,
        gas_price: U256::from(gas_price),
        gas_limit,
        to: TxKind::Call(to),
        value: U256::from(value),
        input: Bytes::new(),
    })
}

/// Signs a transaction for `sender` with a synthetic signature and hash.
pub fn signed_tx(tx: TxData, sender: Address) -> SignedTx {
    let mut preimage = Vec::with_capacity(40);
    preimage.extend_from_slice(sender.as_slice());
    preimage.extend_from_slice(&tx.nonce().to_be_bytes());
    preimage.extend_from_slice(&tx.gas_limit().to_be_bytes());
    preimage.extend_from_slice(&tx.value().to_be_bytes::<32>());
    SignedTx::new(tx, signature_for(sender), keccak256(&preimage))
}

/// Creates a funded account on the backend.
pub fn fund<B: Backend>(backend: &mut B, address: Address, balance: U256) {
    let mut account = backend.account(address).unwrap_or_default();
    account.balance = balance;
    backend.set_account(address, account).expect("test backend write");
}

/// Interpreter stub returning a configured outcome. Consumes `gas_cost` on
/// top of the intrinsic cost and reports out-of-gas when not enough is
/// available.
#[derive(Debug, Clone, Default)]
pub struct StubVm {
    /// Gas consumed by every invocation.
    pub gas_cost: u64,
    /// Return data of every invocation.
    pub ret: Bytes,
    /// Interpreter error reported by every invocation.
    pub vm_error: Option<String>,
    /// Refund credits accumulated per invocation.
    pub refund: u64,
}

impl StubVm {
    fn run(&self, state: &mut dyn VmState, available_gas: u64) -> VmOutcome {
        if available_gas < self.gas_cost {
            return VmOutcome::error(0, VM_ERR_OUT_OF_GAS);
        }
        if self.refund > 0 {
            state.add_refund(self.refund);
        }
        VmOutcome {
            ret: self.ret.clone(),
            leftover_gas: available_gas - self.gas_cost,
            vm_error: self.vm_error.clone(),
        }
    }
}

impl VirtualMachine for StubVm {
    fn create(
        &mut self,
        state: &mut dyn VmState,
        _block: &BlockEnv,
        _msg: &Message,
        available_gas: u64,
        _cfg: &mut VmConfig<'_>,
    ) -> VmOutcome {
        self.run(state, available_gas)
    }

    fn call(
        &mut self,
        state: &mut dyn VmState,
        _block: &BlockEnv,
        _msg: &Message,
        _to: Address,
        available_gas: u64,
        _cfg: &mut VmConfig<'_>,
    ) -> VmOutcome {
        self.run(state, available_gas)
    }
}

/// Interpreter stub that performs the top-level value transfer the way the
/// real interpreter would, then consumes `gas_cost`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferVm {
    /// Gas consumed on top of the transfer.
    pub gas_cost: u64,
}

impl VirtualMachine for TransferVm {
    fn create(
        &mut self,
        state: &mut dyn VmState,
        _block: &BlockEnv,
        msg: &Message,
        available_gas: u64,
        _cfg: &mut VmConfig<'_>,
    ) -> VmOutcome {
        if available_gas < self.gas_cost {
            return VmOutcome::error(0, VM_ERR_OUT_OF_GAS);
        }
        let created = msg.from.create(msg.nonce);
        state.create_account(created);
        if !msg.value.is_zero() {
            state.sub_balance(msg.from, msg.value);
            state.add_balance(created, msg.value);
        }
        state.set_code(created, msg.input.clone());
        VmOutcome::success(Bytes::new(), available_gas - self.gas_cost)
    }

    fn call(
        &mut self,
        state: &mut dyn VmState,
        _block: &BlockEnv,
        msg: &Message,
        to: Address,
        available_gas: u64,
        _cfg: &mut VmConfig<'_>,
    ) -> VmOutcome {
        if available_gas < self.gas_cost {
            return VmOutcome::error(0, VM_ERR_OUT_OF_GAS);
        }
        if !msg.value.is_zero() {
            state.sub_balance(msg.from, msg.value);
            state.add_balance(to, msg.value);
        }
        VmOutcome::success(Bytes::new(), available_gas - self.gas_cost)
    }
}

/// Hook recording every receipt it sees.
#[derive(Debug, Clone, Default)]
pub struct RecordingHook {
    /// Receipts observed by the hook.
    pub receipts: Arc<Mutex<Vec<TxReceipt>>>,
}

impl PostExecutionHook for RecordingHook {
    fn on_post_execution(
        &self,
        _backend: &mut dyn Backend,
        _msg: &Message,
        receipt: &TxReceipt,
    ) -> Result<(), HookError> {
        self.receipts.lock().expect("hook mutex").push(receipt.clone());
        Ok(())
    }
}

/// Hook that always fails, optionally after writing state.
#[derive(Debug, Clone, Default)]
pub struct FailingHook {
    /// Account the hook dirties before failing, to prove isolation.
    pub scribble: Option<Address>,
}

impl PostExecutionHook for FailingHook {
    fn on_post_execution(
        &self,
        backend: &mut dyn Backend,
        _msg: &Message,
        _receipt: &TxReceipt,
    ) -> Result<(), HookError> {
        if let Some(address) = self.scribble {
            backend
                .set_account(address, crate::statedb::Account::default())
                .map_err(|StateError(message)| HookError(message))?;
        }
        Err(HookError("hook rejected".to_string()))
    }
}

/// Tracer recording invocation boundaries.
#[derive(Debug, Clone, Default)]
pub struct RecordingTracer {
    /// Gas limits observed at invocation start.
    pub started: Vec<u64>,
    /// Leftover gas observed after settlement.
    pub ended: Vec<u64>,
}

impl Tracer for RecordingTracer {
    fn on_tx_start(&mut self, gas_limit: u64) {
        self.started.push(gas_limit);
    }

    fn on_tx_end(&mut self, leftover_gas: u64) {
        self.ended.push(leftover_gas);
    }
}
