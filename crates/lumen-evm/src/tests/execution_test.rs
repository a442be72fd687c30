use alloy_primitives::{address, Address, Bytes, TxKind, B256, U256};

use crate::{
    constants::{MAX_INIT_CODE_SIZE, TX_GAS},
    error::ExecutionError,
    execution::{Executor, PostExecutionHook, VM_ERR_POST_PROCESSING},
    statedb::{Backend, InMemoryBackend},
    test_utils::{
        fund, legacy_transfer, signed_tx, FailingHook, RecordingHook, RecordingTracer, StubVm,
        TransferVm,
    },
    tx::Message,
    vm::VirtualMachine,
    BlockEnv, BlockResourceState, ChainConfig, EvmParams, VmConfig, VmOutcome,
};

const CHAIN_ID: u64 = 9000;
const SENDER: Address = address!("00000000000000000000000000000000000000a1");
const RECIPIENT: Address = address!("00000000000000000000000000000000000000b2");

struct Env {
    backend: InMemoryBackend,
    params: EvmParams,
    chain: ChainConfig,
    block: BlockEnv,
    block_state: BlockResourceState,
}

fn env() -> Env {
    Env {
        backend: InMemoryBackend::new(),
        params: EvmParams::default(),
        chain: ChainConfig { chain_id: CHAIN_ID, ..Default::default() },
        block: BlockEnv::default(),
        block_state: BlockResourceState::default(),
    }
}

fn executor<'a, V: VirtualMachine>(env: &'a mut Env, vm: &'a mut V) -> Executor<'a, InMemoryBackend, V> {
    Executor::new(
        &mut env.backend,
        vm,
        &env.params,
        &env.chain,
        &env.block,
        &mut env.block_state,
    )
}

fn transfer_msg(value: u64, gas_limit: u64) -> Message {
    Message {
        from: SENDER,
        to: TxKind::Call(RECIPIENT),
        nonce: 0,
        gas_limit,
        gas_price: U256::from(1),
        value: U256::from(value),
        input: Bytes::new(),
        access_list: Default::default(),
        tx_hash: B256::with_last_byte(0xee),
    }
}

/// End-to-end value transfer at gas price 1: the pipeline's fee deduction
/// and nonce increment, then the engine's execution, refund and counters.
#[test]
fn transfer_scenario_settles_fees_nonce_and_counters() {
    use crate::{
        CheckContext, CheckMode, Envelope, FeeMarketParams, Pipeline,
    };
    use crate::test_utils::TestVerifier;

    let mut env = env();
    let fee_params = FeeMarketParams { no_base_fee: true, ..Default::default() };
    let balance = U256::from(1_000_000);
    fund(&mut env.backend, SENDER, balance);

    let tx = signed_tx(legacy_transfer(CHAIN_ID, 0, RECIPIENT, 10, TX_GAS, 1), SENDER);
    let mut envelope = Envelope::from_tx(tx);

    // inclusion-time pipeline pass: deducts the fee, increments the nonce
    let pipeline = Pipeline::builder(Box::new(TestVerifier)).build();
    let mut ctx = CheckContext::new(
        &mut env.backend,
        &env.params,
        &fee_params,
        &env.chain,
        &env.block,
        &mut env.block_state,
        CheckMode::Inclusion,
    );
    pipeline.run(&mut ctx, &mut envelope, false).unwrap();

    let after_pipeline = env.backend.account(SENDER).unwrap();
    assert_eq!(after_pipeline.balance, balance - U256::from(TX_GAS));
    assert_eq!(after_pipeline.nonce, 1);

    // engine pass: transfer executes, nothing left to refund at a 21k limit
    let crate::EnvelopeMsg::Ethereum(tx) = envelope.msgs.remove(0) else { panic!("eth msg") };
    let mut vm = TransferVm::default();
    let outcome = executor(&mut env, &mut vm).apply_transaction(&tx).unwrap();

    assert_eq!(outcome.result.gas_used, TX_GAS);
    assert!(outcome.receipt.status);
    assert_eq!(outcome.receipt.cumulative_gas_used, TX_GAS);

    let sender = env.backend.account(SENDER).unwrap();
    assert_eq!(sender.balance, balance - U256::from(TX_GAS) - U256::from(10));
    assert_eq!(env.backend.account(RECIPIENT).unwrap().balance, U256::from(10));
    assert_eq!(env.block_state.gas_used, TX_GAS);
    assert_eq!(env.block_state.tx_index, 1);
}

#[test]
fn unused_gas_is_refunded_down_to_the_minimum_charge_floor() {
    let mut env = env();
    let balance = U256::from(10_000_000);
    fund(&mut env.backend, SENDER, balance);
    // simulate the up-front fee deduction at gas price 1
    let gas_limit = 50_000u64;
    fund(&mut env.backend, SENDER, balance - U256::from(gas_limit));

    let tx = signed_tx(legacy_transfer(CHAIN_ID, 0, RECIPIENT, 0, gas_limit, 1), SENDER)
        .with_from(SENDER);

    let mut vm = StubVm { gas_cost: 1_000, ..Default::default() };
    let outcome = executor(&mut env, &mut vm).apply_transaction(&tx).unwrap();

    // actual usage is 22_000 but the floor charges half the declared limit
    assert_eq!(outcome.result.gas_used, 25_000);
    let refunded = U256::from(gas_limit - 25_000);
    assert_eq!(
        env.backend.account(SENDER).unwrap().balance,
        balance - U256::from(gas_limit) + refunded
    );
}

#[test]
fn storage_refund_counter_is_capped_by_the_fork_quotient() {
    let mut env = env();
    fund(&mut env.backend, SENDER, U256::from(1_000_000));

    // the interpreter reports 4_000 gas of work and 10_000 of refund credits
    let mut vm = StubVm { gas_cost: 4_000, refund: 10_000, ..Default::default() };
    let gas_limit = 36_000u64;

    // London-equivalent rules: refund <= gas_used / 5
    let res = executor(&mut env, &mut vm)
        .apply_message(&transfer_msg(0, gas_limit), None, false)
        .unwrap();
    // vm used 25_000, refund capped at 5_000, floor is 18_000
    assert_eq!(res.gas_used, 20_000);

    // pre-London rules: refund <= gas_used / 2, so the full credit applies
    // and the floor takes over
    env.chain.london_height = None;
    let res = executor(&mut env, &mut vm)
        .apply_message(&transfer_msg(0, gas_limit), None, false)
        .unwrap();
    assert_eq!(res.gas_used, 18_000);
}

#[test]
fn oversized_initcode_is_rejected_before_any_vm_work() {
    let mut env = env();
    fund(&mut env.backend, SENDER, U256::from(1_000_000));
    let before = env.backend.clone();

    let msg = Message {
        from: SENDER,
        to: TxKind::Create,
        nonce: 0,
        gas_limit: 2_000_000,
        gas_price: U256::from(1),
        value: U256::ZERO,
        input: vec![0u8; MAX_INIT_CODE_SIZE + 1].into(),
        access_list: Default::default(),
        tx_hash: B256::ZERO,
    };

    let mut vm = TransferVm::default();
    let err = executor(&mut env, &mut vm).apply_message(&msg, None, true).unwrap_err();
    assert_eq!(
        err,
        ExecutionError::InitCodeTooLarge { size: MAX_INIT_CODE_SIZE + 1, limit: MAX_INIT_CODE_SIZE }
    );
    assert!(!err.is_fatal());
    assert_eq!(env.backend, before, "no state mutation on rejection");
}

#[test]
fn governance_switches_disable_create_and_call() {
    let mut env = env();
    env.params.enable_create = false;
    let mut vm = TransferVm::default();

    let mut create_msg = transfer_msg(0, 100_000);
    create_msg.to = TxKind::Create;
    let err = executor(&mut env, &mut vm).apply_message(&create_msg, None, false).unwrap_err();
    assert_eq!(err, ExecutionError::CreateDisabled);

    env.params.enable_create = true;
    env.params.enable_call = false;
    let err = executor(&mut env, &mut vm)
        .apply_message(&transfer_msg(0, 100_000), None, false)
        .unwrap_err();
    assert_eq!(err, ExecutionError::CallDisabled);
}

#[test]
fn vm_level_failure_still_commits_and_charges_gas() {
    let mut env = env();
    fund(&mut env.backend, SENDER, U256::from(1_000_000));

    let tx = signed_tx(legacy_transfer(CHAIN_ID, 0, RECIPIENT, 0, TX_GAS, 1), SENDER)
        .with_from(SENDER);
    let mut vm = StubVm { vm_error: Some("execution reverted".to_string()), ..Default::default() };
    let outcome = executor(&mut env, &mut vm).apply_transaction(&tx).unwrap();

    assert!(outcome.result.failed());
    assert!(!outcome.receipt.status);
    assert_eq!(outcome.result.gas_used, TX_GAS);
    assert_eq!(env.block_state.tx_index, 1);
    assert_eq!(env.block_state.gas_used, TX_GAS);
}

#[test]
fn contract_creation_pins_and_advances_the_sender_nonce() {
    let mut env = env();
    fund(&mut env.backend, SENDER, U256::from(10_000_000));

    let code = Bytes::from_static(&[0x60, 0x80]);
    let msg = Message {
        from: SENDER,
        to: TxKind::Create,
        nonce: 0,
        gas_limit: 100_000,
        gas_price: U256::from(1),
        value: U256::ZERO,
        input: code.clone(),
        access_list: Default::default(),
        tx_hash: B256::ZERO,
    };

    let mut vm = TransferVm::default();
    let res = executor(&mut env, &mut vm).apply_message(&msg, None, true).unwrap();
    assert!(!res.failed());

    let created = SENDER.create(0);
    assert_eq!(env.backend.code(env.backend.account(created).unwrap().code_hash), code);
    assert_eq!(env.backend.account(SENDER).unwrap().nonce, 1);
}

#[test]
fn successful_hooks_observe_the_receipt_and_state_commits() {
    let mut env = env();
    fund(&mut env.backend, SENDER, U256::from(1_000_000));

    let hook = RecordingHook::default();
    let receipts = hook.receipts.clone();
    let hooks: Vec<Box<dyn PostExecutionHook>> = vec![Box::new(hook)];

    let tx = signed_tx(legacy_transfer(CHAIN_ID, 0, RECIPIENT, 10, TX_GAS, 1), SENDER)
        .with_from(SENDER);
    let mut vm = TransferVm::default();
    let outcome = executor(&mut env, &mut vm)
        .with_hooks(&hooks)
        .apply_transaction(&tx)
        .unwrap();

    assert!(outcome.receipt.status);
    assert_eq!(receipts.lock().unwrap().len(), 1);
    assert_eq!(env.backend.account(RECIPIENT).unwrap().balance, U256::from(10));
}

#[test]
fn hook_failure_degrades_the_tx_but_keeps_gas_accounted() {
    let scribble = address!("00000000000000000000000000000000000000dd");
    let mut env = env();
    let balance = U256::from(1_000_000);
    fund(&mut env.backend, SENDER, balance);

    let hooks: Vec<Box<dyn PostExecutionHook>> =
        vec![Box::new(FailingHook { scribble: Some(scribble) })];

    let tx = signed_tx(legacy_transfer(CHAIN_ID, 0, RECIPIENT, 10, TX_GAS, 1), SENDER)
        .with_from(SENDER);
    let mut vm = TransferVm::default();
    let outcome = executor(&mut env, &mut vm)
        .with_hooks(&hooks)
        .apply_transaction(&tx)
        .unwrap();

    // degraded to a no-log failure
    assert_eq!(outcome.result.vm_error.as_deref(), Some(VM_ERR_POST_PROCESSING));
    assert!(outcome.result.logs.is_empty());
    assert!(!outcome.receipt.status);

    // the transaction's and the hook's state changes were discarded
    assert!(env.backend.account(RECIPIENT).is_none());
    assert!(env.backend.account(scribble).is_none());

    // but gas stays accounted and the unused gas was refunded
    assert_eq!(env.block_state.gas_used, TX_GAS);
    assert_eq!(env.backend.account(SENDER).unwrap().balance, balance);
}

#[test]
fn refund_leftover_gas_overflow_is_fatal() {
    struct OverflowVm;

    impl VirtualMachine for OverflowVm {
        fn create(
            &mut self,
            _state: &mut dyn crate::VmState,
            _block: &BlockEnv,
            _msg: &Message,
            _gas: u64,
            _cfg: &mut VmConfig<'_>,
        ) -> VmOutcome {
            VmOutcome::success(Bytes::new(), u64::MAX)
        }

        fn call(
            &mut self,
            _state: &mut dyn crate::VmState,
            _block: &BlockEnv,
            _msg: &Message,
            _to: Address,
            _gas: u64,
            _cfg: &mut VmConfig<'_>,
        ) -> VmOutcome {
            VmOutcome::success(Bytes::new(), u64::MAX)
        }
    }

    let mut env = env();
    fund(&mut env.backend, SENDER, U256::from(1_000_000));

    let mut vm = OverflowVm;
    let err = executor(&mut env, &mut vm)
        .apply_message(&transfer_msg(0, TX_GAS), None, false)
        .unwrap_err();
    assert!(matches!(err, ExecutionError::GasOverflow { .. }));
    assert!(err.is_fatal());
}

#[test]
fn tracer_observes_settled_gas_boundaries() {
    let mut env = env();
    fund(&mut env.backend, SENDER, U256::from(1_000_000));

    let mut vm = StubVm { gas_cost: 1_000, ..Default::default() };
    let mut tracer = RecordingTracer::default();
    let gas_limit = 50_000u64;
    let res = executor(&mut env, &mut vm)
        .apply_message(&transfer_msg(0, gas_limit), Some(&mut tracer), false)
        .unwrap();

    assert_eq!(tracer.started, vec![gas_limit]);
    assert_eq!(tracer.ended, vec![gas_limit - res.gas_used]);
}
