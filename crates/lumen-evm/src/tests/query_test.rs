use alloy_primitives::{address, Address, Bytes, TxKind, B256, U256};

use crate::{
    constants::TX_GAS,
    execution::Executor,
    query::EstimateGasError,
    statedb::{Backend, InMemoryBackend},
    test_utils::{fund, legacy_transfer, signed_tx, RecordingTracer, StubVm, TransferVm},
    tx::Message,
    vm::VirtualMachine,
    BlockEnv, BlockResourceState, ChainConfig, EvmParams,
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
        block: BlockEnv { gas_limit: 10_000_000, ..Default::default() },
        block_state: BlockResourceState::default(),
    }
}

fn executor<'a, V: VirtualMachine>(
    env: &'a mut Env,
    vm: &'a mut V,
) -> Executor<'a, InMemoryBackend, V> {
    Executor::new(
        &mut env.backend,
        vm,
        &env.params,
        &env.chain,
        &env.block,
        &mut env.block_state,
    )
}

fn call_msg(gas_limit: u64) -> Message {
    Message {
        from: SENDER,
        to: TxKind::Call(RECIPIENT),
        nonce: 0,
        gas_limit,
        gas_price: U256::from(1),
        value: U256::ZERO,
        input: Bytes::new(),
        access_list: Default::default(),
        tx_hash: B256::ZERO,
    }
}

#[test]
fn call_leaves_no_observable_state_behind() {
    let mut env = env();
    fund(&mut env.backend, SENDER, U256::from(1_000_000));
    let before = env.backend.clone();

    let mut vm = TransferVm::default();
    let mut msg = call_msg(TX_GAS);
    msg.value = U256::from(500);
    let res = executor(&mut env, &mut vm).call(&msg, None).unwrap();

    assert!(!res.failed());
    assert_eq!(env.backend, before);
    assert_eq!(env.block_state, BlockResourceState::default());
}

#[test]
fn estimate_gas_converges_on_the_smallest_working_limit() {
    let mut env = env();
    fund(&mut env.backend, SENDER, U256::from(1_000_000));

    // the interpreter wants exactly 9_000 gas on top of the intrinsic cost
    let mut vm = StubVm { gas_cost: 9_000, ..Default::default() };
    let estimate = executor(&mut env, &mut vm).estimate_gas(&call_msg(0), None).unwrap();
    assert_eq!(estimate, TX_GAS + 9_000);
}

#[test]
fn estimate_gas_probing_does_not_mutate_state() {
    let mut env = env();
    fund(&mut env.backend, SENDER, U256::from(1_000_000));
    let before = env.backend.clone();

    let mut vm = StubVm { gas_cost: 9_000, ..Default::default() };
    executor(&mut env, &mut vm).estimate_gas(&call_msg(0), None).unwrap();
    assert_eq!(env.backend, before);
}

#[test]
fn estimate_gas_reports_an_insufficient_cap() {
    let mut env = env();
    fund(&mut env.backend, SENDER, U256::from(1_000_000));

    let mut vm = StubVm { gas_cost: 9_000, ..Default::default() };
    let err = executor(&mut env, &mut vm)
        .estimate_gas(&call_msg(0), Some(25_000))
        .unwrap_err();
    assert_eq!(err, EstimateGasError::GasCapTooLow(25_000));
}

#[test]
fn estimate_gas_surfaces_non_gas_vm_errors_verbatim() {
    let mut env = env();
    fund(&mut env.backend, SENDER, U256::from(1_000_000));

    let mut vm = StubVm {
        vm_error: Some("execution reverted: kaput".to_string()),
        ..Default::default()
    };
    let err = executor(&mut env, &mut vm).estimate_gas(&call_msg(0), None).unwrap_err();
    assert_eq!(err, EstimateGasError::VmError("execution reverted: kaput".to_string()));
}

#[test]
fn trace_call_attaches_the_tracer_without_committing() {
    let mut env = env();
    fund(&mut env.backend, SENDER, U256::from(1_000_000));
    let before = env.backend.clone();

    let mut vm = StubVm { gas_cost: 500, ..Default::default() };
    let mut tracer = RecordingTracer::default();
    let res = executor(&mut env, &mut vm)
        .trace_call(&call_msg(50_000), &mut tracer, None)
        .unwrap();

    assert_eq!(tracer.started, vec![50_000]);
    assert_eq!(tracer.ended, vec![50_000 - res.gas_used]);
    assert_eq!(env.backend, before);
}

#[test]
fn trace_transaction_replays_predecessors_on_a_discardable_view() {
    let mut env = env();
    let balance = U256::from(10_000_000);
    fund(&mut env.backend, SENDER, balance);
    let before = env.backend.clone();

    let predecessor = signed_tx(legacy_transfer(CHAIN_ID, 0, RECIPIENT, 100, TX_GAS, 1), SENDER)
        .with_from(SENDER);
    let tx = signed_tx(legacy_transfer(CHAIN_ID, 1, RECIPIENT, 25, TX_GAS, 1), SENDER)
        .with_from(SENDER);

    let mut vm = TransferVm::default();
    let mut tracer = RecordingTracer::default();
    let res = executor(&mut env, &mut vm)
        .trace_transaction(std::slice::from_ref(&predecessor), &tx, &mut tracer, None)
        .unwrap();

    assert!(!res.failed());
    // the traced transaction saw both invocation boundaries recorded
    assert_eq!(tracer.started.len(), 1);
    // nothing of the replay leaked into the committed view
    assert_eq!(env.backend, before);
}

#[test]
fn trace_block_traces_every_transaction_in_order() {
    let mut env = env();
    fund(&mut env.backend, SENDER, U256::from(10_000_000));

    let txs = vec![
        signed_tx(legacy_transfer(CHAIN_ID, 0, RECIPIENT, 1, TX_GAS, 1), SENDER)
            .with_from(SENDER),
        signed_tx(legacy_transfer(CHAIN_ID, 1, RECIPIENT, 2, TX_GAS, 1), SENDER)
            .with_from(SENDER),
    ];

    let mut vm = TransferVm::default();
    let mut tracer = RecordingTracer::default();
    let results = executor(&mut env, &mut vm).trace_block(&txs, &mut tracer, None).unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(tracer.started, vec![TX_GAS, TX_GAS]);
    assert!(results.iter().all(|res| !res.failed()));
}
