use alloy_primitives::{address, keccak256, Address, Bytes, Log, B256, U256};

use crate::{
    constants::EMPTY_CODE_HASH,
    statedb::{Account, Backend, InMemoryBackend, StateDB, VmState},
    test_utils::fund,
    Rules,
};

const ALICE: Address = address!("00000000000000000000000000000000000000a1");
const BOB: Address = address!("00000000000000000000000000000000000000b2");

const MODERN: Rules = Rules { is_london: true, is_shanghai: true };

fn log(address: Address) -> Log {
    Log::new_unchecked(address, vec![B256::ZERO], Bytes::new())
}

#[test]
fn create_account_preserves_balance_and_resets_the_rest() {
    let mut backend = InMemoryBackend::new();
    backend
        .set_account(
            ALICE,
            Account { nonce: 7, balance: U256::from(100), code_hash: keccak256([1, 2, 3]) },
        )
        .unwrap();
    backend.set_storage(ALICE, U256::from(1), U256::from(9)).unwrap();

    let mut db = StateDB::new(&mut backend);
    db.create_account(ALICE);

    assert_eq!(db.get_balance(ALICE), U256::from(100));
    assert_eq!(db.get_nonce(ALICE), 0);
    assert_eq!(db.get_code_hash(ALICE), EMPTY_CODE_HASH);
    // re-created accounts see fresh storage
    assert_eq!(db.get_state(ALICE, U256::from(1)), U256::ZERO);

    db.commit().unwrap();
    assert_eq!(backend.account(ALICE).unwrap().balance, U256::from(100));
    assert_eq!(backend.storage(ALICE, U256::from(1)), U256::ZERO);
}

#[test]
fn balance_is_the_arithmetic_sum_of_credits_and_debits() {
    let mut backend = InMemoryBackend::new();
    let mut db = StateDB::new(&mut backend);

    db.add_balance(ALICE, U256::from(100));
    db.add_balance(ALICE, U256::from(50));
    db.sub_balance(ALICE, U256::from(30));
    // zero amounts are no-ops
    db.add_balance(ALICE, U256::ZERO);
    db.sub_balance(ALICE, U256::ZERO);

    assert_eq!(db.get_balance(ALICE), U256::from(120));
}

#[test]
#[should_panic(expected = "balance underflow")]
fn debiting_more_than_the_balance_is_fatal() {
    let mut backend = InMemoryBackend::new();
    let mut db = StateDB::new(&mut backend);
    db.add_balance(ALICE, U256::from(5));
    db.sub_balance(ALICE, U256::from(6));
}

#[test]
fn code_is_content_addressed_and_empty_code_is_no_contract() {
    let mut backend = InMemoryBackend::new();
    let mut db = StateDB::new(&mut backend);

    // unknown account has a zero code hash, existing EOA the canonical one
    assert_eq!(db.get_code_hash(BOB), B256::ZERO);
    db.create_account(ALICE);
    assert_eq!(db.get_code_hash(ALICE), EMPTY_CODE_HASH);

    let code = Bytes::from(hex::decode("60006000").unwrap());
    db.set_code(ALICE, code.clone());
    assert_eq!(db.get_code_hash(ALICE), keccak256(&code));
    assert_eq!(db.get_code(ALICE), code);
    assert_eq!(db.get_code_size(ALICE), 4);

    db.set_code(ALICE, Bytes::new());
    assert_eq!(db.get_code_hash(ALICE), EMPTY_CODE_HASH);

    db.set_code(ALICE, code.clone());
    db.commit().unwrap();
    assert_eq!(backend.code(keccak256(&code)), code);
    assert!(backend.account(ALICE).unwrap().is_contract());
}

#[test]
fn storage_writes_are_buffered_until_commit() {
    let mut backend = InMemoryBackend::new();
    backend.set_account(ALICE, Account::default()).unwrap();
    backend.set_storage(ALICE, U256::from(1), U256::from(7)).unwrap();

    let mut db = StateDB::new(&mut backend);
    assert_eq!(db.get_state(ALICE, U256::from(1)), U256::from(7));

    db.set_state(ALICE, U256::from(1), U256::from(42));
    assert_eq!(db.get_state(ALICE, U256::from(1)), U256::from(42));
    // committed reads bypass the dirty value
    assert_eq!(db.get_committed_state(ALICE, U256::from(1)), U256::from(7));
    assert_eq!(backend.storage(ALICE, U256::from(1)), U256::from(7));

    let mut db = StateDB::new(&mut backend);
    db.set_state(ALICE, U256::from(1), U256::from(42));
    db.commit().unwrap();
    assert_eq!(backend.storage(ALICE, U256::from(1)), U256::from(42));
}

#[test]
fn snapshot_revert_restores_every_dimension_of_state() {
    let mut backend = InMemoryBackend::new();
    fund(&mut backend, ALICE, U256::from(1_000));

    let mut db = StateDB::new(&mut backend);
    db.set_nonce(ALICE, 3);
    db.set_state(ALICE, U256::from(1), U256::from(11));
    db.add_log(log(ALICE));

    let snapshot = db.snapshot();

    db.add_balance(ALICE, U256::from(500));
    db.set_nonce(ALICE, 9);
    db.set_code(ALICE, Bytes::from_static(&[1]));
    db.set_state(ALICE, U256::from(1), U256::from(22));
    db.set_transient_state(ALICE, U256::from(2), U256::from(33));
    db.add_log(log(ALICE));
    db.add_address_to_access_list(BOB);
    db.add_slot_to_access_list(BOB, U256::from(5));
    db.create_account(BOB);

    db.revert_to_snapshot(snapshot);

    assert_eq!(db.get_balance(ALICE), U256::from(1_000));
    assert_eq!(db.get_nonce(ALICE), 3);
    assert_eq!(db.get_code_hash(ALICE), EMPTY_CODE_HASH);
    assert_eq!(db.get_state(ALICE, U256::from(1)), U256::from(11));
    assert_eq!(db.get_transient_state(ALICE, U256::from(2)), U256::ZERO);
    assert_eq!(db.logs().len(), 1);
    assert!(!db.address_in_access_list(BOB));
    assert!(!db.slot_in_access_list(BOB, U256::from(5)));
    assert!(!db.exists(BOB));

    // reverting an already-unwound revision is a no-op
    db.revert_to_snapshot(snapshot);
    assert_eq!(db.get_balance(ALICE), U256::from(1_000));
}

#[test]
fn nested_snapshots_unwind_in_order() {
    let mut backend = InMemoryBackend::new();
    let mut db = StateDB::new(&mut backend);

    db.add_balance(ALICE, U256::from(1));
    let outer = db.snapshot();
    db.add_balance(ALICE, U256::from(2));
    let inner = db.snapshot();
    db.add_balance(ALICE, U256::from(4));

    db.revert_to_snapshot(inner);
    assert_eq!(db.get_balance(ALICE), U256::from(3));

    // snapshot ids increase monotonically
    assert!(inner > outer);

    db.revert_to_snapshot(outer);
    assert_eq!(db.get_balance(ALICE), U256::from(1));
}

#[test]
fn reverting_an_outer_snapshot_unwinds_nested_ones_too() {
    let mut backend = InMemoryBackend::new();
    let mut db = StateDB::new(&mut backend);

    let outer = db.snapshot();
    db.add_balance(ALICE, U256::from(1));
    let _inner = db.snapshot();
    db.add_balance(ALICE, U256::from(2));

    db.revert_to_snapshot(outer);
    assert_eq!(db.get_balance(ALICE), U256::ZERO);
}

#[test]
fn refund_counter_accumulates_and_underflow_panics() {
    let mut backend = InMemoryBackend::new();
    let mut db = StateDB::new(&mut backend);

    db.add_refund(10_000);
    db.sub_refund(4_000);
    assert_eq!(db.get_refund(), 6_000);
}

#[test]
#[should_panic(expected = "refund counter below zero")]
fn refund_underflow_is_fatal() {
    let mut backend = InMemoryBackend::new();
    let mut db = StateDB::new(&mut backend);
    db.add_refund(5);
    db.sub_refund(6);
}

#[test]
fn suicide_zeroes_balance_and_removes_at_commit() {
    let mut backend = InMemoryBackend::new();
    fund(&mut backend, ALICE, U256::from(777));
    backend.set_storage(ALICE, U256::from(1), U256::from(2)).unwrap();

    let mut db = StateDB::new(&mut backend);
    assert!(!db.has_suicided(ALICE));
    assert!(db.suicide(ALICE));
    assert!(db.has_suicided(ALICE));
    assert_eq!(db.get_balance(ALICE), U256::ZERO);
    // unknown accounts cannot be destroyed
    assert!(!db.suicide(BOB));

    db.commit().unwrap();
    assert!(backend.account(ALICE).is_none());
    assert_eq!(backend.storage(ALICE, U256::from(1)), U256::ZERO);
}

#[test]
fn suicide_reverts_with_its_snapshot() {
    let mut backend = InMemoryBackend::new();
    fund(&mut backend, ALICE, U256::from(777));

    let mut db = StateDB::new(&mut backend);
    let snapshot = db.snapshot();
    db.suicide(ALICE);
    db.revert_to_snapshot(snapshot);

    assert!(!db.has_suicided(ALICE));
    assert_eq!(db.get_balance(ALICE), U256::from(777));
}

#[test]
fn prepare_clears_transient_storage_and_warms_declared_state() {
    use alloy_eips::eip2930::{AccessList, AccessListItem};
    use alloy_primitives::TxKind;

    let mut backend = InMemoryBackend::new();
    let mut db = StateDB::new(&mut backend);
    db.set_transient_state(ALICE, U256::from(1), U256::from(2));

    let list = AccessList(vec![AccessListItem {
        address: BOB,
        storage_keys: vec![B256::with_last_byte(5)],
    }]);
    let coinbase = address!("00000000000000000000000000000000000000cb");
    db.prepare(&MODERN, ALICE, coinbase, TxKind::Call(BOB), &[], &list);

    assert_eq!(db.get_transient_state(ALICE, U256::from(1)), U256::ZERO);
    assert!(db.address_in_access_list(ALICE));
    assert!(db.address_in_access_list(BOB));
    assert!(db.address_in_access_list(coinbase));
    assert!(db.slot_in_access_list(BOB, U256::from(5)));
    assert!(!db.slot_in_access_list(BOB, U256::from(6)));
}
