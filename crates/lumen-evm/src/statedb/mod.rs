//! Journaled state store.
//!
//! [`StateDB`] is a durable-looking, in-memory-cached view over accounts,
//! code, storage slots, logs and access-list membership, with nested
//! snapshot/revert and a one-pass atomic commit into a [`Backend`]. One store
//! instance is exclusively owned by the single logical transaction in
//! flight; it transitions open → (mutating)* → committed | discarded and is
//! consumed by [`StateDB::commit`], so a finished instance cannot be reused.

mod access_list;
mod backend;
mod journal;

pub use backend::{Backend, CacheBackend, InMemoryBackend};

use alloy_eips::eip2930::AccessList;
use alloy_primitives::{keccak256, map::HashMap, Address, Bytes, Log, TxKind, B256, U256};

use crate::{
    constants::EMPTY_CODE_HASH,
    error::StateError,
    params::Rules,
};
use access_list::AccessListState;
use journal::{Journal, JournalEntry};

/// Basic account record: nonce, balance and content-addressed code hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Transaction count of the account.
    pub nonce: u64,
    /// Balance in the chain's fee currency. Never negative by construction.
    pub balance: U256,
    /// Keccak-256 hash of the contract code; [`EMPTY_CODE_HASH`] for
    /// externally-owned accounts.
    pub code_hash: B256,
}

impl Default for Account {
    fn default() -> Self {
        Self { nonce: 0, balance: U256::ZERO, code_hash: EMPTY_CODE_HASH }
    }
}

impl Account {
    /// Whether the account carries contract code.
    pub fn is_contract(&self) -> bool {
        self.code_hash != EMPTY_CODE_HASH && self.code_hash != B256::ZERO
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub(crate) struct AccountFlags: u8 {
        /// The entry carries uncommitted mutations.
        const DIRTY = 1 << 0;
        /// The account was created inside this store; its committed storage
        /// is by definition empty.
        const CREATED = 1 << 1;
        /// The account is marked for removal at commit.
        const SELF_DESTRUCTED = 1 << 2;
        /// The account was re-created over an existing one; commit must wipe
        /// the previously committed state first.
        const RESET = 1 << 3;
    }
}

/// Cached per-account state inside one store instance.
#[derive(Debug, Clone)]
pub(crate) struct AccountEntry {
    account: Account,
    code: Option<Bytes>,
    code_dirty: bool,
    dirty_storage: HashMap<U256, U256>,
    origin_storage: HashMap<U256, U256>,
    flags: AccountFlags,
}

impl AccountEntry {
    fn loaded(account: Account) -> Self {
        Self {
            account,
            code: None,
            code_dirty: false,
            dirty_storage: HashMap::default(),
            origin_storage: HashMap::default(),
            flags: AccountFlags::empty(),
        }
    }

    fn fresh(balance: U256, flags: AccountFlags) -> Self {
        Self {
            account: Account { balance, ..Default::default() },
            code: None,
            code_dirty: false,
            dirty_storage: HashMap::default(),
            origin_storage: HashMap::default(),
            flags: flags | AccountFlags::DIRTY | AccountFlags::CREATED,
        }
    }
}

/// The state-store capability surface the interpreter executes against.
///
/// Mirrors the store operations the VM needs: balances, nonces, code,
/// storage (persistent, committed and transient), logs, the refund counter,
/// access-list membership and nested snapshot/revert.
pub trait VmState {
    /// Creates the account, preserving the balance when it already exists
    /// (re-creation on collision keeps funds, resets code and storage).
    /// Idempotent.
    fn create_account(&mut self, address: Address);

    /// Whether the account exists in this view.
    fn exists(&mut self, address: Address) -> bool;

    /// Balance of the account; zero when absent.
    fn get_balance(&mut self, address: Address) -> U256;

    /// Credits the account. A zero amount is a no-op.
    fn add_balance(&mut self, address: Address, amount: U256);

    /// Debits the account. A zero amount is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if the debit would take the balance negative; affordability is
    /// checked by the pipeline and the interpreter before money moves, so an
    /// underflow here is a determinism-breaking bug.
    fn sub_balance(&mut self, address: Address, amount: U256);

    /// Nonce of the account; zero when absent.
    fn get_nonce(&mut self, address: Address) -> u64;

    /// Overwrites the nonce.
    fn set_nonce(&mut self, address: Address, nonce: u64);

    /// Code hash of the account; the canonical empty-code hash for an
    /// existing account without code, zero when the account is absent.
    fn get_code_hash(&mut self, address: Address) -> B256;

    /// Contract code of the account; empty when absent.
    fn get_code(&mut self, address: Address) -> Bytes;

    /// Size of the contract code in bytes.
    fn get_code_size(&mut self, address: Address) -> usize;

    /// Replaces the contract code. Empty code is equivalent to "no contract"
    /// and yields the canonical empty-code hash.
    fn set_code(&mut self, address: Address, code: Bytes);

    /// Current value of a storage slot, including uncommitted writes.
    fn get_state(&mut self, address: Address, key: U256) -> U256;

    /// Last-committed value of a storage slot, bypassing uncommitted
    /// writes. Refund accounting reads through this.
    fn get_committed_state(&mut self, address: Address, key: U256) -> U256;

    /// Writes a storage slot. The zero value is equivalent to deletion.
    fn set_state(&mut self, address: Address, key: U256, value: U256);

    /// Current value of a transient storage slot.
    fn get_transient_state(&self, address: Address, key: U256) -> U256;

    /// Writes a transient storage slot; cleared at every message start.
    fn set_transient_state(&mut self, address: Address, key: U256, value: U256);

    /// Marks the account for removal at commit and zeroes its balance.
    /// Returns whether the account existed; routing the seized balance is
    /// the interpreter's concern.
    fn suicide(&mut self, address: Address) -> bool;

    /// Whether the account is marked for removal.
    fn has_suicided(&mut self, address: Address) -> bool;

    /// Accumulates a gas refund credit.
    fn add_refund(&mut self, gas: u64);

    /// Removes a previously accumulated refund credit.
    ///
    /// # Panics
    ///
    /// Panics when subtracting more than available; an engine bug, not a
    /// user-triggerable condition.
    fn sub_refund(&mut self, gas: u64);

    /// Current refund counter.
    fn get_refund(&self) -> u64;

    /// Records an emitted log. Journaled like state: reverting a snapshot
    /// removes logs emitted after it.
    fn add_log(&mut self, log: Log);

    /// Marks an address warm.
    fn add_address_to_access_list(&mut self, address: Address);

    /// Marks a storage slot (and its address) warm.
    fn add_slot_to_access_list(&mut self, address: Address, key: U256);

    /// Whether the address is warm.
    fn address_in_access_list(&self, address: Address) -> bool;

    /// Whether the storage slot is warm.
    fn slot_in_access_list(&self, address: Address, key: U256) -> bool;

    /// Opens a revision and returns its monotonically increasing id.
    fn snapshot(&mut self) -> usize;

    /// Undoes every journal entry recorded after revision `id`, in reverse
    /// order. Reverting an already-unwound revision is a no-op.
    fn revert_to_snapshot(&mut self, id: usize);
}

/// Journaled account/storage view over a [`Backend`].
#[derive(Debug)]
pub struct StateDB<'a, B: Backend> {
    backend: &'a mut B,
    accounts: HashMap<Address, AccountEntry>,
    journal: Journal,
    access_list: AccessListState,
    transient: HashMap<(Address, U256), U256>,
    logs: Vec<Log>,
    refund: u64,
}

impl<'a, B: Backend> StateDB<'a, B> {
    /// Opens a fresh store over the given committed view.
    pub fn new(backend: &'a mut B) -> Self {
        Self {
            backend,
            accounts: HashMap::default(),
            journal: Journal::default(),
            access_list: AccessListState::default(),
            transient: HashMap::default(),
            logs: Vec::new(),
            refund: 0,
        }
    }

    /// Logs emitted since the store was constructed, in emission order.
    pub fn logs(&self) -> &[Log] {
        &self.logs
    }

    /// Executes the preparatory steps for a message: clears transient
    /// storage and pre-warms the sender, the destination, the declared
    /// access list, the active precompiles and (once Shanghai-equivalent
    /// rules apply) the coinbase.
    pub fn prepare(
        &mut self,
        rules: &Rules,
        sender: Address,
        coinbase: Address,
        destination: TxKind,
        precompiles: &[Address],
        access_list: &AccessList,
    ) {
        self.transient.clear();

        self.add_address_to_access_list(sender);
        if let TxKind::Call(to) = destination {
            self.add_address_to_access_list(to);
        }
        for precompile in precompiles {
            self.add_address_to_access_list(*precompile);
        }
        for item in &access_list.0 {
            self.add_address_to_access_list(item.address);
            for key in &item.storage_keys {
                self.add_slot_to_access_list(item.address, U256::from_be_bytes(key.0));
            }
        }
        if rules.is_shanghai {
            self.add_address_to_access_list(coinbase);
        }
    }

    /// Flushes all journaled mutations into the backend in one deterministic
    /// pass. Suicided accounts are fully removed; re-created accounts wipe
    /// their previously committed state first.
    pub fn commit(self) -> Result<(), StateError> {
        let Self { backend, mut accounts, .. } = self;

        let mut addresses: Vec<Address> = accounts.keys().copied().collect();
        addresses.sort_unstable();

        for address in addresses {
            let entry = accounts.remove(&address).expect("address collected from the map");
            if entry.flags.contains(AccountFlags::SELF_DESTRUCTED) {
                backend.delete_account(address)?;
                continue;
            }
            if !entry.flags.contains(AccountFlags::DIRTY) {
                continue;
            }
            if entry.flags.contains(AccountFlags::RESET) {
                backend.delete_account(address)?;
            }
            if entry.code_dirty {
                if let Some(code) = &entry.code {
                    backend.set_code(entry.account.code_hash, code.clone())?;
                }
            }
            backend.set_account(address, entry.account.clone())?;

            let mut keys: Vec<U256> = entry.dirty_storage.keys().copied().collect();
            keys.sort_unstable();
            for key in keys {
                backend.set_storage(address, key, entry.dirty_storage[&key])?;
            }
        }
        Ok(())
    }

    fn load(&mut self, address: Address) -> Option<&mut AccountEntry> {
        if !self.accounts.contains_key(&address) {
            let account = self.backend.account(address)?;
            self.accounts.insert(address, AccountEntry::loaded(account));
        }
        self.accounts.get_mut(&address)
    }

    fn get_or_create(&mut self, address: Address) -> &mut AccountEntry {
        if self.load(address).is_none() {
            self.journal.append(JournalEntry::AccountCreated { address });
            self.accounts
                .insert(address, AccountEntry::fresh(U256::ZERO, AccountFlags::empty()));
        }
        self.accounts.get_mut(&address).expect("entry inserted above")
    }

    /// Last-committed storage value, cached per slot.
    fn origin_state(&mut self, address: Address, key: U256) -> U256 {
        if let Some(entry) = self.accounts.get(&address) {
            if let Some(value) = entry.origin_storage.get(&key) {
                return *value;
            }
        }
        let value = self.backend.storage(address, key);
        if let Some(entry) = self.accounts.get_mut(&address) {
            entry.origin_storage.insert(key, value);
        }
        value
    }

    fn undo(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::AccountCreated { address } => {
                self.accounts.remove(&address);
            }
            JournalEntry::AccountReset { address, prev } => {
                self.accounts.insert(address, *prev);
            }
            JournalEntry::BalanceChanged { address, prev } => {
                let entry = self.accounts.get_mut(&address).expect("journaled account exists");
                entry.account.balance = prev;
            }
            JournalEntry::NonceChanged { address, prev } => {
                let entry = self.accounts.get_mut(&address).expect("journaled account exists");
                entry.account.nonce = prev;
            }
            JournalEntry::CodeChanged { address, prev_code_hash, prev_code } => {
                let entry = self.accounts.get_mut(&address).expect("journaled account exists");
                entry.account.code_hash = prev_code_hash;
                entry.code = prev_code;
            }
            JournalEntry::StorageChanged { address, key, prev } => {
                let entry = self.accounts.get_mut(&address).expect("journaled account exists");
                entry.dirty_storage.insert(key, prev);
            }
            JournalEntry::TransientStorageChanged { address, key, prev } => {
                if prev.is_zero() {
                    self.transient.remove(&(address, key));
                } else {
                    self.transient.insert((address, key), prev);
                }
            }
            JournalEntry::SuicideMarked { address, prev_suicided, prev_balance } => {
                let entry = self.accounts.get_mut(&address).expect("journaled account exists");
                if !prev_suicided {
                    entry.flags.remove(AccountFlags::SELF_DESTRUCTED);
                }
                entry.account.balance = prev_balance;
            }
            JournalEntry::LogAdded => {
                self.logs.pop();
            }
            JournalEntry::AccessListAddressAdded { address } => {
                self.access_list.remove_address(address);
            }
            JournalEntry::AccessListSlotAdded { address, key } => {
                self.access_list.remove_slot(address, key);
            }
        }
    }
}

impl<B: Backend> VmState for StateDB<'_, B> {
    fn create_account(&mut self, address: Address) {
        if self.load(address).is_some() {
            let prev = self.accounts.get(&address).expect("loaded above").clone();
            let balance = prev.account.balance;
            self.journal
                .append(JournalEntry::AccountReset { address, prev: Box::new(prev) });
            self.accounts
                .insert(address, AccountEntry::fresh(balance, AccountFlags::RESET));
        } else {
            self.journal.append(JournalEntry::AccountCreated { address });
            self.accounts
                .insert(address, AccountEntry::fresh(U256::ZERO, AccountFlags::empty()));
        }
    }

    fn exists(&mut self, address: Address) -> bool {
        self.load(address).is_some()
    }

    fn get_balance(&mut self, address: Address) -> U256 {
        self.load(address).map_or(U256::ZERO, |entry| entry.account.balance)
    }

    fn add_balance(&mut self, address: Address, amount: U256) {
        if amount.is_zero() {
            return;
        }
        let entry = self.get_or_create(address);
        let prev = entry.account.balance;
        entry.account.balance = prev
            .checked_add(amount)
            .unwrap_or_else(|| panic!("balance overflow crediting {amount} to {address}"));
        entry.flags.insert(AccountFlags::DIRTY);
        self.journal.append(JournalEntry::BalanceChanged { address, prev });
    }

    fn sub_balance(&mut self, address: Address, amount: U256) {
        if amount.is_zero() {
            return;
        }
        let entry = self.get_or_create(address);
        let prev = entry.account.balance;
        entry.account.balance = prev
            .checked_sub(amount)
            .unwrap_or_else(|| panic!("balance underflow debiting {amount} from {address}"));
        entry.flags.insert(AccountFlags::DIRTY);
        self.journal.append(JournalEntry::BalanceChanged { address, prev });
    }

    fn get_nonce(&mut self, address: Address) -> u64 {
        self.load(address).map_or(0, |entry| entry.account.nonce)
    }

    fn set_nonce(&mut self, address: Address, nonce: u64) {
        let entry = self.get_or_create(address);
        let prev = entry.account.nonce;
        entry.account.nonce = nonce;
        entry.flags.insert(AccountFlags::DIRTY);
        self.journal.append(JournalEntry::NonceChanged { address, prev });
    }

    fn get_code_hash(&mut self, address: Address) -> B256 {
        self.load(address).map_or(B256::ZERO, |entry| entry.account.code_hash)
    }

    fn get_code(&mut self, address: Address) -> Bytes {
        let Some(entry) = self.load(address) else { return Bytes::new() };
        if let Some(code) = &entry.code {
            return code.clone();
        }
        let code_hash = entry.account.code_hash;
        if code_hash == EMPTY_CODE_HASH || code_hash == B256::ZERO {
            return Bytes::new();
        }
        let code = self.backend.code(code_hash);
        if let Some(entry) = self.accounts.get_mut(&address) {
            entry.code = Some(code.clone());
        }
        code
    }

    fn get_code_size(&mut self, address: Address) -> usize {
        self.get_code(address).len()
    }

    fn set_code(&mut self, address: Address, code: Bytes) {
        let code_hash = if code.is_empty() { EMPTY_CODE_HASH } else { keccak256(&code) };
        let entry = self.get_or_create(address);
        let prev_code_hash = entry.account.code_hash;
        let prev_code = entry.code.clone();
        entry.account.code_hash = code_hash;
        entry.code = Some(code);
        entry.code_dirty = true;
        entry.flags.insert(AccountFlags::DIRTY);
        self.journal
            .append(JournalEntry::CodeChanged { address, prev_code_hash, prev_code });
    }

    fn get_state(&mut self, address: Address, key: U256) -> U256 {
        if let Some(entry) = self.accounts.get(&address) {
            if let Some(value) = entry.dirty_storage.get(&key) {
                return *value;
            }
            if entry.flags.contains(AccountFlags::CREATED) {
                return U256::ZERO;
            }
        }
        if self.load(address).is_none() {
            return U256::ZERO;
        }
        self.origin_state(address, key)
    }

    fn get_committed_state(&mut self, address: Address, key: U256) -> U256 {
        if self.load(address).is_none() {
            return U256::ZERO;
        }
        self.origin_state(address, key)
    }

    fn set_state(&mut self, address: Address, key: U256, value: U256) {
        let prev = self.get_state(address, key);
        if prev == value {
            return;
        }
        let entry = self.get_or_create(address);
        entry.dirty_storage.insert(key, value);
        entry.flags.insert(AccountFlags::DIRTY);
        self.journal.append(JournalEntry::StorageChanged { address, key, prev });
    }

    fn get_transient_state(&self, address: Address, key: U256) -> U256 {
        self.transient.get(&(address, key)).copied().unwrap_or(U256::ZERO)
    }

    fn set_transient_state(&mut self, address: Address, key: U256, value: U256) {
        let prev = self.get_transient_state(address, key);
        if prev == value {
            return;
        }
        if value.is_zero() {
            self.transient.remove(&(address, key));
        } else {
            self.transient.insert((address, key), value);
        }
        self.journal
            .append(JournalEntry::TransientStorageChanged { address, key, prev });
    }

    fn suicide(&mut self, address: Address) -> bool {
        let Some(entry) = self.load(address) else { return false };
        let prev_suicided = entry.flags.contains(AccountFlags::SELF_DESTRUCTED);
        let prev_balance = entry.account.balance;
        entry.flags.insert(AccountFlags::SELF_DESTRUCTED | AccountFlags::DIRTY);
        entry.account.balance = U256::ZERO;
        self.journal
            .append(JournalEntry::SuicideMarked { address, prev_suicided, prev_balance });
        true
    }

    fn has_suicided(&mut self, address: Address) -> bool {
        self.accounts
            .get(&address)
            .is_some_and(|entry| entry.flags.contains(AccountFlags::SELF_DESTRUCTED))
    }

    fn add_refund(&mut self, gas: u64) {
        self.refund = self
            .refund
            .checked_add(gas)
            .unwrap_or_else(|| panic!("refund counter overflow adding {gas}"));
    }

    fn sub_refund(&mut self, gas: u64) {
        assert!(
            gas <= self.refund,
            "refund counter below zero: subtracting {gas} from {}",
            self.refund
        );
        self.refund -= gas;
    }

    fn get_refund(&self) -> u64 {
        self.refund
    }

    fn add_log(&mut self, log: Log) {
        self.journal.append(JournalEntry::LogAdded);
        self.logs.push(log);
    }

    fn add_address_to_access_list(&mut self, address: Address) {
        if self.access_list.add_address(address) {
            self.journal.append(JournalEntry::AccessListAddressAdded { address });
        }
    }

    fn add_slot_to_access_list(&mut self, address: Address, key: U256) {
        let (address_added, slot_added) = self.access_list.add_slot(address, key);
        if address_added {
            self.journal.append(JournalEntry::AccessListAddressAdded { address });
        }
        if slot_added {
            self.journal.append(JournalEntry::AccessListSlotAdded { address, key });
        }
    }

    fn address_in_access_list(&self, address: Address) -> bool {
        self.access_list.contains_address(address)
    }

    fn slot_in_access_list(&self, address: Address, key: U256) -> bool {
        self.access_list.contains_slot(address, key)
    }

    fn snapshot(&mut self) -> usize {
        self.journal.snapshot()
    }

    fn revert_to_snapshot(&mut self, id: usize) {
        if let Some(tail) = self.journal.revert_to_snapshot(id) {
            for entry in tail.into_iter().rev() {
                self.undo(entry);
            }
        }
    }
}
