//! Committed-state views backing the journaled store.
//!
//! The persistence engine itself lives outside this crate; [`Backend`] is the
//! narrow capability the store borrows for committed reads and the one-pass
//! flush. [`CacheBackend`] layers a cheap copy-on-write child view on top of
//! any backend for hook isolation and read-only queries.

use alloy_primitives::{
    map::{HashMap, HashSet},
    Address, Bytes, B256, U256,
};
use auto_impl::auto_impl;

use crate::{error::StateError, statedb::Account};

/// Read/write capability over the committed account model.
///
/// Reads are infallible: a missing account is `None`, a missing slot is zero,
/// unknown code is empty. Writes surface persistence failures, which the
/// store treats as fatal.
#[auto_impl(&mut, Box)]
pub trait Backend {
    /// Returns the committed account record, if the account exists.
    fn account(&self, address: Address) -> Option<Account>;

    /// Returns code by content hash; empty when unknown.
    fn code(&self, code_hash: B256) -> Bytes;

    /// Returns the committed storage value; zero when absent.
    fn storage(&self, address: Address, key: U256) -> U256;

    /// Writes an account record.
    fn set_account(&mut self, address: Address, account: Account) -> Result<(), StateError>;

    /// Stores code content-addressed by its hash.
    fn set_code(&mut self, code_hash: B256, code: Bytes) -> Result<(), StateError>;

    /// Writes a storage slot; the zero value deletes the slot.
    fn set_storage(&mut self, address: Address, key: U256, value: U256)
        -> Result<(), StateError>;

    /// Removes an account together with its storage.
    fn delete_account(&mut self, address: Address) -> Result<(), StateError>;
}

/// In-memory [`Backend`] used by read-only queries and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryBackend {
    accounts: HashMap<Address, Account>,
    codes: HashMap<B256, Bytes>,
    storage: HashMap<Address, HashMap<U256, U256>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for InMemoryBackend {
    fn account(&self, address: Address) -> Option<Account> {
        self.accounts.get(&address).cloned()
    }

    fn code(&self, code_hash: B256) -> Bytes {
        self.codes.get(&code_hash).cloned().unwrap_or_default()
    }

    fn storage(&self, address: Address, key: U256) -> U256 {
        self.storage
            .get(&address)
            .and_then(|slots| slots.get(&key))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    fn set_account(&mut self, address: Address, account: Account) -> Result<(), StateError> {
        self.accounts.insert(address, account);
        Ok(())
    }

    fn set_code(&mut self, code_hash: B256, code: Bytes) -> Result<(), StateError> {
        self.codes.insert(code_hash, code);
        Ok(())
    }

    fn set_storage(
        &mut self,
        address: Address,
        key: U256,
        value: U256,
    ) -> Result<(), StateError> {
        let slots = self.storage.entry(address).or_default();
        if value.is_zero() {
            slots.remove(&key);
        } else {
            slots.insert(key, value);
        }
        Ok(())
    }

    fn delete_account(&mut self, address: Address) -> Result<(), StateError> {
        self.accounts.remove(&address);
        self.storage.remove(&address);
        Ok(())
    }
}

/// Copy-on-write child view over another backend.
///
/// Reads fall through to the inner view, writes buffer locally.
/// [`Self::commit`] merges the buffered writes into the inner view in one
/// deterministic pass; dropping the view discards them. Never partially
/// merged.
#[derive(Debug)]
pub struct CacheBackend<'a, B: Backend> {
    inner: &'a mut B,
    accounts: HashMap<Address, Option<Account>>,
    codes: HashMap<B256, Bytes>,
    storage: HashMap<Address, HashMap<U256, U256>>,
    wiped: HashSet<Address>,
}

impl<'a, B: Backend> CacheBackend<'a, B> {
    /// Creates a child view over `inner`.
    pub fn new(inner: &'a mut B) -> Self {
        Self {
            inner,
            accounts: HashMap::default(),
            codes: HashMap::default(),
            storage: HashMap::default(),
            wiped: HashSet::default(),
        }
    }

    /// Flushes every buffered write into the inner view.
    pub fn commit(self) -> Result<(), StateError> {
        let mut addresses: Vec<Address> = self
            .accounts
            .keys()
            .chain(self.storage.keys())
            .chain(self.wiped.iter())
            .copied()
            .collect();
        addresses.sort_unstable();
        addresses.dedup();

        for address in addresses {
            if self.wiped.contains(&address) {
                self.inner.delete_account(address)?;
            }
            match self.accounts.get(&address) {
                Some(Some(account)) => self.inner.set_account(address, account.clone())?,
                // deletion already handled through the wipe set
                Some(None) | None => {}
            }
            if let Some(slots) = self.storage.get(&address) {
                let mut keys: Vec<U256> = slots.keys().copied().collect();
                keys.sort_unstable();
                for key in keys {
                    self.inner.set_storage(address, key, slots[&key])?;
                }
            }
        }

        let mut hashes: Vec<B256> = self.codes.keys().copied().collect();
        hashes.sort_unstable();
        for hash in hashes {
            self.inner.set_code(hash, self.codes[&hash].clone())?;
        }
        Ok(())
    }
}

impl<B: Backend> Backend for CacheBackend<'_, B> {
    fn account(&self, address: Address) -> Option<Account> {
        match self.accounts.get(&address) {
            Some(account) => account.clone(),
            None if self.wiped.contains(&address) => None,
            None => self.inner.account(address),
        }
    }

    fn code(&self, code_hash: B256) -> Bytes {
        self.codes
            .get(&code_hash)
            .cloned()
            .unwrap_or_else(|| self.inner.code(code_hash))
    }

    fn storage(&self, address: Address, key: U256) -> U256 {
        if let Some(value) = self.storage.get(&address).and_then(|slots| slots.get(&key)) {
            return *value;
        }
        if self.wiped.contains(&address) {
            return U256::ZERO;
        }
        self.inner.storage(address, key)
    }

    fn set_account(&mut self, address: Address, account: Account) -> Result<(), StateError> {
        self.accounts.insert(address, Some(account));
        Ok(())
    }

    fn set_code(&mut self, code_hash: B256, code: Bytes) -> Result<(), StateError> {
        self.codes.insert(code_hash, code);
        Ok(())
    }

    fn set_storage(
        &mut self,
        address: Address,
        key: U256,
        value: U256,
    ) -> Result<(), StateError> {
        self.storage.entry(address).or_default().insert(key, value);
        Ok(())
    }

    fn delete_account(&mut self, address: Address) -> Result<(), StateError> {
        self.accounts.insert(address, None);
        self.storage.remove(&address);
        self.wiped.insert(address);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;

    use super::*;

    #[test]
    fn cache_backend_discards_on_drop() {
        let addr = address!("00000000000000000000000000000000000000aa");
        let mut inner = InMemoryBackend::new();
        inner
            .set_account(addr, Account { balance: U256::from(7), ..Default::default() })
            .unwrap();

        {
            let mut cache = CacheBackend::new(&mut inner);
            cache
                .set_account(addr, Account { balance: U256::from(99), ..Default::default() })
                .unwrap();
            cache.set_storage(addr, U256::from(1), U256::from(2)).unwrap();
            assert_eq!(cache.account(addr).unwrap().balance, U256::from(99));
        }

        assert_eq!(inner.account(addr).unwrap().balance, U256::from(7));
        assert_eq!(inner.storage(addr, U256::from(1)), U256::ZERO);
    }

    #[test]
    fn cache_backend_commits_in_one_pass() {
        let addr = address!("00000000000000000000000000000000000000bb");
        let mut inner = InMemoryBackend::new();

        let mut cache = CacheBackend::new(&mut inner);
        cache
            .set_account(addr, Account { nonce: 3, ..Default::default() })
            .unwrap();
        cache.set_storage(addr, U256::from(1), U256::from(2)).unwrap();
        cache.commit().unwrap();

        assert_eq!(inner.account(addr).unwrap().nonce, 3);
        assert_eq!(inner.storage(addr, U256::from(1)), U256::from(2));
    }

    #[test]
    fn cache_backend_wipes_deleted_accounts() {
        let addr = address!("00000000000000000000000000000000000000cc");
        let mut inner = InMemoryBackend::new();
        inner.set_account(addr, Account::default()).unwrap();
        inner.set_storage(addr, U256::from(1), U256::from(9)).unwrap();

        let mut cache = CacheBackend::new(&mut inner);
        cache.delete_account(addr).unwrap();
        assert!(cache.account(addr).is_none());
        assert_eq!(cache.storage(addr, U256::from(1)), U256::ZERO);
        cache.commit().unwrap();

        assert!(inner.account(addr).is_none());
        assert_eq!(inner.storage(addr, U256::from(1)), U256::ZERO);
    }
}
