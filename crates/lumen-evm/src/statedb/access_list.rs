//! Warm address and storage-key membership for gas-discount accounting.

use alloy_primitives::{
    map::HashSet,
    Address, U256,
};

/// EIP-2930-style warm membership. Independent of the account journal but
/// still snapshot-scoped: additions are undone through journal entries.
#[derive(Debug, Clone, Default)]
pub(crate) struct AccessListState {
    addresses: HashSet<Address>,
    slots: HashSet<(Address, U256)>,
}

impl AccessListState {
    /// Marks an address warm. Returns whether it was newly added.
    pub(crate) fn add_address(&mut self, address: Address) -> bool {
        self.addresses.insert(address)
    }

    /// Marks a storage slot (and its address) warm. Returns whether the
    /// address and the slot were newly added, in that order.
    pub(crate) fn add_slot(&mut self, address: Address, key: U256) -> (bool, bool) {
        (self.addresses.insert(address), self.slots.insert((address, key)))
    }

    pub(crate) fn contains_address(&self, address: Address) -> bool {
        self.addresses.contains(&address)
    }

    pub(crate) fn contains_slot(&self, address: Address, key: U256) -> bool {
        self.slots.contains(&(address, key))
    }

    /// Undoes [`Self::add_address`].
    pub(crate) fn remove_address(&mut self, address: Address) {
        self.addresses.remove(&address);
    }

    /// Undoes the slot part of [`Self::add_slot`].
    pub(crate) fn remove_slot(&mut self, address: Address, key: U256) {
        self.slots.remove(&(address, key));
    }
}
