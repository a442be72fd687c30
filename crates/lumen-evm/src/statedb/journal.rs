//! Linear undo journal with revision bookmarks.
//!
//! Every mutation of the store pushes one undo record; snapshots are
//! monotonically increasing revision ids bookmarking a journal length.
//! Reverting replays the tail of the journal in reverse.

use alloy_primitives::{Address, Bytes, B256, U256};

use crate::statedb::AccountEntry;

/// A single undo record.
#[derive(Debug)]
pub(crate) enum JournalEntry {
    /// Account created where none existed before.
    AccountCreated {
        /// Created account.
        address: Address,
    },
    /// Account re-created over an existing one; restores the full previous
    /// entry on revert.
    AccountReset {
        /// Re-created account.
        address: Address,
        /// Entry as it was before the reset.
        prev: Box<AccountEntry>,
    },
    /// Balance mutated.
    BalanceChanged {
        /// Mutated account.
        address: Address,
        /// Balance before the change.
        prev: U256,
    },
    /// Nonce mutated.
    NonceChanged {
        /// Mutated account.
        address: Address,
        /// Nonce before the change.
        prev: u64,
    },
    /// Contract code replaced.
    CodeChanged {
        /// Mutated account.
        address: Address,
        /// Code hash before the change.
        prev_code_hash: B256,
        /// Loaded code before the change, if any.
        prev_code: Option<Bytes>,
    },
    /// Storage slot written.
    StorageChanged {
        /// Mutated account.
        address: Address,
        /// Slot key.
        key: U256,
        /// Value before the write.
        prev: U256,
    },
    /// Transient storage slot written.
    TransientStorageChanged {
        /// Mutated account.
        address: Address,
        /// Slot key.
        key: U256,
        /// Value before the write.
        prev: U256,
    },
    /// Account marked for removal.
    SuicideMarked {
        /// Marked account.
        address: Address,
        /// Whether the account was already marked.
        prev_suicided: bool,
        /// Balance before it was seized.
        prev_balance: U256,
    },
    /// Log emitted.
    LogAdded,
    /// Address became warm.
    AccessListAddressAdded {
        /// Warmed address.
        address: Address,
    },
    /// Storage key became warm.
    AccessListSlotAdded {
        /// Warmed address.
        address: Address,
        /// Warmed slot key.
        key: U256,
    },
}

#[derive(Debug, Clone, Copy)]
struct Revision {
    id: usize,
    journal_len: usize,
}

/// Ordered log of undo records plus the revision bookmarks that snapshots
/// hand out.
#[derive(Debug, Default)]
pub(crate) struct Journal {
    entries: Vec<JournalEntry>,
    revisions: Vec<Revision>,
    next_revision_id: usize,
}

impl Journal {
    pub(crate) fn append(&mut self, entry: JournalEntry) {
        self.entries.push(entry);
    }

    /// Opens a new revision and returns its id.
    pub(crate) fn snapshot(&mut self) -> usize {
        let id = self.next_revision_id;
        self.next_revision_id += 1;
        self.revisions.push(Revision { id, journal_len: self.entries.len() });
        id
    }

    /// Closes revision `id` and every revision opened after it, returning
    /// the journal tail to undo (oldest first). `None` when the revision was
    /// already unwound, which makes a second revert a no-op.
    pub(crate) fn revert_to_snapshot(&mut self, id: usize) -> Option<Vec<JournalEntry>> {
        let idx = self.revisions.iter().position(|revision| revision.id == id)?;
        let journal_len = self.revisions[idx].journal_len;
        self.revisions.truncate(idx);
        Some(self.entries.split_off(journal_len))
    }
}
