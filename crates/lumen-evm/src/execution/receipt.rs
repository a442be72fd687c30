//! Receipts for committed transactions.

use alloy_primitives::{Address, Bloom, Log, B256};
use serde::{Deserialize, Serialize};

use crate::{block::BlockEnv, execution::ExecutionResult, tx::Message};

/// Receipt produced for every transaction that went through
/// [`crate::Executor::apply_transaction`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    /// Whether execution succeeded (no VM error).
    pub status: bool,
    /// Running total of gas used in the block including this transaction,
    /// capped at the block gas limit for display purposes.
    pub cumulative_gas_used: u64,
    /// Bloom filter over the receipt's logs.
    pub bloom: Bloom,
    /// Logs emitted by the transaction, in emission order.
    pub logs: Vec<Log>,
    /// Hash of the transaction.
    pub tx_hash: B256,
    /// Address of the created contract, for creation transactions.
    pub contract_address: Option<Address>,
    /// Gas charged to the sender.
    pub gas_used: u64,
    /// Hash of the enclosing block header.
    pub block_hash: B256,
    /// Height of the enclosing block.
    pub block_height: u64,
    /// Position of the transaction within the block.
    pub tx_index: u64,
}

/// Derives the bloom filter over a sequence of logs.
pub fn logs_bloom<'a>(logs: impl IntoIterator<Item = &'a Log>) -> Bloom {
    let mut bloom = Bloom::default();
    for log in logs {
        bloom.accrue_log(log);
    }
    bloom
}

pub(crate) fn build_receipt(
    block: &BlockEnv,
    block_gas_used: u64,
    tx_index: u64,
    msg: &Message,
    res: &ExecutionResult,
) -> TxReceipt {
    TxReceipt {
        status: !res.failed(),
        cumulative_gas_used: block_gas_used.saturating_add(res.gas_used).min(block.gas_limit),
        bloom: logs_bloom(&res.logs),
        logs: res.logs.clone(),
        tx_hash: res.tx_hash,
        contract_address: msg
            .is_contract_creation()
            .then(|| msg.from.create(msg.nonce)),
        gas_used: res.gas_used,
        block_hash: block.hash,
        block_height: block.height,
        tx_index,
    }
}
