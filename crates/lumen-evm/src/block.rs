//! Block execution environment and per-block transient accounting.

use alloy_primitives::{Address, Bloom, B256, U256};

use crate::error::ExecutionError;

/// Execution environment of the block being processed. Immutable for the
/// duration of the block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEnv {
    /// Block height.
    pub height: u64,
    /// Block timestamp in seconds.
    pub time: u64,
    /// Header hash of the block, carried into receipts.
    pub hash: B256,
    /// Proposer address exposed to the COINBASE opcode.
    pub coinbase: Address,
    /// Hard per-block gas limit.
    pub gas_limit: u64,
    /// Base fee of this block, `None` while the fee market is disabled.
    pub base_fee: Option<U256>,
}

impl Default for BlockEnv {
    fn default() -> Self {
        Self {
            height: 1,
            time: 0,
            hash: B256::ZERO,
            coinbase: Address::ZERO,
            gas_limit: 30_000_000,
            base_fee: None,
        }
    }
}

/// Per-block transient accumulators, reset at block start.
///
/// `gas_wanted` collects declared gas limits for the fee-market calculator;
/// `gas_used` is the block-level gas meter the engine reconciles after every
/// transaction. Read-only query paths must never touch these counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockResourceState {
    /// Sum of declared gas limits admitted into the block.
    pub gas_wanted: u64,
    /// Actual gas consumed by executed transactions.
    pub gas_used: u64,
    /// Index of the next transaction within the block.
    pub tx_index: u64,
    /// Index of the next log within the block.
    pub log_index: u64,
    /// Accumulated bloom filter over all logs of the block.
    pub bloom: Bloom,
}

impl BlockResourceState {
    /// Resets every counter for a new block.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Adds a declared gas limit to the gas-wanted tally.
    pub fn add_gas_wanted(&mut self, gas: u64) -> Result<u64, ExecutionError> {
        self.gas_wanted = self
            .gas_wanted
            .checked_add(gas)
            .ok_or(ExecutionError::CumulativeGasOverflow)?;
        Ok(self.gas_wanted)
    }

    /// Reconciles the block gas meter with the gas a transaction actually
    /// used, returning the new block total.
    pub fn reconcile_gas_used(&mut self, gas: u64) -> Result<u64, ExecutionError> {
        self.gas_used = self
            .gas_used
            .checked_add(gas)
            .ok_or(ExecutionError::CumulativeGasOverflow)?;
        Ok(self.gas_used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_reset() {
        let mut state = BlockResourceState::default();
        assert_eq!(state.add_gas_wanted(21_000).unwrap(), 21_000);
        assert_eq!(state.add_gas_wanted(9_000).unwrap(), 30_000);
        assert_eq!(state.reconcile_gas_used(21_000).unwrap(), 21_000);
        state.tx_index += 1;

        state.reset();
        assert_eq!(state, BlockResourceState::default());
    }

    #[test]
    fn gas_overflow_is_fatal() {
        let mut state = BlockResourceState { gas_used: u64::MAX, ..Default::default() };
        assert_eq!(
            state.reconcile_gas_used(1).unwrap_err(),
            ExecutionError::CumulativeGasOverflow
        );
    }
}
