//! Dynamic base-fee calculator and its per-block lifecycle.

use alloy_primitives::U256;
use tracing::debug;

use crate::{block::BlockResourceState, params::FeeMarketParams};

/// Computes the next block's base fee from the prior block's declared gas
/// usage, per the elasticity-multiplier scheme.
///
/// Returns `None` while base-fee computation is disabled (pre-activation or
/// turned off by parameter); callers must treat that as "no base fee
/// enforced this block", not as zero. On the activation block the configured
/// initial base fee is returned unchanged.
///
/// All arithmetic is 256-bit integer math: a maximal-overshoot block raises
/// the fee by at most `1/base_fee_change_denominator`, an undershoot lowers
/// it by the same rule, and the result never drops below `min_gas_price`.
pub fn calculate_base_fee(
    params: &FeeMarketParams,
    block_gas_limit: u64,
    parent_gas_wanted: u64,
    height: u64,
) -> Option<U256> {
    if !params.is_base_fee_enabled(height) {
        return None;
    }
    if height == params.enable_height {
        return Some(params.base_fee);
    }

    let parent_base_fee = params.base_fee;
    let gas_target = block_gas_limit / params.elasticity_multiplier;
    if gas_target == 0 {
        return Some(parent_base_fee.max(params.min_gas_price));
    }
    let denominator = U256::from(params.base_fee_change_denominator);

    let next = match parent_gas_wanted.cmp(&gas_target) {
        core::cmp::Ordering::Equal => parent_base_fee.max(params.min_gas_price),
        core::cmp::Ordering::Greater => {
            let gas_delta = U256::from(parent_gas_wanted - gas_target);
            let fee_delta =
                parent_base_fee.saturating_mul(gas_delta) / U256::from(gas_target) / denominator;
            parent_base_fee.saturating_add(fee_delta.max(U256::from(1)))
        }
        core::cmp::Ordering::Less => {
            let gas_delta = U256::from(gas_target - parent_gas_wanted);
            let fee_delta =
                parent_base_fee.saturating_mul(gas_delta) / U256::from(gas_target) / denominator;
            parent_base_fee.saturating_sub(fee_delta).max(params.min_gas_price)
        }
    };
    Some(next)
}

/// Fee-market state carried across blocks: the parameters plus the
/// gas-wanted accumulation of the parent block.
#[derive(Debug, Clone, Default)]
pub struct FeeMarket {
    /// Current fee-market parameters.
    pub params: FeeMarketParams,
    parent_gas_wanted: u64,
}

impl FeeMarket {
    /// Creates the fee market from its parameters.
    pub fn new(params: FeeMarketParams) -> Self {
        Self { params, parent_gas_wanted: 0 }
    }

    /// Gas the parent block wanted, as recorded at its end.
    pub const fn parent_gas_wanted(&self) -> u64 {
        self.parent_gas_wanted
    }

    /// Recomputes and pins the base fee at the start of a block. The base
    /// fee is immutable for the rest of the block.
    pub fn on_block_begin(&mut self, block_gas_limit: u64, height: u64) -> Option<U256> {
        let base_fee =
            calculate_base_fee(&self.params, block_gas_limit, self.parent_gas_wanted, height);
        if let Some(fee) = base_fee {
            debug!(height, base_fee = %fee, "calculated base fee for block");
            self.params.base_fee = fee;
        }
        base_fee
    }

    /// Snapshots the block's accumulated gas-wanted tally for the next
    /// block's computation.
    pub fn on_block_end(&mut self, block_state: &BlockResourceState) {
        self.parent_gas_wanted = block_state.gas_wanted;
    }
}
