//! Chain-wide parameters consumed by the pipeline and the engine.
//!
//! Parameters are read-only inputs to this crate; mutating them is a
//! governance concern that lives outside the execution core.

use serde::{Deserialize, Serialize};

use crate::constants;

/// Governance-controlled parameters of the EVM module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmParams {
    /// Whether contract-creation transactions are admitted.
    pub enable_create: bool,
    /// Whether contract-call transactions are admitted.
    pub enable_call: bool,
    /// Whether legacy transactions without a chain id are admitted.
    pub allow_unprotected_txs: bool,
    /// Minimum-gas-charge multiplier in basis points of the declared gas
    /// limit. The realized charge is `max(gas_limit * multiplier, gas_used)`.
    pub min_gas_multiplier_bps: u64,
}

impl Default for EvmParams {
    fn default() -> Self {
        Self {
            enable_create: true,
            enable_call: true,
            allow_unprotected_txs: false,
            min_gas_multiplier_bps: constants::DEFAULT_MIN_GAS_MULTIPLIER_BPS,
        }
    }
}

impl EvmParams {
    /// Validates parameter consistency.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_gas_multiplier_bps > constants::MIN_GAS_MULTIPLIER_SCALE {
            return Err(format!(
                "min gas multiplier {} exceeds scale {}",
                self.min_gas_multiplier_bps,
                constants::MIN_GAS_MULTIPLIER_SCALE
            ));
        }
        Ok(())
    }
}

/// Governance-controlled parameters of the fee market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeMarketParams {
    /// Disables base-fee enforcement entirely when set.
    pub no_base_fee: bool,
    /// Height at which the fee market activates.
    pub enable_height: u64,
    /// Base fee of the current block. Seeded with the initial base fee and
    /// recomputed once per block by the calculator.
    pub base_fee: alloy_primitives::U256,
    /// Consensus-enforced floor under the base fee and under offered prices.
    pub min_gas_price: alloy_primitives::U256,
    /// Ratio between the block gas limit and the gas target.
    pub elasticity_multiplier: u64,
    /// Bound on base-fee movement between consecutive blocks.
    pub base_fee_change_denominator: u64,
}

impl Default for FeeMarketParams {
    fn default() -> Self {
        Self {
            no_base_fee: false,
            enable_height: 0,
            base_fee: alloy_primitives::U256::from(constants::DEFAULT_BASE_FEE),
            min_gas_price: alloy_primitives::U256::ZERO,
            elasticity_multiplier: constants::DEFAULT_ELASTICITY_MULTIPLIER,
            base_fee_change_denominator: constants::DEFAULT_BASE_FEE_CHANGE_DENOMINATOR,
        }
    }
}

impl FeeMarketParams {
    /// Whether base-fee enforcement is active at the given height.
    pub fn is_base_fee_enabled(&self, height: u64) -> bool {
        !self.no_base_fee && height >= self.enable_height
    }

    /// Validates parameter consistency.
    pub fn validate(&self) -> Result<(), String> {
        if self.elasticity_multiplier == 0 {
            return Err("elasticity multiplier cannot be zero".to_string());
        }
        if self.base_fee_change_denominator == 0 {
            return Err("base fee change denominator cannot be zero".to_string());
        }
        Ok(())
    }
}

/// Hard-fork schedule of the chain.
///
/// The chain launches with the modern gas-cost table; only the switches that
/// change execution semantics at runtime are configurable. `None` means the
/// fork never activates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// EIP-155 chain id of this chain.
    pub chain_id: u64,
    /// Activation height of the London-equivalent rules (base fee, EIP-3529
    /// refund cap).
    pub london_height: Option<u64>,
    /// Activation height of the Shanghai-equivalent rules (init-code size
    /// limit and metering).
    pub shanghai_height: Option<u64>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self { chain_id: 1, london_height: Some(0), shanghai_height: Some(0) }
    }
}

impl ChainConfig {
    /// Whether the London-equivalent rules are active at `height`.
    pub fn is_london(&self, height: u64) -> bool {
        self.london_height.is_some_and(|h| height >= h)
    }

    /// Whether the Shanghai-equivalent rules are active at `height`.
    pub fn is_shanghai(&self, height: u64) -> bool {
        self.shanghai_height.is_some_and(|h| height >= h)
    }

    /// Resolves the rule set in force at `height`.
    pub fn rules(&self, height: u64) -> Rules {
        Rules { is_london: self.is_london(height), is_shanghai: self.is_shanghai(height) }
    }
}

/// Rule set in force for one block height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rules {
    /// London-equivalent rules active.
    pub is_london: bool,
    /// Shanghai-equivalent rules active.
    pub is_shanghai: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_market_params_enable_height() {
        let params = FeeMarketParams { enable_height: 10, ..Default::default() };
        assert!(!params.is_base_fee_enabled(9));
        assert!(params.is_base_fee_enabled(10));
        assert!(params.is_base_fee_enabled(11));

        let disabled = FeeMarketParams { no_base_fee: true, ..Default::default() };
        assert!(!disabled.is_base_fee_enabled(100));
    }

    #[test]
    fn fee_market_params_validate_rejects_zero_divisors() {
        assert!(FeeMarketParams::default().validate().is_ok());
        let params = FeeMarketParams { elasticity_multiplier: 0, ..Default::default() };
        assert!(params.validate().is_err());
        let params = FeeMarketParams { base_fee_change_denominator: 0, ..Default::default() };
        assert!(params.validate().is_err());
    }

    #[test]
    fn fee_market_params_serde_roundtrip() {
        let params = FeeMarketParams {
            min_gas_price: alloy_primitives::U256::from(25_000_000_000u64),
            ..Default::default()
        };
        let encoded = serde_json::to_string(&params).unwrap();
        let decoded: FeeMarketParams = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, params);
    }

    #[test]
    fn chain_config_fork_switches() {
        let config = ChainConfig { chain_id: 9000, london_height: Some(5), shanghai_height: None };
        assert!(!config.is_london(4));
        assert!(config.is_london(5));
        assert!(!config.is_shanghai(u64::MAX));
        let rules = config.rules(5);
        assert!(rules.is_london && !rules.is_shanghai);
    }
}
