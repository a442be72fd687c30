//! Gas accounting primitives: the validation-phase gas meter, intrinsic-gas
//! computation, and refund settlement.

use alloy_eips::eip2930::AccessList;

use crate::{constants, error::ExecutionError, params::Rules};

/// Gas meter installed around the validation and execution phases.
///
/// The meter is deliberately non-halting: host-side accounting must never
/// interfere with VM-level gas accounting, so consumption is recorded against
/// a reporting limit but never rejected. The limit is what block processing
/// reads back as the gas the transaction wanted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GasMeter {
    limit: u64,
    consumed: u64,
}

impl GasMeter {
    /// Meter with no meaningful limit, used for the validation phase itself.
    pub const fn unlimited() -> Self {
        Self { limit: u64::MAX, consumed: 0 }
    }

    /// Meter bounded by the gas the transaction declared.
    pub const fn with_limit(limit: u64) -> Self {
        Self { limit, consumed: 0 }
    }

    /// Records gas consumption. Never fails; saturates at `u64::MAX`.
    pub fn consume(&mut self, amount: u64) {
        self.consumed = self.consumed.saturating_add(amount);
    }

    /// Returns previously consumed gas to the meter.
    ///
    /// # Panics
    ///
    /// Panics if more gas is returned than was consumed; that is an engine
    /// bug, not a user-triggerable condition.
    pub fn refund(&mut self, amount: u64) {
        assert!(
            amount <= self.consumed,
            "gas refund {amount} exceeds consumed gas {}",
            self.consumed
        );
        self.consumed -= amount;
    }

    /// Gas consumed so far.
    pub const fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Reporting limit of the meter.
    pub const fn limit(&self) -> u64 {
        self.limit
    }
}

/// Computes the gas charged before any bytecode executes: a base cost, the
/// per-byte payload cost, the contract-creation surcharge, the initcode word
/// cost once Shanghai-equivalent rules are active, and the access-list
/// surcharge.
pub fn intrinsic_gas(
    input: &[u8],
    access_list: &AccessList,
    is_contract_creation: bool,
    rules: &Rules,
) -> Result<u64, ExecutionError> {
    let mut gas = if is_contract_creation {
        constants::TX_GAS_CONTRACT_CREATION
    } else {
        constants::TX_GAS
    };

    if !input.is_empty() {
        let nonzero = input.iter().filter(|byte| **byte != 0).count() as u64;
        if (u64::MAX - gas) / constants::TX_DATA_NON_ZERO_GAS < nonzero {
            return Err(ExecutionError::GasUintOverflow);
        }
        gas += nonzero * constants::TX_DATA_NON_ZERO_GAS;

        let zero = input.len() as u64 - nonzero;
        if (u64::MAX - gas) / constants::TX_DATA_ZERO_GAS < zero {
            return Err(ExecutionError::GasUintOverflow);
        }
        gas += zero * constants::TX_DATA_ZERO_GAS;

        if is_contract_creation && rules.is_shanghai {
            let words = (input.len() as u64).div_ceil(32);
            if (u64::MAX - gas) / constants::INIT_CODE_WORD_GAS < words {
                return Err(ExecutionError::GasUintOverflow);
            }
            gas += words * constants::INIT_CODE_WORD_GAS;
        }
    }

    if !access_list.0.is_empty() {
        let addresses = access_list.0.len() as u64;
        let storage_keys =
            access_list.0.iter().map(|item| item.storage_keys.len() as u64).sum::<u64>();
        gas = gas
            .checked_add(addresses.checked_mul(constants::TX_ACCESS_LIST_ADDRESS_GAS).ok_or(
                ExecutionError::GasUintOverflow,
            )?)
            .ok_or(ExecutionError::GasUintOverflow)?;
        gas = gas
            .checked_add(
                storage_keys
                    .checked_mul(constants::TX_ACCESS_LIST_STORAGE_KEY_GAS)
                    .ok_or(ExecutionError::GasUintOverflow)?,
            )
            .ok_or(ExecutionError::GasUintOverflow)?;
    }

    Ok(gas)
}

/// Caps the accumulated refund counter by the fork-appropriate quotient of
/// the gas actually used.
pub fn gas_to_refund(refund_counter: u64, gas_used: u64, refund_quotient: u64) -> u64 {
    refund_counter.min(gas_used / refund_quotient)
}

/// Refund divisor in force at the given rule set (EIP-3529 halves refunds
/// from London on).
pub const fn refund_quotient(rules: &Rules) -> u64 {
    if rules.is_london {
        constants::REFUND_QUOTIENT_EIP3529
    } else {
        constants::REFUND_QUOTIENT
    }
}

/// Minimum gas charged to the sender regardless of actual usage, expressed
/// as a basis-point multiple of the declared gas limit. The product is
/// truncated to an integer.
pub fn minimum_gas_charge(gas_limit: u64, multiplier_bps: u64) -> u64 {
    ((gas_limit as u128 * multiplier_bps as u128) / constants::MIN_GAS_MULTIPLIER_SCALE as u128)
        as u64
}

#[cfg(test)]
mod tests {
    use alloy_eips::eip2930::AccessListItem;
    use alloy_primitives::{Address, B256};

    use super::*;

    const MODERN: Rules = Rules { is_london: true, is_shanghai: true };
    const PRE_LONDON: Rules = Rules { is_london: false, is_shanghai: false };

    #[test]
    fn plain_transfer_costs_base_gas() {
        assert_eq!(intrinsic_gas(&[], &AccessList::default(), false, &MODERN).unwrap(), 21_000);
        assert_eq!(intrinsic_gas(&[], &AccessList::default(), true, &PRE_LONDON).unwrap(), 53_000);
    }

    #[test]
    fn payload_bytes_are_charged_by_content() {
        let input = [0u8, 0, 1, 2];
        let gas = intrinsic_gas(&input, &AccessList::default(), false, &MODERN).unwrap();
        assert_eq!(gas, 21_000 + 2 * 4 + 2 * 16);
    }

    #[test]
    fn initcode_words_charged_post_shanghai_only() {
        let input = vec![1u8; 33]; // two words
        let with = intrinsic_gas(&input, &AccessList::default(), true, &MODERN).unwrap();
        let without = intrinsic_gas(&input, &AccessList::default(), true, &PRE_LONDON).unwrap();
        assert_eq!(with - without, 2 * 2);
    }

    #[test]
    fn access_list_surcharge() {
        let list = AccessList(vec![AccessListItem {
            address: Address::ZERO,
            storage_keys: vec![B256::ZERO, B256::with_last_byte(1)],
        }]);
        let gas = intrinsic_gas(&[], &list, false, &MODERN).unwrap();
        assert_eq!(gas, 21_000 + 2_400 + 2 * 1_900);
    }

    #[test]
    fn refund_is_capped_by_quotient_of_usage() {
        assert_eq!(gas_to_refund(10_000, 20_000, 5), 4_000);
        assert_eq!(gas_to_refund(1_000, 20_000, 5), 1_000);
        assert_eq!(gas_to_refund(10_000, 20_000, 2), 10_000);
        assert_eq!(refund_quotient(&MODERN), 5);
        assert_eq!(refund_quotient(&PRE_LONDON), 2);
    }

    #[test]
    fn minimum_charge_truncates() {
        assert_eq!(minimum_gas_charge(21_000, 5_000), 10_500);
        assert_eq!(minimum_gas_charge(21_001, 5_000), 10_500);
        assert_eq!(minimum_gas_charge(0, 5_000), 0);
    }

    #[test]
    fn meter_tracks_consumption_against_limit() {
        let mut meter = GasMeter::with_limit(50_000);
        meter.consume(30_000);
        meter.refund(10_000);
        assert_eq!(meter.consumed(), 20_000);
        assert_eq!(meter.limit(), 50_000);
    }

    #[test]
    #[should_panic(expected = "gas refund")]
    fn meter_refund_underflow_panics() {
        let mut meter = GasMeter::unlimited();
        meter.consume(5);
        meter.refund(6);
    }
}
