//! Constants for the Lumen EVM module.
//!
//! Gas costs mirror the canonical Ethereum schedule for the forks the chain
//! launches with; fee-market defaults follow the EIP-1559 parameterization.

use alloy_primitives::{b256, B256};

/// Gas charged for every transaction before any bytecode executes.
pub const TX_GAS: u64 = 21_000;
/// Gas charged for a contract-creation transaction before any bytecode
/// executes.
pub const TX_GAS_CONTRACT_CREATION: u64 = 53_000;

/// Gas charged per zero byte of transaction payload.
pub const TX_DATA_ZERO_GAS: u64 = 4;
/// Gas charged per non-zero byte of transaction payload.
pub const TX_DATA_NON_ZERO_GAS: u64 = 16;

/// Gas charged per address declared in a transaction access list.
pub const TX_ACCESS_LIST_ADDRESS_GAS: u64 = 2_400;
/// Gas charged per storage key declared in a transaction access list.
pub const TX_ACCESS_LIST_STORAGE_KEY_GAS: u64 = 1_900;

/// Gas charged per 32-byte word of initcode once the init-code size rule is
/// active.
pub const INIT_CODE_WORD_GAS: u64 = 2;

/// Maximum deployed contract code size in bytes.
pub const MAX_CODE_SIZE: usize = 24_576;
/// Maximum contract-creation payload size in bytes, enforced once the
/// Shanghai-equivalent fork is active.
pub const MAX_INIT_CODE_SIZE: usize = 2 * MAX_CODE_SIZE;

/// Divisor capping gas refunds before the London-equivalent fork:
/// `refund <= gas_used / 2`.
pub const REFUND_QUOTIENT: u64 = 2;
/// Divisor capping gas refunds from the London-equivalent fork on:
/// `refund <= gas_used / 5` (EIP-3529).
pub const REFUND_QUOTIENT_EIP3529: u64 = 5;

/// Scale of the minimum-gas-charge multiplier: the multiplier is expressed
/// in basis points of the declared gas limit.
pub const MIN_GAS_MULTIPLIER_SCALE: u64 = 10_000;
/// Default minimum-gas-charge multiplier (0.5x the declared gas limit).
pub const DEFAULT_MIN_GAS_MULTIPLIER_BPS: u64 = 5_000;

/// Divisor applied to transaction tips when deriving mempool priority.
pub const PRIORITY_REDUCTION: u64 = 1_000_000;

/// Default initial base fee for the activation block (1 gwei).
pub const DEFAULT_BASE_FEE: u64 = 1_000_000_000;
/// Default bound on base-fee movement between consecutive blocks (1/8).
pub const DEFAULT_BASE_FEE_CHANGE_DENOMINATOR: u64 = 8;
/// Default ratio between the block gas limit and the gas target.
pub const DEFAULT_ELASTICITY_MULTIPLIER: u64 = 2;

/// Keccak-256 hash of empty code, the canonical code hash of an account
/// without a contract.
pub const EMPTY_CODE_HASH: B256 =
    b256!("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470");
