//! Error types of the transaction-execution core.
//!
//! The taxonomy separates errors by where they abort processing:
//! [`AdmissionError`] rejects a transaction before any virtual-machine work,
//! [`ExecutionError`] reports engine failures (some retryable, some fatal),
//! and [`StateError`] surfaces journaled-store commit failures. A VM-level
//! revert is *not* an error of this crate; it travels as a string on an
//! otherwise successful execution result.

use alloy_primitives::{Address, B256, U256};

/// Errors raised by the validation and fee pipeline. All of them reject the
/// transaction before any state-transition work and are reported to the
/// submitter verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    /// The envelope carries a message type the pipeline does not handle.
    #[error("unsupported message type in envelope: {type_url}")]
    UnsupportedMessage {
        /// Type identifier of the foreign message.
        type_url: String,
    },

    /// Transaction fields are structurally inconsistent.
    #[error("malformed transaction: {0}")]
    Malformed(String),

    /// Fee arithmetic (`gas_limit x price`) overflowed 256 bits.
    #[error("transaction fee overflows 256-bit arithmetic")]
    FeeOverflow,

    /// Signature recovery failed or produced no usable sender.
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// The transaction committed to a different chain.
    #[error("invalid chain id; got {got}, expected {expected}")]
    ChainId {
        /// Chain id declared by the transaction.
        got: u64,
        /// Chain id of this chain.
        expected: u64,
    },

    /// The sender carries contract code and cannot originate transactions.
    #[error("sender is not an externally-owned account: {address}, code hash {code_hash}")]
    SenderNotEoa {
        /// Offending sender address.
        address: Address,
        /// Code hash found on the sender account.
        code_hash: B256,
    },

    /// A stage that requires the recovered sender ran before signature
    /// verification populated it.
    #[error("sender address is not populated for tx {tx_hash}")]
    MissingSender {
        /// Hash of the affected transaction.
        tx_hash: B256,
    },

    /// Sender balance cannot cover the worst-case transaction cost
    /// (fee plus transferred value).
    #[error("sender balance {balance} is below transaction cost {cost}")]
    InsufficientBalance {
        /// Current sender balance.
        balance: U256,
        /// Required fee-plus-value cost.
        cost: U256,
    },

    /// Sender balance cannot cover the top-level value transfer.
    #[error("failed to transfer {value} from {from}: insufficient funds")]
    InsufficientTransferBalance {
        /// Sender of the transfer.
        from: Address,
        /// Transferred value.
        value: U256,
    },

    /// Declared gas limit is below the intrinsic gas of the transaction.
    #[error("gas limit {gas_limit} is below intrinsic gas {intrinsic_gas}")]
    GasLimitBelowIntrinsic {
        /// Declared gas limit.
        gas_limit: u64,
        /// Computed intrinsic gas.
        intrinsic_gas: u64,
    },

    /// Declared gas exceeds what a block may spend.
    #[error("tx gas ({gas_wanted}) exceeds block gas limit ({block_gas_limit})")]
    BlockGasLimitExceeded {
        /// Gas declared by the envelope.
        gas_wanted: u64,
        /// Hard per-block gas limit.
        block_gas_limit: u64,
    },

    /// The sender account does not exist where a previous stage should have
    /// created it.
    #[error("account {address} does not exist")]
    UnknownAccount {
        /// Missing account address.
        address: Address,
    },

    /// Declared nonce does not match the sender account.
    #[error("invalid nonce; got {got}, expected {expected}")]
    InvalidNonce {
        /// Nonce declared by the transaction.
        got: u64,
        /// Nonce currently recorded for the sender.
        expected: u64,
    },

    /// Declared price is below the node-local mempool floor. Admission-time
    /// only; never part of consensus.
    #[error("gas price {price} is below the node minimum {min_price}")]
    PriceBelowNodeFloor {
        /// Price offered by the transaction.
        price: U256,
        /// Node-local floor.
        min_price: U256,
    },

    /// Effective price is below the chain-wide minimum gas price parameter.
    #[error("effective gas price {price} is below the minimum gas price {min_price}")]
    PriceBelowMinimum {
        /// Effective price offered by the transaction.
        price: U256,
        /// Consensus-enforced floor.
        min_price: U256,
    },

    /// Dynamic-fee transaction offers a fee cap below the block base fee.
    #[error("max fee per gas less than block base fee ({fee_cap} < {base_fee})")]
    FeeCapBelowBaseFee {
        /// Fee cap declared by the transaction.
        fee_cap: U256,
        /// Base fee of the current block.
        base_fee: U256,
    },

    /// Underlying state access failed while a stage recorded its effects.
    #[error(transparent)]
    State(#[from] StateError),
}

/// Signature recovery failure reported by the black-box verifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("signature verification failed: {0}")]
pub struct SignatureError(pub String);

/// Errors raised by the state-transition engine.
///
/// Non-fatal variants leave no observable state behind and are safe to retry
/// with different parameters (gas estimation relies on this). Fatal variants
/// indicate a determinism-breaking bug and must abort block processing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// Contract creation is disabled by governance parameters.
    #[error("contract creation is disabled by chain parameters")]
    CreateDisabled,

    /// Contract calls are disabled by governance parameters.
    #[error("contract calls are disabled by chain parameters")]
    CallDisabled,

    /// Remaining gas cannot cover the intrinsic cost of the message.
    #[error("intrinsic gas too low: have {have}, want {want}")]
    IntrinsicGas {
        /// Gas left for the message.
        have: u64,
        /// Intrinsic gas required.
        want: u64,
    },

    /// Intrinsic-gas arithmetic overflowed.
    #[error("intrinsic gas computation overflows u64")]
    GasUintOverflow,

    /// Contract-creation payload exceeds the maximum initcode size.
    #[error("max initcode size exceeded: size {size}, limit {limit}")]
    InitCodeTooLarge {
        /// Payload size in bytes.
        size: usize,
        /// Active limit in bytes.
        limit: usize,
    },

    /// The message sender has not been resolved; signature verification must
    /// run before the transaction reaches the engine.
    #[error("message sender is not populated; signature verification has not run")]
    MissingSender,

    /// Refund accounting produced more leftover gas than the declared limit.
    /// Fatal: correct refund accounting can never trigger this.
    #[error("gas overflow: message gas limit {gas_limit} < leftover gas {leftover_gas}")]
    GasOverflow {
        /// Declared message gas limit.
        gas_limit: u64,
        /// Computed leftover gas.
        leftover_gas: u64,
    },

    /// Cumulative block gas accounting overflowed. Fatal.
    #[error("cumulative block gas used overflows u64")]
    CumulativeGasOverflow,

    /// Refund arithmetic overflowed 256 bits. Fatal: the pipeline verified
    /// the full fee fits, so the refund must too.
    #[error("gas refund amount overflows 256-bit arithmetic")]
    RefundOverflow,

    /// Committing the journaled store failed. Fatal.
    #[error(transparent)]
    Commit(#[from] StateError),
}

impl ExecutionError {
    /// Whether the error must abort processing of the current block instead
    /// of being reported to the caller as a rejection.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::GasOverflow { .. }
                | Self::CumulativeGasOverflow
                | Self::RefundOverflow
                | Self::Commit(_)
        )
    }
}

/// Failure of the persistent view backing the journaled store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("state backend error: {0}")]
pub struct StateError(pub String);

/// Failure reported by a post-execution hook. Degrades the transaction to a
/// failed receipt; never aborts the block.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("post-execution hook failed: {0}")]
pub struct HookError(pub String);
