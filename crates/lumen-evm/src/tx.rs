//! Transaction data model: the three supported variants, the signed wrapper,
//! the envelope admitted by the pipeline, and the internal message form
//! consumed by the state-transition engine.
//!
//! Wire (de)serialization of the envelope lives outside this crate; the
//! envelope codec assigns each signed transaction its canonical hash.

use alloy_eips::eip2930::AccessList;
use alloy_primitives::{Address, Bytes, TxKind, B256, U256};
use auto_impl::auto_impl;

use crate::{
    constants::PRIORITY_REDUCTION,
    error::{AdmissionError, SignatureError},
};

/// Raw secp256k1 signature values carried by a signed transaction. Consumed
/// opaquely by the black-box signature verifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxSignature {
    /// Signature `r` value.
    pub r: U256,
    /// Signature `s` value.
    pub s: U256,
    /// Recovery id, possibly folded with the chain id for legacy
    /// transactions.
    pub v: u64,
}

/// Pre-fee-market transaction with a single gas price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTx {
    /// Chain id, `None` for unprotected (pre-EIP-155) transactions.
    pub chain_id: Option<u64>,
    /// Sender nonce.
    pub nonce: u64,
    /// Offered price per gas unit.
    pub gas_price: U256,
    /// Declared gas limit.
    pub gas_limit: u64,
    /// Recipient, or contract creation when absent.
    pub to: TxKind,
    /// Transferred value.
    pub value: U256,
    /// Call data or initcode.
    pub input: Bytes,
}

/// Transaction with a pre-declared access list (EIP-2930 style).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessListTx {
    /// Chain id.
    pub chain_id: u64,
    /// Sender nonce.
    pub nonce: u64,
    /// Offered price per gas unit.
    pub gas_price: U256,
    /// Declared gas limit.
    pub gas_limit: u64,
    /// Recipient, or contract creation when absent.
    pub to: TxKind,
    /// Transferred value.
    pub value: U256,
    /// Call data or initcode.
    pub input: Bytes,
    /// Addresses and storage keys pre-declared for warm access.
    pub access_list: AccessList,
}

/// Fee-market transaction with a fee cap and a priority-fee cap
/// (EIP-1559 style).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicFeeTx {
    /// Chain id.
    pub chain_id: u64,
    /// Sender nonce.
    pub nonce: u64,
    /// Cap on the priority fee (tip) per gas unit.
    pub max_priority_fee_per_gas: U256,
    /// Cap on the total price per gas unit.
    pub max_fee_per_gas: U256,
    /// Declared gas limit.
    pub gas_limit: u64,
    /// Recipient, or contract creation when absent.
    pub to: TxKind,
    /// Transferred value.
    pub value: U256,
    /// Call data or initcode.
    pub input: Bytes,
    /// Addresses and storage keys pre-declared for warm access.
    pub access_list: AccessList,
}

/// The transaction variants admitted by the pipeline. Immutable once signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxData {
    /// Single-gas-price transaction.
    Legacy(LegacyTx),
    /// Access-list transaction.
    AccessList(AccessListTx),
    /// Fee-cap/tip-cap transaction.
    DynamicFee(DynamicFeeTx),
}

impl TxData {
    /// Declared sender nonce.
    pub const fn nonce(&self) -> u64 {
        match self {
            Self::Legacy(tx) => tx.nonce,
            Self::AccessList(tx) => tx.nonce,
            Self::DynamicFee(tx) => tx.nonce,
        }
    }

    /// Declared gas limit.
    pub const fn gas_limit(&self) -> u64 {
        match self {
            Self::Legacy(tx) => tx.gas_limit,
            Self::AccessList(tx) => tx.gas_limit,
            Self::DynamicFee(tx) => tx.gas_limit,
        }
    }

    /// Recipient, or contract creation when absent.
    pub const fn to(&self) -> TxKind {
        match self {
            Self::Legacy(tx) => tx.to,
            Self::AccessList(tx) => tx.to,
            Self::DynamicFee(tx) => tx.to,
        }
    }

    /// Transferred value.
    pub const fn value(&self) -> U256 {
        match self {
            Self::Legacy(tx) => tx.value,
            Self::AccessList(tx) => tx.value,
            Self::DynamicFee(tx) => tx.value,
        }
    }

    /// Call data or initcode.
    pub const fn input(&self) -> &Bytes {
        match self {
            Self::Legacy(tx) => &tx.input,
            Self::AccessList(tx) => &tx.input,
            Self::DynamicFee(tx) => &tx.input,
        }
    }

    /// Declared chain id, `None` for unprotected legacy transactions.
    pub const fn chain_id(&self) -> Option<u64> {
        match self {
            Self::Legacy(tx) => tx.chain_id,
            Self::AccessList(tx) => Some(tx.chain_id),
            Self::DynamicFee(tx) => Some(tx.chain_id),
        }
    }

    /// Pre-declared access list; empty for legacy transactions.
    pub fn access_list(&self) -> Option<&AccessList> {
        match self {
            Self::Legacy(_) => None,
            Self::AccessList(tx) => Some(&tx.access_list),
            Self::DynamicFee(tx) => Some(&tx.access_list),
        }
    }

    /// Whether the transaction creates a contract.
    pub const fn is_contract_creation(&self) -> bool {
        self.to().is_create()
    }

    /// Worst-case price per gas unit: the declared price, or the fee cap for
    /// dynamic-fee transactions.
    pub const fn gas_price(&self) -> U256 {
        match self {
            Self::Legacy(tx) => tx.gas_price,
            Self::AccessList(tx) => tx.gas_price,
            Self::DynamicFee(tx) => tx.max_fee_per_gas,
        }
    }

    /// Price per gas unit actually charged under the given base fee:
    /// `min(base_fee + tip_cap, fee_cap)` for dynamic-fee transactions, the
    /// declared price otherwise.
    pub fn effective_gas_price(&self, base_fee: Option<&U256>) -> U256 {
        match self {
            Self::Legacy(tx) => tx.gas_price,
            Self::AccessList(tx) => tx.gas_price,
            Self::DynamicFee(tx) => match base_fee {
                Some(base) => base
                    .saturating_add(tx.max_priority_fee_per_gas)
                    .min(tx.max_fee_per_gas),
                None => tx.max_fee_per_gas,
            },
        }
    }

    /// Tip per gas unit the proposer receives above the base fee.
    pub fn effective_gas_tip(&self, base_fee: Option<&U256>) -> U256 {
        let Some(base) = base_fee else {
            return match self {
                Self::DynamicFee(tx) => tx.max_priority_fee_per_gas,
                _ => self.gas_price(),
            };
        };
        match self {
            Self::DynamicFee(tx) => tx
                .max_fee_per_gas
                .saturating_sub(*base)
                .min(tx.max_priority_fee_per_gas),
            _ => self.gas_price().saturating_sub(*base),
        }
    }

    /// Worst-case fee: `gas_price x gas_limit`. `None` on 256-bit overflow.
    pub fn fee(&self) -> Option<U256> {
        self.gas_price().checked_mul(U256::from(self.gas_limit()))
    }

    /// Fee charged under the given base fee:
    /// `effective_gas_price x gas_limit`. `None` on 256-bit overflow.
    pub fn effective_fee(&self, base_fee: Option<&U256>) -> Option<U256> {
        self.effective_gas_price(base_fee)
            .checked_mul(U256::from(self.gas_limit()))
    }

    /// Worst-case cost the sender must be able to afford: fee plus value.
    pub fn cost(&self) -> Option<U256> {
        self.fee()?.checked_add(self.value())
    }

    /// Mempool ordering priority derived from the effective tip.
    pub fn priority(&self, base_fee: Option<&U256>) -> i64 {
        let reduced = self.effective_gas_tip(base_fee) / U256::from(PRIORITY_REDUCTION);
        let reduced: u128 = reduced.saturating_to();
        reduced.min(i64::MAX as u128) as i64
    }

    /// Checks that the declared fields are self-consistent, independent of
    /// any chain state.
    pub fn validate_basic(&self) -> Result<(), AdmissionError> {
        if self.gas_limit() == 0 {
            return Err(AdmissionError::Malformed("gas limit must be positive".to_string()));
        }
        if let Self::DynamicFee(tx) = self {
            if tx.max_fee_per_gas < tx.max_priority_fee_per_gas {
                return Err(AdmissionError::Malformed(format!(
                    "max priority fee per gas ({}) higher than max fee per gas ({})",
                    tx.max_priority_fee_per_gas, tx.max_fee_per_gas
                )));
            }
        }
        if self.cost().is_none() {
            return Err(AdmissionError::FeeOverflow);
        }
        Ok(())
    }
}

/// A signed transaction: the payload, its signature, and the canonical hash
/// assigned by the envelope codec. The recovered sender is cached on the
/// message once signature verification has run.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Deref)]
pub struct SignedTx {
    /// Transaction payload.
    #[deref]
    pub tx: TxData,
    /// Signature over the payload.
    pub signature: TxSignature,
    /// Canonical transaction hash.
    pub hash: B256,
    from: Option<Address>,
}

impl SignedTx {
    /// Wraps a transaction payload with its signature and canonical hash.
    pub const fn new(tx: TxData, signature: TxSignature, hash: B256) -> Self {
        Self { tx, signature, hash, from: None }
    }

    /// The cached sender, if signature verification has run.
    pub const fn from(&self) -> Option<Address> {
        self.from
    }

    /// Caches the recovered sender address.
    pub fn set_from(&mut self, from: Address) {
        self.from = Some(from);
    }

    /// Builder-style variant of [`Self::set_from`].
    pub fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    /// Converts the transaction into the engine's message form, resolving
    /// the effective gas price against the block base fee. `None` until the
    /// sender has been recovered.
    pub fn as_message(&self, base_fee: Option<&U256>) -> Option<Message> {
        let from = self.from?;
        Some(Message {
            from,
            to: self.tx.to(),
            nonce: self.tx.nonce(),
            gas_limit: self.tx.gas_limit(),
            gas_price: self.tx.effective_gas_price(base_fee),
            value: self.tx.value(),
            input: self.tx.input().clone(),
            access_list: self.tx.access_list().cloned().unwrap_or_default(),
            tx_hash: self.hash,
        })
    }
}

/// Internal message form of one transaction, with fee fields resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Recovered sender.
    pub from: Address,
    /// Recipient, or contract creation when absent.
    pub to: TxKind,
    /// Declared sender nonce.
    pub nonce: u64,
    /// Declared gas limit.
    pub gas_limit: u64,
    /// Effective price per gas unit.
    pub gas_price: U256,
    /// Transferred value.
    pub value: U256,
    /// Call data or initcode.
    pub input: Bytes,
    /// Pre-declared warm addresses and storage keys.
    pub access_list: AccessList,
    /// Hash of the originating transaction; zero for synthesized messages.
    pub tx_hash: B256,
}

impl Message {
    /// Whether the message creates a contract.
    pub const fn is_contract_creation(&self) -> bool {
        self.to.is_create()
    }
}

/// One message carried by a transaction envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeMsg {
    /// An EVM transaction.
    Ethereum(SignedTx),
    /// Any other message type. The pipeline rejects envelopes that carry
    /// these.
    Foreign {
        /// Type identifier reported in the rejection.
        type_url: String,
    },
}

/// A signed container of messages submitted and admitted as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Messages in submission order.
    pub msgs: Vec<EnvelopeMsg>,
}

impl Envelope {
    /// Wraps a single transaction into an envelope.
    pub fn from_tx(tx: SignedTx) -> Self {
        Self { msgs: vec![EnvelopeMsg::Ethereum(tx)] }
    }

    /// Borrows every EVM message, rejecting envelopes that carry any other
    /// message type.
    pub fn eth_msgs(&self) -> Result<Vec<&SignedTx>, AdmissionError> {
        self.msgs
            .iter()
            .map(|msg| match msg {
                EnvelopeMsg::Ethereum(tx) => Ok(tx),
                EnvelopeMsg::Foreign { type_url } => Err(AdmissionError::UnsupportedMessage {
                    type_url: type_url.clone(),
                }),
            })
            .collect()
    }

    /// Mutable variant of [`Self::eth_msgs`].
    pub fn eth_msgs_mut(&mut self) -> Result<Vec<&mut SignedTx>, AdmissionError> {
        self.msgs
            .iter_mut()
            .map(|msg| match msg {
                EnvelopeMsg::Ethereum(tx) => Ok(tx),
                EnvelopeMsg::Foreign { type_url } => Err(AdmissionError::UnsupportedMessage {
                    type_url: type_url.clone(),
                }),
            })
            .collect()
    }
}

/// Black-box signer-recovery capability. Implementations wrap the actual
/// cryptographic recovery, which lives outside this crate.
#[auto_impl(&, Box, Arc)]
pub trait SignatureVerifier {
    /// Recovers the sender address committed to by the transaction
    /// signature.
    fn recover_signer(&self, tx: &SignedTx) -> Result<Address, SignatureError>;
}
