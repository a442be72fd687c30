//! Structural, signature, account and transfer-affordability stages.

use crate::{
    error::AdmissionError,
    pipeline::{CheckContext, Stage},
    statedb::{Account, Backend},
    tx::{Envelope, SignatureVerifier},
};

/// Checks that the envelope carries only EVM messages and that every
/// message's fields are self-consistent. The typed transaction model already
/// rules out cross-variant field mixes (a dynamic-fee transaction cannot
/// carry a plain gas price); what remains are value-level checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicValidation;

impl<B: Backend> Stage<B> for BasicValidation {
    fn check(
        &self,
        _ctx: &mut CheckContext<'_, B>,
        env: &mut Envelope,
        _simulate: bool,
    ) -> Result<(), AdmissionError> {
        for tx in env.eth_msgs()? {
            tx.validate_basic()?;
        }
        Ok(())
    }
}

/// Recovers and caches the sender of every message. Fails closed when
/// recovery fails or the declared chain id does not match this chain.
pub struct SignatureVerification {
    verifier: Box<dyn SignatureVerifier>,
}

impl core::fmt::Debug for SignatureVerification {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SignatureVerification").finish_non_exhaustive()
    }
}

impl SignatureVerification {
    /// Creates the stage around the black-box verifier.
    pub fn new(verifier: Box<dyn SignatureVerifier>) -> Self {
        Self { verifier }
    }
}

impl<B: Backend> Stage<B> for SignatureVerification {
    fn check(
        &self,
        ctx: &mut CheckContext<'_, B>,
        env: &mut Envelope,
        _simulate: bool,
    ) -> Result<(), AdmissionError> {
        let chain_id = ctx.chain_config.chain_id;
        let allow_unprotected = ctx.params.allow_unprotected_txs;
        for tx in env.eth_msgs_mut()? {
            match tx.chain_id() {
                None if !allow_unprotected => {
                    return Err(AdmissionError::Malformed(
                        "unprotected transactions are not allowed on this chain".to_string(),
                    ));
                }
                Some(got) if got != chain_id => {
                    return Err(AdmissionError::ChainId { got, expected: chain_id });
                }
                _ => {}
            }
            let from = self.verifier.recover_signer(tx)?;
            tx.set_from(from);
        }
        Ok(())
    }
}

/// Verifies the sender account: it must be externally owned, it is created
/// with a zero nonce when unknown, and it must afford the worst-case
/// transaction cost. Runs at admission and re-check time only; by inclusion
/// time the sender is guaranteed to exist.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountVerification;

impl<B: Backend> Stage<B> for AccountVerification {
    fn check(
        &self,
        ctx: &mut CheckContext<'_, B>,
        env: &mut Envelope,
        _simulate: bool,
    ) -> Result<(), AdmissionError> {
        if ctx.mode.is_inclusion() {
            return Ok(());
        }
        for tx in env.eth_msgs()? {
            let from = tx
                .from()
                .ok_or(AdmissionError::MissingSender { tx_hash: tx.hash })?;

            let account = match ctx.backend.account(from) {
                Some(account) => {
                    if account.is_contract() {
                        return Err(AdmissionError::SenderNotEoa {
                            address: from,
                            code_hash: account.code_hash,
                        });
                    }
                    account
                }
                None => {
                    let account = Account::default();
                    ctx.backend.set_account(from, account.clone())?;
                    account
                }
            };

            let cost = tx.cost().ok_or(AdmissionError::FeeOverflow)?;
            if account.balance < cost {
                return Err(AdmissionError::InsufficientBalance {
                    balance: account.balance,
                    cost,
                });
            }
        }
        Ok(())
    }
}

/// Checks the top-level value transfer: the fee cap must clear the block
/// base fee, and the sender balance must cover the transferred value.
/// Sub-call transfers are the interpreter's concern.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanTransfer;

impl<B: Backend> Stage<B> for CanTransfer {
    fn check(
        &self,
        ctx: &mut CheckContext<'_, B>,
        env: &mut Envelope,
        _simulate: bool,
    ) -> Result<(), AdmissionError> {
        for tx in env.eth_msgs()? {
            if let Some(base_fee) = ctx.base_fee() {
                let fee_cap = tx.gas_price();
                if fee_cap < *base_fee {
                    return Err(AdmissionError::FeeCapBelowBaseFee {
                        fee_cap,
                        base_fee: *base_fee,
                    });
                }
            }

            let value = tx.value();
            if value.is_zero() {
                continue;
            }
            let from = tx
                .from()
                .ok_or(AdmissionError::MissingSender { tx_hash: tx.hash })?;
            let balance = ctx.backend.account(from).map_or_else(Default::default, |a| a.balance);
            if balance < value {
                return Err(AdmissionError::InsufficientTransferBalance { from, value });
            }
        }
        Ok(())
    }
}
