//! Gas- and nonce-accounting stages.

use crate::{
    error::AdmissionError,
    gas::{intrinsic_gas, GasMeter},
    pipeline::{CheckContext, Stage},
    statedb::Backend,
    tx::{Envelope, TxData},
};

/// Installs the validation-phase gas meter: effectively unmetered, so
/// host-side accounting cannot interfere with VM-level gas accounting.
/// Outermost stage; must run first.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextSetup;

impl<B: Backend> Stage<B> for ContextSetup {
    fn check(
        &self,
        ctx: &mut CheckContext<'_, B>,
        _env: &mut Envelope,
        _simulate: bool,
    ) -> Result<(), AdmissionError> {
        ctx.gas_meter = GasMeter::unlimited();
        Ok(())
    }
}

/// Verifies intrinsic gas, deducts the full fee from the sender, installs
/// the transaction-scoped gas meter and records the envelope's mempool
/// priority (the minimum across its messages).
///
/// Fee deduction and intrinsic verification are skipped on re-validation
/// passes: balances were already charged when the transaction was first
/// admitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct GasAccounting;

impl<B: Backend> Stage<B> for GasAccounting {
    fn check(
        &self,
        ctx: &mut CheckContext<'_, B>,
        env: &mut Envelope,
        _simulate: bool,
    ) -> Result<(), AdmissionError> {
        let base_fee = ctx.base_fee().copied();
        let rules = ctx.chain_config.rules(ctx.block.height);

        let mut gas_wanted: u64 = 0;
        // the lowest priority across all messages becomes the envelope's
        let mut min_priority = i64::MAX;

        for tx in env.eth_msgs()? {
            min_priority = min_priority.min(tx.priority(base_fee.as_ref()));

            let gas_limit = tx.gas_limit();
            // The declared limit cannot be trusted for mempool accounting
            // since unused gas is refunded, so the node may clamp it.
            if ctx.mode.is_admission() && ctx.max_tx_gas_wanted != 0 {
                gas_wanted = gas_wanted.saturating_add(gas_limit.min(ctx.max_tx_gas_wanted));
            } else {
                gas_wanted = gas_wanted.saturating_add(gas_limit);
            }

            if ctx.mode.is_recheck() {
                continue;
            }

            let intrinsic = intrinsic_gas(
                tx.input(),
                &tx.access_list().cloned().unwrap_or_default(),
                tx.is_contract_creation(),
                &rules,
            )
            .map_err(|_| AdmissionError::FeeOverflow)?;
            if gas_limit < intrinsic {
                return Err(AdmissionError::GasLimitBelowIntrinsic {
                    gas_limit,
                    intrinsic_gas: intrinsic,
                });
            }

            // The fee charged up front: the effective fee once the fee
            // market prices dynamic transactions, the worst case otherwise.
            let fee = if rules.is_london && matches!(tx.tx, TxData::DynamicFee(_)) {
                tx.effective_fee(base_fee.as_ref())
            } else {
                tx.fee()
            }
            .ok_or(AdmissionError::FeeOverflow)?;

            if !fee.is_zero() {
                let from = tx
                    .from()
                    .ok_or(AdmissionError::MissingSender { tx_hash: tx.hash })?;
                let mut account = ctx.backend.account(from).unwrap_or_default();
                account.balance = account.balance.checked_sub(fee).ok_or(
                    AdmissionError::InsufficientBalance { balance: account.balance, cost: fee },
                )?;
                ctx.backend.set_account(from, account)?;
            }
        }

        // The gas wanted, not the gas consumed so far, is what must fit in
        // the block.
        if gas_wanted > ctx.block.gas_limit {
            return Err(AdmissionError::BlockGasLimitExceeded {
                gas_wanted,
                block_gas_limit: ctx.block.gas_limit,
            });
        }

        ctx.gas_meter = GasMeter::with_limit(gas_wanted);
        ctx.priority = min_priority;
        Ok(())
    }
}

/// Checks and increments the sender nonce of every message. Multiple
/// messages from one sender are accepted only with sequential nonces, since
/// each message advances the account by exactly one.
///
/// Re-validation passes tolerate a nonce that this pass context already
/// advanced, keeping the stage idempotent for effects applied at admission.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonceIncrement;

impl<B: Backend> Stage<B> for NonceIncrement {
    fn check(
        &self,
        ctx: &mut CheckContext<'_, B>,
        env: &mut Envelope,
        _simulate: bool,
    ) -> Result<(), AdmissionError> {
        for tx in env.eth_msgs()? {
            let from = tx
                .from()
                .ok_or(AdmissionError::MissingSender { tx_hash: tx.hash })?;
            let mut account = ctx
                .backend
                .account(from)
                .ok_or(AdmissionError::UnknownAccount { address: from })?;

            let declared = tx.nonce();
            if ctx.mode.is_recheck() && declared.checked_add(1) == Some(account.nonce) {
                // already applied when the transaction was first admitted
                continue;
            }
            if declared != account.nonce {
                return Err(AdmissionError::InvalidNonce {
                    got: declared,
                    expected: account.nonce,
                });
            }
            account.nonce += 1;
            ctx.backend.set_account(from, account)?;
        }
        Ok(())
    }
}

/// Adds the envelope's declared gas to the per-block gas-wanted tally read
/// by the fee-market calculator. Performs no validation beyond the block
/// gas cap; skipped entirely while dynamic-fee parameters are disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct GasWantedTally;

impl<B: Backend> Stage<B> for GasWantedTally {
    fn check(
        &self,
        ctx: &mut CheckContext<'_, B>,
        env: &mut Envelope,
        _simulate: bool,
    ) -> Result<(), AdmissionError> {
        if !ctx.chain_config.is_london(ctx.block.height) {
            return Ok(());
        }

        let mut gas_wanted: u64 = 0;
        for tx in env.eth_msgs()? {
            gas_wanted = gas_wanted.saturating_add(tx.gas_limit());
        }
        if gas_wanted > ctx.block.gas_limit {
            return Err(AdmissionError::BlockGasLimitExceeded {
                gas_wanted,
                block_gas_limit: ctx.block.gas_limit,
            });
        }

        if ctx.fee_params.is_base_fee_enabled(ctx.block.height) {
            ctx.block_state
                .add_gas_wanted(gas_wanted)
                .map_err(|err| AdmissionError::Malformed(err.to_string()))?;
        }
        Ok(())
    }
}
