//! Price-floor stages.

use crate::{
    error::AdmissionError,
    pipeline::{CheckContext, Stage},
    statedb::Backend,
    tx::Envelope,
};

/// Rejects transactions priced below the node-local mempool floor.
///
/// Admission-time only and never part of consensus. Once the fee market is
/// active the consensus-side floors (the global minimum and the base fee)
/// subsume the node-local one, so this stage only applies while no base fee
/// is enforced.
#[derive(Debug, Clone, Copy, Default)]
pub struct MempoolFeeFilter;

impl<B: Backend> Stage<B> for MempoolFeeFilter {
    fn check(
        &self,
        ctx: &mut CheckContext<'_, B>,
        env: &mut Envelope,
        simulate: bool,
    ) -> Result<(), AdmissionError> {
        if !ctx.mode.is_admission() || simulate {
            return Ok(());
        }
        if ctx.base_fee().is_some() || ctx.min_gas_prices.is_zero() {
            return Ok(());
        }
        for tx in env.eth_msgs()? {
            let price = tx.gas_price();
            if price < ctx.min_gas_prices {
                return Err(AdmissionError::PriceBelowNodeFloor {
                    price,
                    min_price: ctx.min_gas_prices,
                });
            }
        }
        Ok(())
    }
}

/// Enforces the chain-wide minimum gas price parameter against the effective
/// price of every message. Consensus-enforced, unlike [`MempoolFeeFilter`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MinGasPriceFilter;

impl<B: Backend> Stage<B> for MinGasPriceFilter {
    fn check(
        &self,
        ctx: &mut CheckContext<'_, B>,
        env: &mut Envelope,
        _simulate: bool,
    ) -> Result<(), AdmissionError> {
        let min_price = ctx.fee_params.min_gas_price;
        if min_price.is_zero() {
            return Ok(());
        }
        for tx in env.eth_msgs()? {
            let price = tx.effective_gas_price(ctx.base_fee());
            if price < min_price {
                return Err(AdmissionError::PriceBelowMinimum { price, min_price });
            }
        }
        Ok(())
    }
}
