//! Validation and fee pipeline.
//!
//! An ordered chain of independent stages runs once per transaction at
//! admission time and again, in a reduced form, before inclusion. Each stage
//! inspects the envelope and records side effects on the [`CheckContext`]
//! (sender caching, fee deduction, gas-wanted accounting); the first error
//! aborts the whole pass. The driver is a flat stage vector, so individual
//! stages stay trivially unit-testable.
//!
//! Stage effects are *not* rolled back on failure: block processing is
//! expected to run the whole pass inside an outer transactional scope (see
//! [`crate::CacheBackend`]) so that admission failures never reach committed
//! state.

mod fees;
mod gas;
mod listener;
mod validation;

pub use fees::{MempoolFeeFilter, MinGasPriceFilter};
pub use gas::{ContextSetup, GasAccounting, GasWantedTally, NonceIncrement};
pub use listener::{PendingTxListener, PendingTxNotifier};
pub use validation::{AccountVerification, BasicValidation, CanTransfer, SignatureVerification};

use alloy_primitives::U256;

use crate::{
    block::{BlockEnv, BlockResourceState},
    error::AdmissionError,
    gas::GasMeter,
    params::{ChainConfig, EvmParams, FeeMarketParams},
    statedb::Backend,
    tx::{Envelope, SignatureVerifier},
};

/// Where in the transaction lifecycle a pipeline pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMode {
    /// First-time admission into the pending pool.
    Admission,
    /// Re-validation of an already admitted transaction.
    Recheck,
    /// Final pass during block processing, immediately before execution.
    Inclusion,
}

impl CheckMode {
    /// Whether this is the first-time admission pass.
    pub const fn is_admission(&self) -> bool {
        matches!(self, Self::Admission)
    }

    /// Whether this is a re-validation pass.
    pub const fn is_recheck(&self) -> bool {
        matches!(self, Self::Recheck)
    }

    /// Whether this pass runs during block processing.
    pub const fn is_inclusion(&self) -> bool {
        matches!(self, Self::Inclusion)
    }
}

/// Mutable context threaded through the stages of one pipeline pass.
pub struct CheckContext<'a, B: Backend> {
    /// State view the pass records its side effects into.
    pub backend: &'a mut B,
    /// EVM module parameters.
    pub params: &'a EvmParams,
    /// Fee-market parameters.
    pub fee_params: &'a FeeMarketParams,
    /// Hard-fork schedule.
    pub chain_config: &'a ChainConfig,
    /// Environment of the block the pass runs against.
    pub block: &'a BlockEnv,
    /// Per-block transient counters.
    pub block_state: &'a mut BlockResourceState,
    /// Lifecycle position of this pass.
    pub mode: CheckMode,
    /// Node-local price floor consulted at admission time only.
    pub min_gas_prices: U256,
    /// Node-side clamp on the per-transaction gas-wanted tally at admission
    /// time; zero disables the clamp.
    pub max_tx_gas_wanted: u64,
    /// Gas meter installed by the setup stage and re-installed, bounded by
    /// the declared gas, by the gas-accounting stage.
    pub gas_meter: GasMeter,
    /// Mempool ordering priority recorded by the gas-accounting stage.
    pub priority: i64,
}

impl<'a, B: Backend> CheckContext<'a, B> {
    /// Creates a context for one pipeline pass.
    pub fn new(
        backend: &'a mut B,
        params: &'a EvmParams,
        fee_params: &'a FeeMarketParams,
        chain_config: &'a ChainConfig,
        block: &'a BlockEnv,
        block_state: &'a mut BlockResourceState,
        mode: CheckMode,
    ) -> Self {
        Self {
            backend,
            params,
            fee_params,
            chain_config,
            block,
            block_state,
            mode,
            min_gas_prices: U256::ZERO,
            max_tx_gas_wanted: 0,
            gas_meter: GasMeter::unlimited(),
            priority: i64::MAX,
        }
    }

    /// Base fee of the current block, `None` while the fee market is
    /// disabled.
    pub fn base_fee(&self) -> Option<&U256> {
        self.block.base_fee.as_ref()
    }
}

impl<B: Backend> core::fmt::Debug for CheckContext<'_, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CheckContext")
            .field("mode", &self.mode)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// One link of the pipeline.
///
/// A stage either returns `Ok(())` to continue the chain or an error to
/// abort it; errors never partially apply a later stage's effects.
pub trait Stage<B: Backend> {
    /// Runs the stage against one envelope.
    fn check(
        &self,
        ctx: &mut CheckContext<'_, B>,
        env: &mut Envelope,
        simulate: bool,
    ) -> Result<(), AdmissionError>;
}

/// The assembled pipeline: stages in their canonical order, any
/// caller-supplied extra stages, and the terminal listener stage.
pub struct Pipeline<B: Backend> {
    stages: Vec<Box<dyn Stage<B>>>,
}

impl<B: Backend> core::fmt::Debug for Pipeline<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pipeline").field("stages", &self.stages.len()).finish()
    }
}

impl<B: Backend> Pipeline<B> {
    /// Starts building a pipeline around the given signature verifier.
    pub fn builder(verifier: Box<dyn SignatureVerifier>) -> PipelineBuilder<B> {
        PipelineBuilder { verifier, extra: Vec::new(), listener: None }
    }

    /// Runs every stage in order, aborting on the first error.
    pub fn run(
        &self,
        ctx: &mut CheckContext<'_, B>,
        env: &mut Envelope,
        simulate: bool,
    ) -> Result<(), AdmissionError> {
        for stage in &self.stages {
            stage.check(ctx, env, simulate)?;
        }
        Ok(())
    }
}

/// Builder assembling the canonical stage order with optional extensions.
pub struct PipelineBuilder<B: Backend> {
    verifier: Box<dyn SignatureVerifier>,
    extra: Vec<Box<dyn Stage<B>>>,
    listener: Option<PendingTxListener>,
}

impl<B: Backend> core::fmt::Debug for PipelineBuilder<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PipelineBuilder").field("extra", &self.extra.len()).finish_non_exhaustive()
    }
}

impl<B: Backend> PipelineBuilder<B> {
    /// Appends a caller-supplied stage. Extra stages run after the canonical
    /// chain and before the terminal listener stage.
    pub fn with_stage(mut self, stage: Box<dyn Stage<B>>) -> Self {
        self.extra.push(stage);
        self
    }

    /// Installs the pending-transaction listener.
    pub fn with_listener(mut self, listener: PendingTxListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Assembles the pipeline. The canonical order is fixed; later stages
    /// rely on state recorded by earlier ones and must not be reordered.
    pub fn build(self) -> Pipeline<B> {
        let mut stages: Vec<Box<dyn Stage<B>>> = vec![
            Box::new(ContextSetup),
            Box::new(MempoolFeeFilter),
            Box::new(MinGasPriceFilter),
            Box::new(BasicValidation),
            Box::new(SignatureVerification::new(self.verifier)),
            Box::new(AccountVerification),
            Box::new(CanTransfer),
            Box::new(GasAccounting),
            Box::new(NonceIncrement),
            Box::new(GasWantedTally),
        ];
        stages.extend(self.extra);
        stages.push(Box::new(PendingTxNotifier::new(self.listener)));
        Pipeline { stages }
    }
}
