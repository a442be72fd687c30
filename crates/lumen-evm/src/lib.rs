//! Transaction-execution core of the Lumen ledger's EVM module.
//!
//! Four tightly coupled pieces form the hot path every transaction travels:
//! the validation and fee [`pipeline`](Pipeline), the state-transition
//! [`Executor`], the journaled [`StateDB`], and the dynamic base-fee
//! calculator in [`feemarket`](calculate_base_fee). The bytecode interpreter,
//! signature recovery and the persistence engine are consumed as black boxes
//! through the [`VirtualMachine`], [`SignatureVerifier`] and [`Backend`]
//! traits.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod constants;

mod block;
pub use block::*;

mod error;
pub use error::*;

mod execution;
pub use execution::*;

mod feemarket;
pub use feemarket::*;

mod gas;
pub use gas::*;

mod params;
pub use params::*;

mod pipeline;
pub use pipeline::*;

mod query;
pub use query::*;

mod statedb;
pub use statedb::*;

mod tx;
pub use tx::*;

mod vm;
pub use vm::*;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

#[cfg(test)]
mod tests;
