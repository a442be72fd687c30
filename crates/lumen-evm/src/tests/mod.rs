//! Integration-style suites for the pipeline, the engine, the store, the
//! fee market and the query entry points.

mod execution_test;
mod query_test;
mod statedb_test;
