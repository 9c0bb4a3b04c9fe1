//! Perfcap - capture a perf call-graph profile of a running process
//!
//! This library drives `perf record` against a process resolved by name,
//! resets ownership of the raw trace left behind by the privileged capture,
//! and converts it with `perf script` into a form flame graph viewers accept.

pub mod backend;
pub mod capture;
pub mod cli;
