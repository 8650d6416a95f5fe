//! Configuration models for oracles and oracle sets.

pub mod oracle;

pub use oracle::{OracleConfig, OracleSetConfig, ShutdownPolicy};
