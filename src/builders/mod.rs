//! Builders to construct oracles from configuration.

pub mod oracle_builder;

pub use oracle_builder::build_oracles;
