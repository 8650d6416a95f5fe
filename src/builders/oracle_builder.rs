//! Build a named set of oracles from configuration.

use std::collections::HashMap;

use tracing::info;

use crate::config::OracleSetConfig;
use crate::core::{Oracle, OracleError};

/// Build every oracle of a set. None of them is started.
///
/// # Errors
///
/// Returns `OracleError::InvalidConfig` if the set fails validation.
pub fn build_oracles(cfg: &OracleSetConfig) -> Result<HashMap<String, Oracle>, OracleError> {
    cfg.validate()
        .map_err(|e| OracleError::InvalidConfig(format!("oracle set invalid: {e}")))?;

    let mut oracles = HashMap::with_capacity(cfg.oracles.len());
    for (name, oracle_cfg) in &cfg.oracles {
        let oracle = Oracle::new(oracle_cfg.clone().with_thread_name_prefix(format!(
            "{}-{name}",
            oracle_cfg.thread_name_prefix
        )))?;
        info!(oracle = %name, oracle_id = %oracle.id(), "Oracle built from configuration");
        oracles.insert(name.clone(), oracle);
    }

    Ok(oracles)
}
