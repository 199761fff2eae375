//! Bridge configuration, passed as JSON to `wb_on_load`.

use crate::error::BridgeError;
use serde::Deserialize;

/// Interface version requested from the runtime when no version is configured.
pub const DEFAULT_INTERFACE_VERSION: u32 = 0x0001_0006;

/// Largest exchange request accepted when no limit is configured.
pub const DEFAULT_MAX_EXCHANGE_LEN: usize = 64 * 1024;

/// Load-time configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Install a log subscriber at this level (`error`..`trace`) during load
    pub log_level: Option<String>,
    /// Interface version passed to the runtime's `get_env`
    pub interface_version: u32,
    /// Upper bound on exchange request length
    pub max_exchange_len: usize,
    /// Log outstanding handles when the bridge is unloaded
    pub report_leaks_on_unload: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            interface_version: DEFAULT_INTERFACE_VERSION,
            max_exchange_len: DEFAULT_MAX_EXCHANGE_LEN,
            report_leaks_on_unload: true,
        }
    }
}

impl BridgeConfig {
    /// Parse a configuration from JSON. `None` yields the defaults.
    pub fn from_json(json: Option<&str>) -> Result<Self, BridgeError> {
        let config: BridgeConfig = match json {
            Some(s) if !s.trim().is_empty() => serde_json::from_str(s)?,
            _ => BridgeConfig::default(),
        };
        if config.max_exchange_len == 0 {
            return Err(BridgeError::InvalidArgument(
                "max_exchange_len must be positive".into(),
            ));
        }
        Ok(config)
    }
}
