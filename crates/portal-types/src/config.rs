//! Bridge configuration.

use serde::{Deserialize, Serialize};

/// Options an embedding application sets on a bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Keep private-looking attribute writes locally when the remote side
    /// refuses them.
    pub allow_private_attribute_fallback: bool,
    /// Probe the remote side for imports nothing local can satisfy.
    pub auto_discover_missing: bool,
    /// Root names forced remote when the bridge is created.
    pub forced: Vec<String>,
    /// On install, create empty package placeholders for forced roots that
    /// are not in the module table yet.
    pub create_parent_modules: bool,
    /// Log level for binaries embedding the bridge.
    pub log_level: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            allow_private_attribute_fallback: true,
            auto_discover_missing: true,
            forced: Vec::new(),
            create_parent_modules: false,
            log_level: "info".to_string(),
        }
    }
}
