use serde::{Deserialize, Serialize};

/// Retries a quantity decrement makes after its first attempt before it
/// reports a conflict.
pub const DEFAULT_MAX_QUANTITY_RETRIES: u32 = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Compare-and-set retries for one quantity decrement, after the first
    /// attempt. Zero means a single attempt.
    pub max_quantity_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_quantity_retries: DEFAULT_MAX_QUANTITY_RETRIES,
        }
    }
}
