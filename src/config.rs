//! Pipeline configuration.

use serde::Deserialize;

/// Tunables for pipeline behavior. Deserializable so hosts can load it from
/// their own settings files; every field has a working default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// When true, the executor refuses to launch a command while an
    /// interrupt drain is pending and fails it instead. Off by default:
    /// the drain flag is advisory.
    pub block_starts_while_draining: bool,
    /// Prefix for minted command ids (`<prefix>-<uuid>`).
    pub command_id_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            block_starts_while_draining: false,
            command_id_prefix: "cmd".to_string(),
        }
    }
}
