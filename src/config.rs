use serde::{Deserialize, Serialize};

use crate::error::{SchemaError, SchemaErrorKind};

/// Largest identifier a database column can hold.
pub const DEFAULT_MAX_ID: u64 = 9_223_372_036_854_775_807;

/// Sweeps a referenced field may stay unresolved before it is given up on.
pub const DEFAULT_RETRY_BUDGET: usize = 3;

/// Tunables of the validation engine.
///
/// ```yaml
/// retry_budget: 5
/// max_id: 4294967295
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Per-path retry budget of the dependency resolver. Chains of `when`
    /// references deeper than this degrade to "unresolved".
    pub retry_budget: usize,
    /// Upper bound accepted by `id` fields.
    pub max_id: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            retry_budget: DEFAULT_RETRY_BUDGET,
            max_id: DEFAULT_MAX_ID,
        }
    }
}

impl EngineOptions {
    pub fn from_yaml(input: &str) -> Result<EngineOptions, SchemaError> {
        if input.trim().is_empty() {
            return Ok(EngineOptions::default());
        }
        serde_saphyr::from_str(input).map_err(|e| {
            SchemaError::new(
                SchemaErrorKind::Syntax,
                "",
                format!("invalid engine options: {}", e),
            )
        })
    }
}
