use crate::error::{FieldSchemaError, Result};
use crate::hierarchy::DEFAULT_INDENT_UNIT;
use crate::ingestion::{DuplicatePolicy, HeaderSynonyms};
use crate::repair::parse_lenient;
use crate::reverse::{LabelDictionary, DEFAULT_EXAMPLE_MAX_LEN};
use log::debug;
use serde::{Deserialize, Serialize};

/// Tunables for the compiler. Every field has a default, so a config
/// document only needs to name what it changes. A supplied `labels` or
/// `headers` table replaces the built-in one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompilerConfig {
    /// Indent per nesting level in the field table.
    pub indent_unit: u32,
    /// Maximum characters kept from a sample value as a field example.
    pub example_max_len: usize,
    pub labels: LabelDictionary,
    pub headers: HeaderSynonyms,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            indent_unit: DEFAULT_INDENT_UNIT,
            example_max_len: DEFAULT_EXAMPLE_MAX_LEN,
            labels: LabelDictionary::default(),
            headers: HeaderSynonyms::default(),
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

impl CompilerConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let repaired = parse_lenient(text)?;
        let config: CompilerConfig = serde_json::from_value(repaired.value)?;
        config.validate()?;
        debug!(
            "Loaded compiler config ({} labels, duplicate policy {:?})",
            config.labels.len(),
            config.duplicate_policy
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.indent_unit == 0 {
            return Err(FieldSchemaError::InvalidConfig(
                "indentUnit must be greater than 0".to_string(),
            ));
        }
        if self.example_max_len == 0 {
            return Err(FieldSchemaError::InvalidConfig(
                "exampleMaxLen must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
