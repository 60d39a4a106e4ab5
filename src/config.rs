//! Pipeline configuration
//!
//! Every field has a default, so a configuration file only needs the
//! settings it changes:
//!
//! ```json
//! { "max_call_depth": 2048, "log_level": "debug" }
//! ```

use crate::interpreter::constants::{DEFAULT_MAX_CALL_DEPTH, DEFAULT_MAX_HEAP_CELLS, DEFAULT_MAX_STACK_CELLS};
use crate::interpreter::InterpreterConfig;
use crate::logger::LogLevel;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Options shared by every pipeline stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineOptions {
    /// Name used in diagnostics for the source text
    pub source_name: String,
    /// Nested calls allowed before the interpreter reports a stack overflow
    pub max_call_depth: usize,
    /// Function the backends start from
    pub entry_point: String,
    pub log_level: LogLevel,
    pub max_stack_cells: usize,
    pub max_heap_cells: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            source_name: "<input>".to_string(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            entry_point: "main".to_string(),
            log_level: LogLevel::default(),
            max_stack_cells: DEFAULT_MAX_STACK_CELLS,
            max_heap_cells: DEFAULT_MAX_HEAP_CELLS,
        }
    }
}

impl PipelineOptions {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = name.into();
        self
    }

    pub fn interpreter_config(&self) -> InterpreterConfig {
        InterpreterConfig {
            max_call_depth: self.max_call_depth,
            max_stack_cells: self.max_stack_cells,
            max_heap_cells: self.max_heap_cells,
            entry_point: self.entry_point.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let options = PipelineOptions::from_json_str(r#"{ "max_call_depth": 64, "log_level": "debug" }"#).unwrap();
        assert_eq!(options.max_call_depth, 64);
        assert_eq!(options.log_level, LogLevel::Debug);
        assert_eq!(options.entry_point, "main");
        assert_eq!(options.interpreter_config().max_call_depth, 64);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        assert!(matches!(
            PipelineOptions::from_json_str(r#"{ "max_depth": 1 }"#),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_file_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("astcc.json");
        std::fs::write(&path, r#"{ "entry_point": "start" }"#).unwrap();
        assert_eq!(PipelineOptions::from_json_file(&path).unwrap().entry_point, "start");
        assert!(matches!(
            PipelineOptions::from_json_file(&dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }
}
