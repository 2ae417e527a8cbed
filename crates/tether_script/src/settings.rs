//! Runtime settings

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engine limits applied once, right after the runtime is created.
///
/// Every knob is optional; `None` keeps the engine default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Native stack budget for script calls. Deep recursion past this raises
    /// a script exception instead of overflowing the host stack.
    pub max_stack_bytes: Option<usize>,
    /// Total heap the engine may allocate before raising out-of-memory.
    pub max_heap_bytes: Option<usize>,
    /// Allocation volume that triggers a garbage collection pass.
    pub gc_threshold_bytes: Option<usize>,
}

impl RuntimeSettings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|err| BridgeError::Settings(err.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn with_max_stack_bytes(mut self, bytes: usize) -> Self {
        self.max_stack_bytes = Some(bytes);
        self
    }

    pub fn with_max_heap_bytes(mut self, bytes: usize) -> Self {
        self.max_heap_bytes = Some(bytes);
        self
    }

    pub fn with_gc_threshold_bytes(mut self, bytes: usize) -> Self {
        self.gc_threshold_bytes = Some(bytes);
        self
    }
}
