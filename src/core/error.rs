use thiserror::Error;

use crate::core::registry::RegistryError;
use crate::core::selection::SelectionError;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("cycle detected: template '{name}' is already on the path {path:?}")]
    CycleDetected { name: String, path: Vec<String> },
    #[error("template '{template}' has {len} mandatory slots, slot {slot} is out of range")]
    SlotOutOfRange {
        template: String,
        slot: usize,
        len: usize,
    },
    #[error("selection error: {0}")]
    Selection(#[from] SelectionError),
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("pre-generation hook failed: {0}")]
    Hook(String),
}
