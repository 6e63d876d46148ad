//! Confirmation pipeline configuration.

use serde::{Deserialize, Serialize};

use crate::confirmation_processor::ConfirmationHeightMode;

/// Settings for the confirmation-height processor.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    /// Which cementing strategy to use. Automatic picks unbounded while the
    /// uncemented backlog is small and bounded once it isn't.
    #[serde(default)]
    pub mode: ConfirmationHeightMode,

    /// How many blocks to accumulate before committing and re-acquiring the
    /// write transaction. Bounds peak memory and lock hold time.
    #[serde(default = "default_batch_write_size")]
    pub batch_write_size: usize,
}

fn default_batch_write_size() -> usize {
    4096
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            mode: ConfirmationHeightMode::default(),
            batch_write_size: default_batch_write_size(),
        }
    }
}
