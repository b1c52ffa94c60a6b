//! Replication session configuration

use serde::{Deserialize, Serialize};

/// Default upper bound for a single frame payload (64 MiB)
pub const DEFAULT_MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// Default number of records between progress log lines
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 1_000;

/// Configuration shared by dumpers and loaders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicateConfig {
    /// Largest frame payload accepted when reading a stream
    pub max_frame_len: u32,

    /// Records between progress log lines
    pub progress_interval: u64,

    /// Start loaders with unknown record types tolerated
    pub ignore_missing: bool,
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            ignore_missing: false,
        }
    }
}

impl ReplicateConfig {
    /// Configuration for loading into a store that may lack some types
    pub fn lenient() -> Self {
        Self {
            ignore_missing: true,
            ..Default::default()
        }
    }

    /// Set the maximum frame payload length
    pub fn with_max_frame_len(mut self, max_frame_len: u32) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Set the progress log interval
    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval;
        self
    }
}
