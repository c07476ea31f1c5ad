use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::duration_serde;

/// Presence detection and link traversal settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Pixels added around a landmark rectangle before template search
    pub landmark_margin: i32,

    /// How long to wait for the destination after clicking a link
    #[serde(with = "duration_serde")]
    pub arrival_timeout: Duration,

    #[serde(with = "duration_serde")]
    pub arrival_poll_interval: Duration,

    /// Clicks per step before giving up on the link
    pub max_link_attempts: u32,

    /// Re-identify and re-plan this many times after a failed step
    pub max_replans: u32,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            landmark_margin: 10,
            arrival_timeout: Duration::from_secs(5),
            arrival_poll_interval: Duration::from_millis(300),
            max_link_attempts: 3,
            max_replans: 2,
        }
    }
}
