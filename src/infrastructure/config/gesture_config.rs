use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::duration_serde;

/// Timing and shape of composed touch gestures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Hold time between press and release of a tap
    #[serde(with = "duration_serde")]
    pub click_delay: Duration,

    /// Pause between the two taps of a double tap
    #[serde(with = "duration_serde")]
    pub double_tap_interval: Duration,

    /// Default duration of swipes and drags
    #[serde(with = "duration_serde")]
    pub swipe_duration: Duration,

    /// Interval between interpolation steps of smooth moves
    #[serde(with = "duration_serde")]
    pub move_step: Duration,

    /// Hold time of a long press
    #[serde(with = "duration_serde")]
    pub long_press: Duration,

    /// Pause between key events while typing
    #[serde(with = "duration_serde")]
    pub key_delay: Duration,

    /// Finger distance at the start and end of a zoom-out pinch
    pub pinch_span_start: f64,
    pub pinch_span_end: f64,

    #[serde(with = "duration_serde")]
    pub pinch_duration: Duration,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            click_delay: Duration::from_millis(80),
            double_tap_interval: Duration::from_millis(100),
            swipe_duration: Duration::from_millis(300),
            move_step: Duration::from_millis(10),
            long_press: Duration::from_millis(800),
            key_delay: Duration::from_millis(30),
            pinch_span_start: 400.0,
            pinch_span_end: 150.0,
            pinch_duration: Duration::from_millis(400),
        }
    }
}
