use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::duration_serde;
use crate::domain::model::Rect;

/// Inclusive RGB range selecting map feature pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl ColorRange {
    pub fn contains(&self, rgb: [u8; 3]) -> bool {
        (0..3).all(|i| rgb[i] >= self.lower[i] && rgb[i] <= self.upper[i])
    }
}

/// Map node resolver tuning values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Shortest swipe the device reliably turns into a scroll
    pub min_scroll: f64,

    /// Max squared difference between transformed and reference node size
    pub size_diff_threshold: f64,

    /// Max squared difference between transformed width and height
    pub aspect_diff_threshold: f64,

    /// Mask intensity a pixel needs to count as a node pixel
    pub brightness_threshold: u8,

    /// Pause before retrying after a failed attempt
    #[serde(with = "duration_serde")]
    pub retry_delay: Duration,

    /// Chance of zooming out before retrying a rejected estimate
    pub zoom_out_probability: f64,

    /// Visible part of the map on screen
    pub scroll_window: Rect,

    /// Side of the square click region returned for a node
    pub click_size: i32,

    #[serde(with = "duration_serde")]
    pub swipe_duration: Duration,

    pub ransac_iterations: u32,
    pub ransac_reprojection_threshold: f64,
    pub min_inliers: usize,

    /// Blobs smaller than this many pixels are noise
    pub min_blob_area: u32,

    /// Lowe ratio for descriptor matching
    pub match_ratio: f64,

    /// Colors of node and path pixels on the map
    pub mask_colors: Vec<ColorRange>,

    /// Give up after this many attempts; unbounded when absent
    pub max_attempts: Option<u32>,

    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_scroll: 75.0,
            size_diff_threshold: 400.0,
            aspect_diff_threshold: 100.0,
            brightness_threshold: 200,
            retry_delay: Duration::from_millis(500),
            zoom_out_probability: 0.5,
            scroll_window: Rect::new(0, 100, 1920, 880),
            click_size: 10,
            swipe_duration: Duration::from_millis(400),
            ransac_iterations: 500,
            ransac_reprojection_threshold: 5.0,
            min_inliers: 4,
            min_blob_area: 20,
            match_ratio: 0.8,
            mask_colors: vec![ColorRange {
                lower: [200, 200, 200],
                upper: [255, 255, 255],
            }],
            max_attempts: None,
            seed: None,
        }
    }
}
