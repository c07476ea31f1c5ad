use serde::{Deserialize, Serialize};

use super::geometry::Rect;

/// Location is a recognizable screen in the navigation graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    /// Unique identifier used by links and navigation requests
    pub id: String,

    /// How landmark results are combined
    #[serde(default)]
    pub mode: MatchingMode,

    /// Landmarks checked to decide whether this location is on screen
    #[serde(default)]
    pub landmarks: Vec<Landmark>,

    /// Outgoing links, in preference order
    #[serde(default)]
    pub links: Vec<Link>,

    /// Transitional screen that may advance on its own
    #[serde(default)]
    pub intermediate: bool,
}

impl Location {
    /// Find the first link leading to `dest`
    pub fn link_to(&self, dest: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.dest == dest)
    }
}

/// How the landmark results of a location are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingMode {
    /// Every landmark must match
    #[default]
    And,
    /// At least one landmark must match
    Or,
}

/// Landmark used for presence detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Landmark {
    /// Template image expected inside `rect`
    Template {
        template: String,
        rect: Rect,
        #[serde(default = "default_template_threshold")]
        threshold: f64,
    },
    /// Color checkpoints with an average-difference tolerance
    Pixels {
        points: Vec<ColorPoint>,
        #[serde(default = "default_color_tolerance")]
        tolerance: f64,
    },
}

/// ColorPoint represents a coordinate with an expected color.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorPoint {
    pub x: i32,
    pub y: i32,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Directed edge to another location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Destination location id
    pub dest: String,

    /// What to click to traverse the link
    #[serde(flatten)]
    pub target: LinkTarget,
}

/// Click target of a link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkTarget {
    /// Fixed screen rectangle
    Rect { rect: Rect },
    /// Template searched inside `rect`; the hit is clicked
    Template {
        template: String,
        rect: Rect,
        #[serde(default = "default_template_threshold")]
        threshold: f64,
    },
}

impl LinkTarget {
    pub fn rect(&self) -> Rect {
        match self {
            Self::Rect { rect } | Self::Template { rect, .. } => *rect,
        }
    }
}

fn default_template_threshold() -> f64 {
    0.8
}

fn default_color_tolerance() -> f64 {
    5.0
}
