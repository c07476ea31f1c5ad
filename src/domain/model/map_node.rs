use serde::{Deserialize, Serialize};

use super::geometry::Rect;

/// MapNode is an abstract target on a scrolling map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapNode {
    /// Identifier used in logs and cache keys
    pub name: String,

    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,

    #[serde(rename = "type", default)]
    pub node_type: NodeType,

    #[serde(default)]
    pub coordinates: CoordinateKind,
}

impl MapNode {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    pub fn is_absolute(&self) -> bool {
        self.coordinates == CoordinateKind::Absolute
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    #[default]
    Normal,
    CommandPost,
    Heliport,
    HeavyHeliport,
}

/// How a node's rectangle is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateKind {
    /// Position on the reference map; needs a homography
    #[default]
    Relative,
    /// Fixed on-screen rectangle
    Absolute,
}

/// Map definition: reference image plus its nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapDefinition {
    pub name: String,

    /// Reference map image, relative to the map file
    #[serde(default)]
    pub reference_image: Option<String>,

    pub nodes: Vec<MapNode>,
}

impl MapDefinition {
    pub fn node(&self, name: &str) -> Option<&MapNode> {
        self.nodes.iter().find(|n| n.name == name)
    }
}
