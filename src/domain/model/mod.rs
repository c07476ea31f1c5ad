mod geometry;
mod location;
mod map_node;

pub use geometry::{Point, Rect};
pub use location::{ColorPoint, Landmark, Link, LinkTarget, Location, MatchingMode};
pub use map_node::{CoordinateKind, MapDefinition, MapNode, NodeType};
