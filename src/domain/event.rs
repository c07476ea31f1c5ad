use serde::{Deserialize, Serialize};

/// Domain events published while navigating and resolving map nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    /// Presence detection found the current location
    LocationIdentified { location: String },

    /// A path step finished; `clicked` is false when the link was skipped
    StepCompleted {
        from: String,
        to: String,
        clicked: bool,
    },

    /// Navigation reached its destination
    NavigationFinished { destination: String, hops: usize },

    /// Resolver scrolled or zoomed the map and dropped its estimates
    CorrectionApplied { node: String, kind: CorrectionKind },

    /// Resolver produced a click target for a node
    NodeResolved {
        node: String,
        x: i32,
        y: i32,
        attempts: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionKind {
    Scroll,
    ZoomOut,
}

impl DomainEvent {
    /// Get the event type name for subscribers that route by name
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::LocationIdentified { .. } => "location_identified",
            Self::StepCompleted { .. } => "step_completed",
            Self::NavigationFinished { .. } => "navigation_finished",
            Self::CorrectionApplied { .. } => "correction_applied",
            Self::NodeResolved { .. } => "node_resolved",
        }
    }
}
