use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Current location could not be identified")]
    UnidentifiableLocation,

    #[error("No path from {from} to {to}")]
    UnreachableDestination { from: String, to: String },

    #[error("Unknown destination: {0}")]
    UnknownDestinationId(String),

    #[error("Link from {from} points to unknown location {to}")]
    DanglingLink { from: String, to: String },

    #[error("Destination {location} did not appear after clicking its link")]
    ArrivalTimeout { location: String },

    #[error("Map node {node} not resolved after {attempts} attempts")]
    NodeNotResolved { node: String, attempts: u32 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Degenerate estimate: {0}")]
    DegenerateEstimate(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<anyhow::Error> for DomainError {
    fn from(err: anyhow::Error) -> Self {
        DomainError::Capture(err.to_string())
    }
}
