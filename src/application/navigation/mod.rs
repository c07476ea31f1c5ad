mod graph;
mod navigator;
mod presence;
mod repository;

pub use graph::{LocationGraph, PathStep};
pub use navigator::Navigator;
pub use presence::PresenceDetector;
pub use repository::LocationRepository;
