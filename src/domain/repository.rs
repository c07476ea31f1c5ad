use crate::domain::error::DomainError;
use crate::domain::model::{Location, MapDefinition};

pub type Result<T> = std::result::Result<T, DomainError>;

/// Declarative source of location definitions
pub trait LocationSource: Send + Sync {
    fn load(&self) -> Result<Vec<Location>>;
}

/// Declarative source of map definitions
pub trait MapSource: Send + Sync {
    fn load_map(&self, name: &str) -> Result<MapDefinition>;
}

/// In-memory location list, mostly for embedding and tests
pub struct StaticLocationSource {
    locations: Vec<Location>,
}

impl StaticLocationSource {
    pub fn new(locations: Vec<Location>) -> Self {
        Self { locations }
    }
}

impl LocationSource for StaticLocationSource {
    fn load(&self) -> Result<Vec<Location>> {
        Ok(self.locations.clone())
    }
}

// Implement LocationSource for Box<dyn LocationSource> to allow dynamic dispatch
impl LocationSource for Box<dyn LocationSource> {
    fn load(&self) -> Result<Vec<Location>> {
        (**self).load()
    }
}
