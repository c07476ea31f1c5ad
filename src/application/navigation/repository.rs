use std::sync::{Arc, RwLock};

use crate::domain::repository::{LocationSource, Result};

use super::graph::LocationGraph;

/// Cached location graph with an explicit reload.
///
/// Readers get an `Arc` snapshot; `refresh` swaps in a new graph without
/// disturbing routes already planned on the old one.
pub struct LocationRepository {
    source: Box<dyn LocationSource>,
    graph: RwLock<Arc<LocationGraph>>,
}

impl LocationRepository {
    pub fn load(source: Box<dyn LocationSource>) -> Result<Self> {
        let graph = Arc::new(Self::build(source.as_ref())?);
        Ok(Self {
            source,
            graph: RwLock::new(graph),
        })
    }

    pub fn graph(&self) -> Arc<LocationGraph> {
        self.graph
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Reload from the source. On failure the previous graph stays in place.
    pub fn refresh(&self) -> Result<Arc<LocationGraph>> {
        let graph = Arc::new(Self::build(self.source.as_ref())?);
        *self
            .graph
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = graph.clone();
        tracing::info!(locations = graph.len(), "Location graph refreshed");
        Ok(graph)
    }

    fn build(source: &dyn LocationSource) -> Result<LocationGraph> {
        let graph = LocationGraph::new(source.load()?);
        for (from, to) in graph.dangling_links() {
            tracing::warn!(from = %from, to = %to, "Link to unknown location");
        }
        Ok(graph)
    }
}
