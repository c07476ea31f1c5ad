//! Location graph and breadth-first routing.

use std::collections::{HashMap, VecDeque};

use crate::domain::error::DomainError;
use crate::domain::model::{Link, Location};
use crate::domain::repository::Result;

/// One hop of a route
#[derive(Debug, Clone, PartialEq)]
pub struct PathStep {
    pub source: String,
    pub dest: String,
    pub link: Link,
}

/// Immutable snapshot of all known locations.
#[derive(Debug, Default)]
pub struct LocationGraph {
    locations: Vec<Location>,
    index: HashMap<String, usize>,
}

impl LocationGraph {
    pub fn new(locations: Vec<Location>) -> Self {
        let mut graph = Self::default();
        for location in locations {
            if graph.index.contains_key(&location.id) {
                tracing::warn!(location = %location.id, "Duplicate location ignored");
                continue;
            }
            graph.index.insert(location.id.clone(), graph.locations.len());
            graph.locations.push(location);
        }
        graph
    }

    pub fn get(&self, id: &str) -> Option<&Location> {
        self.index.get(id).map(|&i| &self.locations[i])
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// `(from, to)` of every link whose destination is unknown
    pub fn dangling_links(&self) -> Vec<(String, String)> {
        self.locations
            .iter()
            .flat_map(|l| l.links.iter().map(move |link| (l, link)))
            .filter(|(_, link)| !self.index.contains_key(&link.dest))
            .map(|(l, link)| (l.id.clone(), link.dest.clone()))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        match self.dangling_links().into_iter().next() {
            Some((from, to)) => Err(DomainError::DanglingLink { from, to }),
            None => Ok(()),
        }
    }

    /// Fewest-hop route from `from` to `to`. Links are explored in declared
    /// order, so among equally short routes the one using earlier links wins.
    /// `from == to` yields an empty route.
    pub fn shortest_path(&self, from: &str, to: &str) -> Result<Vec<PathStep>> {
        let start = *self
            .index
            .get(from)
            .ok_or_else(|| DomainError::UnknownDestinationId(from.to_string()))?;
        let goal = *self
            .index
            .get(to)
            .ok_or_else(|| DomainError::UnknownDestinationId(to.to_string()))?;
        if start == goal {
            return Ok(Vec::new());
        }

        // node -> (previous node, link index on previous node)
        let mut prev: HashMap<usize, (usize, usize)> = HashMap::new();
        let mut queue = VecDeque::from([start]);

        'search: while let Some(node) = queue.pop_front() {
            let location = &self.locations[node];
            for (link_index, link) in location.links.iter().enumerate() {
                let next = *self.index.get(&link.dest).ok_or_else(|| DomainError::DanglingLink {
                    from: location.id.clone(),
                    to: link.dest.clone(),
                })?;
                if next == start || prev.contains_key(&next) {
                    continue;
                }
                prev.insert(next, (node, link_index));
                if next == goal {
                    break 'search;
                }
                queue.push_back(next);
            }
        }

        if !prev.contains_key(&goal) {
            return Err(DomainError::UnreachableDestination {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let mut steps = Vec::new();
        let mut node = goal;
        while node != start {
            let (source, link_index) = prev[&node];
            let source_location = &self.locations[source];
            steps.push(PathStep {
                source: source_location.id.clone(),
                dest: self.locations[node].id.clone(),
                link: source_location.links[link_index].clone(),
            });
            node = source;
        }
        steps.reverse();

        tracing::debug!(from, to, hops = steps.len(), "Planned route");
        Ok(steps)
    }
}
