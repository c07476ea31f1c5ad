//! Walks the location graph by clicking links and verifying arrival.

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use ulid::Ulid;

use crate::application::eventbus::SharedEventBus;
use crate::application::input::TouchScreen;
use crate::domain::error::DomainError;
use crate::domain::event::DomainEvent;
use crate::domain::model::Location;
use crate::domain::repository::Result;
use crate::infrastructure::capture::{Frame, FrameSource};
use crate::infrastructure::config::NavigationConfig;

use super::graph::{LocationGraph, PathStep};
use super::presence::PresenceDetector;
use super::repository::LocationRepository;

pub struct Navigator {
    repository: Arc<LocationRepository>,
    detector: PresenceDetector,
    frames: Arc<dyn FrameSource>,
    touch: TouchScreen,
    events: SharedEventBus,
    config: NavigationConfig,
    current: Option<String>,
}

impl Navigator {
    pub fn new(
        repository: Arc<LocationRepository>,
        detector: PresenceDetector,
        frames: Arc<dyn FrameSource>,
        touch: TouchScreen,
        events: SharedEventBus,
        config: NavigationConfig,
    ) -> Self {
        Self {
            repository,
            detector,
            frames,
            touch,
            events,
            config,
            current: None,
        }
    }

    /// Last known location, if any
    pub fn current_location(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Override the known location; `None` forces detection on the next move.
    pub fn set_current_location(&mut self, location: Option<String>) {
        self.current = location;
    }

    pub async fn identify_current_location(&mut self) -> Result<String> {
        let graph = self.repository.graph();
        let frame = Arc::new(self.capture().await?);
        let id = self.detector.identify(&graph, frame).await?;
        tracing::info!(location = %id, "Current location identified");
        self.events.publish(DomainEvent::LocationIdentified {
            location: id.clone(),
        });
        self.current = Some(id.clone());
        Ok(id)
    }

    /// Move to `dest`, re-planning from a freshly identified location when a
    /// step does not arrive.
    pub async fn navigate_to(&mut self, dest: &str, cancel: &CancellationToken) -> Result<()> {
        let span = tracing::info_span!("navigate", attempt = %Ulid::new(), dest = %dest);
        self.navigate(dest, cancel).instrument(span).await
    }

    async fn navigate(&mut self, dest: &str, cancel: &CancellationToken) -> Result<()> {
        let graph = self.repository.graph();
        if graph.get(dest).is_none() {
            return Err(DomainError::UnknownDestinationId(dest.to_string()));
        }

        let mut replans = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(DomainError::Cancelled);
            }

            let current = match self.current.clone() {
                Some(current) => current,
                None => self.identify_current_location().await?,
            };
            let path = graph.shortest_path(&current, dest)?;

            match self.walk(&graph, &path, cancel).await {
                Ok(()) => {
                    tracing::info!(hops = path.len(), "Arrived at {}", dest);
                    self.events.publish(DomainEvent::NavigationFinished {
                        destination: dest.to_string(),
                        hops: path.len(),
                    });
                    return Ok(());
                }
                Err(DomainError::ArrivalTimeout { location })
                    if replans < self.config.max_replans =>
                {
                    replans += 1;
                    tracing::warn!(replans, "{} did not appear, re-planning", location);
                    self.current = None;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn walk(
        &mut self,
        graph: &LocationGraph,
        path: &[PathStep],
        cancel: &CancellationToken,
    ) -> Result<()> {
        for step in path {
            if cancel.is_cancelled() {
                return Err(DomainError::Cancelled);
            }
            let dangling = || DomainError::DanglingLink {
                from: step.source.clone(),
                to: step.dest.clone(),
            };
            let source = graph.get(&step.source).ok_or_else(dangling)?;
            let dest = graph.get(&step.dest).ok_or_else(dangling)?;

            // Transitional screens may already have moved on by themselves
            let clicked = if source.intermediate && self.is_on_screen(dest).await? {
                tracing::debug!("{} already reached from intermediate {}", dest.id, source.id);
                false
            } else {
                self.traverse(step, dest, cancel).await?;
                true
            };

            self.current = Some(step.dest.clone());
            self.events.publish(DomainEvent::StepCompleted {
                from: step.source.clone(),
                to: step.dest.clone(),
                clicked,
            });
        }
        Ok(())
    }

    async fn traverse(
        &mut self,
        step: &PathStep,
        dest: &Location,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for attempt in 1..=self.config.max_link_attempts.max(1) {
            let frame = self.capture().await?;
            match self.detector.link_target(&step.link, &frame) {
                Some(rect) => {
                    tracing::debug!(attempt, "Clicking link {} -> {}", step.source, step.dest);
                    self.touch.tap_rect(rect).await?;
                }
                None => {
                    tracing::debug!(attempt, "Link {} -> {} not visible", step.source, step.dest)
                }
            }

            if self.wait_for(dest, cancel).await? {
                return Ok(());
            }
        }
        Err(DomainError::ArrivalTimeout {
            location: dest.id.clone(),
        })
    }

    async fn wait_for(&self, location: &Location, cancel: &CancellationToken) -> Result<bool> {
        let deadline = Instant::now() + self.config.arrival_timeout;
        loop {
            if self.is_on_screen(location).await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(DomainError::Cancelled),
                _ = tokio::time::sleep(self.config.arrival_poll_interval) => {}
            }
        }
    }

    async fn is_on_screen(&self, location: &Location) -> Result<bool> {
        let frame = self.capture().await?;
        Ok(self.detector.is_in_region(location, &frame))
    }

    async fn capture(&self) -> Result<Frame> {
        Ok(self.frames.capture().await?)
    }
}
