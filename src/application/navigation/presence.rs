//! Landmark-based detection of the location currently on screen.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::domain::error::DomainError;
use crate::domain::model::{ColorPoint, Landmark, Link, LinkTarget, Location, MatchingMode, Rect};
use crate::domain::repository::Result;
use crate::infrastructure::capture::{Frame, TemplateMatcher, TemplateStore};

use super::graph::LocationGraph;

/// Evaluates landmarks and link targets against captured frames.
#[derive(Clone)]
pub struct PresenceDetector {
    templates: Arc<TemplateStore>,
    matcher: Arc<dyn TemplateMatcher>,
    /// Slack around declared rectangles when searching for templates
    margin: i32,
}

impl PresenceDetector {
    pub fn new(
        templates: Arc<TemplateStore>,
        matcher: Arc<dyn TemplateMatcher>,
        margin: i32,
    ) -> Self {
        Self {
            templates,
            matcher,
            margin,
        }
    }

    /// Whether `location` is on screen. A location without landmarks never is.
    pub fn is_in_region(&self, location: &Location, frame: &Frame) -> bool {
        if location.landmarks.is_empty() {
            return false;
        }
        match location.mode {
            MatchingMode::And => location
                .landmarks
                .iter()
                .all(|l| self.landmark_matches(l, frame)),
            MatchingMode::Or => location
                .landmarks
                .iter()
                .any(|l| self.landmark_matches(l, frame)),
        }
    }

    pub fn landmark_matches(&self, landmark: &Landmark, frame: &Frame) -> bool {
        match landmark {
            Landmark::Template {
                template,
                rect,
                threshold,
            } => self.find_template(template, *rect, *threshold, frame).is_some(),
            Landmark::Pixels { points, tolerance } => pixels_match(points, *tolerance, frame),
        }
    }

    /// Screen rectangle to click for `link`, if its target is visible.
    pub fn link_target(&self, link: &Link, frame: &Frame) -> Option<Rect> {
        match &link.target {
            LinkTarget::Rect { rect } => Some(*rect),
            LinkTarget::Template {
                template,
                rect,
                threshold,
            } => self.find_template(template, *rect, *threshold, frame),
        }
    }

    fn find_template(&self, name: &str, rect: Rect, threshold: f64, frame: &Frame) -> Option<Rect> {
        let template = match self.templates.get(name) {
            Ok(template) => template,
            Err(e) => {
                tracing::warn!("Template unavailable: {}", e);
                return None;
            }
        };
        let region = rect.grow(self.margin).clip(frame.width(), frame.height())?;
        self.matcher
            .find(frame, &template, region, threshold)
            .map(|hit| hit.rect)
    }

    /// Check every location against `frame` concurrently; the first match
    /// wins and the remaining checks are aborted.
    pub async fn identify(&self, graph: &LocationGraph, frame: Arc<Frame>) -> Result<String> {
        let mut checks = JoinSet::new();
        for location in graph.locations() {
            if location.landmarks.is_empty() {
                continue;
            }
            let detector = self.clone();
            let location = location.clone();
            let frame = frame.clone();
            checks.spawn_blocking(move || {
                detector
                    .is_in_region(&location, &frame)
                    .then_some(location.id)
            });
        }

        while let Some(joined) = checks.join_next().await {
            match joined {
                Ok(Some(id)) => {
                    checks.abort_all();
                    tracing::debug!(location = %id, "Location identified");
                    return Ok(id);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Presence check failed: {}", e),
            }
        }
        Err(DomainError::UnidentifiableLocation)
    }
}

/// Average colour distance over the in-frame points must stay within
/// `tolerance`; points outside the frame are skipped.
fn pixels_match(points: &[ColorPoint], tolerance: f64, frame: &Frame) -> bool {
    let mut total_diff = 0.0;
    let mut valid_points = 0;

    for point in points {
        if point.x < 0 || point.y < 0 {
            continue;
        }
        let (x, y) = (point.x as u32, point.y as u32);
        if x >= frame.width() || y >= frame.height() {
            continue;
        }
        let pixel = frame.rgb.get_pixel(x, y);
        total_diff += color_diff(pixel.0, [point.r, point.g, point.b]);
        valid_points += 1;
    }

    if valid_points == 0 {
        return false;
    }
    total_diff / valid_points as f64 <= tolerance
}

/// Calculate average color difference between two colors
fn color_diff(a: [u8; 3], b: [u8; 3]) -> f64 {
    let sum: i32 = (0..3).map(|i| (a[i] as i32 - b[i] as i32).abs()).sum();
    sum as f64 / 3.0
}
