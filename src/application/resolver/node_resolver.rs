//! Locates map nodes on a scrolling map view.
//!
//! Each attempt estimates a homography from the reference map to the live
//! frame, validates the node rectangle it predicts, scrolls the node into
//! the visible window if needed, and finally picks a bright feature pixel
//! inside it as the click target.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use ulid::Ulid;

use crate::application::eventbus::SharedEventBus;
use crate::application::input::TouchScreen;
use crate::domain::error::DomainError;
use crate::domain::event::{CorrectionKind, DomainEvent};
use crate::domain::model::{MapDefinition, MapNode, Point, Rect};
use crate::domain::repository::Result;
use crate::infrastructure::capture::FrameSource;
use crate::infrastructure::config::ResolverConfig;

use super::features::{extract_mask, FeatureMatcher, ReferenceMap};
use super::homography::{ransac, Homography};

/// Transform estimated for the current view, with the node rectangles it
/// produced. Dropped whenever the view is scrolled or zoomed.
#[derive(Debug, Clone)]
pub struct HomographyEstimate {
    pub transform: Homography,
    rects: HashMap<String, Rect>,
}

impl HomographyEstimate {
    pub fn new(transform: Homography) -> Self {
        Self {
            transform,
            rects: HashMap::new(),
        }
    }

    pub fn rect_for(&mut self, node: &MapNode) -> Option<Rect> {
        if let Some(rect) = self.rects.get(&node.name) {
            return Some(*rect);
        }
        let rect = self.transform.transform_rect(node.rect())?;
        self.rects.insert(node.name.clone(), rect);
        Some(rect)
    }
}

#[derive(Default)]
struct Session {
    estimate: Option<HomographyEstimate>,
}

impl Session {
    fn invalidate(&mut self) {
        self.estimate = None;
    }
}

enum Step {
    Resolved(Rect),
    Corrected,
    Retry,
}

pub struct MapNodeResolver {
    reference: Arc<ReferenceMap>,
    matcher: Arc<dyn FeatureMatcher>,
    frames: Arc<dyn FrameSource>,
    touch: TouchScreen,
    events: SharedEventBus,
    config: ResolverConfig,
    rng: StdRng,
}

impl MapNodeResolver {
    pub fn new(
        reference: Arc<ReferenceMap>,
        matcher: Arc<dyn FeatureMatcher>,
        frames: Arc<dyn FrameSource>,
        touch: TouchScreen,
        events: SharedEventBus,
        config: ResolverConfig,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            reference,
            matcher,
            frames,
            touch,
            events,
            config,
            rng,
        }
    }

    /// Click region for `node`. Absolute nodes are returned as declared.
    ///
    /// Retries until the node is found, `cancel` fires, or the optional
    /// `max_attempts` runs out; the last two end in `NodeNotResolved`.
    pub async fn resolve(&mut self, node: &MapNode, cancel: &CancellationToken) -> Result<Rect> {
        let mut session = Session::default();
        self.resolve_in(&mut session, node, cancel).await
    }

    /// Resolve several nodes against one shared estimate.
    pub async fn resolve_all(
        &mut self,
        nodes: &[MapNode],
        cancel: &CancellationToken,
    ) -> Result<Vec<Rect>> {
        let mut session = Session::default();
        let mut rects = Vec::with_capacity(nodes.len());
        for node in nodes {
            rects.push(self.resolve_in(&mut session, node, cancel).await?);
        }
        Ok(rects)
    }

    async fn resolve_in(
        &mut self,
        session: &mut Session,
        node: &MapNode,
        cancel: &CancellationToken,
    ) -> Result<Rect> {
        if node.is_absolute() {
            return Ok(node.rect());
        }

        let span = tracing::info_span!("resolve", node = %node.name, session = %Ulid::new());
        async move {
            let mut attempts = 0u32;
            loop {
                let exhausted = self.config.max_attempts.is_some_and(|max| attempts >= max);
                if cancel.is_cancelled() || exhausted {
                    tracing::warn!(
                        attempts,
                        cancelled = cancel.is_cancelled(),
                        "Giving up on node"
                    );
                    return Err(DomainError::NodeNotResolved {
                        node: node.name.clone(),
                        attempts,
                    });
                }
                attempts += 1;

                match self.attempt(session, node).await {
                    Step::Resolved(rect) => {
                        let center = rect.center();
                        tracing::info!(attempts, x = center.x, y = center.y, "Node resolved");
                        self.events.publish(DomainEvent::NodeResolved {
                            node: node.name.clone(),
                            x: center.x.round() as i32,
                            y: center.y.round() as i32,
                            attempts,
                        });
                        return Ok(rect);
                    }
                    Step::Corrected | Step::Retry => {}
                }

                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.config.retry_delay) => {}
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn attempt(&mut self, session: &mut Session, node: &MapNode) -> Step {
        let frame = match self.frames.capture().await {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Capture failed: {}", e);
                return Step::Retry;
            }
        };
        let live = extract_mask(&frame.rgb, &self.config.mask_colors);

        if session.estimate.is_none() {
            let pairs = self.matcher.correspondences(&self.reference, &live);
            match ransac(
                &pairs,
                self.config.ransac_iterations,
                self.config.ransac_reprojection_threshold,
                self.config.min_inliers,
                &mut self.rng,
            ) {
                Ok((transform, inliers)) => {
                    tracing::debug!(
                        pairs = pairs.len(),
                        inliers = inliers.len(),
                        "Homography estimated"
                    );
                    session.estimate = Some(HomographyEstimate::new(transform));
                }
                Err(e) => {
                    tracing::debug!("{}", e);
                    return Step::Retry;
                }
            }
        }

        let predicted = session.estimate.as_mut().and_then(|e| e.rect_for(node));
        let rect = match self.validate(predicted, node.rect()) {
            Ok(rect) => rect,
            Err(reason) => {
                tracing::debug!(?predicted, "Estimate rejected: {}", reason);
                session.invalidate();
                let zoom = self.rng.gen_bool(self.config.zoom_out_probability.clamp(0.0, 1.0));
                if zoom && self.zoom_out(node).await {
                    return Step::Corrected;
                }
                return Step::Retry;
            }
        };

        if let Some((dx, dy)) = self.scroll_delta(rect) {
            session.invalidate();
            if self.scroll(node, dx, dy).await {
                return Step::Corrected;
            }
            return Step::Retry;
        }

        match self.localize(&live, rect) {
            Some(target) => {
                let size = self.config.click_size;
                Step::Resolved(Rect::centered(target, size, size))
            }
            None => {
                tracing::debug!(?rect, "No bright pixels in region");
                session.invalidate();
                Step::Retry
            }
        }
    }

    /// Reject rectangles that are empty, flipped, far from the reference
    /// size, or far from square.
    fn validate(
        &self,
        predicted: Option<Rect>,
        reference: Rect,
    ) -> std::result::Result<Rect, String> {
        let rect = predicted.ok_or_else(|| "node maps to infinity".to_string())?;
        if rect.width <= 0 || rect.height <= 0 {
            return Err(format!("non-positive size {}x{}", rect.width, rect.height));
        }

        let size = (rect.width + rect.height) as f64 / 2.0;
        let reference_size = (reference.width + reference.height) as f64 / 2.0;
        let size_diff = (size - reference_size).powi(2);
        if size_diff > self.config.size_diff_threshold {
            return Err(format!("size off by {:.1} (squared)", size_diff));
        }

        let aspect_diff = ((rect.width - rect.height) as f64).powi(2);
        if aspect_diff > self.config.aspect_diff_threshold {
            return Err(format!("aspect off by {:.1} (squared)", aspect_diff));
        }
        Ok(rect)
    }

    /// Content movement that brings `rect` inside the scroll window, at
    /// least `min_scroll` on every axis that needs one.
    fn scroll_delta(&self, rect: Rect) -> Option<(f64, f64)> {
        let window = self.config.scroll_window;
        let axis = |start: i32, end: i32, lo: i32, hi: i32| -> f64 {
            if start < lo {
                (lo - start) as f64
            } else if end > hi {
                -((end - hi) as f64)
            } else {
                0.0
            }
        };
        let dx = axis(rect.x, rect.right(), window.x, window.right());
        let dy = axis(rect.y, rect.bottom(), window.y, window.bottom());
        if dx == 0.0 && dy == 0.0 {
            return None;
        }

        let min_scroll = self.config.min_scroll;
        let bound = |d: f64| if d == 0.0 { 0.0 } else { d.signum() * d.abs().max(min_scroll) };
        Some((bound(dx), bound(dy)))
    }

    /// Swipe the view by `(dx, dy)`; false when the gesture failed.
    async fn scroll(&mut self, node: &MapNode, dx: f64, dy: f64) -> bool {
        let window = self.config.scroll_window;
        let (from_x, to_x) = self.swipe_span(window.x, window.right(), dx);
        let (from_y, to_y) = self.swipe_span(window.y, window.bottom(), dy);
        let (from, to) = (Point::new(from_x, from_y), Point::new(to_x, to_y));

        tracing::info!(dx, dy, "Scrolling node into view");
        if let Err(e) = self.touch.swipe(from, to, self.config.swipe_duration).await {
            tracing::warn!("Scroll gesture failed: {}", e);
            return false;
        }
        self.events.publish(DomainEvent::CorrectionApplied {
            node: node.name.clone(),
            kind: CorrectionKind::Scroll,
        });
        true
    }

    /// Random start and matching end of a `delta` long swipe inside `[lo, hi)`
    fn swipe_span(&mut self, lo: i32, hi: i32, delta: f64) -> (f64, f64) {
        let span = (hi - lo - 1).max(0);
        let delta = (delta.round() as i32).clamp(-span, span);
        let (min, max) = if delta >= 0 {
            (lo, hi - delta)
        } else {
            (lo - delta, hi)
        };
        let start = if min < max {
            self.rng.gen_range(min..max)
        } else {
            lo
        };
        (start as f64, (start + delta) as f64)
    }

    /// Pinch out around the scroll window; false when the device has a
    /// single contact slot or the gesture failed.
    async fn zoom_out(&mut self, node: &MapNode) -> bool {
        if self.touch.slot_count().await < 2 {
            tracing::debug!("Single-contact device, zoom out skipped");
            return false;
        }
        tracing::info!("Zooming out before re-estimating");
        if let Err(e) = self.touch.zoom_out(self.config.scroll_window.center()).await {
            tracing::warn!("Zoom out failed: {}", e);
            return false;
        }
        self.events.publish(DomainEvent::CorrectionApplied {
            node: node.name.clone(),
            kind: CorrectionKind::ZoomOut,
        });
        true
    }

    /// Random pixel of `rect` brighter than the threshold in the live mask
    fn localize(&mut self, live: &image::GrayImage, rect: Rect) -> Option<Point> {
        let roi = rect.clip(live.width(), live.height())?;
        let threshold = self.config.brightness_threshold;
        let candidates: Vec<(i32, i32)> = (roi.y..roi.bottom())
            .flat_map(|y| (roi.x..roi.right()).map(move |x| (x, y)))
            .filter(|&(x, y)| live.get_pixel(x as u32, y as u32)[0] > threshold)
            .collect();
        let &(x, y) = candidates.choose(&mut self.rng)?;
        Some(Point::new(x as f64, y as f64))
    }
}

/// Build the reference feature map of `map`, reading its image relative to `dir`.
pub fn load_reference(
    map: &MapDefinition,
    dir: &Path,
    config: &ResolverConfig,
) -> Result<ReferenceMap> {
    let name = map
        .reference_image
        .as_deref()
        .ok_or_else(|| DomainError::Config(format!("map {} has no reference image", map.name)))?;
    let path = dir.join(name);
    let image = image::open(&path)
        .map_err(|e| DomainError::Config(format!("reference image {:?}: {}", path, e)))?
        .to_rgb8();
    Ok(ReferenceMap::from_image(&image, &config.mask_colors, config.min_blob_area))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use image::GrayImage;

    use crate::application::eventbus::create_event_bus;
    use crate::domain::model::{CoordinateKind, NodeType};
    use crate::infrastructure::config::ColorRange;
    use crate::infrastructure::device::event::{
        ABS_MT_POSITION_Y, ABS_MT_SLOT, BTN_TOUCH, EV_ABS, EV_KEY,
    };
    use crate::infrastructure::device::DeviceDescriptor;
    use crate::testing::{
        frame_with_square, sample_descriptor, touch_screen, translation_pairs, RecordingSink,
        ScriptedMatcher, StaticFrameSource,
    };

    const WHITE: ColorRange = ColorRange {
        lower: [240, 240, 240],
        upper: [255, 255, 255],
    };

    fn config() -> ResolverConfig {
        ResolverConfig {
            scroll_window: Rect::new(0, 100, 1000, 800),
            mask_colors: vec![WHITE],
            zoom_out_probability: 0.0,
            retry_delay: Duration::from_millis(100),
            swipe_duration: Duration::from_millis(100),
            seed: Some(11),
            ..Default::default()
        }
    }

    fn node(name: &str, x: i32, y: i32, size: i32) -> MapNode {
        MapNode {
            name: name.to_string(),
            x,
            y,
            width: size,
            height: size,
            node_type: NodeType::Normal,
            coordinates: CoordinateKind::Relative,
        }
    }

    struct Fixture {
        resolver: MapNodeResolver,
        matcher: Arc<ScriptedMatcher>,
        sink: RecordingSink,
        events: SharedEventBus,
    }

    fn fixture(script: Vec<Vec<(Point, Point)>>, config: ResolverConfig) -> Fixture {
        fixture_on(sample_descriptor(1000, 1000), script, config)
    }

    fn fixture_on(
        descriptor: DeviceDescriptor,
        script: Vec<Vec<(Point, Point)>>,
        config: ResolverConfig,
    ) -> Fixture {
        let matcher = Arc::new(ScriptedMatcher::new(script));
        let frames = Arc::new(StaticFrameSource::new(frame_with_square(
            1000,
            1000,
            Rect::new(500, 400, 40, 40),
            [255, 255, 255],
        )));
        let (touch, sink) = touch_screen(descriptor);
        let events = create_event_bus();
        let resolver = MapNodeResolver::new(
            Arc::new(ReferenceMap::new(GrayImage::new(10, 10), 1)),
            matcher.clone(),
            frames,
            touch,
            events.clone(),
            config,
        );
        Fixture {
            resolver,
            matcher,
            sink,
            events,
        }
    }

    /// Vertical finger travel of every swipe
    fn swipe_lengths(sink: &RecordingSink) -> Vec<i32> {
        let mut y = 0;
        let mut start = 0;
        let mut lengths = Vec::new();
        for e in sink.batches().iter().flatten() {
            match (e.kind, e.code, e.value) {
                (EV_ABS, ABS_MT_POSITION_Y, v) => y = v,
                (EV_KEY, BTN_TOUCH, 1) => start = y,
                (EV_KEY, BTN_TOUCH, 0) => lengths.push(y - start),
                _ => {}
            }
        }
        lengths
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_inside_node() {
        let mut f = fixture(vec![translation_pairs(0.0, 0.0)], config());
        let mut rx = f.events.subscribe();
        let target = node("n", 500, 400, 40);

        let rect = f.resolver.resolve(&target, &CancellationToken::new()).await.unwrap();
        assert_eq!((rect.width, rect.height), (10, 10));
        assert!(target.rect().contains_point(&rect.center()));
        assert!(f.sink.batches().is_empty());
        assert!(matches!(
            rx.try_recv().unwrap(),
            DomainEvent::NodeResolved { attempts: 1, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flipped_estimate_is_retried() {
        let flipped: Vec<(Point, Point)> = translation_pairs(0.0, 0.0)
            .into_iter()
            .map(|(r, _)| (r, Point::new(1000.0 - r.x, r.y)))
            .collect();
        let mut f = fixture(vec![flipped, translation_pairs(0.0, 0.0)], config());
        let target = node("n", 500, 400, 40);

        let rect = f.resolver.resolve(&target, &CancellationToken::new()).await.unwrap();
        assert!(rect.is_valid());
        assert!(target.rect().contains_point(&rect.center()));
        assert_eq!(f.matcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_validation_rejects_bad_rects() {
        let f = fixture(vec![], config());
        let reference = Rect::new(0, 0, 40, 40);
        let v = |r: Rect| f.resolver.validate(Some(r), reference);
        assert!(v(Rect::new(5, 5, 0, 40)).is_err());
        assert!(v(Rect::new(5, 5, 40, -3)).is_err());
        // Size: mean side 70 vs 40
        assert!(v(Rect::new(5, 5, 70, 70)).is_err());
        // Aspect: 48 vs 32
        assert!(v(Rect::new(5, 5, 48, 32)).is_err());
        assert!(v(Rect::new(5, 5, 42, 38)).is_ok());
        assert!(f.resolver.validate(None, reference).is_err());
    }

    async fn scroll_for_offset(dy: f64) -> Vec<i32> {
        let script = vec![translation_pairs(0.0, dy), translation_pairs(0.0, 0.0)];
        let mut f = fixture(script, config());
        let mut rx = f.events.subscribe();
        f.resolver
            .resolve(&node("n", 500, 400, 40), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(
            rx.try_recv().unwrap(),
            DomainEvent::CorrectionApplied {
                kind: CorrectionKind::Scroll,
                ..
            }
        ));
        assert_eq!(f.matcher.calls(), 2);
        swipe_lengths(&f.sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_node_above_window_scrolls_down() {
        // Node lands at y=-100, 200px above the window top at y=100
        assert_eq!(scroll_for_offset(-500.0).await, vec![200]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_scrolls_are_raised_to_minimum() {
        // 30px above the window: the swipe is stretched to 75px
        assert_eq!(scroll_for_offset(-330.0).await, vec![75]);
        // Below the window bottom at y=900: scroll up
        assert_eq!(scroll_for_offset(480.0).await, vec![-75]);
    }

    /// Reference mapped at twice its size
    fn squashed() -> Vec<(Point, Point)> {
        translation_pairs(0.0, 0.0)
            .into_iter()
            .map(|(r, _)| (r, Point::new(r.x * 2.0, r.y * 2.0)))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_zoom_out_on_rejection() {
        let config = ResolverConfig {
            zoom_out_probability: 1.0,
            ..config()
        };
        let mut f = fixture(vec![squashed(), translation_pairs(0.0, 0.0)], config);
        let mut rx = f.events.subscribe();
        f.resolver
            .resolve(&node("n", 500, 400, 40), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(
            rx.try_recv().unwrap(),
            DomainEvent::CorrectionApplied {
                kind: CorrectionKind::ZoomOut,
                ..
            }
        ));
        assert_eq!(f.sink.presses(), vec![1, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_slot_device_skips_zoom_out() {
        let mut single = sample_descriptor(1000, 1000);
        single.specs.remove(&ABS_MT_SLOT);
        let config = ResolverConfig {
            zoom_out_probability: 1.0,
            ..config()
        };
        let mut f = fixture_on(single, vec![squashed(), translation_pairs(0.0, 0.0)], config);
        let mut rx = f.events.subscribe();

        let rect = f
            .resolver
            .resolve(&node("n", 500, 400, 40), &CancellationToken::new())
            .await
            .unwrap();
        assert!(rect.is_valid());
        assert!(matches!(
            rx.try_recv().unwrap(),
            DomainEvent::NodeResolved { attempts: 2, .. }
        ));
        assert!(f.sink.batches().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_scroll_is_retried() {
        let script = vec![translation_pairs(0.0, -500.0), translation_pairs(0.0, 0.0)];
        let mut f = fixture(script, config());
        let mut rx = f.events.subscribe();
        f.sink.fail_at(0);

        f.resolver
            .resolve(&node("n", 500, 400, 40), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(
            rx.try_recv().unwrap(),
            DomainEvent::NodeResolved { attempts: 2, .. }
        ));
        assert!(f.sink.presses().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dark_roi_is_retried() {
        // The first estimate puts the node 100px below the white square
        let script = vec![translation_pairs(0.0, 100.0), translation_pairs(0.0, 0.0)];
        let mut f = fixture(script, config());
        let mut rx = f.events.subscribe();
        let target = node("n", 500, 400, 40);

        let rect = f.resolver.resolve(&target, &CancellationToken::new()).await.unwrap();
        assert!(target.rect().contains_point(&rect.center()));
        assert_eq!(f.matcher.calls(), 2);
        assert!(f.sink.batches().is_empty());
        assert!(matches!(
            rx.try_recv().unwrap(),
            DomainEvent::NodeResolved { attempts: 2, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_on_cancel_or_attempt_limit() {
        let mut f = fixture(vec![vec![]], config());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            trigger.cancel();
        });
        match f.resolver.resolve(&node("n", 500, 400, 40), &cancel).await {
            Err(DomainError::NodeNotResolved { node, attempts }) => {
                assert_eq!(node, "n");
                assert!(attempts >= 10);
            }
            other => panic!("unexpected {:?}", other),
        }

        let limited = ResolverConfig {
            max_attempts: Some(3),
            ..config()
        };
        let mut f = fixture(vec![vec![]], limited);
        assert!(matches!(
            f.resolver.resolve(&node("n", 500, 400, 40), &CancellationToken::new()).await,
            Err(DomainError::NodeNotResolved { attempts: 3, .. })
        ));
        assert_eq!(f.matcher.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_absolute_nodes_and_shared_estimate() {
        let mut f = fixture(vec![translation_pairs(0.0, 0.0)], config());
        let mut fixed = node("fixed", 10, 20, 30);
        fixed.coordinates = CoordinateKind::Absolute;
        let nodes = vec![fixed, node("a", 500, 400, 20), node("b", 520, 420, 20)];

        let rects = f
            .resolver
            .resolve_all(&nodes, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(rects[0], Rect::new(10, 20, 30, 30));
        assert!(nodes[1].rect().contains_point(&rects[1].center()));
        assert!(nodes[2].rect().contains_point(&rects[2].center()));
        assert_eq!(f.matcher.calls(), 1);
    }
}
