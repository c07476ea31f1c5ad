//! Fakes shared by the unit tests.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};

use crate::application::input::TouchScreen;
use crate::domain::model::{ColorPoint, Landmark, Point, Rect};
use crate::infrastructure::capture::{Frame, FrameSource};
use crate::infrastructure::config::GestureConfig;
use crate::infrastructure::device::event::{
    RawEvent, ABS_MT_POSITION_X, ABS_MT_POSITION_Y, ABS_MT_SLOT, ABS_MT_TRACKING_ID, BTN_TOUCH,
    EV_ABS, EV_KEY,
};
use crate::infrastructure::device::{
    AxisSpec, DeviceDescriptor, DeviceError, DeviceResult, DisplayExtent, EventSink, EventSource,
    EventStream, InputSynthesizer,
};

/// Fresh directory under the system temp dir
pub fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("wayfarer-{}-{}", name, ulid::Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn axis(max_value: i32) -> AxisSpec {
    AxisSpec {
        max_value,
        ..Default::default()
    }
}

/// Ten-slot touchscreen reporting `BTN_TOUCH`
pub fn sample_descriptor(max_x: i32, max_y: i32) -> DeviceDescriptor {
    let mut specs = HashMap::new();
    specs.insert(ABS_MT_SLOT, axis(9));
    specs.insert(ABS_MT_POSITION_X, axis(max_x));
    specs.insert(ABS_MT_POSITION_Y, axis(max_y));
    specs.insert(ABS_MT_TRACKING_ID, axis(65535));
    DeviceDescriptor {
        device_file: "/dev/input/event2".to_string(),
        name: "test-touch".to_string(),
        specs,
        keys: BTreeSet::from([BTN_TOUCH]),
    }
}

const TEST_DISPLAY: DisplayExtent = DisplayExtent {
    width: 1000,
    height: 1000,
};

/// Records every batch written to the device
#[derive(Clone, Default)]
pub struct RecordingSink {
    batches: Arc<Mutex<Vec<Vec<RawEvent>>>>,
    fail_at: Arc<Mutex<Option<usize>>>,
}

impl RecordingSink {
    /// Reject, once, the batch that would be recorded at `index`
    pub fn fail_at(&self, index: usize) {
        *self.fail_at.lock().unwrap() = Some(index);
    }

    pub fn batches(&self) -> Vec<Vec<RawEvent>> {
        self.batches.lock().unwrap().clone()
    }

    /// Values of `BTN_TOUCH` events in order
    pub fn presses(&self) -> Vec<i32> {
        self.batches()
            .iter()
            .flatten()
            .filter(|e| e.kind == EV_KEY && e.code == BTN_TOUCH)
            .map(|e| e.value)
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn send_batch(&mut self, events: &[RawEvent]) -> DeviceResult<()> {
        let mut batches = self.batches.lock().unwrap();
        let mut fail_at = self.fail_at.lock().unwrap();
        if *fail_at == Some(batches.len()) {
            *fail_at = None;
            return Err(DeviceError::Disconnected);
        }
        batches.push(events.to_vec());
        Ok(())
    }
}

/// Touch facade over a recording sink, display and axes both 1000x1000
pub fn touch_screen(descriptor: DeviceDescriptor) -> (TouchScreen, RecordingSink) {
    let sink = RecordingSink::default();
    let synth = InputSynthesizer::new(Arc::new(descriptor), TEST_DISPLAY, Box::new(sink.clone()));
    (TouchScreen::new(synth, GestureConfig::default()), sink)
}

/// Live stream that serves a fixed list once, then refuses to reopen
pub struct VecEventSource {
    events: Mutex<Option<Vec<io::Result<RawEvent>>>>,
    pending: bool,
    opens: AtomicUsize,
}

impl VecEventSource {
    pub fn once(events: Vec<io::Result<RawEvent>>) -> Self {
        Self {
            events: Mutex::new(Some(events)),
            pending: false,
            opens: AtomicUsize::new(0),
        }
    }

    /// Opens fine but never yields
    pub fn pending() -> Self {
        Self {
            events: Mutex::new(None),
            pending: true,
            opens: AtomicUsize::new(0),
        }
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSource for VecEventSource {
    async fn open(&self) -> DeviceResult<EventStream> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.pending {
            return Ok(stream::pending().boxed());
        }
        match self.events.lock().unwrap().take() {
            Some(events) => Ok(stream::iter(events).boxed()),
            None => Err(DeviceError::Disconnected),
        }
    }
}

/// Black frame with `rect` filled with `color`
pub fn frame_with_square(width: u32, height: u32, rect: Rect, color: [u8; 3]) -> Frame {
    let mut rgb = RgbImage::new(width, height);
    for y in rect.y.max(0)..rect.bottom().min(height as i32) {
        for x in rect.x.max(0)..rect.right().min(width as i32) {
            rgb.put_pixel(x as u32, y as u32, Rgb(color));
        }
    }
    Frame::from_image(DynamicImage::ImageRgb8(rgb))
}

/// Square grayscale template with a non-flat pattern
pub fn patterned_template(size: u32) -> GrayImage {
    GrayImage::from_fn(size, size, |x, y| Luma([((x * 37 + y * 91) % 251) as u8]))
}

/// Pixel landmark on the colour fake screens are painted with
pub fn color_landmark(color: [u8; 3]) -> Landmark {
    Landmark::Pixels {
        points: vec![ColorPoint {
            x: 5,
            y: 5,
            r: color[0],
            g: color[1],
            b: color[2],
        }],
        tolerance: 5.0,
    }
}

/// Always returns the same frame
pub struct StaticFrameSource {
    frame: Frame,
    captures: AtomicUsize,
}

impl StaticFrameSource {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            captures: AtomicUsize::new(0),
        }
    }

    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameSource for StaticFrameSource {
    async fn capture(&self) -> anyhow::Result<Frame> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(self.frame.clone())
    }
}

#[derive(Default)]
struct FakeScreenState {
    current: String,
    colors: HashMap<String, [u8; 3]>,
    buttons: Vec<(String, Rect, String)>,
    taps: Vec<Point>,
    x: i32,
    y: i32,
}

/// Simulated app: each screen is painted in one colour and buttons switch
/// screens when a finger goes down inside them. Acts as both the device
/// and the frame source.
#[derive(Clone, Default)]
pub struct FakeScreen {
    state: Arc<Mutex<FakeScreenState>>,
}

impl FakeScreen {
    pub fn new(start: &str) -> Self {
        let screen = Self::default();
        screen.state.lock().unwrap().current = start.to_string();
        screen
    }

    pub fn screen(self, id: &str, color: [u8; 3]) -> Self {
        self.state.lock().unwrap().colors.insert(id.to_string(), color);
        self
    }

    pub fn button(self, from: &str, rect: Rect, to: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .buttons
            .push((from.to_string(), rect, to.to_string()));
        self
    }

    pub fn show(&self, id: &str) {
        self.state.lock().unwrap().current = id.to_string();
    }

    pub fn current(&self) -> String {
        self.state.lock().unwrap().current.clone()
    }

    pub fn taps(&self) -> Vec<Point> {
        self.state.lock().unwrap().taps.clone()
    }

    /// Touch facade driving this screen
    pub fn touch(&self) -> TouchScreen {
        let synth = InputSynthesizer::new(
            Arc::new(sample_descriptor(TEST_DISPLAY.width as i32, TEST_DISPLAY.height as i32)),
            TEST_DISPLAY,
            Box::new(self.clone()),
        );
        TouchScreen::new(synth, GestureConfig::default())
    }
}

#[async_trait]
impl EventSink for FakeScreen {
    async fn send_batch(&mut self, events: &[RawEvent]) -> DeviceResult<()> {
        let mut state = self.state.lock().unwrap();
        for event in events {
            match (event.kind, event.code) {
                (EV_ABS, ABS_MT_POSITION_X) => state.x = event.value,
                (EV_ABS, ABS_MT_POSITION_Y) => state.y = event.value,
                (EV_KEY, BTN_TOUCH) if event.value == 1 => {
                    let point = Point::new(state.x as f64, state.y as f64);
                    state.taps.push(point);
                    let next = state
                        .buttons
                        .iter()
                        .find(|(from, rect, _)| {
                            *from == state.current && rect.contains_point(&point)
                        })
                        .map(|(_, _, to)| to.clone());
                    if let Some(next) = next {
                        state.current = next;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FrameSource for FakeScreen {
    async fn capture(&self) -> anyhow::Result<Frame> {
        let state = self.state.lock().unwrap();
        let color = state.colors.get(&state.current).copied().unwrap_or([0, 0, 0]);
        Ok(frame_with_square(100, 100, Rect::new(0, 0, 100, 100), color))
    }
}

/// Correspondences of a pure translation over a fixed point grid
pub fn translation_pairs(dx: f64, dy: f64) -> Vec<(Point, Point)> {
    [(100.0, 100.0), (700.0, 120.0), (400.0, 300.0), (150.0, 650.0), (720.0, 700.0), (330.0, 520.0)]
        .into_iter()
        .map(|(x, y)| (Point::new(x, y), Point::new(x + dx, y + dy)))
        .collect()
}

/// Feature matcher that replays scripted correspondence sets; the last set
/// repeats once the script runs out.
#[derive(Default)]
pub struct ScriptedMatcher {
    script: Mutex<VecDeque<Vec<(Point, Point)>>>,
    last: Mutex<Vec<(Point, Point)>>,
    calls: AtomicUsize,
}

impl ScriptedMatcher {
    pub fn new(script: Vec<Vec<(Point, Point)>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl crate::application::resolver::FeatureMatcher for ScriptedMatcher {
    fn correspondences(
        &self,
        _reference: &crate::application::resolver::ReferenceMap,
        _live: &GrayImage,
    ) -> Vec<(Point, Point)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            *last = next;
        }
        last.clone()
    }
}
