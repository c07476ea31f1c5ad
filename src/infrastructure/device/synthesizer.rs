//! Virtual touchscreen/keyboard state and raw protocol synthesis.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::domain::model::Point;

use super::channel::EventSink;
use super::descriptor::{AxisSpec, DeviceDescriptor};
use super::error::{DeviceError, DeviceResult};
use super::event::{
    RawEvent, ABS_MT_POSITION_X, ABS_MT_POSITION_Y, ABS_MT_PRESSURE, ABS_MT_SLOT,
    ABS_MT_TRACKING_ID, BTN_TOUCH, REL_HWHEEL, REL_WHEEL,
};

/// Logical size of the screen the caller thinks in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayExtent {
    pub width: u32,
    pub height: u32,
}

impl Default for DisplayExtent {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// `raw = round(logical / extent * axis_max)`
pub fn to_raw(logical: f64, extent: u32, axis: &AxisSpec) -> i32 {
    (logical / extent as f64 * axis.max_value as f64).round() as i32
}

/// `logical = round(raw / axis_max * extent)`
pub fn to_logical(raw: i32, extent: u32, axis: &AxisSpec) -> f64 {
    if axis.max_value == 0 {
        return 0.0;
    }
    (raw as f64 / axis.max_value as f64 * extent as f64).round()
}

/// Ease-out cubic: fast start, slow arrival.
pub fn ease_out(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

/// Position axis reported by the live listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionAxis {
    X,
    Y,
}

/// Position change observed on the device's live stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveUpdate {
    pub slot: usize,
    pub axis: PositionAxis,
    pub raw: i32,
    pub logical: f64,
}

/// State of one contact slot
#[derive(Debug, Default)]
pub struct CursorState {
    pub x: f64,
    pub y: f64,
    raw_x: Option<i32>,
    raw_y: Option<i32>,
    pressed: AtomicBool,
    tracking_id: Option<i32>,
}

impl CursorState {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed.load(Ordering::Acquire)
    }

    pub fn tracking_id(&self) -> Option<i32> {
        self.tracking_id
    }
}

/// Turns logical touch and key operations into raw evdev frames.
pub struct InputSynthesizer {
    descriptor: Arc<DeviceDescriptor>,
    display: DisplayExtent,
    sink: Box<dyn EventSink>,
    slots: Vec<CursorState>,
    active_slot: Option<usize>,
    next_tracking_id: i32,
    move_step: Duration,
    live_rx: Option<mpsc::UnboundedReceiver<LiveUpdate>>,
}

impl InputSynthesizer {
    pub fn new(
        descriptor: Arc<DeviceDescriptor>,
        display: DisplayExtent,
        sink: Box<dyn EventSink>,
    ) -> Self {
        let slots = (0..descriptor.max_slots()).map(|_| CursorState::default()).collect();
        Self {
            descriptor,
            display,
            sink,
            slots,
            active_slot: None,
            next_tracking_id: 0,
            move_step: Duration::from_millis(10),
            live_rx: None,
        }
    }

    /// Attach the receiving end of a live listener.
    pub fn with_live_updates(mut self, rx: mpsc::UnboundedReceiver<LiveUpdate>) -> Self {
        self.live_rx = Some(rx);
        self
    }

    pub fn with_move_step(mut self, step: Duration) -> Self {
        if !step.is_zero() {
            self.move_step = step;
        }
        self
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn display(&self) -> DisplayExtent {
        self.display
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Best current estimate of the primary contact position.
    pub fn position(&mut self) -> Point {
        self.drain_live();
        self.slots[0].position()
    }

    pub fn slot(&mut self, slot: usize) -> DeviceResult<&CursorState> {
        self.drain_live();
        self.slots
            .get(slot)
            .ok_or(DeviceError::InvalidSlot(slot as i32))
    }

    pub async fn press_down(&mut self) -> DeviceResult<()> {
        self.press_down_slot(0).await
    }

    pub async fn press_up(&mut self) -> DeviceResult<()> {
        self.press_up_slot(0).await
    }

    pub async fn move_to(&mut self, point: Point) -> DeviceResult<()> {
        self.move_slot_to(0, point).await
    }

    pub async fn smooth_move(&mut self, dest: Point, duration: Duration) -> DeviceResult<()> {
        self.smooth_move_slot(0, dest, duration).await
    }

    /// Put a finger down in `slot` at its current position. A second press on
    /// an already pressed slot emits nothing.
    pub async fn press_down_slot(&mut self, slot: usize) -> DeviceResult<()> {
        self.drain_live();
        let state = self
            .slots
            .get(slot)
            .ok_or(DeviceError::InvalidSlot(slot as i32))?;
        if state
            .pressed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::trace!(slot, "press_down ignored, slot already pressed");
            return Ok(());
        }

        let first_contact = !self.any_pressed_except(slot);
        let tracking_id = self.allocate_tracking_id();
        let (raw_x, raw_y) = self.raw_position(self.slots[slot].position());

        let mut events = Vec::with_capacity(8);
        self.push_slot_select(slot, &mut events);
        events.push(RawEvent::abs(ABS_MT_TRACKING_ID, tracking_id));
        if first_contact && self.descriptor.supports_key(BTN_TOUCH) {
            events.push(RawEvent::key(BTN_TOUCH, 1));
        }
        events.push(RawEvent::abs(ABS_MT_POSITION_X, raw_x));
        events.push(RawEvent::abs(ABS_MT_POSITION_Y, raw_y));
        if let Some(pressure) = self.descriptor.axis(ABS_MT_PRESSURE) {
            events.push(RawEvent::abs(
                ABS_MT_PRESSURE,
                (pressure.min_value + pressure.max_value) / 2,
            ));
        }
        events.push(RawEvent::syn());

        if let Err(e) = self.sink.send_batch(&events).await {
            self.slots[slot].pressed.store(false, Ordering::Release);
            return Err(e);
        }

        let state = &mut self.slots[slot];
        state.tracking_id = Some(tracking_id);
        state.raw_x = Some(raw_x);
        state.raw_y = Some(raw_y);
        self.active_slot = Some(slot);
        Ok(())
    }

    /// Lift the finger in `slot`. Lifting a slot that is not pressed emits nothing.
    pub async fn press_up_slot(&mut self, slot: usize) -> DeviceResult<()> {
        self.drain_live();
        let state = self
            .slots
            .get(slot)
            .ok_or(DeviceError::InvalidSlot(slot as i32))?;
        if state
            .pressed
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::trace!(slot, "press_up ignored, slot not pressed");
            return Ok(());
        }

        let last_contact = !self.any_pressed_except(slot);
        let mut events = Vec::with_capacity(4);
        self.push_slot_select(slot, &mut events);
        events.push(RawEvent::abs(ABS_MT_TRACKING_ID, -1));
        if last_contact && self.descriptor.supports_key(BTN_TOUCH) {
            events.push(RawEvent::key(BTN_TOUCH, 0));
        }
        events.push(RawEvent::syn());

        if let Err(e) = self.sink.send_batch(&events).await {
            self.slots[slot].pressed.store(true, Ordering::Release);
            return Err(e);
        }
        self.slots[slot].tracking_id = None;
        self.active_slot = Some(slot);
        Ok(())
    }

    /// Move `slot` to `point`, emitting only the axes whose raw value changed.
    pub async fn move_slot_to(&mut self, slot: usize, point: Point) -> DeviceResult<()> {
        self.drain_live();
        if slot >= self.slots.len() {
            return Err(DeviceError::InvalidSlot(slot as i32));
        }

        let (raw_x, raw_y) = self.raw_position(point);
        let mut axes = Vec::with_capacity(2);
        if self.slots[slot].raw_x != Some(raw_x) {
            axes.push(RawEvent::abs(ABS_MT_POSITION_X, raw_x));
        }
        if self.slots[slot].raw_y != Some(raw_y) {
            axes.push(RawEvent::abs(ABS_MT_POSITION_Y, raw_y));
        }

        if !axes.is_empty() {
            let mut events = Vec::with_capacity(axes.len() + 2);
            self.push_slot_select(slot, &mut events);
            events.extend(axes);
            events.push(RawEvent::syn());
            self.sink.send_batch(&events).await?;
            self.active_slot = Some(slot);
        }

        let state = &mut self.slots[slot];
        state.raw_x = Some(raw_x);
        state.raw_y = Some(raw_y);
        state.x = point.x;
        state.y = point.y;
        Ok(())
    }

    /// Interpolate from the current position to `dest` along an ease-out
    /// curve, one step every `move_step`.
    pub async fn smooth_move_slot(
        &mut self,
        slot: usize,
        dest: Point,
        duration: Duration,
    ) -> DeviceResult<()> {
        if duration < Duration::from_millis(1) {
            return self.move_slot_to(slot, dest).await;
        }

        let start = self.slot(slot)?.position();
        let steps = (duration.as_millis() / self.move_step.as_millis().max(1)).max(1) as u32;
        for i in 1..=steps {
            let t = ease_out(i as f64 / steps as f64);
            let point = Point::new(
                start.x + (dest.x - start.x) * t,
                start.y + (dest.y - start.y) * t,
            );
            self.move_slot_to(slot, point).await?;
            if i < steps {
                tokio::time::sleep(self.move_step).await;
            }
        }
        Ok(())
    }

    pub async fn key_down(&mut self, code: u16) -> DeviceResult<()> {
        self.sink
            .send_batch(&[RawEvent::key(code, 1), RawEvent::syn()])
            .await
    }

    pub async fn key_up(&mut self, code: u16) -> DeviceResult<()> {
        self.sink
            .send_batch(&[RawEvent::key(code, 0), RawEvent::syn()])
            .await
    }

    /// Scroll wheel ticks; positive `dy` scrolls up, positive `dx` right.
    pub async fn spin_wheel(&mut self, dx: i32, dy: i32) -> DeviceResult<()> {
        let mut events = Vec::with_capacity(3);
        if dx != 0 {
            events.push(RawEvent::rel(REL_HWHEEL, dx));
        }
        if dy != 0 {
            events.push(RawEvent::rel(REL_WHEEL, dy));
        }
        if events.is_empty() {
            return Ok(());
        }
        events.push(RawEvent::syn());
        self.sink.send_batch(&events).await
    }

    fn raw_position(&self, point: Point) -> (i32, i32) {
        let x = self
            .descriptor
            .axis(ABS_MT_POSITION_X)
            .map(|axis| to_raw(point.x, self.display.width, axis))
            .unwrap_or(point.x.round() as i32);
        let y = self
            .descriptor
            .axis(ABS_MT_POSITION_Y)
            .map(|axis| to_raw(point.y, self.display.height, axis))
            .unwrap_or(point.y.round() as i32);
        (x, y)
    }

    fn push_slot_select(&self, slot: usize, events: &mut Vec<RawEvent>) {
        if self.descriptor.has_slots() && self.active_slot != Some(slot) {
            events.push(RawEvent::abs(ABS_MT_SLOT, slot as i32));
        }
    }

    fn any_pressed_except(&self, slot: usize) -> bool {
        self.slots
            .iter()
            .enumerate()
            .any(|(i, s)| i != slot && s.is_pressed())
    }

    fn allocate_tracking_id(&mut self) -> i32 {
        let max = self
            .descriptor
            .axis(ABS_MT_TRACKING_ID)
            .map(|a| a.max_value)
            .filter(|m| *m > 0)
            .unwrap_or(i32::MAX);
        let id = self.next_tracking_id;
        self.next_tracking_id = if id >= max { 0 } else { id + 1 };
        id
    }

    /// Apply position updates queued by the live listener.
    fn drain_live(&mut self) {
        let Some(rx) = self.live_rx.as_mut() else {
            return;
        };
        loop {
            match rx.try_recv() {
                Ok(update) => {
                    let Some(state) = self.slots.get_mut(update.slot) else {
                        continue;
                    };
                    match update.axis {
                        PositionAxis::X => {
                            state.raw_x = Some(update.raw);
                            state.x = update.logical;
                        }
                        PositionAxis::Y => {
                            state.raw_y = Some(update.raw);
                            state.y = update.logical;
                        }
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::debug!("Live listener gone, keeping synthesized cursor only");
                    self.live_rx = None;
                    break;
                }
            }
        }
    }
}
