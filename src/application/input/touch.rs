//! Serialized touch and keyboard gestures on top of the synthesizer.
//!
//! Every gesture runs while holding one per-device lock, so raw frames of two
//! gestures never interleave. `TouchScreen::lock` and
//! `TouchScreen::atomic_action` extend that guarantee to multi-step sequences.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::model::{Point, Rect};
use crate::infrastructure::config::GestureConfig;
use crate::infrastructure::device::{ease_out, DeviceError, DeviceResult, InputSynthesizer};
use crate::infrastructure::input::KeyCode;

struct TouchState {
    synth: InputSynthesizer,
    /// One-shot extra hold time for the next tap
    click_delay: Duration,
}

/// Gesture facade of one virtual screen
#[derive(Clone)]
pub struct TouchScreen {
    state: Arc<Mutex<TouchState>>,
    config: Arc<GestureConfig>,
}

impl TouchScreen {
    pub fn new(synth: InputSynthesizer, config: GestureConfig) -> Self {
        let synth = synth.with_move_step(config.move_step);
        Self {
            state: Arc::new(Mutex::new(TouchState {
                synth,
                click_delay: Duration::ZERO,
            })),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    /// Contacts the device can hold down at once
    pub async fn slot_count(&self) -> usize {
        self.state.lock().await.synth.slot_count()
    }

    /// Take the device lock. Gestures issued through the returned scope
    /// run back to back; the lock is released when the scope is dropped.
    pub async fn lock(&self) -> GestureScope {
        GestureScope {
            guard: self.state.clone().lock_owned().await,
            config: self.config.clone(),
        }
    }

    /// Run `action` while holding the device lock.
    ///
    /// ```ignore
    /// touch.atomic_action(move |s| async move {
    ///     s.tap(menu, &[]).await?;
    ///     s.tap(entry, &[]).await
    /// }.boxed()).await?;
    /// ```
    pub async fn atomic_action<T, F>(&self, action: F) -> DeviceResult<T>
    where
        F: for<'a> FnOnce(&'a mut GestureScope) -> BoxFuture<'a, DeviceResult<T>>,
    {
        let mut scope = self.lock().await;
        action(&mut scope).await
    }

    pub async fn position(&self) -> Point {
        self.lock().await.position()
    }

    /// Extra hold time for the next tap only
    pub async fn set_click_delay(&self, delay: Duration) {
        self.lock().await.set_click_delay(delay);
    }

    pub async fn tap(&self, point: Point, modifiers: &[KeyCode]) -> DeviceResult<()> {
        self.lock().await.tap(point, modifiers).await
    }

    pub async fn tap_rect(&self, rect: Rect) -> DeviceResult<()> {
        self.lock().await.tap(rect.center(), &[]).await
    }

    pub async fn double_tap(&self, point: Point) -> DeviceResult<()> {
        self.lock().await.double_tap(point).await
    }

    pub async fn long_press(&self, point: Point, duration: Duration) -> DeviceResult<()> {
        self.lock().await.long_press(point, duration).await
    }

    pub async fn drag(&self, from: Point, to: Point, duration: Duration) -> DeviceResult<()> {
        self.lock().await.drag(from, to, duration).await
    }

    pub async fn swipe(&self, from: Point, to: Point, duration: Duration) -> DeviceResult<()> {
        let mut scope = self.lock().await;
        scope.start_swipe(from).await?;
        scope.end_swipe(to, duration).await
    }

    pub async fn smooth_move(&self, dest: Point, duration: Duration) -> DeviceResult<()> {
        self.lock().await.smooth_move(dest, duration).await
    }

    pub async fn pinch(
        &self,
        center: Point,
        from_span: f64,
        to_span: f64,
        duration: Duration,
    ) -> DeviceResult<()> {
        self.lock()
            .await
            .pinch(center, from_span, to_span, duration)
            .await
    }

    /// Two-finger pinch towards `center` with the configured spans
    pub async fn zoom_out(&self, center: Point) -> DeviceResult<()> {
        let cfg = &self.config;
        self.pinch(center, cfg.pinch_span_start, cfg.pinch_span_end, cfg.pinch_duration)
            .await
    }

    pub async fn press_key(&self, key: KeyCode) -> DeviceResult<()> {
        self.lock().await.press_key(key).await
    }

    pub async fn type_text(&self, text: &str) -> DeviceResult<()> {
        self.lock().await.type_text(text).await
    }

    pub async fn key_down(&self, key: KeyCode) -> DeviceResult<()> {
        self.lock().await.key_down(key).await
    }

    pub async fn key_up(&self, key: KeyCode) -> DeviceResult<()> {
        self.lock().await.key_up(key).await
    }

    pub async fn spin_wheel(&self, dx: i32, dy: i32) -> DeviceResult<()> {
        self.lock().await.spin_wheel(dx, dy).await
    }
}

/// Exclusive access to the device for a sequence of gestures.
pub struct GestureScope {
    guard: OwnedMutexGuard<TouchState>,
    config: Arc<GestureConfig>,
}

impl GestureScope {
    pub fn position(&mut self) -> Point {
        self.guard.synth.position()
    }

    pub fn set_click_delay(&mut self, delay: Duration) {
        self.guard.click_delay = delay;
    }

    /// Move, hold modifiers, press, wait, release, release modifiers.
    pub async fn tap(&mut self, point: Point, modifiers: &[KeyCode]) -> DeviceResult<()> {
        let hold = self.config.click_delay + std::mem::take(&mut self.guard.click_delay);
        let synth = &mut self.guard.synth;

        synth.move_to(point).await?;
        for (held, key) in modifiers.iter().enumerate() {
            if let Err(e) = synth.key_down(key.evdev_code()).await {
                let _ = release_keys(synth, &modifiers[..held]).await;
                return Err(e);
            }
        }
        let pressed = press_and_hold(synth, hold).await;
        let released = release_keys(synth, modifiers).await;
        tracing::trace!("Tapped at ({}, {})", point.x, point.y);
        pressed.and(released)
    }

    pub async fn double_tap(&mut self, point: Point) -> DeviceResult<()> {
        self.tap(point, &[]).await?;
        tokio::time::sleep(self.config.double_tap_interval).await;
        self.tap(point, &[]).await
    }

    pub async fn long_press(&mut self, point: Point, duration: Duration) -> DeviceResult<()> {
        let synth = &mut self.guard.synth;
        synth.move_to(point).await?;
        press_and_hold(synth, duration).await
    }

    /// Press at `from`, wait for the press to register, then move and lift.
    pub async fn drag(&mut self, from: Point, to: Point, duration: Duration) -> DeviceResult<()> {
        self.start_swipe(from).await?;
        tokio::time::sleep(self.config.click_delay).await;
        self.end_swipe(to, duration).await
    }

    /// First half of a swipe: finger down at `from`.
    pub async fn start_swipe(&mut self, from: Point) -> DeviceResult<()> {
        let synth = &mut self.guard.synth;
        synth.move_to(from).await?;
        synth.press_down().await
    }

    /// Second half of a swipe: eased move to `to`, then lift.
    pub async fn end_swipe(&mut self, to: Point, duration: Duration) -> DeviceResult<()> {
        let synth = &mut self.guard.synth;
        let moved = synth.smooth_move(to, duration).await;
        // Never leave the finger down
        synth.press_up().await?;
        moved
    }

    pub async fn swipe(&mut self, from: Point, to: Point, duration: Duration) -> DeviceResult<()> {
        self.start_swipe(from).await?;
        self.end_swipe(to, duration).await
    }

    pub async fn smooth_move(&mut self, dest: Point, duration: Duration) -> DeviceResult<()> {
        self.guard.synth.smooth_move(dest, duration).await
    }

    /// Two horizontal fingers around `center` whose distance goes from
    /// `from_span` to `to_span`. Needs a device with at least two slots.
    pub async fn pinch(
        &mut self,
        center: Point,
        from_span: f64,
        to_span: f64,
        duration: Duration,
    ) -> DeviceResult<()> {
        let step = self.config.move_step.max(Duration::from_millis(1));
        let synth = &mut self.guard.synth;
        if synth.slot_count() < 2 {
            return Err(DeviceError::InvalidSlot(1));
        }

        let fingers = |span: f64| (center.offset(-span / 2.0, 0.0), center.offset(span / 2.0, 0.0));
        let (left, right) = fingers(from_span);
        synth.move_slot_to(0, left).await?;
        synth.move_slot_to(1, right).await?;
        synth.press_down_slot(0).await?;
        synth.press_down_slot(1).await?;

        let steps = (duration.as_millis() / step.as_millis()).max(1) as u32;
        let mut moved = Ok(());
        for i in 1..=steps {
            let span = from_span + (to_span - from_span) * ease_out(i as f64 / steps as f64);
            let (left, right) = fingers(span);
            moved = match synth.move_slot_to(0, left).await {
                Ok(()) => synth.move_slot_to(1, right).await,
                Err(e) => Err(e),
            };
            if moved.is_err() {
                break;
            }
            tokio::time::sleep(step).await;
        }

        synth.press_up_slot(1).await?;
        synth.press_up_slot(0).await?;
        tracing::trace!(from_span, to_span, "Pinched at ({}, {})", center.x, center.y);
        moved
    }

    pub async fn press_key(&mut self, key: KeyCode) -> DeviceResult<()> {
        let synth = &mut self.guard.synth;
        synth.key_down(key.evdev_code()).await?;
        tokio::time::sleep(self.config.key_delay).await;
        synth.key_up(key.evdev_code()).await
    }

    /// Type `text` key by key; characters without a key are skipped.
    pub async fn type_text(&mut self, text: &str) -> DeviceResult<()> {
        let shift = KeyCode::LeftShift.evdev_code();
        for c in text.chars() {
            let Some((key, shifted)) = KeyCode::from_char(c) else {
                tracing::warn!("No key for {:?}, skipped", c);
                continue;
            };
            if shifted {
                self.guard.synth.key_down(shift).await?;
            }
            let pressed = self.press_key(key).await;
            if shifted {
                self.guard.synth.key_up(shift).await?;
            }
            pressed?;
            tokio::time::sleep(self.config.key_delay).await;
        }
        Ok(())
    }

    pub async fn key_down(&mut self, key: KeyCode) -> DeviceResult<()> {
        self.guard.synth.key_down(key.evdev_code()).await
    }

    pub async fn key_up(&mut self, key: KeyCode) -> DeviceResult<()> {
        self.guard.synth.key_up(key.evdev_code()).await
    }

    pub async fn spin_wheel(&mut self, dx: i32, dy: i32) -> DeviceResult<()> {
        self.guard.synth.spin_wheel(dx, dy).await
    }
}

/// Release `keys` in reverse order; every key is tried, the first failure is returned.
async fn release_keys(synth: &mut InputSynthesizer, keys: &[KeyCode]) -> DeviceResult<()> {
    let mut released = Ok(());
    for key in keys.iter().rev() {
        if let Err(e) = synth.key_up(key.evdev_code()).await {
            tracing::warn!(?key, "Failed to release key: {}", e);
            if released.is_ok() {
                released = Err(e);
            }
        }
    }
    released
}

async fn press_and_hold(synth: &mut InputSynthesizer, hold: Duration) -> DeviceResult<()> {
    synth.press_down().await?;
    if !hold.is_zero() {
        tokio::time::sleep(hold).await;
    }
    synth.press_up().await
}
