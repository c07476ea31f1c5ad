//! Background task that reads the device's live event stream and feeds
//! cursor position updates to the synthesizer.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::channel::EventSource;
use super::descriptor::DeviceDescriptor;
use super::event::{
    RawEvent, ABS_MT_POSITION_X, ABS_MT_POSITION_Y, ABS_MT_SLOT, ABS_X, ABS_Y, EV_ABS,
};
use super::synthesizer::{to_logical, DisplayExtent, LiveUpdate, PositionAxis};

/// Reconnect policy of the listener
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Time between reconnect attempts (milliseconds)
    pub reconnect_interval_ms: u64,

    /// Consecutive failed reconnects before the listener exits
    pub reconnect_attempts: u32,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            reconnect_interval_ms: 1000,
            reconnect_attempts: 5,
        }
    }
}

impl ListenerConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

/// Converts raw events into position updates, tracking the selected slot.
pub struct LiveTracker {
    descriptor: Arc<DeviceDescriptor>,
    display: DisplayExtent,
    slot: usize,
}

impl LiveTracker {
    pub fn new(descriptor: Arc<DeviceDescriptor>, display: DisplayExtent) -> Self {
        Self {
            descriptor,
            display,
            slot: 0,
        }
    }

    pub fn apply(&mut self, event: RawEvent) -> Option<LiveUpdate> {
        if event.kind != EV_ABS {
            return None;
        }
        let (axis, extent) = match event.code {
            ABS_MT_SLOT => {
                self.slot = event.value.max(0) as usize;
                return None;
            }
            ABS_MT_POSITION_X | ABS_X => (PositionAxis::X, self.display.width),
            ABS_MT_POSITION_Y | ABS_Y => (PositionAxis::Y, self.display.height),
            _ => return None,
        };
        let spec = self.descriptor.axis(event.code)?;
        Some(LiveUpdate {
            slot: self.slot,
            axis,
            raw: event.value,
            logical: to_logical(event.value, extent, spec),
        })
    }
}

/// Spawn the listener. The task ends when `cancel` fires, when the
/// synthesizer drops its receiver, or when reconnecting keeps failing.
pub fn spawn_listener(
    source: Arc<dyn EventSource>,
    descriptor: Arc<DeviceDescriptor>,
    display: DisplayExtent,
    config: ListenerConfig,
    cancel: CancellationToken,
) -> (mpsc::UnboundedReceiver<LiveUpdate>, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let tracker = LiveTracker::new(descriptor, display);
    let handle = tokio::spawn(run(source, tracker, config, tx, cancel));
    (rx, handle)
}

async fn run(
    source: Arc<dyn EventSource>,
    mut tracker: LiveTracker,
    config: ListenerConfig,
    tx: mpsc::UnboundedSender<LiveUpdate>,
    cancel: CancellationToken,
) {
    let mut failures: u32 = 0;

    loop {
        let opened = tokio::select! {
            _ = cancel.cancelled() => return,
            opened = source.open() => opened,
        };

        match opened {
            Ok(mut stream) => {
                tracing::debug!("Live event stream opened");
                loop {
                    let next = tokio::select! {
                        _ = cancel.cancelled() => return,
                        next = stream.next() => next,
                    };
                    match next {
                        Some(Ok(event)) => {
                            failures = 0;
                            if let Some(update) = tracker.apply(event) {
                                if tx.send(update).is_err() {
                                    tracing::debug!("Synthesizer gone, listener exiting");
                                    return;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!("Live event stream error: {}", e);
                            break;
                        }
                        None => {
                            tracing::info!("Live event stream closed");
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Failed to open live event stream: {}", e);
            }
        }

        failures += 1;
        if failures > config.reconnect_attempts {
            tracing::warn!(failures, "Device disconnected, listener exiting");
            return;
        }
        tracing::info!(
            attempt = failures,
            interval = ?config.reconnect_interval(),
            "Reconnecting to live event stream"
        );
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(config.reconnect_interval()) => {}
        }
    }
}
