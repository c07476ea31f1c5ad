//! Virtual touchscreen device: capability parsing, raw protocol synthesis
//! and the live event listener.

mod channel;
mod codec;
pub mod descriptor;
mod error;
pub mod event;
mod listener;
mod synthesizer;

pub use channel::{
    CommandSink, DeviceNodeSource, EventSink, EventSource, EventStream, FramedEventSink,
    GeteventSource,
};
pub use codec::{parse_getevent_line, EventLayout, GeteventCodec, InputEventCodec};
pub use descriptor::{AxisSpec, DeviceDescriptor};
pub use error::{DeviceError, DeviceResult};
pub use event::RawEvent;
pub use listener::{spawn_listener, ListenerConfig, LiveTracker};
pub use synthesizer::{
    ease_out, to_logical, to_raw, CursorState, DisplayExtent, InputSynthesizer, LiveUpdate,
    PositionAxis,
};
