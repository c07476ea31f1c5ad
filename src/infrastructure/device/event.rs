//! Linux input event codes and the raw event triple.

use evdev::{AbsoluteAxisType, EventType, InputEvent, Key, RelativeAxisType, Synchronization};

pub const EV_SYN: u16 = EventType::SYNCHRONIZATION.0;
pub const EV_KEY: u16 = EventType::KEY.0;
pub const EV_REL: u16 = EventType::RELATIVE.0;
pub const EV_ABS: u16 = EventType::ABSOLUTE.0;

pub const SYN_REPORT: u16 = Synchronization::SYN_REPORT.0;

pub const ABS_X: u16 = AbsoluteAxisType::ABS_X.0;
pub const ABS_Y: u16 = AbsoluteAxisType::ABS_Y.0;
pub const ABS_MT_SLOT: u16 = AbsoluteAxisType::ABS_MT_SLOT.0;
pub const ABS_MT_POSITION_X: u16 = AbsoluteAxisType::ABS_MT_POSITION_X.0;
pub const ABS_MT_POSITION_Y: u16 = AbsoluteAxisType::ABS_MT_POSITION_Y.0;
pub const ABS_MT_TRACKING_ID: u16 = AbsoluteAxisType::ABS_MT_TRACKING_ID.0;
pub const ABS_MT_PRESSURE: u16 = AbsoluteAxisType::ABS_MT_PRESSURE.0;

pub const REL_HWHEEL: u16 = RelativeAxisType::REL_HWHEEL.0;
pub const REL_WHEEL: u16 = RelativeAxisType::REL_WHEEL.0;

pub const BTN_TOUCH: u16 = Key::BTN_TOUCH.code();
pub const BTN_TOOL_FINGER: u16 = Key::BTN_TOOL_FINGER.code();

/// One `(type, code, value)` triple of the evdev protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl RawEvent {
    pub fn new(kind: u16, code: u16, value: i32) -> Self {
        Self { kind, code, value }
    }

    pub fn abs(code: u16, value: i32) -> Self {
        Self::new(EV_ABS, code, value)
    }

    pub fn key(code: u16, value: i32) -> Self {
        Self::new(EV_KEY, code, value)
    }

    pub fn rel(code: u16, value: i32) -> Self {
        Self::new(EV_REL, code, value)
    }

    pub fn syn() -> Self {
        Self::new(EV_SYN, SYN_REPORT, 0)
    }

    pub fn is_syn(&self) -> bool {
        self.kind == EV_SYN && self.code == SYN_REPORT
    }
}

impl From<InputEvent> for RawEvent {
    fn from(event: InputEvent) -> Self {
        Self::new(event.event_type().0, event.code(), event.value())
    }
}

impl From<RawEvent> for InputEvent {
    fn from(event: RawEvent) -> Self {
        InputEvent::new(EventType(event.kind), event.code, event.value)
    }
}

/// Map a `getevent -l` label such as `ABS_MT_POSITION_X` or `BTN_TOUCH`
/// to its numeric code.
pub fn code_from_label(label: &str) -> Option<u16> {
    if let Ok(axis) = label.parse::<AbsoluteAxisType>() {
        return Some(axis.0);
    }
    label.parse::<Key>().ok().map(Key::code)
}
