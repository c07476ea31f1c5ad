//! Wire codecs for raw input events.
//!
//! `InputEventCodec` speaks the binary `struct input_event` layout used by
//! `/dev/input/event*` nodes. `GeteventCodec` decodes the textual stream
//! printed by `getevent` when the node is read through a shell.

use std::io;

use bytes::{Buf, BufMut, BytesMut};
use evdev::{EventType, InputEvent};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use super::event::RawEvent;

/// Size of the `timeval` header preceding type/code/value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLayout {
    /// 32-bit userspace: 16 bytes per event
    Bits32,
    /// 64-bit userspace: 24 bytes per event
    #[default]
    Bits64,
}

impl EventLayout {
    pub fn frame_size(&self) -> usize {
        self.timestamp_size() + 8
    }

    fn timestamp_size(&self) -> usize {
        match self {
            Self::Bits32 => 8,
            Self::Bits64 => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InputEventCodec {
    layout: EventLayout,
}

impl InputEventCodec {
    pub fn new(layout: EventLayout) -> Self {
        Self { layout }
    }
}

impl Decoder for InputEventCodec {
    type Item = RawEvent;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RawEvent>, io::Error> {
        let size = self.layout.frame_size();
        if src.len() < size {
            src.reserve(size - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(size);
        frame.advance(self.layout.timestamp_size());
        let kind = frame.get_u16_le();
        let code = frame.get_u16_le();
        let value = frame.get_i32_le();
        Ok(Some(InputEvent::new(EventType(kind), code, value).into()))
    }
}

impl Encoder<RawEvent> for InputEventCodec {
    type Error = io::Error;

    fn encode(&mut self, event: RawEvent, dst: &mut BytesMut) -> Result<(), io::Error> {
        let event = InputEvent::from(event);
        dst.reserve(self.layout.frame_size());
        // The kernel stamps injected events itself
        dst.put_bytes(0, self.layout.timestamp_size());
        dst.put_u16_le(event.event_type().0);
        dst.put_u16_le(event.code());
        dst.put_i32_le(event.value());
        Ok(())
    }
}

/// Decoder for `getevent` text output: `[/dev/input/eventN: ]TTTT CCCC VVVVVVVV`.
#[derive(Debug)]
pub struct GeteventCodec {
    lines: LinesCodec,
}

impl GeteventCodec {
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(1024),
        }
    }
}

impl Default for GeteventCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for GeteventCodec {
    type Item = RawEvent;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RawEvent>, io::Error> {
        loop {
            match self.lines.decode(src).map_err(lines_error)? {
                Some(line) => {
                    if let Some(event) = parse_getevent_line(&line) {
                        return Ok(Some(event));
                    }
                }
                None => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<RawEvent>, io::Error> {
        loop {
            match self.lines.decode_eof(src).map_err(lines_error)? {
                Some(line) => {
                    if let Some(event) = parse_getevent_line(&line) {
                        return Ok(Some(event));
                    }
                }
                None => return Ok(None),
            }
        }
    }
}

fn lines_error(err: LinesCodecError) -> io::Error {
    match err {
        LinesCodecError::Io(e) => e,
        LinesCodecError::MaxLineLengthExceeded => {
            io::Error::new(io::ErrorKind::InvalidData, "getevent line too long")
        }
    }
}

/// Parse one `getevent` line; anything that is not an event triple yields `None`.
pub fn parse_getevent_line(line: &str) -> Option<RawEvent> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 3 {
        return None;
    }
    let [kind, code, value] = [
        tokens[tokens.len() - 3],
        tokens[tokens.len() - 2],
        tokens[tokens.len() - 1],
    ];
    if kind.len() != 4 || code.len() != 4 || value.len() != 8 {
        return None;
    }
    let kind = u16::from_str_radix(kind, 16).ok()?;
    let code = u16::from_str_radix(code, 16).ok()?;
    let value = u32::from_str_radix(value, 16).ok()? as i32;
    Some(RawEvent::new(kind, code, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::device::event::{ABS_MT_POSITION_X, ABS_MT_TRACKING_ID, EV_ABS};

    #[test]
    fn test_binary_layout_32() {
        let mut codec = InputEventCodec::new(EventLayout::Bits32);
        let mut buf = BytesMut::new();
        codec
            .encode(RawEvent::abs(ABS_MT_POSITION_X, 420), &mut buf)
            .unwrap();
        assert_eq!(buf.len(), 16);
        assert_eq!(&buf[8..10], &[0x03, 0x00]);
        assert_eq!(&buf[10..12], &[0x35, 0x00]);
        assert_eq!(&buf[12..16], &420i32.to_le_bytes());
    }

    #[test]
    fn test_binary_decode_waits_for_full_frame() {
        let mut codec = InputEventCodec::new(EventLayout::Bits64);
        let mut buf = BytesMut::new();
        codec.encode(RawEvent::abs(ABS_MT_TRACKING_ID, -1), &mut buf).unwrap();
        codec.encode(RawEvent::syn(), &mut buf).unwrap();
        let mut partial = buf.split_to(20);
        assert_eq!(codec.decode(&mut partial).unwrap(), None);
        partial.unsplit(buf);
        assert_eq!(
            codec.decode(&mut partial).unwrap(),
            Some(RawEvent::abs(ABS_MT_TRACKING_ID, -1))
        );
        assert_eq!(codec.decode(&mut partial).unwrap(), Some(RawEvent::syn()));
        assert!(partial.is_empty());
    }

    #[test]
    fn test_getevent_text_stream() {
        let mut codec = GeteventCodec::new();
        let mut buf = BytesMut::from(concat!(
            "add device 1: /dev/input/event2\n",
            "/dev/input/event2: 0003 0035 000001a4\n",
            "0003 0039 ffffffff\n",
            "0000 00",
        ));
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(RawEvent::new(EV_ABS, ABS_MT_POSITION_X, 0x1a4))
        );
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(RawEvent::abs(ABS_MT_TRACKING_ID, -1))
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"00 00000000\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(RawEvent::syn()));
    }
}
