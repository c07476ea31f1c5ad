//! Parser for `getevent -p` style capability dumps.

use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use regex::Regex;

use super::error::{DeviceError, DeviceResult};
use super::event::{
    code_from_label, ABS_MT_POSITION_X, ABS_MT_POSITION_Y, ABS_MT_PRESSURE, ABS_MT_SLOT,
};

/// Range description of one absolute axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisSpec {
    pub min_value: i32,
    pub max_value: i32,
    pub fuzz: i32,
    pub flat: i32,
    pub resolution: i32,
}

/// Capabilities of one input device.
#[derive(Debug, Clone, Default)]
pub struct DeviceDescriptor {
    pub device_file: String,
    pub name: String,
    pub specs: HashMap<u16, AxisSpec>,
    pub keys: BTreeSet<u16>,
}

impl DeviceDescriptor {
    pub fn axis(&self, code: u16) -> Option<&AxisSpec> {
        self.specs.get(&code)
    }

    pub fn is_touch_capable(&self) -> bool {
        self.specs.contains_key(&ABS_MT_POSITION_X) && self.specs.contains_key(&ABS_MT_POSITION_Y)
    }

    /// Number of contact slots; devices without `ABS_MT_SLOT` have one.
    pub fn max_slots(&self) -> usize {
        self.axis(ABS_MT_SLOT)
            .map(|s| (s.max_value - s.min_value + 1).max(1) as usize)
            .unwrap_or(1)
    }

    pub fn has_slots(&self) -> bool {
        self.specs.contains_key(&ABS_MT_SLOT)
    }

    pub fn supports_pressure(&self) -> bool {
        self.specs.contains_key(&ABS_MT_PRESSURE)
    }

    pub fn supports_key(&self, code: u16) -> bool {
        self.keys.contains(&code)
    }
}

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^add device \d+:\s*(\S+)").expect("valid header regex"))
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^\s*name:\s*"(.*)""#).expect("valid name regex"))
}

fn keys_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*KEY \(0001\):(.*)$").expect("valid key regex"))
}

fn section_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*[A-Z]+ \([0-9a-fA-F]{4}\):").expect("valid section regex"))
}

fn axis_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?:^|\s)([0-9a-fA-F]{4}|[A-Z][A-Z0-9_]+)\s*:\s*",
            r"value\s+(-?\d+),\s*min\s+(-?\d+),\s*max\s+(-?\d+),\s*",
            r"fuzz\s+(-?\d+),\s*flat\s+(-?\d+)(?:,\s*resolution\s+(-?\d+))?",
        ))
        .expect("valid axis regex")
    })
}

/// Parse a capability dump and return the first touch-capable device.
///
/// The dump may describe several devices, each starting with an
/// `add device N: <path>` line. Lines that match no known pattern are ignored.
pub fn parse(dump: &str) -> DeviceResult<DeviceDescriptor> {
    let mut devices: Vec<DeviceDescriptor> = Vec::new();
    let mut current: Option<DeviceDescriptor> = None;
    let mut in_keys = false;

    for line in dump.lines() {
        if let Some(caps) = header_re().captures(line) {
            if let Some(done) = current.take() {
                devices.push(done);
            }
            current = Some(DeviceDescriptor {
                device_file: caps[1].to_string(),
                ..Default::default()
            });
            in_keys = false;
            continue;
        }

        let device = current.get_or_insert_with(DeviceDescriptor::default);

        if let Some(caps) = name_re().captures(line) {
            device.name = caps[1].to_string();
            in_keys = false;
            continue;
        }

        if let Some(caps) = keys_re().captures(line) {
            device.keys.extend(parse_key_tokens(&caps[1]));
            in_keys = true;
            continue;
        }

        if let Some(caps) = axis_re().captures(line) {
            in_keys = false;
            let Some(code) = parse_code(&caps[1]) else {
                continue;
            };
            let spec = AxisSpec {
                min_value: parse_int(&caps[3])?,
                max_value: parse_int(&caps[4])?,
                fuzz: parse_int(&caps[5])?,
                flat: parse_int(&caps[6])?,
                resolution: caps.get(7).map(|m| parse_int(m.as_str())).transpose()?.unwrap_or(0),
            };
            device.specs.insert(code, spec);
            continue;
        }

        if in_keys {
            if section_re().is_match(line) {
                in_keys = false;
            } else {
                device.keys.extend(parse_key_tokens(line));
            }
        }
    }

    if let Some(done) = current.take() {
        devices.push(done);
    }

    let device = devices
        .into_iter()
        .find(|d| d.is_touch_capable())
        .ok_or(DeviceError::NoTouchAxes)?;

    tracing::debug!(
        device = %device.device_file,
        name = %device.name,
        axes = device.specs.len(),
        "Parsed device descriptor"
    );
    Ok(device)
}

fn parse_code(token: &str) -> Option<u16> {
    u16::from_str_radix(token, 16)
        .ok()
        .or_else(|| code_from_label(token))
}

fn parse_int(token: &str) -> DeviceResult<i32> {
    token
        .parse::<i32>()
        .map_err(|e| DeviceError::Parse(format!("{}: {}", token, e)))
}

fn parse_key_tokens(text: &str) -> Vec<u16> {
    text.split_whitespace()
        .filter_map(|t| {
            if t.len() == 4 {
                u16::from_str_radix(t, 16).ok()
            } else {
                code_from_label(t)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::device::event::{BTN_TOUCH, BTN_TOOL_FINGER};

    const DUMP: &str = r#"add device 1: /dev/input/event4
  name:     "gpio-keys"
  events:
    KEY (0001): 0072  0073  0074
  input props:
    <none>
add device 2: /dev/input/event2
  name:     "synaptics_dsx"
  events:
    KEY (0001): 0145  014a
                0158
    ABS (0003): 002f  : value 0, min 0, max 9, fuzz 0, flat 0, resolution 0
                0030  : value 0, min 0, max 255, fuzz 0, flat 0, resolution 0
                0035  : value 0, min 0, max 1079, fuzz 0, flat 0, resolution 0
                0036  : value 0, min 0, max 2339, fuzz 0, flat 0, resolution 0
                0039  : value 0, min 0, max 65535, fuzz 0, flat 0, resolution 0
                003a  : value 0, min 0, max 255, fuzz 2, flat 1, resolution 0
  input props:
    INPUT_PROP_DIRECT
"#;

    #[test]
    fn test_parse_picks_touch_device() {
        let device = parse(DUMP).unwrap();
        assert_eq!(device.device_file, "/dev/input/event2");
        assert_eq!(device.name, "synaptics_dsx");
        let x = device.axis(ABS_MT_POSITION_X).unwrap();
        assert_eq!((x.min_value, x.max_value), (0, 1079));
        assert_eq!(device.axis(ABS_MT_POSITION_Y).unwrap().max_value, 2339);
        let pressure = device.axis(ABS_MT_PRESSURE).unwrap();
        assert_eq!((pressure.fuzz, pressure.flat), (2, 1));
        assert_eq!(device.max_slots(), 10);
        assert!(device.supports_pressure());
        assert!(device.supports_key(BTN_TOUCH));
        assert!(device.supports_key(BTN_TOOL_FINGER));
        assert!(device.supports_key(0x158));
        assert!(!device.supports_key(0x72));
    }

    #[test]
    fn test_parse_labelled_dump() {
        let dump = r#"add device 1: /dev/input/event1
  name:     "virtio_input_multi_touch_1"
  events:
    KEY (0001): BTN_TOUCH
    ABS (0003): ABS_MT_SLOT           : value 0, min 0, max 1, fuzz 0, flat 0, resolution 0
                ABS_MT_POSITION_X     : value 0, min 0, max 32767, fuzz 0, flat 0, resolution 0
                ABS_MT_POSITION_Y     : value 0, min 0, max 32767, fuzz 0, flat 0
                ABS_MT_TRACKING_ID    : value 0, min 0, max 10, fuzz 0, flat 0, resolution 0
"#;
        let device = parse(dump).unwrap();
        assert_eq!(device.axis(ABS_MT_POSITION_X).unwrap().max_value, 32767);
        assert_eq!(device.axis(ABS_MT_POSITION_Y).unwrap().resolution, 0);
        assert_eq!(device.max_slots(), 2);
        assert!(device.supports_key(BTN_TOUCH));
        assert!(!device.supports_pressure());
    }

    #[test]
    fn test_parse_without_touch_axes_fails() {
        let dump = "add device 1: /dev/input/event0\n  name: \"keys\"\n    KEY (0001): 0072\n";
        assert!(matches!(parse(dump), Err(DeviceError::NoTouchAxes)));
        assert!(matches!(parse(""), Err(DeviceError::NoTouchAxes)));
    }
}
