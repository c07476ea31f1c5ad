use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::infrastructure::device::{DisplayExtent, EventLayout, ListenerConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub resources: ResourceConfig,
    pub device: DeviceConfig,
    /// Command printing one encoded screenshot to stdout
    pub capture: CommandSpec,
}

/// Where declarative data lives
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub locations_dir: PathBuf,
    pub maps_dir: PathBuf,
    /// Base directory for landmark and link templates
    pub templates_dir: PathBuf,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            locations_dir: PathBuf::from("resources/locations"),
            maps_dir: PathBuf::from("resources/maps"),
            templates_dir: PathBuf::from("resources"),
        }
    }
}

/// External program and its arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl Default for CommandSpec {
    fn default() -> Self {
        Self::new("adb", &["exec-out", "screencap", "-p"])
    }
}

/// Where the capability dump of the touch device comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum DescriptorSource {
    File { path: PathBuf },
    Command(CommandSpec),
}

impl Default for DescriptorSource {
    fn default() -> Self {
        Self::Command(CommandSpec::new("adb", &["shell", "getevent", "-p"]))
    }
}

/// Live event stream used to follow the real contact position
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LiveSource {
    #[default]
    Disabled,
    /// Text output of a `getevent` style command
    Getevent(CommandSpec),
    /// Binary device node readable from this host
    Node { path: PathBuf },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Logical screen size used for coordinate scaling
    pub display: DisplayExtent,

    /// Binary event layout of the device node
    pub layout: EventLayout,

    pub descriptor: DescriptorSource,

    /// Command whose stdin is written to the device node
    pub sink: CommandSpec,

    pub live: LiveSource,

    pub listener: ListenerConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            display: DisplayExtent::default(),
            layout: EventLayout::default(),
            descriptor: DescriptorSource::default(),
            sink: CommandSpec::new("adb", &["exec-in", "sh", "-c", "cat > /dev/input/event2"]),
            live: LiveSource::default(),
            listener: ListenerConfig::default(),
        }
    }
}
