//! Connects the navigator, the map node resolver and the touch facade to a
//! real device and screen capture command.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::eventbus::{create_event_bus, SharedEventBus};
use crate::application::input::TouchScreen;
use crate::application::navigation::{LocationRepository, Navigator, PresenceDetector};
use crate::application::resolver::{load_reference, BlobMatcher, MapNodeResolver};
use crate::domain::model::MapDefinition;
use crate::infrastructure::capture::{CommandFrameSource, FrameSource, NccMatcher, TemplateStore};
use crate::infrastructure::config::{
    AppConfig, DescriptorSource, DeviceConfig, GestureConfig, LiveSource, NavigationConfig,
    ResolverConfig, ResourceConfig,
};
use crate::infrastructure::device::{
    descriptor, spawn_listener, CommandSink, DeviceDescriptor, DeviceNodeSource, EventSource,
    GeteventSource, InputSynthesizer,
};
use crate::infrastructure::sources::YamlLocationSource;

/// Shared device, capture and event bus handles
pub struct Runtime {
    touch: TouchScreen,
    frames: Arc<dyn FrameSource>,
    events: SharedEventBus,
    cancel: CancellationToken,
    listener: Option<JoinHandle<()>>,
}

impl Runtime {
    pub fn new(touch: TouchScreen, frames: Arc<dyn FrameSource>) -> Self {
        Self {
            touch,
            frames,
            events: create_event_bus(),
            cancel: CancellationToken::new(),
            listener: None,
        }
    }

    /// Describe the device, open its command channel and, when configured,
    /// start following its live stream.
    pub async fn connect(app: &AppConfig, gesture: &GestureConfig) -> Result<Self> {
        let device = &app.device;
        let descriptor = Arc::new(read_descriptor(&device.descriptor).await?);
        tracing::info!(
            device = %descriptor.device_file,
            name = %descriptor.name,
            slots = descriptor.max_slots(),
            "Touch device described"
        );

        let sink = CommandSink::spawn(&device.sink.program, &device.sink.args, device.layout)
            .with_context(|| format!("spawning {}", device.sink.program))?;
        let mut synth = InputSynthesizer::new(descriptor.clone(), device.display, Box::new(sink));

        let cancel = CancellationToken::new();
        let mut listener = None;
        if let Some(source) = live_source(device) {
            let (rx, handle) = spawn_listener(
                source,
                descriptor,
                device.display,
                device.listener,
                cancel.child_token(),
            );
            synth = synth.with_live_updates(rx);
            listener = Some(handle);
        }

        let frames = CommandFrameSource::new(app.capture.program.clone(), app.capture.args.clone());
        Ok(Self {
            touch: TouchScreen::new(synth, gesture.clone()),
            frames: Arc::new(frames),
            events: create_event_bus(),
            cancel,
            listener,
        })
    }

    pub fn touch(&self) -> &TouchScreen {
        &self.touch
    }

    pub fn frames(&self) -> Arc<dyn FrameSource> {
        self.frames.clone()
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    /// Navigator over the locations and templates under `resources`.
    pub fn navigator(
        &self,
        resources: &ResourceConfig,
        config: &NavigationConfig,
    ) -> Result<Navigator> {
        let source = YamlLocationSource::new(&resources.locations_dir);
        let repository = LocationRepository::load(Box::new(source))
            .with_context(|| format!("loading locations from {:?}", resources.locations_dir))?;
        let detector = PresenceDetector::new(
            Arc::new(TemplateStore::new(&resources.templates_dir)),
            Arc::new(NccMatcher),
            config.landmark_margin,
        );
        Ok(Navigator::new(
            Arc::new(repository),
            detector,
            self.frames.clone(),
            self.touch.clone(),
            self.events.clone(),
            config.clone(),
        ))
    }

    /// Resolver for the nodes of `map`, whose reference image lives in `maps_dir`.
    pub fn resolver(
        &self,
        map: &MapDefinition,
        maps_dir: &Path,
        config: &ResolverConfig,
    ) -> Result<MapNodeResolver> {
        let reference = load_reference(map, maps_dir, config)?;
        let matcher = BlobMatcher::new(config.min_blob_area, config.match_ratio);
        Ok(MapNodeResolver::new(
            Arc::new(reference),
            Arc::new(matcher),
            self.frames.clone(),
            self.touch.clone(),
            self.events.clone(),
            config.clone(),
        ))
    }

    /// Stop the live listener and wait for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Some(handle) = self.listener {
            if let Err(e) = handle.await {
                tracing::warn!("Live listener ended abnormally: {}", e);
            }
        }
    }
}

async fn read_descriptor(source: &DescriptorSource) -> Result<DeviceDescriptor> {
    let dump = match source {
        DescriptorSource::File { path } => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {:?}", path))?,
        DescriptorSource::Command(command) => {
            let output = Command::new(&command.program)
                .args(&command.args)
                .stdin(Stdio::null())
                .output()
                .await
                .with_context(|| format!("running {}", command.program))?;
            if !output.status.success() {
                anyhow::bail!("{} exited with {}", command.program, output.status);
            }
            String::from_utf8_lossy(&output.stdout).into_owned()
        }
    };
    Ok(descriptor::parse(&dump)?)
}

fn live_source(device: &DeviceConfig) -> Option<Arc<dyn EventSource>> {
    match &device.live {
        LiveSource::Disabled => None,
        LiveSource::Getevent(command) => Some(Arc::new(GeteventSource::new(
            command.program.clone(),
            command.args.clone(),
        ))),
        LiveSource::Node { path } => Some(Arc::new(DeviceNodeSource::new(path, device.layout))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use crate::domain::error::DomainError;
    use crate::domain::model::{Point, Rect};
    use crate::domain::repository::MapSource;
    use crate::infrastructure::config::CommandSpec;
    use crate::infrastructure::sources::YamlMapSource;
    use crate::testing::{
        frame_with_square, sample_descriptor, temp_dir, touch_screen, StaticFrameSource,
    };

    const DUMP: &str = r#"add device 2: /dev/input/event2
  name:     "virtual_touch"
  events:
    KEY (0001): 014a
    ABS (0003): 002f  : value 0, min 0, max 4, fuzz 0, flat 0, resolution 0
                0035  : value 0, min 0, max 1079, fuzz 0, flat 0, resolution 0
                0036  : value 0, min 0, max 1919, fuzz 0, flat 0, resolution 0
                0039  : value 0, min 0, max 65535, fuzz 0, flat 0, resolution 0
"#;

    #[tokio::test]
    async fn test_connect_opens_configured_channels() {
        let dir = temp_dir("runtime");
        let dump = dir.join("dump.txt");
        fs::write(&dump, DUMP).unwrap();
        let shot = dir.join("shot.png");
        frame_with_square(64, 48, Rect::new(8, 8, 16, 16), [255, 255, 255])
            .rgb
            .save(&shot)
            .unwrap();

        let mut app = AppConfig::default();
        app.device.descriptor = DescriptorSource::File { path: dump };
        app.device.sink = CommandSpec::new("sh", &["-c", "cat > /dev/null"]);
        app.capture = CommandSpec::new("cat", &[shot.to_str().unwrap()]);

        let runtime = Runtime::connect(&app, &GestureConfig::default()).await.unwrap();
        assert_eq!(runtime.touch().slot_count().await, 5);
        runtime.touch().tap(Point::new(100.0, 100.0), &[]).await.unwrap();
        let frame = runtime.frames().capture().await.unwrap();
        assert_eq!((frame.width(), frame.height()), (64, 48));
        runtime.shutdown().await;

        app.device.descriptor = DescriptorSource::File {
            path: dir.join("missing.txt"),
        };
        assert!(Runtime::connect(&app, &GestureConfig::default()).await.is_err());
        fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_builds_navigator_and_resolver() {
        let dir = temp_dir("resources");
        let locations = dir.join("locations");
        fs::create_dir_all(&locations).unwrap();
        fs::write(locations.join("home.yaml"), "- id: home\n- id: shop\n").unwrap();
        fs::write(
            dir.join("sector.yaml"),
            concat!(
                "name: sector\n",
                "reference_image: sector.png\n",
                "nodes:\n",
                "  - { name: exit, x: 10, y: 20, width: 30, height: 30, coordinates: absolute }\n",
            ),
        )
        .unwrap();
        frame_with_square(200, 200, Rect::new(50, 50, 20, 20), [255, 255, 255])
            .rgb
            .save(dir.join("sector.png"))
            .unwrap();

        let (touch, _sink) = touch_screen(sample_descriptor(1000, 1000));
        let frames = StaticFrameSource::new(frame_with_square(
            100,
            100,
            Rect::new(0, 0, 10, 10),
            [0, 0, 0],
        ));
        let runtime = Runtime::new(touch, Arc::new(frames));

        let resources = ResourceConfig {
            locations_dir: locations,
            maps_dir: dir.clone(),
            templates_dir: dir.clone(),
        };
        let mut navigator = runtime
            .navigator(&resources, &NavigationConfig::default())
            .unwrap();
        assert!(matches!(
            navigator.navigate_to("nowhere", &CancellationToken::new()).await,
            Err(DomainError::UnknownDestinationId(_))
        ));

        let map = YamlMapSource::new(&dir).load_map("sector").unwrap();
        let mut resolver = runtime
            .resolver(&map, &dir, &ResolverConfig::default())
            .unwrap();
        let exit = map.node("exit").unwrap();
        let rect = resolver.resolve(exit, &CancellationToken::new()).await.unwrap();
        assert_eq!(rect, Rect::new(10, 20, 30, 30));

        let mut missing = map.clone();
        missing.reference_image = Some("gone.png".to_string());
        assert!(runtime.resolver(&missing, &dir, &ResolverConfig::default()).is_err());
        fs::remove_dir_all(dir).ok();
    }
}
