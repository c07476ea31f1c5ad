//! Command and live-stream channels to an input device.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWrite;
use tokio::process::{Child, ChildStdin, Command};
use tokio_util::codec::{FramedRead, FramedWrite};

use super::codec::{EventLayout, GeteventCodec, InputEventCodec};
use super::error::{DeviceError, DeviceResult};
use super::event::RawEvent;

/// Live stream of events read back from a device.
pub type EventStream = BoxStream<'static, io::Result<RawEvent>>;

/// Destination for synthesized events
#[async_trait]
pub trait EventSink: Send {
    /// Write one batch of events. Batches produced by the synthesizer always
    /// end with a sync event.
    async fn send_batch(&mut self, events: &[RawEvent]) -> DeviceResult<()>;
}

/// Something that can (re)open the device's live event stream
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn open(&self) -> DeviceResult<EventStream>;
}

/// Binary event sink over any async writer (device node, pipe, socket).
pub struct FramedEventSink<W> {
    inner: FramedWrite<W, InputEventCodec>,
}

impl<W: AsyncWrite + Unpin + Send> FramedEventSink<W> {
    pub fn new(writer: W, layout: EventLayout) -> Self {
        Self {
            inner: FramedWrite::new(writer, InputEventCodec::new(layout)),
        }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> EventSink for FramedEventSink<W> {
    async fn send_batch(&mut self, events: &[RawEvent]) -> DeviceResult<()> {
        for event in events {
            self.inner.feed(*event).await.map_err(io_error)?;
        }
        self.inner.flush().await.map_err(io_error)?;
        Ok(())
    }
}

/// Sink that pipes binary events into a spawned command's stdin,
/// e.g. `adb exec-in "cat > /dev/input/event2"`.
pub struct CommandSink {
    sink: FramedEventSink<ChildStdin>,
    _child: Child,
}

impl CommandSink {
    pub fn spawn(program: &str, args: &[String], layout: EventLayout) -> DeviceResult<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        let stdin = child.stdin.take().ok_or(DeviceError::Disconnected)?;
        tracing::info!(program, ?args, "Spawned device command channel");
        Ok(Self {
            sink: FramedEventSink::new(stdin, layout),
            _child: child,
        })
    }
}

#[async_trait]
impl EventSink for CommandSink {
    async fn send_batch(&mut self, events: &[RawEvent]) -> DeviceResult<()> {
        self.sink.send_batch(events).await
    }
}

/// Reads the binary stream of a local `/dev/input/event*` node.
pub struct DeviceNodeSource {
    path: PathBuf,
    layout: EventLayout,
}

impl DeviceNodeSource {
    pub fn new(path: impl Into<PathBuf>, layout: EventLayout) -> Self {
        Self {
            path: path.into(),
            layout,
        }
    }
}

#[async_trait]
impl EventSource for DeviceNodeSource {
    async fn open(&self) -> DeviceResult<EventStream> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(FramedRead::new(file, InputEventCodec::new(self.layout)).boxed())
    }
}

/// Runs a command such as `adb shell getevent /dev/input/event2` and decodes
/// its text output.
pub struct GeteventSource {
    program: String,
    args: Vec<String>,
}

impl GeteventSource {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl EventSource for GeteventSource {
    async fn open(&self) -> DeviceResult<EventStream> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdout(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        let stdout = child.stdout.take().ok_or(DeviceError::Disconnected)?;
        let stream = FramedRead::new(stdout, GeteventCodec::new()).map(move |event| {
            // The child is killed when the stream is dropped
            let _keep_alive = &child;
            event
        });
        Ok(stream.boxed())
    }
}

fn io_error(err: io::Error) -> DeviceError {
    match err.kind() {
        io::ErrorKind::BrokenPipe | io::ErrorKind::NotConnected | io::ErrorKind::UnexpectedEof => {
            DeviceError::Disconnected
        }
        _ => DeviceError::Io(err),
    }
}
