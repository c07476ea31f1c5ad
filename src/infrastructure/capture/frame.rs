use std::process::Stdio;

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, RgbImage};
use tokio::process::Command;

/// One captured screen, with the grayscale copy template matching needs.
#[derive(Debug, Clone)]
pub struct Frame {
    pub rgb: RgbImage,
    pub gray: GrayImage,
}

impl Frame {
    pub fn from_image(image: DynamicImage) -> Self {
        Self {
            gray: image.to_luma8(),
            rgb: image.to_rgb8(),
        }
    }

    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    pub fn height(&self) -> u32 {
        self.rgb.height()
    }
}

/// Source of live screen frames
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn capture(&self) -> anyhow::Result<Frame>;
}

/// Captures by running a command that prints a PNG on stdout,
/// e.g. `adb exec-out screencap -p`.
pub struct CommandFrameSource {
    program: String,
    args: Vec<String>,
}

impl CommandFrameSource {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl FrameSource for CommandFrameSource {
    async fn capture(&self) -> anyhow::Result<Frame> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .await?;
        if !output.status.success() {
            anyhow::bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        let image = image::load_from_memory(&output.stdout)?;
        Ok(Frame::from_image(image))
    }
}
