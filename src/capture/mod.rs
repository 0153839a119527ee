mod directory;

pub use directory::ImageDirectory;

use anyhow::Result;
use image::RgbImage;

/// A decoded still frame and the name it is exported under
#[derive(Debug, Clone)]
pub struct SourceFrame {
    pub name: String,
    pub image: RgbImage,
}

/// Trait for frame sources
pub trait FrameSource {
    /// Produce the next frame, or `None` once the source is exhausted
    ///
    /// An error only affects the frame it was raised for; calling again
    /// moves on to the next one.
    fn next_frame(&mut self) -> Result<Option<SourceFrame>>;

    /// Number of frames left, if known
    fn len_hint(&self) -> Option<usize>;
}
