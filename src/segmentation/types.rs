use crate::error::Result;
use image::RgbImage;
use ndarray::Array2;

/// Binary mask indexed `[[y, x]]`: 0 = background, 1 = foreground
pub type Mask = Array2<u8>;

/// Euclidean distance from each pixel to the nearest background pixel
pub type DistanceField = Array2<f32>;

/// Integer labels indexed `[[y, x]]`, used for both marker maps and
/// segmentation results
pub type LabelMap = Array2<i32>;

/// Marker label for pixels the watershed has to resolve
pub const UNKNOWN: i32 = 0;
/// Marker label for the stationary scene
pub const BACKGROUND: i32 = 1;
/// First label handed to a candidate intruder region
pub const FIRST_INTRUDER: i32 = 2;
/// Watershed label for pixels where two different regions meet
pub const BOUNDARY: i32 = -1;

/// Status of a pixel after mask refinement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedState {
    /// Outside the expanded mask
    Background,
    /// Inside the conservative core
    Core,
    /// In the expanded mask but not the core
    Unresolved,
}

impl SeedState {
    pub fn classify(expanded: u8, core: u8) -> Self {
        match (expanded != 0, core != 0) {
            (_, true) => SeedState::Core,
            (true, false) => SeedState::Unresolved,
            (false, false) => SeedState::Background,
        }
    }
}

/// Trait for adaptive background models
/// Allows swapping the mixture model for other subtractors
pub trait BackgroundSubtractor {
    /// Classify a frame and fold it into the model
    ///
    /// # Returns
    /// * Raw foreground mask with the frame's dimensions
    fn apply(&mut self, frame: &RgbImage) -> Result<Mask>;

    /// Forget everything learned so far
    ///
    /// Call this when:
    /// - The camera has moved
    /// - A new, unrelated sequence starts
    fn reset_state(&mut self);

    /// Number of frames folded into the current model
    fn frames_seen(&self) -> u64;
}

/// Convert a 0/1 mask to a grey RGB image for export
pub fn mask_to_rgb(mask: &Mask) -> RgbImage {
    let (height, width) = mask.dim();
    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let value = if mask[[y as usize, x as usize]] != 0 { 255 } else { 0 };
        image::Rgb([value, value, value])
    })
}
