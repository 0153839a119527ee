use crate::error::{DetectionError, Result};
use crate::segmentation::MAX_MIXTURES;

pub const DEFAULT_RESIZE_FACTOR: f32 = 0.3;
pub const DEFAULT_HISTORY: u32 = 20;
pub const DEFAULT_MIXTURES: usize = 5;
pub const DEFAULT_VAR_THRESHOLD: f32 = 16.0;
pub const DEFAULT_BACKGROUND_RATIO: f32 = 0.9;
pub const DEFAULT_LUMA_BLUR: u32 = 21;
pub const DEFAULT_LUMA_BLUR_PASSES: u32 = 2;
pub const DEFAULT_MEDIAN_BLUR: u32 = 7;
pub const DEFAULT_KERNEL_SIZE: u32 = 7;
pub const DEFAULT_DILATE_ITERATIONS: u32 = 3;
pub const DEFAULT_ERODE_ITERATIONS: u32 = 1;
pub const DEFAULT_CORE_FRACTION: f32 = 0.65;
pub const DEFAULT_OPACITY: f32 = 0.5;

/// How the distance field is cut into the core mask
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoreThreshold {
    /// Fraction of the current frame's maximum distance
    Relative(f32),
    /// Fixed distance in pixels
    Absolute(f32),
}

/// Tunable constants for every stage of the detector
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    /// Scale applied to each frame before anything else
    pub resize_factor: f32,
    /// Box-blur kernel for the luminance channel
    pub luma_blur: u32,
    pub luma_blur_passes: u32,
    /// Median kernel applied to all channels
    pub median_blur: u32,
    /// Number of frames the background model effectively remembers
    pub history: u32,
    /// Gaussian components per pixel
    pub mixtures: usize,
    /// Squared Mahalanobis distance under which a pixel matches the background
    pub var_threshold: f32,
    /// Cumulative component weight that counts as background
    pub background_ratio: f32,
    /// Side of the square structuring element
    pub kernel_size: u32,
    pub dilate_iterations: u32,
    pub erode_iterations: u32,
    pub core_threshold: CoreThreshold,
    /// Weight of the label colors when blending the overlay
    pub opacity: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            resize_factor: DEFAULT_RESIZE_FACTOR,
            luma_blur: DEFAULT_LUMA_BLUR,
            luma_blur_passes: DEFAULT_LUMA_BLUR_PASSES,
            median_blur: DEFAULT_MEDIAN_BLUR,
            history: DEFAULT_HISTORY,
            mixtures: DEFAULT_MIXTURES,
            var_threshold: DEFAULT_VAR_THRESHOLD,
            background_ratio: DEFAULT_BACKGROUND_RATIO,
            kernel_size: DEFAULT_KERNEL_SIZE,
            dilate_iterations: DEFAULT_DILATE_ITERATIONS,
            erode_iterations: DEFAULT_ERODE_ITERATIONS,
            core_threshold: CoreThreshold::Relative(DEFAULT_CORE_FRACTION),
            opacity: DEFAULT_OPACITY,
        }
    }
}

impl DetectorConfig {
    /// Reject values that leave any stage mathematically undefined
    pub fn validate(&self) -> Result<()> {
        if !self.resize_factor.is_finite() || self.resize_factor <= 0.0 {
            return Err(DetectionError::config(
                "resize_factor",
                format!("must be a positive number, got {}", self.resize_factor),
            ));
        }
        if self.history == 0 {
            return Err(DetectionError::config("history", "must be at least 1"));
        }
        if self.mixtures == 0 || self.mixtures > MAX_MIXTURES {
            return Err(DetectionError::config(
                "mixtures",
                format!("must lie in 1..={}, got {}", MAX_MIXTURES, self.mixtures),
            ));
        }
        if !self.var_threshold.is_finite() || self.var_threshold <= 0.0 {
            return Err(DetectionError::config(
                "var_threshold",
                format!("must be positive, got {}", self.var_threshold),
            ));
        }
        if !(self.background_ratio > 0.0 && self.background_ratio <= 1.0) {
            return Err(DetectionError::config(
                "background_ratio",
                format!("must lie in (0, 1], got {}", self.background_ratio),
            ));
        }

        check_kernel("luma_blur", self.luma_blur)?;
        check_kernel("median_blur", self.median_blur)?;
        check_kernel("kernel_size", self.kernel_size)?;

        match self.core_threshold {
            CoreThreshold::Relative(fraction) => {
                if !(0.0..1.0).contains(&fraction) {
                    return Err(DetectionError::config(
                        "core_fraction",
                        format!("must lie in [0, 1), got {}", fraction),
                    ));
                }
            }
            CoreThreshold::Absolute(distance) => {
                if !distance.is_finite() || distance < 0.0 {
                    return Err(DetectionError::config(
                        "core_distance",
                        format!("must be a non-negative distance, got {}", distance),
                    ));
                }
            }
        }

        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(DetectionError::config(
                "opacity",
                format!("must lie in [0, 1], got {}", self.opacity),
            ));
        }

        Ok(())
    }
}

fn check_kernel(field: &'static str, size: u32) -> Result<()> {
    if size == 0 {
        return Err(DetectionError::config(field, "kernel size must be at least 1"));
    }
    if size % 2 == 0 {
        return Err(DetectionError::config(
            field,
            format!("kernel size must be odd, got {}", size),
        ));
    }
    Ok(())
}
