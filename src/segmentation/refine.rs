use super::morphology::{dilate, distance_transform, erode};
use super::types::{DistanceField, Mask};
use crate::config::{CoreThreshold, DetectorConfig};
use crate::error::{DetectionError, Result};

/// Generous and conservative views of a raw foreground mask
#[derive(Debug, Clone, PartialEq)]
pub struct RefinedMasks {
    /// Raw mask grown by repeated dilation; bounds the unknown band
    pub expanded: Mask,
    /// Distance-thresholded and eroded blob interiors
    pub core: Mask,
}

/// Morphological cleanup of the background model's raw mask
pub struct MaskRefiner {
    kernel_size: usize,
    dilate_iterations: u32,
    erode_iterations: u32,
    threshold: CoreThreshold,
}

impl MaskRefiner {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            kernel_size: config.kernel_size as usize,
            dilate_iterations: config.dilate_iterations,
            erode_iterations: config.erode_iterations,
            threshold: config.core_threshold,
        }
    }

    pub fn refine(&self, raw: &Mask) -> RefinedMasks {
        let _span = tracing::debug_span!("refine").entered();

        let expanded = dilate(raw, self.kernel_size, self.dilate_iterations);
        let distance = distance_transform(raw);

        let core = match core_cutoff(&distance, self.threshold) {
            Ok(cutoff) => {
                let thresholded = distance.mapv(|d| u8::from(d > cutoff));
                erode(&thresholded, self.kernel_size, self.erode_iterations)
            }
            Err(err) => {
                tracing::debug!("{}, core is empty", err);
                Mask::zeros(raw.dim())
            }
        };

        RefinedMasks { expanded, core }
    }
}

/// Distance above which a pixel belongs to the core
///
/// Fails with `DegenerateMask` when the field is zero everywhere.
pub fn core_cutoff(distance: &DistanceField, threshold: CoreThreshold) -> Result<f32> {
    let max = distance.iter().copied().fold(0.0f32, f32::max);
    if max <= 0.0 {
        return Err(DetectionError::DegenerateMask);
    }
    Ok(match threshold {
        CoreThreshold::Relative(fraction) => fraction * max,
        CoreThreshold::Absolute(cutoff) => cutoff,
    })
}
