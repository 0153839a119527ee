use super::types::{LabelMap, BACKGROUND, UNKNOWN};
use crate::config::DetectorConfig;
use crate::error::{DetectionError, Result};
use image::{Rgb, RgbImage};

pub const UNKNOWN_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
pub const BACKGROUND_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const INTRUDER_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const BOUNDARY_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Color for a label, with every intruder label clamped to a single color
pub fn label_color(label: i32) -> Rgb<u8> {
    match label {
        l if l < UNKNOWN => BOUNDARY_COLOR,
        UNKNOWN => UNKNOWN_COLOR,
        BACKGROUND => BACKGROUND_COLOR,
        _ => INTRUDER_COLOR,
    }
}

/// Pure label-color grid
#[cfg(test)]
pub fn label_colors(labels: &LabelMap) -> RgbImage {
    let (height, width) = labels.dim();
    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        label_color(labels[[y as usize, x as usize]])
    })
}

/// Blends segmentation colors over the frame for review
pub struct Compositor {
    opacity: f32,
}

impl Compositor {
    pub fn new(config: &DetectorConfig) -> Self {
        Self::with_opacity(config.opacity)
    }

    /// Unvalidated; `opacity` is expected in `[0, 1]`, which
    /// `DetectorConfig::validate` enforces for configured detectors
    pub fn with_opacity(opacity: f32) -> Self {
        Self { opacity }
    }

    /// `frame * (1 - opacity) + color * opacity`, per channel
    pub fn composite(&self, frame: &RgbImage, labels: &LabelMap) -> Result<RgbImage> {
        let _span = tracing::debug_span!("composite").entered();

        let (width, height) = frame.dimensions();
        if labels.dim() != (height as usize, width as usize) {
            return Err(DetectionError::invalid_frame(format!(
                "frame is {}x{} but segmentation is {}x{}",
                width,
                height,
                labels.dim().1,
                labels.dim().0
            )));
        }

        let alpha = self.opacity;
        let beta = 1.0 - alpha;
        Ok(RgbImage::from_fn(width, height, |x, y| {
            let base = frame.get_pixel(x, y);
            let color = label_color(labels[[y as usize, x as usize]]);
            let mut out = [0u8; 3];
            for c in 0..3 {
                let blended = base[c] as f32 * beta + color[c] as f32 * alpha;
                out[c] = blended.round().clamp(0.0, 255.0) as u8;
            }
            Rgb(out)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::types::BOUNDARY;
    use ndarray::array;

    fn sample() -> (RgbImage, LabelMap) {
        let frame = RgbImage::from_fn(3, 2, |x, y| Rgb([(x * 40) as u8, (y * 90) as u8, 77]));
        let labels = array![[1, 2, 7], [BOUNDARY, 1, 2]];
        (frame, labels)
    }

    #[test]
    fn test_label_color_clamps() {
        assert_eq!(label_color(1), BACKGROUND_COLOR);
        assert_eq!(label_color(2), INTRUDER_COLOR);
        assert_eq!(label_color(42), INTRUDER_COLOR);
        assert_eq!(label_color(BOUNDARY), BOUNDARY_COLOR);
        assert_eq!(label_color(0), UNKNOWN_COLOR);
    }

    #[test]
    fn test_zero_opacity_returns_frame() {
        let (frame, labels) = sample();
        let out = Compositor::with_opacity(0.0).composite(&frame, &labels).unwrap();
        assert_eq!(out, frame);
    }

    #[test]
    fn test_full_opacity_returns_colors() {
        let (frame, labels) = sample();
        let out = Compositor::with_opacity(1.0).composite(&frame, &labels).unwrap();
        assert_eq!(out, label_colors(&labels));
    }

    #[test]
    fn test_half_blend() {
        let frame = RgbImage::from_pixel(1, 1, Rgb([100, 100, 100]));
        let out = Compositor::with_opacity(0.5)
            .composite(&frame, &array![[2]])
            .unwrap();
        assert_eq!(out.get_pixel(0, 0).0, [50, 178, 50]);
    }

    #[test]
    fn test_configured_opacity_used_as_given() {
        let compositor = Compositor::new(&DetectorConfig {
            opacity: 0.25,
            ..Default::default()
        });
        let frame = RgbImage::from_pixel(1, 1, Rgb([100, 100, 100]));
        let out = compositor.composite(&frame, &array![[2]]).unwrap();
        assert_eq!(out.get_pixel(0, 0).0, [75, 139, 75]);
    }

    #[test]
    fn test_out_of_range_opacity_rejected_by_config() {
        for opacity in [-0.1, 1.5] {
            let config = DetectorConfig {
                opacity,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "opacity {} accepted", opacity);
        }
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let (frame, _) = sample();
        assert!(Compositor::with_opacity(0.5)
            .composite(&frame, &LabelMap::zeros((3, 3)))
            .is_err());
    }
}
