use crate::config::DetectorConfig;
use crate::error::{DetectionError, Result};
use image::{imageops, GrayImage, Luma, Rgb, RgbImage};
use imageproc::filter::{box_filter, median_filter};
use ndarray::Array2;

/// A frame after resizing, and the photometrically normalized copy the
/// background model consumes
#[derive(Debug, Clone)]
pub struct PreparedFrame {
    /// Resized but otherwise untouched; watershed and overlay use this
    pub scaled: RgbImage,
    /// Luminance-smoothed and median-filtered
    pub normalized: RgbImage,
}

/// Photometric normalization of raw frames
pub struct Preprocessor {
    resize_factor: f32,
    luma_blur: u32,
    luma_blur_passes: u32,
    median_blur: u32,
}

impl Preprocessor {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            resize_factor: config.resize_factor,
            luma_blur: config.luma_blur,
            luma_blur_passes: config.luma_blur_passes,
            median_blur: config.median_blur,
        }
    }

    /// Dimensions a frame of the given size is resized to
    pub fn scaled_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        (
            (width as f32 * self.resize_factor) as u32,
            (height as f32 * self.resize_factor) as u32,
        )
    }

    /// Preprocess a raw frame before statistical comparison
    ///
    /// Steps:
    /// 1. Resize by the configured factor
    /// 2. Convert to CIE L*a*b*
    /// 3. Box-blur the 8-bit L channel (twice by default), leaving chrominance alone
    /// 4. Convert back to RGB
    /// 5. Median-filter all channels
    ///
    /// Frames whose resized size is smaller than a blur kernel are rejected.
    pub fn preprocess(&self, image: &RgbImage) -> Result<PreparedFrame> {
        let _span = tracing::debug_span!("preprocess").entered();

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectionError::invalid_frame(format!(
                "empty frame ({}x{})",
                width, height
            )));
        }

        let (target_width, target_height) = self.scaled_dimensions(width, height);
        let kernel = self.luma_blur.max(self.median_blur);
        if target_width < kernel || target_height < kernel {
            return Err(DetectionError::invalid_frame(format!(
                "{}x{} frame resizes to {}x{}, smaller than the {}px blur kernel",
                width, height, target_width, target_height, kernel
            )));
        }

        let scaled = if (target_width, target_height) != (width, height) {
            imageops::resize(
                image,
                target_width,
                target_height,
                imageops::FilterType::Triangle,
            )
        } else {
            image.clone()
        };

        let (lightness, a, b) = split_lab(&scaled);
        let lightness = smooth_lightness(&lightness, self.luma_blur, self.luma_blur_passes);
        let smoothed = merge_lab(&lightness, &a, &b);
        let normalized = median_blur(&smoothed, self.median_blur);

        Ok(PreparedFrame { scaled, normalized })
    }
}

// sRGB (D65) <-> CIE L*a*b*
const WHITE_X: f32 = 0.950456;
const WHITE_Z: f32 = 1.088754;
const LAB_EPSILON: f32 = 0.008856;
const LAB_KAPPA: f32 = 903.3;

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn lab_f(t: f32) -> f32 {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

fn lab_f_inv(f: f32) -> f32 {
    let cube = f * f * f;
    if cube > LAB_EPSILON {
        cube
    } else {
        (f - 16.0 / 116.0) / 7.787
    }
}

pub(crate) fn rgb_to_lab(rgb: [u8; 3]) -> [f32; 3] {
    let r = srgb_to_linear(rgb[0] as f32 / 255.0);
    let g = srgb_to_linear(rgb[1] as f32 / 255.0);
    let b = srgb_to_linear(rgb[2] as f32 / 255.0);

    let x = (0.412_453 * r + 0.357_580 * g + 0.180_423 * b) / WHITE_X;
    let y = 0.212_671 * r + 0.715_160 * g + 0.072_169 * b;
    let z = (0.019_334 * r + 0.119_193 * g + 0.950_227 * b) / WHITE_Z;

    let (fx, fy, fz) = (lab_f(x), lab_f(y), lab_f(z));
    let l = if y > LAB_EPSILON {
        116.0 * fy - 16.0
    } else {
        LAB_KAPPA * y
    };

    [l, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

pub(crate) fn lab_to_rgb(lab: [f32; 3]) -> [u8; 3] {
    let [l, a, b] = lab;
    let y = if l > LAB_KAPPA * LAB_EPSILON {
        ((l + 16.0) / 116.0).powi(3)
    } else {
        l / LAB_KAPPA
    };
    let fy = lab_f(y);
    let x = lab_f_inv(a / 500.0 + fy) * WHITE_X;
    let z = lab_f_inv(fy - b / 200.0) * WHITE_Z;

    let r = 3.240_479 * x - 1.537_150 * y - 0.498_535 * z;
    let g = -0.969_256 * x + 1.875_991 * y + 0.041_556 * z;
    let b = 0.055_648 * x - 0.204_043 * y + 1.057_311 * z;

    let to_u8 = |c: f32| {
        (linear_to_srgb(c.clamp(0.0, 1.0)) * 255.0)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    [to_u8(r), to_u8(g), to_u8(b)]
}

// L* (0..=100) stored on the 8-bit 0..=255 scale
fn encode_lightness(l: f32) -> u8 {
    (l * 255.0 / 100.0).round().clamp(0.0, 255.0) as u8
}

fn decode_lightness(v: u8) -> f32 {
    v as f32 * 100.0 / 255.0
}

fn split_lab(image: &RgbImage) -> (GrayImage, Array2<f32>, Array2<f32>) {
    let (width, height) = image.dimensions();
    let shape = (height as usize, width as usize);
    let mut l = GrayImage::new(width, height);
    let mut a = Array2::<f32>::zeros(shape);
    let mut b = Array2::<f32>::zeros(shape);

    for (x, y, pixel) in image.enumerate_pixels() {
        let lab = rgb_to_lab(pixel.0);
        let idx = [y as usize, x as usize];
        l.put_pixel(x, y, Luma([encode_lightness(lab[0])]));
        a[idx] = lab[1];
        b[idx] = lab[2];
    }

    (l, a, b)
}

fn merge_lab(l: &GrayImage, a: &Array2<f32>, b: &Array2<f32>) -> RgbImage {
    RgbImage::from_fn(l.width(), l.height(), |x, y| {
        let idx = [y as usize, x as usize];
        let lightness = decode_lightness(l.get_pixel(x, y)[0]);
        Rgb(lab_to_rgb([lightness, a[idx], b[idx]]))
    })
}

/// `passes` rounds of a normalized `ksize` x `ksize` box filter
pub fn smooth_lightness(lightness: &GrayImage, ksize: u32, passes: u32) -> GrayImage {
    let mut out = lightness.clone();
    if ksize <= 1 {
        return out;
    }
    let radius = ksize / 2;
    for _ in 0..passes {
        out = box_filter(&out, radius, radius);
    }
    out
}

/// Per-channel median over a `ksize` x `ksize` window
pub fn median_blur(image: &RgbImage, ksize: u32) -> RgbImage {
    if ksize <= 1 {
        return image.clone();
    }
    let radius = ksize / 2;
    median_filter(image, radius, radius)
}
