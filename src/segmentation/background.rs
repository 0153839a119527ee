use super::types::{BackgroundSubtractor, Mask};
use crate::config::DetectorConfig;
use crate::error::{DetectionError, Result};
use image::RgbImage;
use ndarray::Array2;

/// Upper bound on Gaussian components per pixel
pub const MAX_MIXTURES: usize = 8;

// Squared Mahalanobis distance under which an observation updates a component
const VAR_THRESHOLD_GEN: f32 = 9.0;
const VAR_INIT: f32 = 15.0;
const VAR_MIN: f32 = 4.0;
const VAR_MAX: f32 = 5.0 * VAR_INIT;
// Complexity reduction prior: components whose weight drops below
// alpha * CT are discarded
const COMPLEXITY_REDUCTION: f32 = 0.05;

/// One weighted Gaussian with a diagonal covariance over RGB
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Component {
    pub weight: f32,
    pub mean: [f32; 3],
    pub variance: [f32; 3],
}

impl Component {
    fn new(sample: [f32; 3], weight: f32) -> Self {
        Self {
            weight,
            mean: sample,
            variance: [VAR_INIT; 3],
        }
    }

    /// Squared Mahalanobis distance of a sample
    fn distance2(&self, sample: &[f32; 3]) -> f32 {
        (0..3)
            .map(|c| {
                let diff = sample[c] - self.mean[c];
                diff * diff / self.variance[c]
            })
            .sum()
    }

    /// Pull mean and variance toward a sample at rate `k`
    fn absorb(&mut self, sample: &[f32; 3], k: f32) {
        for c in 0..3 {
            let diff = sample[c] - self.mean[c];
            self.mean[c] += k * diff;
            let var = self.variance[c] + k * (diff * diff - self.variance[c]);
            self.variance[c] = var.clamp(VAR_MIN, VAR_MAX);
        }
    }
}

/// Mixture state of a single pixel, components sorted by descending weight
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PixelMixture {
    components: [Component; MAX_MIXTURES],
    modes: usize,
}

struct UpdateParams {
    alpha: f32,
    var_threshold: f32,
    background_ratio: f32,
    max_modes: usize,
}

impl PixelMixture {
    pub fn components(&self) -> &[Component] {
        &self.components[..self.modes]
    }

    /// Fold a sample into the mixture and report whether it is foreground
    fn update(&mut self, sample: [f32; 3], params: &UpdateParams) -> bool {
        let alpha = params.alpha;
        let prune = alpha * COMPLEXITY_REDUCTION;

        let mut background = false;
        let mut matched = false;
        let mut cumulative = 0.0;

        for component in self.components[..self.modes].iter_mut() {
            component.weight = (1.0 - alpha) * component.weight - prune;

            if !matched {
                let dist2 = component.distance2(&sample);
                if cumulative < params.background_ratio && dist2 < params.var_threshold {
                    background = true;
                }
                if dist2 < VAR_THRESHOLD_GEN {
                    matched = true;
                    component.weight += alpha;
                    let k = alpha / component.weight;
                    component.absorb(&sample, k);
                }
            }

            cumulative += component.weight.max(0.0);
        }

        self.discard_below(prune);
        self.normalize();

        if !matched {
            self.insert(Component::new(sample, alpha), params.max_modes);
        }

        self.sort();
        !background
    }

    /// Drop components whose weight fell under `floor`, keeping order
    fn discard_below(&mut self, floor: f32) {
        let mut kept = 0;
        for i in 0..self.modes {
            if self.components[i].weight >= floor {
                self.components[kept] = self.components[i];
                kept += 1;
            }
        }
        self.modes = kept;
    }

    fn normalize(&mut self) {
        let total: f32 = self.components().iter().map(|c| c.weight).sum();
        if total > 0.0 {
            for component in self.components[..self.modes].iter_mut() {
                component.weight /= total;
            }
        }
    }

    /// Add a fresh component, replacing the weakest when full
    fn insert(&mut self, mut component: Component, max_modes: usize) {
        if self.modes == max_modes {
            self.modes -= 1;
            self.normalize();
        }
        if self.modes == 0 {
            component.weight = 1.0;
        } else {
            let keep = 1.0 - component.weight;
            for existing in self.components[..self.modes].iter_mut() {
                existing.weight *= keep;
            }
        }
        self.components[self.modes] = component;
        self.modes += 1;
    }

    // Insertion sort; at most MAX_MIXTURES entries and nearly sorted already
    fn sort(&mut self) {
        for i in 1..self.modes {
            let mut j = i;
            while j > 0 && self.components[j].weight > self.components[j - 1].weight {
                self.components.swap(j, j - 1);
                j -= 1;
            }
        }
    }
}

/// Adaptive Gaussian mixture background model
///
/// Each pixel carries up to `mixtures` weighted Gaussians. A pixel is
/// background when it lies within the variance threshold of a component
/// whose predecessors have not yet used up `background_ratio` of the total
/// weight. Weights decay by `1 - alpha` every frame, with
/// `alpha = 1 / min(2n, history)` on the n-th frame, so the model learns
/// quickly during warm-up and then remembers roughly `history` frames.
///
/// Shadows are not modelled separately; the decision is strictly binary.
pub struct GaussianMixture {
    history: u32,
    mixtures: usize,
    var_threshold: f32,
    background_ratio: f32,

    // Flat per-pixel state, indexed y * width + x
    pixels: Vec<PixelMixture>,
    width: u32,
    height: u32,
    frames: u64,
}

impl GaussianMixture {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            history: config.history,
            mixtures: config.mixtures.min(MAX_MIXTURES),
            var_threshold: config.var_threshold,
            background_ratio: config.background_ratio,
            pixels: Vec::new(),
            width: 0,
            height: 0,
            frames: 0,
        }
    }

    /// Learning rate used for the upcoming frame
    pub fn learning_rate(&self) -> f32 {
        let n = self.frames + 1;
        1.0 / (2 * n).min(self.history as u64) as f32
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> Option<&PixelMixture> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(y as usize * self.width as usize + x as usize)
    }

    fn init_state(&mut self, width: u32, height: u32) {
        if !self.pixels.is_empty() {
            tracing::info!(
                "Frame size changed from {}x{} to {}x{}, reinitializing background model",
                self.width,
                self.height,
                width,
                height
            );
        } else {
            tracing::debug!("Initializing background model at {}x{}", width, height);
        }
        self.width = width;
        self.height = height;
        self.pixels = vec![PixelMixture::default(); width as usize * height as usize];
        self.frames = 0;
    }
}

impl BackgroundSubtractor for GaussianMixture {
    fn apply(&mut self, frame: &RgbImage) -> Result<Mask> {
        let _span = tracing::debug_span!("background_model").entered();

        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectionError::invalid_frame("empty frame"));
        }
        if self.pixels.is_empty() || (width, height) != (self.width, self.height) {
            self.init_state(width, height);
        }

        let params = UpdateParams {
            alpha: self.learning_rate(),
            var_threshold: self.var_threshold,
            background_ratio: self.background_ratio,
            max_modes: self.mixtures,
        };

        let mut mask = Array2::<u8>::zeros((height as usize, width as usize));
        for ((x, y, pixel), mixture) in frame.enumerate_pixels().zip(self.pixels.iter_mut()) {
            let sample = [pixel[0] as f32, pixel[1] as f32, pixel[2] as f32];
            if mixture.update(sample, &params) {
                mask[[y as usize, x as usize]] = 1;
            }
        }

        self.frames += 1;
        Ok(mask)
    }

    fn reset_state(&mut self) {
        tracing::info!("Resetting background model");
        self.pixels.clear();
        self.width = 0;
        self.height = 0;
        self.frames = 0;
    }

    fn frames_seen(&self) -> u64 {
        self.frames
    }
}
