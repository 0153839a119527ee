mod background;
mod composite;
mod markers;
pub mod morphology;
mod preprocess;
mod refine;
pub mod types;
mod watershed;

pub use background::{GaussianMixture, MAX_MIXTURES};
pub use composite::Compositor;
pub use markers::make_markers;
pub use preprocess::Preprocessor;
pub use refine::MaskRefiner;
pub use types::{BackgroundSubtractor, LabelMap, Mask};
pub use watershed::segment;

use crate::config::DetectorConfig;

/// Create the default background model (Gaussian mixture)
pub fn create_default_model(config: &DetectorConfig) -> Box<dyn BackgroundSubtractor> {
    Box::new(GaussianMixture::new(config))
}
