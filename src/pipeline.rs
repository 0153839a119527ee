use crate::capture::SourceFrame;
use crate::config::DetectorConfig;
use crate::error::{DetectionError, FrameError, Result};
use crate::segmentation::types::FIRST_INTRUDER;
use crate::segmentation::{
    self, make_markers, segment, BackgroundSubtractor, Compositor, LabelMap, Mask, MaskRefiner,
    Preprocessor,
};
use image::RgbImage;
use std::time::{Duration, Instant};

/// Wall-clock time spent in each stage of one frame
#[derive(Debug, Clone, Copy, Default)]
pub struct StageTimings {
    pub preprocess: Duration,
    pub background: Duration,
    pub refine: Duration,
    pub watershed: Duration,
    pub composite: Duration,
}

impl StageTimings {
    pub fn total(&self) -> Duration {
        self.preprocess + self.background + self.refine + self.watershed + self.composite
    }

    pub fn accumulate(&mut self, other: &StageTimings) {
        self.preprocess += other.preprocess;
        self.background += other.background;
        self.refine += other.refine;
        self.watershed += other.watershed;
        self.composite += other.composite;
    }
}

/// Everything produced for one processed frame
#[derive(Debug, Clone)]
pub struct FrameOutput {
    /// Name of the source frame, used to tag exports
    pub name: String,
    /// Resized input, before photometric normalization
    pub original: RgbImage,
    /// Segmentation colors blended over `original`
    pub overlay: RgbImage,
    pub segmentation: LabelMap,
    pub core_mask: Mask,
    /// Number of candidate intruder seeds
    pub intruders: usize,
    pub timings: StageTimings,
}

/// Per-frame detection pipeline
///
/// Owns the background model; `process` takes `&mut self`, so frames are
/// folded into the model one at a time, in the order they are handed in.
pub struct Detector {
    preprocessor: Preprocessor,
    model: Box<dyn BackgroundSubtractor>,
    refiner: MaskRefiner,
    compositor: Compositor,
}

impl Detector {
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_model(config, segmentation::create_default_model(config)))
    }

    /// Build around a caller-supplied background model; `config` must
    /// already be validated
    pub fn with_model(config: &DetectorConfig, model: Box<dyn BackgroundSubtractor>) -> Self {
        Self {
            preprocessor: Preprocessor::new(config),
            model,
            refiner: MaskRefiner::new(config),
            compositor: Compositor::new(config),
        }
    }

    pub fn frames_seen(&self) -> u64 {
        self.model.frames_seen()
    }

    pub fn reset(&mut self) {
        self.model.reset_state();
    }

    /// Run one frame through every stage
    ///
    /// A frame that fails preprocessing never reaches the background model.
    pub fn process(&mut self, frame: &SourceFrame) -> std::result::Result<FrameOutput, FrameError> {
        let _span = tracing::debug_span!("process", frame = %frame.name).entered();
        let tag = |source: DetectionError| FrameError {
            frame: frame.name.clone(),
            source,
        };
        let mut timings = StageTimings::default();

        let start = Instant::now();
        let prepared = self.preprocessor.preprocess(&frame.image).map_err(tag)?;
        timings.preprocess = start.elapsed();

        let start = Instant::now();
        let raw = self.model.apply(&prepared.normalized).map_err(tag)?;
        timings.background = start.elapsed();

        let start = Instant::now();
        let refined = self.refiner.refine(&raw);
        let markers = make_markers(&refined).map_err(tag)?;
        timings.refine = start.elapsed();

        let start = Instant::now();
        let segmentation = segment(&prepared.scaled, &markers.map).map_err(tag)?;
        timings.watershed = start.elapsed();

        let start = Instant::now();
        let overlay = self
            .compositor
            .composite(&prepared.scaled, &segmentation)
            .map_err(tag)?;
        timings.composite = start.elapsed();

        tracing::debug!(
            "{}: {} raw foreground px, {} intruder seed(s) covering {} px",
            frame.name,
            raw.iter().filter(|&&v| v != 0).count(),
            markers.intruders,
            segmentation.iter().filter(|&&l| l >= FIRST_INTRUDER).count()
        );

        Ok(FrameOutput {
            name: frame.name.clone(),
            original: prepared.scaled,
            overlay,
            segmentation,
            core_mask: refined.core,
            intruders: markers.intruders,
            timings,
        })
    }
}
