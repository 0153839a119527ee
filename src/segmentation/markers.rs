use super::morphology::connected_components;
use super::refine::RefinedMasks;
use super::types::{LabelMap, SeedState, BACKGROUND, UNKNOWN};
use crate::error::{DetectionError, Result};
use ndarray::{Array2, Zip};

/// Seed labels for the watershed
#[derive(Debug, Clone, PartialEq)]
pub struct Markers {
    /// 0 = unknown, 1 = background, 2.. = candidate intruders
    pub map: LabelMap,
    /// Number of candidate intruder seeds
    pub intruders: usize,
}

/// Per-pixel seed state from the two refined masks
pub fn seed_states(refined: &RefinedMasks) -> Result<Array2<SeedState>> {
    if refined.expanded.dim() != refined.core.dim() {
        return Err(DetectionError::invalid_frame(format!(
            "expanded mask is {:?} but core mask is {:?}",
            refined.expanded.dim(),
            refined.core.dim()
        )));
    }
    Ok(Zip::from(&refined.expanded)
        .and(&refined.core)
        .map_collect(|&expanded, &core| SeedState::classify(expanded, core)))
}

/// Build the marker map
///
/// Core blobs are labelled with 8-connectivity and shifted up by one so
/// that background becomes 1 and intruders start at 2. Pixels in the
/// unknown band (expanded but not core) are set to 0.
pub fn make_markers(refined: &RefinedMasks) -> Result<Markers> {
    let _span = tracing::debug_span!("markers").entered();

    let states = seed_states(refined)?;
    let (components, intruders) = connected_components(&refined.core);

    let map = Zip::from(&states)
        .and(&components)
        .map_collect(|state, &component| match state {
            SeedState::Background => BACKGROUND,
            SeedState::Core => component + BACKGROUND,
            SeedState::Unresolved => UNKNOWN,
        });

    Ok(Markers { map, intruders })
}
