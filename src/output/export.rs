use super::OutputSink;
use crate::pipeline::FrameOutput;
use crate::segmentation::types::mask_to_rgb;
use anyhow::{Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

const OVERLAY_DIR: &str = "WatershedOp";
const ORIGINAL_DIR: &str = "OriginalImg";
const MASK_DIR: &str = "Masks";

/// Writes overlay/original pairs (and optionally core masks) as image files
///
/// Layout under the root:
/// - `WatershedOp/op_<name>`
/// - `OriginalImg/origin_<name>`
/// - `Masks/mask_<stem>.png`
pub struct ExportWriter {
    root: PathBuf,
    save_masks: bool,
}

impl ExportWriter {
    pub fn new<P: AsRef<Path>>(root: P, save_masks: bool) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            save_masks,
        }
    }

    pub fn overlay_path(&self, name: &str) -> PathBuf {
        self.root.join(OVERLAY_DIR).join(format!("op_{}", name))
    }

    pub fn original_path(&self, name: &str) -> PathBuf {
        self.root.join(ORIGINAL_DIR).join(format!("origin_{}", name))
    }

    pub fn mask_path(&self, name: &str) -> PathBuf {
        let stem = Path::new(name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());
        self.root.join(MASK_DIR).join(format!("mask_{}.png", stem))
    }
}

fn save(image: &RgbImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    image
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))
}

impl OutputSink for ExportWriter {
    fn write_frame(&mut self, output: &FrameOutput) -> Result<()> {
        let overlay_path = self.overlay_path(&output.name);
        save(&output.overlay, &overlay_path)?;
        save(&output.original, &self.original_path(&output.name))?;
        if self.save_masks {
            save(&mask_to_rgb(&output.core_mask), &self.mask_path(&output.name))?;
        }

        tracing::info!("Saved output to {}", overlay_path.display());
        Ok(())
    }
}
