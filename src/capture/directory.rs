use super::{FrameSource, SourceFrame};
use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Still frames read from a directory, in file-name order
pub struct ImageDirectory {
    pending: VecDeque<PathBuf>,
}

impl ImageDirectory {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        tracing::info!("Scanning {} for frames", dir.display());

        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read frame directory {}", dir.display()))?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry
                .with_context(|| format!("Failed to list frame directory {}", dir.display()))?;
            let path = entry.path();
            if path.is_file() && is_image(&path) {
                paths.push(path);
            }
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        tracing::info!("Found {} frame(s)", paths.len());

        Ok(Self {
            pending: paths.into(),
        })
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

impl FrameSource for ImageDirectory {
    fn next_frame(&mut self) -> Result<Option<SourceFrame>> {
        let Some(path) = self.pending.pop_front() else {
            return Ok(None);
        };

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let image = image::open(&path)
            .with_context(|| format!("Failed to decode frame {}", path.display()))?
            .to_rgb8();

        Ok(Some(SourceFrame { name, image }))
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.pending.len())
    }
}
