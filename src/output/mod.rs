mod export;

pub use export::ExportWriter;

use crate::pipeline::FrameOutput;
use anyhow::Result;

/// Trait for output destinations
pub trait OutputSink {
    /// Hand off one processed frame
    fn write_frame(&mut self, output: &FrameOutput) -> Result<()>;
}
