mod capture;
mod commands;
mod config;
mod error;
mod output;
mod pipeline;
mod segmentation;

use anyhow::{Context, Result};
use capture::{FrameSource, ImageDirectory};
use clap::Parser;
use commands::{Command, CommandChannel};
use config::{CoreThreshold, DetectorConfig};
use output::{ExportWriter, OutputSink};
use pipeline::{Detector, FrameOutput, StageTimings};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory of still frames (jpg/png), processed in name order
    input_dir: PathBuf,

    /// Root directory for exported frames
    #[arg(short, long, default_value = "Output")]
    output_dir: PathBuf,

    /// Scale applied to every frame before detection
    #[arg(long, default_value_t = config::DEFAULT_RESIZE_FACTOR)]
    resize_factor: f32,

    /// Background model history length in frames
    #[arg(long, default_value_t = config::DEFAULT_HISTORY)]
    history: u32,

    /// Gaussian components per pixel
    #[arg(long, default_value_t = config::DEFAULT_MIXTURES)]
    mixtures: usize,

    /// Squared Mahalanobis distance for a background match
    #[arg(long, default_value_t = config::DEFAULT_VAR_THRESHOLD)]
    var_threshold: f32,

    /// Cumulative component weight that counts as background
    #[arg(long, default_value_t = config::DEFAULT_BACKGROUND_RATIO)]
    background_ratio: f32,

    /// Luminance box-blur kernel size
    #[arg(long, default_value_t = config::DEFAULT_LUMA_BLUR)]
    luma_blur: u32,

    /// Number of luminance blur passes
    #[arg(long, default_value_t = config::DEFAULT_LUMA_BLUR_PASSES)]
    luma_blur_passes: u32,

    /// Median blur kernel size
    #[arg(long, default_value_t = config::DEFAULT_MEDIAN_BLUR)]
    median_blur: u32,

    /// Side of the square structuring element
    #[arg(long, default_value_t = config::DEFAULT_KERNEL_SIZE)]
    kernel_size: u32,

    /// Dilations applied to the raw foreground mask
    #[arg(long, default_value_t = config::DEFAULT_DILATE_ITERATIONS)]
    dilate_iterations: u32,

    /// Erosions applied to the core mask
    #[arg(long, default_value_t = config::DEFAULT_ERODE_ITERATIONS)]
    erode_iterations: u32,

    /// Core threshold as a fraction of the largest distance in the frame
    #[arg(long, default_value_t = config::DEFAULT_CORE_FRACTION)]
    core_fraction: f32,

    /// Core threshold as a fixed distance in pixels (overrides --core-fraction)
    #[arg(long)]
    core_distance: Option<f32>,

    /// Overlay opacity of the segmentation colors
    #[arg(long, default_value_t = config::DEFAULT_OPACITY)]
    opacity: f32,

    /// Export every processed frame
    #[arg(long)]
    save_all: bool,

    /// Also export the core mask of each saved frame
    #[arg(long)]
    save_masks: bool,

    /// Read commands from stdin (s = save, r = reset, q = quit)
    #[arg(short, long)]
    interactive: bool,

    /// Pause between frames, in milliseconds
    #[arg(long, default_value_t = 0)]
    frame_delay_ms: u64,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn detector_config(&self) -> DetectorConfig {
        let core_threshold = match self.core_distance {
            Some(distance) => CoreThreshold::Absolute(distance),
            None => CoreThreshold::Relative(self.core_fraction),
        };
        DetectorConfig {
            resize_factor: self.resize_factor,
            luma_blur: self.luma_blur,
            luma_blur_passes: self.luma_blur_passes,
            median_blur: self.median_blur,
            history: self.history,
            mixtures: self.mixtures,
            var_threshold: self.var_threshold,
            background_ratio: self.background_ratio,
            kernel_size: self.kernel_size,
            dilate_iterations: self.dilate_iterations,
            erode_iterations: self.erode_iterations,
            core_threshold,
            opacity: self.opacity,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let config = args.detector_config();

    tracing::info!("intruder-watch starting");
    tracing::info!("Input: {}", args.input_dir.display());
    tracing::info!("Output: {}", args.output_dir.display());
    tracing::info!(
        "Resize factor: {}, history: {}, mixtures: {}",
        config.resize_factor,
        config.history,
        config.mixtures
    );
    tracing::info!("Core threshold: {:?}", config.core_threshold);

    let mut detector = Detector::new(&config).context("Invalid detector configuration")?;

    let mut source = ImageDirectory::new(&args.input_dir)
        .with_context(|| format!("Failed to open input directory {}", args.input_dir.display()))?;
    if source.len_hint() == Some(0) {
        tracing::warn!("No images found in {}", args.input_dir.display());
    }

    let mut writer = ExportWriter::new(&args.output_dir, args.save_masks);

    let commands = if args.interactive {
        tracing::info!("Type s + Enter to save, r to reset the background, q to quit");
        Some(CommandChannel::stdin())
    } else {
        None
    };

    let options = RunOptions {
        save_all: args.save_all,
        frame_delay: Duration::from_millis(args.frame_delay_ms),
    };

    let processed = run_pipeline(
        &mut source,
        &mut detector,
        &mut writer,
        commands.as_ref(),
        &options,
    )?;

    tracing::info!("Finished: {} frame(s) processed", processed);

    Ok(())
}

struct RunOptions {
    save_all: bool,
    frame_delay: Duration,
}

/// Feed every frame through the detector and return the number processed
fn run_pipeline<S, O>(
    source: &mut S,
    detector: &mut Detector,
    output: &mut O,
    commands: Option<&CommandChannel>,
    options: &RunOptions,
) -> Result<u64>
where
    S: FrameSource,
    O: OutputSink,
{
    let mut frame_count = 0u64;
    let mut totals = StageTimings::default();
    let mut last: Option<FrameOutput> = None;

    tracing::info!("Starting detection loop");

    loop {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Skipping unreadable frame: {:#}", e);
                continue;
            }
        };

        match detector.process(&frame) {
            Ok(result) => {
                frame_count += 1;
                totals.accumulate(&result.timings);
                tracing::debug!(
                    "{}: {} intruder region(s) in {:.1}ms",
                    result.name,
                    result.intruders,
                    result.timings.total().as_secs_f64() * 1000.0
                );

                if options.save_all {
                    output
                        .write_frame(&result)
                        .context("Failed to export frame")?;
                }
                last = Some(result);

                // Log stats every 30 frames
                if frame_count % 30 == 0 {
                    log_averages(frame_count, &totals);
                }
            }
            Err(e) => tracing::warn!("Skipping {}", e),
        }

        // Commands only take effect between frames
        let mut quit = false;
        for command in commands.map(CommandChannel::drain).unwrap_or_default() {
            match command {
                Command::Save => match &last {
                    Some(result) if !options.save_all => output
                        .write_frame(result)
                        .context("Failed to export frame")?,
                    Some(_) => tracing::info!("Frame already exported"),
                    None => tracing::warn!("Nothing to save yet"),
                },
                Command::Reset => detector.reset(),
                Command::Quit => quit = true,
            }
        }
        if quit {
            tracing::info!("Quit requested");
            break;
        }

        if !options.frame_delay.is_zero() {
            std::thread::sleep(options.frame_delay);
        }
    }

    Ok(frame_count)
}

fn log_averages(frame_count: u64, totals: &StageTimings) {
    let avg_ms = |total: Duration| total.as_secs_f64() * 1000.0 / frame_count as f64;
    let total_ms = avg_ms(totals.total());
    tracing::info!(
        "Frame {}: preprocess={:.1}ms, background={:.1}ms, refine={:.1}ms, watershed={:.1}ms, composite={:.1}ms, total={:.1}ms, fps={:.1}",
        frame_count,
        avg_ms(totals.preprocess),
        avg_ms(totals.background),
        avg_ms(totals.refine),
        avg_ms(totals.watershed),
        avg_ms(totals.composite),
        total_ms,
        1000.0 / total_ms.max(f64::EPSILON)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use capture::SourceFrame;
    use image::{Rgb, RgbImage};
    use std::collections::VecDeque;
    use std::sync::mpsc;

    struct VecSource {
        frames: VecDeque<Result<SourceFrame>>,
    }

    impl VecSource {
        fn gray(count: usize, size: u32) -> Self {
            let frames = (0..count)
                .map(|i| {
                    Ok(SourceFrame {
                        name: format!("{i:03}.png"),
                        image: RgbImage::from_pixel(size, size, Rgb([90, 90, 90])),
                    })
                })
                .collect();
            Self { frames }
        }
    }

    impl FrameSource for VecSource {
        fn next_frame(&mut self) -> Result<Option<SourceFrame>> {
            self.frames.pop_front().transpose()
        }

        fn len_hint(&self) -> Option<usize> {
            Some(self.frames.len())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        names: Vec<String>,
    }

    impl OutputSink for RecordingSink {
        fn write_frame(&mut self, output: &FrameOutput) -> Result<()> {
            self.names.push(output.name.clone());
            Ok(())
        }
    }

    fn options(save_all: bool) -> RunOptions {
        RunOptions {
            save_all,
            frame_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["intruder-watch", "frames"]);
        assert_eq!(args.input_dir, PathBuf::from("frames"));
        assert_eq!(args.output_dir, PathBuf::from("Output"));
        assert_eq!(args.detector_config(), DetectorConfig::default());
    }

    #[test]
    fn test_core_distance_overrides_fraction() {
        let args = Args::parse_from([
            "intruder-watch",
            "frames",
            "--core-fraction",
            "0.4",
            "--core-distance",
            "3.5",
        ]);
        assert_eq!(
            args.detector_config().core_threshold,
            CoreThreshold::Absolute(3.5)
        );
    }

    #[test]
    fn test_save_all_exports_every_frame() {
        let mut source = VecSource::gray(4, 100);
        let mut detector = Detector::new(&DetectorConfig::default()).unwrap();
        let mut sink = RecordingSink::default();

        let processed =
            run_pipeline(&mut source, &mut detector, &mut sink, None, &options(true)).unwrap();
        assert_eq!(processed, 4);
        assert_eq!(sink.names, ["000.png", "001.png", "002.png", "003.png"]);
    }

    #[test]
    fn test_bad_frames_are_skipped() {
        let mut source = VecSource::gray(3, 100);
        source.frames.insert(1, Err(anyhow::anyhow!("corrupt")));
        source.frames.insert(
            2,
            Ok(SourceFrame {
                name: "tiny.png".to_string(),
                image: RgbImage::from_pixel(4, 4, Rgb([0, 0, 0])),
            }),
        );
        let mut detector = Detector::new(&DetectorConfig::default()).unwrap();
        let mut sink = RecordingSink::default();

        let processed =
            run_pipeline(&mut source, &mut detector, &mut sink, None, &options(true)).unwrap();
        assert_eq!(processed, 3);
        assert_eq!(detector.frames_seen(), 3);
        assert_eq!(sink.names, ["000.png", "001.png", "002.png"]);
    }

    #[test]
    fn test_save_then_quit_between_frames() {
        let (tx, rx) = mpsc::channel();
        let commands = CommandChannel::from_receiver(rx);
        tx.send(Command::Save).unwrap();
        tx.send(Command::Quit).unwrap();

        let mut source = VecSource::gray(5, 100);
        let mut detector = Detector::new(&DetectorConfig::default()).unwrap();
        let mut sink = RecordingSink::default();

        let processed = run_pipeline(
            &mut source,
            &mut detector,
            &mut sink,
            Some(&commands),
            &options(false),
        )
        .unwrap();
        assert_eq!(processed, 1);
        assert_eq!(sink.names, ["000.png"]);
        assert_eq!(source.len_hint(), Some(4));
    }

    #[test]
    fn test_reset_command_clears_model() {
        let (tx, rx) = mpsc::channel();
        let commands = CommandChannel::from_receiver(rx);
        tx.send(Command::Reset).unwrap();

        let mut source = VecSource::gray(3, 100);
        let mut detector = Detector::new(&DetectorConfig::default()).unwrap();
        let mut sink = RecordingSink::default();

        run_pipeline(
            &mut source,
            &mut detector,
            &mut sink,
            Some(&commands),
            &options(false),
        )
        .unwrap();
        // reset after the first frame, then two more frames
        assert_eq!(detector.frames_seen(), 2);
        assert!(sink.names.is_empty());
    }
}
