use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Sender};

use super::video_encoder::{FfmpegEncoder, FrameSink, MemorySink};
use crate::config::MosaicConfig;
use crate::decoder::frame_data::Frame;
use crate::decoder::video::{FfmpegDecoder, FrameSource};
use crate::error::{MosaicError, Result};
use crate::renderer::processor::MosaicProcessor;

/// Decoded frames allowed in flight between the decoder thread and the
/// transform loop.
const QUEUE_DEPTH: usize = 4;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipelineReport {
    pub frames_read: u64,
    pub frames_written: u64,
    /// The source failed mid-stream; output holds every frame before it.
    pub decode_error: Option<String>,
    pub cancelled: bool,
    pub elapsed: Duration,
}

struct DecodeOutcome {
    frames_read: u64,
    decode_error: Option<String>,
}

/// Drives a [`MosaicProcessor`] over every frame of a source, in order,
/// streaming each mosaic frame to a sink as soon as it is ready.
pub struct VideoPipeline {
    processor: MosaicProcessor,
    cancel: Arc<AtomicBool>,
}

impl VideoPipeline {
    pub fn new(processor: MosaicProcessor) -> Self {
        Self {
            processor,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_config(config: &MosaicConfig) -> Result<Self> {
        Ok(Self::new(MosaicProcessor::from_config(config)?))
    }

    /// Stop reading once `flag` is raised; frames already written are kept
    /// and the sink is still finished.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn run<S>(&mut self, source: S, sink: &mut dyn FrameSink) -> Result<PipelineReport>
    where
        S: FrameSource + 'static,
    {
        let start = Instant::now();
        let (width, height) = source.dimensions();
        self.processor.prepare(width, height)?;

        let (tx, rx) = bounded::<Frame>(QUEUE_DEPTH);
        let decoder = spawn_decoding_thread(source, tx, Arc::clone(&self.cancel));

        let mut frames_written = 0u64;
        let mut failure = None;
        for frame in rx.iter() {
            if self.cancel.load(Ordering::SeqCst) {
                break;
            }
            let step = self
                .processor
                .process_frame(frame)
                .and_then(|mosaic| sink.write_frame(&mosaic));
            if let Err(e) = step {
                failure = Some(e);
                break;
            }
            frames_written += 1;
            if frames_written % 100 == 0 {
                log::info!("{} frames processed", frames_written);
            }
        }
        // unblocks the decoder if it is waiting on a full queue
        drop(rx);

        let outcome = decoder
            .join()
            .map_err(|_| MosaicError::Decode("decoder thread panicked".into()))?;
        if let Some(e) = failure {
            return Err(e);
        }
        sink.finish()?;

        let report = PipelineReport {
            frames_read: outcome.frames_read,
            frames_written,
            decode_error: outcome.decode_error,
            cancelled: self.cancel.load(Ordering::SeqCst),
            elapsed: start.elapsed(),
        };
        log::info!(
            "pipeline done: {} frames in {:.2?}{}",
            report.frames_written,
            report.elapsed,
            if report.cancelled { " (cancelled)" } else { "" }
        );
        Ok(report)
    }
}

/// Read `source` to exhaustion on its own thread, sending frames in order.
///
/// A decode error ends the stream: it is logged and reported, and every
/// frame read before it has already been sent.
fn spawn_decoding_thread<S>(
    mut source: S,
    sender: Sender<Frame>,
    cancel: Arc<AtomicBool>,
) -> JoinHandle<DecodeOutcome>
where
    S: FrameSource + 'static,
{
    thread::spawn(move || {
        let mut frames_read = 0u64;
        let mut decode_error = None;
        while !cancel.load(Ordering::SeqCst) {
            match source.next_frame() {
                Ok(Some(frame)) => {
                    frames_read += 1;
                    if sender.send(frame).is_err() {
                        break; // receiver dropped
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("stopping after {} frames: {}", frames_read, e);
                    decode_error = Some(e.to_string());
                    break;
                }
            }
        }
        DecodeOutcome {
            frames_read,
            decode_error,
        }
    })
}

/// Mosaic every frame of `source_path` and return them in source order.
///
/// Holds the whole output in memory; prefer [`encode_video`] for long
/// videos.
pub fn transform_video(source_path: &Path, config: &MosaicConfig) -> Result<Vec<Frame>> {
    let mut pipeline = VideoPipeline::from_config(config)?;
    let source = FfmpegDecoder::open(source_path)?;
    let mut sink = MemorySink::new();
    pipeline.run(source, &mut sink)?;
    Ok(sink.into_frames())
}

/// Mosaic `source_path` and stream the result into an H.264 file at the
/// configured frame rate.
pub fn encode_video(
    source_path: &Path,
    output_path: &Path,
    config: &MosaicConfig,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<PipelineReport> {
    let mut pipeline = VideoPipeline::from_config(config)?;
    if let Some(flag) = cancel {
        pipeline = pipeline.with_cancel_flag(flag);
    }
    let mut encoder = FfmpegEncoder::new(output_path, config.output_fps)?;
    let source = FfmpegDecoder::open(source_path)?;
    pipeline.run(source, &mut encoder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::video::MemorySource;

    fn pipeline(columns: u32) -> VideoPipeline {
        let icons = vec![
            image::RgbImage::from_pixel(10, 10, image::Rgb([0, 0, 0])),
            image::RgbImage::from_pixel(10, 10, image::Rgb([255, 255, 255])),
        ];
        VideoPipeline::new(MosaicProcessor::new(icons, vec![0, 128], columns).unwrap())
    }

    fn gray_frames(values: &[u8]) -> Vec<Frame> {
        values.iter().map(|&v| Frame::filled(20, 10, [v, v, v])).collect()
    }

    #[test]
    fn test_frames_stay_in_source_order() {
        let values: Vec<u8> = (0..40).map(|i| if i % 3 == 0 { 250 } else { 10 }).collect();
        let source = MemorySource::new(20, 10, gray_frames(&values)).unwrap();
        let mut sink = MemorySink::new();
        let report = pipeline(2).run(source, &mut sink).unwrap();
        assert_eq!(report.frames_written, 40);
        assert_eq!(report.frames_read, 40);
        for (v, out) in values.iter().zip(sink.frames.iter()) {
            let expected = if *v > 128 { 255 } else { 0 };
            assert_eq!(out.pixel(0, 0), [expected; 3]);
        }
    }

    #[test]
    fn test_empty_source_yields_no_frames() {
        let source = MemorySource::new(20, 10, Vec::new()).unwrap();
        let mut sink = MemorySink::new();
        let report = pipeline(2).run(source, &mut sink).unwrap();
        assert_eq!(report.frames_written, 0);
        assert!(sink.frames.is_empty());
        assert!(report.decode_error.is_none());
    }

    #[test]
    fn test_decode_error_keeps_collected_frames() {
        let source = MemorySource::new(20, 10, gray_frames(&[10, 200, 10, 200]))
            .unwrap()
            .failing_at(2);
        let mut sink = MemorySink::new();
        let report = pipeline(2).run(source, &mut sink).unwrap();
        assert_eq!(sink.frames.len(), 2);
        assert!(report.decode_error.is_some());
    }

    #[test]
    fn test_bad_column_count_fails_before_reading() {
        let source = MemorySource::new(20, 10, gray_frames(&[10])).unwrap();
        let mut sink = MemorySink::new();
        let err = pipeline(50).run(source, &mut sink).unwrap_err();
        assert!(matches!(err, MosaicError::InvalidParameter(_)));
        assert!(sink.frames.is_empty());
    }

    #[test]
    fn test_cancel_flag_stops_early() {
        let flag = Arc::new(AtomicBool::new(true));
        let source = MemorySource::new(20, 10, gray_frames(&[10; 8])).unwrap();
        let mut sink = MemorySink::new();
        let report = pipeline(2)
            .with_cancel_flag(flag)
            .run(source, &mut sink)
            .unwrap();
        assert!(report.cancelled);
        assert!(sink.frames.is_empty());
    }

    #[test]
    fn test_missing_video_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let icon = dir.path().join("icon.png");
        image::RgbImage::from_pixel(4, 4, image::Rgb([1, 2, 3]))
            .save(&icon)
            .unwrap();
        let config = MosaicConfig::new(vec![icon], 4);
        let err = transform_video(&dir.path().join("missing.mp4"), &config).unwrap_err();
        assert!(matches!(err, MosaicError::Io { .. }));
    }

    #[test]
    fn test_bad_config_fails_before_opening_video() {
        let config = MosaicConfig::new(vec!["/no/icon.png".into()], 4);
        let err = transform_video(Path::new("/no/video.mp4"), &config).unwrap_err();
        assert!(err.is_configuration());
    }
}
