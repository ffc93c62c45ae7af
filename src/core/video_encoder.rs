use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ChildStdin;
use std::thread::{self, JoinHandle};

use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;

use crate::decoder::frame_data::Frame;
use crate::error::{MosaicError, Result};

/// Receives mosaic frames in presentation order.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and close the output. No frames may be written afterwards.
    fn finish(&mut self) -> Result<()>;
}

/// Collects frames in memory, in the order they were written.
#[derive(Default)]
pub struct MemorySink {
    pub frames: Vec<Frame>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}

impl FrameSink for MemorySink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Streams raw rgb24 frames into an `ffmpeg` child that encodes H.264.
///
/// The child is started lazily on the first frame, since that is when the
/// frame size becomes known. An encoder that never receives a frame leaves
/// no output file behind.
pub struct FfmpegEncoder {
    output: PathBuf,
    fps: u32,
    running: Option<RunningEncoder>,
    frames_written: u64,
}

struct RunningEncoder {
    child: FfmpegChild,
    stdin: Option<ChildStdin>,
    stderr_handle: Option<JoinHandle<Vec<String>>>,
    width: u32,
    height: u32,
}

impl FfmpegEncoder {
    pub fn new(output: &Path, fps: u32) -> Result<Self> {
        if fps == 0 {
            return Err(MosaicError::InvalidParameter(
                "output fps must be at least 1".into(),
            ));
        }
        if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
            if !dir.is_dir() {
                return Err(MosaicError::io(
                    format!("cannot write {}", output.display()),
                    std::io::Error::new(std::io::ErrorKind::NotFound, "output directory missing"),
                ));
            }
        }
        Ok(Self {
            output: output.to_path_buf(),
            fps,
            running: None,
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn start(&mut self, width: u32, height: u32) -> Result<()> {
        let args = encode_args(&self.output, width, height, self.fps);
        let mut child = FfmpegCommand::new()
            .args(&args)
            .spawn()
            .map_err(|e| MosaicError::io("failed to spawn ffmpeg encoder", e))?;

        let stdin = child.take_stdin().ok_or_else(|| {
            MosaicError::io(
                "ffmpeg stdin not available",
                std::io::Error::from(std::io::ErrorKind::BrokenPipe),
            )
        })?;

        let stderr_handle = child.take_stderr().map(|stderr| {
            thread::spawn(move || {
                let mut errors = Vec::new();
                for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
                    log::debug!("[ffmpeg encode] {}", line);
                    if line.to_ascii_lowercase().contains("error") {
                        errors.push(line);
                    }
                }
                errors
            })
        });

        log::info!(
            "encoding {}x{} @ {} fps to {}",
            width,
            height,
            self.fps,
            self.output.display()
        );
        self.running = Some(RunningEncoder {
            child,
            stdin: Some(stdin),
            stderr_handle,
            width,
            height,
        });
        Ok(())
    }
}

impl FrameSink for FfmpegEncoder {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.running.is_none() {
            self.start(frame.width, frame.height)?;
        }
        let Some(running) = self.running.as_mut() else {
            return Err(MosaicError::io(
                "ffmpeg encoder not running",
                std::io::Error::from(std::io::ErrorKind::BrokenPipe),
            ));
        };
        if (running.width, running.height) != frame.dimensions() {
            return Err(MosaicError::InvalidParameter(format!(
                "encoder expects {}x{} frames, got {}x{}",
                running.width, running.height, frame.width, frame.height
            )));
        }
        let stdin = running.stdin.as_mut().ok_or_else(|| {
            MosaicError::io(
                "encoder already finished",
                std::io::Error::from(std::io::ErrorKind::BrokenPipe),
            )
        })?;
        stdin
            .write_all(&frame.buffer)
            .map_err(|e| MosaicError::io(format!("writing {}", self.output.display()), e))?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let Some(mut running) = self.running.take() else {
            log::warn!("no frames to encode, {} not written", self.output.display());
            return Ok(());
        };
        // closing stdin signals end of input
        drop(running.stdin.take());
        let status = running
            .child
            .wait()
            .map_err(|e| MosaicError::io("failed to wait for ffmpeg encoder", e))?;
        let errors = running
            .stderr_handle
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        if !status.success() {
            return Err(MosaicError::io(
                format!("cannot write {}", self.output.display()),
                std::io::Error::other(format!("ffmpeg exited with {}: {}", status, errors.join("; "))),
            ));
        }
        log::info!(
            "wrote {} frames to {}",
            self.frames_written,
            self.output.display()
        );
        Ok(())
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if let Some(mut running) = self.running.take() {
            drop(running.stdin.take());
            let _ = running.child.wait();
        }
    }
}

/// ffmpeg arguments that read raw rgb24 from stdin and write H.264.
///
/// `yuv420p` is only requested for even dimensions, since chroma
/// subsampling cannot represent odd sizes and the output keeps the input
/// resolution.
pub fn encode_args(output: &Path, width: u32, height: u32, fps: u32) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgb24".into(),
        "-s".into(),
        format!("{}x{}", width, height),
        "-r".into(),
        fps.to_string(),
        "-i".into(),
        "pipe:0".into(),
        "-an".into(),
        "-c:v".into(),
        "libx264".into(),
    ];
    if width % 2 == 0 && height % 2 == 0 {
        args.push("-pix_fmt".into());
        args.push("yuv420p".into());
    }
    args.push(output.display().to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_keeps_order() {
        let mut sink = MemorySink::new();
        for v in 0..3u8 {
            sink.write_frame(&Frame::filled(1, 1, [v, v, v])).unwrap();
        }
        sink.finish().unwrap();
        let order: Vec<u8> = sink.into_frames().iter().map(|f| f.buffer[0]).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_encode_args_even_size() {
        let args = encode_args(Path::new("out.mp4"), 640, 360, 24);
        assert!(args.windows(2).any(|w| w[0] == "-s" && w[1] == "640x360"));
        assert!(args.windows(2).any(|w| w[0] == "-r" && w[1] == "24"));
        assert!(args.windows(2).any(|w| w[0] == "-c:v" && w[1] == "libx264"));
        assert!(args.iter().any(|a| a == "yuv420p"));
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn test_encode_args_odd_size_keeps_resolution() {
        let args = encode_args(Path::new("out.mp4"), 105, 99, 24);
        assert!(!args.iter().any(|a| a == "yuv420p"));
        assert!(args.iter().any(|a| a == "105x99"));
    }

    #[test]
    fn test_encoder_rejects_missing_directory() {
        let err = FfmpegEncoder::new(Path::new("/no/such/dir/out.mp4"), 24).err().unwrap();
        assert!(matches!(err, MosaicError::Io { .. }));
    }

    #[test]
    fn test_encoder_without_frames_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.mp4");
        let mut encoder = FfmpegEncoder::new(&path, 24).unwrap();
        encoder.finish().unwrap();
        assert_eq!(encoder.frames_written(), 0);
        assert!(!path.exists());
    }
}
