use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::ChildStdout;
use std::thread::{self, JoinHandle};

use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;

use super::frame_data::{frame_len, Frame};
use super::probe::{probe_video, VideoInfo};
use crate::error::{MosaicError, Result};

/// A sequential supply of decoded frames.
///
/// `next_frame` returns `Ok(None)` at end of stream and `Err(Decode)` when
/// a frame in the middle of the stream cannot be read.
pub trait FrameSource: Send {
    fn dimensions(&self) -> (u32, u32);

    /// Total frames if known up front.
    fn frame_count(&self) -> Option<u64>;

    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Position the source so the next frame returned is `index`.
    fn seek_to(&mut self, index: u64) -> Result<()>;
}

/// Frames decoded by an `ffmpeg` child process into raw `rgb24`.
pub struct FfmpegDecoder {
    path: PathBuf,
    info: VideoInfo,
    child: FfmpegChild,
    stdout: ChildStdout,
    stderr_handle: Option<JoinHandle<Vec<String>>>,
    finished: bool,
}

impl FfmpegDecoder {
    /// Probe `path` and start decoding from the first frame.
    pub fn open(path: &Path) -> Result<Self> {
        let info = probe_video(path)?;
        let (child, stdout, stderr_handle) = spawn_decoder(path, 0, &info)?;
        log::info!(
            "decoding {} ({}x{}, rotated {}, ~{} frames)",
            path.display(),
            info.width,
            info.height,
            info.rotation,
            info.frame_count
        );
        Ok(Self {
            path: path.to_path_buf(),
            info,
            child,
            stdout,
            stderr_handle,
            finished: false,
        })
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    /// Reap the child once its output is exhausted. A failed exit means
    /// the stream ended on an error rather than cleanly.
    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let status = self
            .child
            .wait()
            .map_err(|e| MosaicError::io("failed to wait for ffmpeg", e))?;
        let errors = self
            .stderr_handle
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        if status.success() {
            Ok(())
        } else {
            Err(MosaicError::Decode(format!(
                "ffmpeg exited with {}: {}",
                status,
                errors.join("; ")
            )))
        }
    }

    fn stop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
            if let Some(handle) = self.stderr_handle.take() {
                let _ = handle.join();
            }
            self.finished = true;
        }
    }
}

impl FrameSource for FfmpegDecoder {
    fn dimensions(&self) -> (u32, u32) {
        (self.info.width, self.info.height)
    }

    fn frame_count(&self) -> Option<u64> {
        Some(self.info.frame_count)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }
        let mut buffer = vec![0u8; frame_len(self.info.width, self.info.height)];
        let filled = read_full(&mut self.stdout, &mut buffer)
            .map_err(|e| MosaicError::Decode(format!("reading frame: {}", e)))?;

        if filled == 0 {
            self.finish()?;
            return Ok(None);
        }
        if filled < buffer.len() {
            self.stop();
            return Err(MosaicError::Decode(format!(
                "truncated frame: {} of {} bytes",
                filled,
                buffer.len()
            )));
        }
        Ok(Some(Frame {
            buffer,
            width: self.info.width,
            height: self.info.height,
        }))
    }

    fn seek_to(&mut self, index: u64) -> Result<()> {
        self.stop();
        let (child, stdout, stderr_handle) = spawn_decoder(&self.path, index, &self.info)?;
        self.child = child;
        self.stdout = stdout;
        self.stderr_handle = stderr_handle;
        self.finished = false;
        Ok(())
    }
}

impl Drop for FfmpegDecoder {
    fn drop(&mut self) {
        self.stop();
    }
}

/// ffmpeg arguments that decode `path` to raw rgb24 on stdout, starting at
/// frame `start_frame` (exact index, via the `select` filter).
///
/// The filter chain ends by scaling to exactly `width` x `height`, so every
/// frame on the pipe has the size the reader slices it with.
pub fn decode_args(path: &Path, start_frame: u64, width: u32, height: u32) -> Vec<String> {
    let mut filters = Vec::new();
    if start_frame > 0 {
        filters.push(format!("select=gte(n\\,{})", start_frame));
    }
    filters.push(format!("scale={}:{}", width, height));
    filters.push("format=rgb24".to_string());

    let mut args: Vec<String> = vec![
        "-nostdin".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        path.display().to_string(),
        "-map".into(),
        "0:v:0".into(),
        "-vf".into(),
        filters.join(","),
    ];
    args.extend(
        ["-an", "-sn", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"]
            .iter()
            .map(|s| s.to_string()),
    );
    args
}

fn spawn_decoder(
    path: &Path,
    start_frame: u64,
    info: &VideoInfo,
) -> Result<(FfmpegChild, ChildStdout, Option<JoinHandle<Vec<String>>>)> {
    let mut child = FfmpegCommand::new()
        .args(decode_args(path, start_frame, info.width, info.height))
        .spawn()
        .map_err(|e| MosaicError::io("failed to spawn ffmpeg", e))?;

    let stdout = child.take_stdout().ok_or_else(|| {
        MosaicError::io(
            "ffmpeg stdout not available",
            std::io::Error::from(std::io::ErrorKind::BrokenPipe),
        )
    })?;

    // ffmpeg blocks once its stderr pipe fills, so it is always drained
    let stderr_handle = child.take_stderr().map(|stderr| {
        thread::spawn(move || {
            let mut errors = Vec::new();
            for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
                log::debug!("[ffmpeg] {}", line);
                if line.to_ascii_lowercase().contains("error") {
                    errors.push(line);
                }
            }
            errors
        })
    });

    Ok((child, stdout, stderr_handle))
}

/// Fill `buf` from `reader`, stopping early only at end of stream.
/// Returns the number of bytes read.
pub fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Frames held in memory. Useful for callers that decode elsewhere.
pub struct MemorySource {
    frames: Vec<Frame>,
    width: u32,
    height: u32,
    cursor: usize,
    fail_at: Option<usize>,
}

impl MemorySource {
    pub fn new(width: u32, height: u32, frames: Vec<Frame>) -> Result<Self> {
        if let Some(bad) = frames.iter().find(|f| f.dimensions() != (width, height)) {
            return Err(MosaicError::InvalidParameter(format!(
                "frame of {}x{} in a {}x{} source",
                bad.width, bad.height, width, height
            )));
        }
        Ok(Self {
            frames,
            width,
            height,
            cursor: 0,
            fail_at: None,
        })
    }

    /// Report a decode error instead of returning frame `index`.
    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }
}

impl FrameSource for MemorySource {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn frame_count(&self) -> Option<u64> {
        Some(self.frames.len() as u64)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.fail_at == Some(self.cursor) {
            return Err(MosaicError::Decode(format!(
                "frame {} could not be decoded",
                self.cursor
            )));
        }
        let frame = self.frames.get(self.cursor).cloned();
        if frame.is_some() {
            self.cursor += 1;
        }
        Ok(frame)
    }

    fn seek_to(&mut self, index: u64) -> Result<()> {
        self.cursor = (index as usize).min(self.frames.len());
        Ok(())
    }
}
