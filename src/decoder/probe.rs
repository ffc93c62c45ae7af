use std::io;
use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::error::{MosaicError, Result};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VideoInfo {
    /// Displayed size, after any rotation stored in the stream.
    pub width: u32,
    pub height: u32,
    /// Clockwise rotation in degrees the player applies: 0, 90, 180 or 270.
    pub rotation: u32,
    pub frame_rate: f64,
    /// Best estimate: the container's frame count, else duration x rate.
    pub frame_count: u64,
    pub duration_seconds: Option<f64>,
}

#[derive(Deserialize)]
struct FfprobeOutput {
    format: Option<FormatInfo>,
    streams: Option<Vec<StreamInfo>>,
}

#[derive(Deserialize)]
struct FormatInfo {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct StreamInfo {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
    tags: Option<StreamTags>,
    side_data_list: Option<Vec<SideData>>,
}

#[derive(Deserialize)]
struct StreamTags {
    rotate: Option<String>,
}

#[derive(Deserialize)]
struct SideData {
    rotation: Option<f64>,
}

/// Query stream geometry and length with `ffprobe`.
///
/// A source that ffprobe cannot open is reported as an I/O error.
pub fn probe_video(path: &Path) -> Result<VideoInfo> {
    if !path.is_file() {
        return Err(MosaicError::io(
            format!("cannot open video {}", path.display()),
            io::Error::new(io::ErrorKind::NotFound, "no such file"),
        ));
    }

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            "-select_streams",
            "v:0",
        ])
        .arg(path)
        .output()
        .map_err(|e| MosaicError::io("failed to run ffprobe", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MosaicError::io(
            format!("cannot open video {}", path.display()),
            io::Error::other(stderr.trim().to_string()),
        ));
    }

    let info = parse_probe_output(&String::from_utf8_lossy(&output.stdout))?;
    log::debug!(
        "probed {}: {}x{} @ {:.3} fps, ~{} frames",
        path.display(),
        info.width,
        info.height,
        info.frame_rate,
        info.frame_count
    );
    Ok(info)
}

pub fn parse_probe_output(json: &str) -> Result<VideoInfo> {
    let probe: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| MosaicError::Decode(format!("unreadable ffprobe output: {}", e)))?;

    let stream = probe
        .streams
        .as_ref()
        .and_then(|streams| {
            streams
                .iter()
                .find(|s| s.codec_type.as_deref() == Some("video"))
        })
        .ok_or_else(|| MosaicError::Decode("no video stream".into()))?;

    let (coded_width, coded_height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) => (w, h),
        _ => return Err(MosaicError::Decode("video stream has no dimensions".into())),
    };

    // ffmpeg autorotates on decode, so quarter turns swap the frame size
    let rotation = stream_rotation(stream);
    let (width, height) = if rotation % 180 == 90 {
        (coded_height, coded_width)
    } else {
        (coded_width, coded_height)
    };

    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(0.0);

    let duration_seconds = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_ref())
        .or(stream.duration.as_ref())
        .and_then(|d| d.parse::<f64>().ok());

    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .or_else(|| duration_seconds.map(|d| (d * frame_rate).round().max(0.0) as u64))
        .unwrap_or(0);

    Ok(VideoInfo {
        width,
        height,
        rotation,
        frame_rate,
        frame_count,
        duration_seconds,
    })
}

/// Display rotation from the display matrix side data, else the legacy
/// `rotate` tag, normalised to 0..360.
fn stream_rotation(stream: &StreamInfo) -> u32 {
    let degrees = stream
        .side_data_list
        .iter()
        .flatten()
        .find_map(|sd| sd.rotation)
        .or_else(|| {
            stream
                .tags
                .as_ref()
                .and_then(|t| t.rotate.as_deref())
                .and_then(|r| r.trim().parse::<f64>().ok())
        })
        .unwrap_or(0.0);
    (degrees.round() as i64).rem_euclid(360) as u32
}

/// Parse "30/1", "30000/1001" or "29.97". "0/0" yields `None`.
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    if let Some((num_str, den_str)) = rate.split_once('/') {
        let num: f64 = num_str.parse().ok()?;
        let den: f64 = den_str.parse().ok()?;
        if den > 0.0 && num > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    rate.parse().ok().filter(|r: &f64| *r > 0.0)
}
