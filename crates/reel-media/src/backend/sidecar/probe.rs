//! ffprobe JSON probing.

use crate::asset::AssetInfo;
use crate::capability::CodecId;
use crate::error::OpenError;
use reel_core::{
    ColorPrimaries, ColorRange, ColorTags, FrameRate, MatrixCoefficients, PixelFormat, Timebase,
    TransferCharacteristic,
};
use serde::Deserialize;
use std::path::Path;
use std::process::Command;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    index: usize,
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    bits_per_raw_sample: Option<String>,
    color_transfer: Option<String>,
    color_primaries: Option<String>,
    color_space: Option<String>,
    color_range: Option<String>,
    time_base: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
}

/// Run ffprobe on `path` and describe its first video stream.
pub fn probe(path: &Path) -> Result<AssetInfo, OpenError> {
    let failed = |reason: String| OpenError::OpenFailed {
        path: path.to_path_buf(),
        reason,
    };
    if !path.exists() {
        return Err(failed("file not found".into()));
    }

    let output = Command::new(ffmpeg_sidecar::ffprobe::ffprobe_path())
        .args(["-v", "error", "-show_format", "-show_streams", "-of", "json"])
        .arg(path)
        .output()
        .map_err(|e| failed(format!("cannot run ffprobe: {}", e)))?;
    if !output.status.success() {
        return Err(failed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    parse_probe(path, &String::from_utf8_lossy(&output.stdout))
}

/// Build asset metadata from ffprobe's JSON.
pub fn parse_probe(path: &Path, json: &str) -> Result<AssetInfo, OpenError> {
    let parsed: ProbeOutput = serde_json::from_str(json).map_err(|e| OpenError::OpenFailed {
        path: path.to_path_buf(),
        reason: format!("unreadable probe output: {}", e),
    })?;

    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| OpenError::NoVideoStream(path.to_path_buf()))?;

    let pix_fmt = stream.pix_fmt.clone().unwrap_or_else(|| "yuv420p".into());
    let bit_depth = stream
        .bits_per_raw_sample
        .as_deref()
        .and_then(|b| b.parse().ok())
        .unwrap_or_else(|| bit_depth_of(&pix_fmt));
    let pixel_format = PixelFormat::from_ffmpeg_name(&pix_fmt).unwrap_or(if bit_depth > 8 {
        PixelFormat::Yuv420P10
    } else {
        PixelFormat::Yuv420P
    });

    let name = |v: &Option<String>| v.clone().unwrap_or_default();
    let color = ColorTags {
        transfer: TransferCharacteristic::from_ffmpeg_name(&name(&stream.color_transfer)),
        primaries: ColorPrimaries::from_ffmpeg_name(&name(&stream.color_primaries)),
        matrix: MatrixCoefficients::from_ffmpeg_name(&name(&stream.color_space)),
        range: ColorRange::from_ffmpeg_name(&name(&stream.color_range)),
    };

    let time_base = stream
        .time_base
        .as_deref()
        .and_then(FrameRate::parse)
        .map(|r| Timebase::new(r.numerator as i64, r.denominator as i64))
        .unwrap_or_default();

    let seconds = |v: Option<&String>| v.and_then(|d| d.parse::<f64>().ok());
    let duration = seconds(parsed.format.as_ref().and_then(|f| f.duration.as_ref()))
        .or_else(|| seconds(stream.duration.as_ref()))
        .unwrap_or(0.0);

    Ok(AssetInfo {
        path: path.to_path_buf(),
        duration,
        stream_index: stream.index,
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
        codec: CodecId::from_name(stream.codec_name.as_deref().unwrap_or("unknown")),
        pixel_format_name: pix_fmt,
        pixel_format,
        bit_depth,
        color,
        time_base,
        real_frame_rate: stream.r_frame_rate.as_deref().and_then(FrameRate::parse),
        average_frame_rate: stream.avg_frame_rate.as_deref().and_then(FrameRate::parse),
    })
}

fn bit_depth_of(pix_fmt: &str) -> u32 {
    if pix_fmt.contains("12") {
        12
    } else if pix_fmt.contains("10") {
        10
    } else {
        8
    }
}
