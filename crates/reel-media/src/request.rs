//! Transcode requests and the rendition presets that build them.

use crate::capability::Capability;
use reel_color::ScaleKernel;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// x265 settings of the quality rendition: fixed 4-second GOPs at 60 fps,
/// closed GOPs and temporal layers so the output loops cleanly.
pub const EXPORT_X265_PARAMS: &str = "bframes=4:b-adapt=2:b-pyramid=1:keyint=240:min-keyint=240:no-scenecut=1:open-gop=0:temporal-layers=3";

/// Track timescale of the quality rendition.
pub const EXPORT_TIMESCALE: u32 = 240_000;

/// Encoder tuning. Each knob only applies to the matching capability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderKnobs {
    /// Codec-private parameter string (software)
    pub codec_params: Option<String>,
    /// Speed/quality preset (software)
    pub preset: Option<String>,
    /// Constant rate factor, kept as text (software)
    pub crf: Option<String>,
    /// Target bitrate in bits per second (hardware)
    pub bitrate: Option<u64>,
    /// Profile name (hardware)
    pub profile: Option<String>,
    /// Prefer latency over compression (hardware)
    pub realtime: bool,
}

impl EncoderKnobs {
    /// Keep only the knobs meaningful for `capability`.
    pub fn for_capability(&self, capability: &Capability) -> EncoderKnobs {
        if capability.is_hardware() {
            EncoderKnobs {
                bitrate: self.bitrate,
                profile: self.profile.clone(),
                realtime: self.realtime,
                ..Default::default()
            }
        } else {
            EncoderKnobs {
                codec_params: self.codec_params.clone(),
                preset: self.preset.clone(),
                crf: self.crf.clone(),
                ..Default::default()
            }
        }
    }
}

/// One complete transcode job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodeRequest {
    pub output: PathBuf,
    /// Window start in seconds
    pub start: f64,
    /// Window end in seconds; 0 means the end of the asset
    pub end: f64,
    /// Output height; 0 keeps the source height
    pub target_height: u32,
    /// Output rate; 0 keeps the source rate
    pub target_fps: f64,
    /// Encoder implementation; `None` uses the backend's HEVC default
    pub encoder: Option<String>,
    pub knobs: EncoderKnobs,
    /// Kernel of the fallback scale context
    pub scale_kernel: ScaleKernel,
    /// Plan color/scale work through a filter chain
    pub filter_chain: bool,
    /// Tone-map even when the source is SDR
    pub tonemap: bool,
    /// Encode 10-bit regardless of the source
    pub ten_bit: bool,
    /// Track timescale; 0 lets the container follow the encoder timebase
    pub timescale: u32,
}

/// A reusable preset: everything in a request except output and window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenditionProfile {
    pub name: String,
    pub encoder: Option<String>,
    pub knobs: EncoderKnobs,
    pub scale_kernel: ScaleKernel,
    pub filter_chain: bool,
    pub tonemap: bool,
    pub ten_bit: bool,
    pub timescale: u32,
    pub target_height: u32,
    pub target_fps: f64,
}

impl Default for RenditionProfile {
    fn default() -> Self {
        Self::export()
    }
}

impl RenditionProfile {
    /// Fast rendition on the platform hardware encoder.
    pub fn prepare() -> Self {
        Self {
            name: "prepare".into(),
            encoder: Some("hevc_videotoolbox".into()),
            knobs: EncoderKnobs {
                bitrate: Some(10_000_000),
                profile: Some("main".into()),
                realtime: true,
                ..Default::default()
            },
            scale_kernel: ScaleKernel::Point,
            filter_chain: false,
            tonemap: false,
            ten_bit: false,
            timescale: 0,
            target_height: 0,
            target_fps: 0.0,
        }
    }

    /// Quality rendition on libx265.
    pub fn export() -> Self {
        Self {
            name: "export".into(),
            encoder: Some("libx265".into()),
            knobs: EncoderKnobs {
                codec_params: Some(EXPORT_X265_PARAMS.into()),
                preset: Some("medium".into()),
                crf: Some("22".into()),
                ..Default::default()
            },
            scale_kernel: ScaleKernel::Bicubic,
            filter_chain: true,
            tonemap: false,
            ten_bit: true,
            timescale: EXPORT_TIMESCALE,
            target_height: 0,
            target_fps: 0.0,
        }
    }

    /// Quality rendition with caller-chosen tone mapping and bit depth.
    pub fn export_ext(tonemap: bool, ten_bit: bool) -> Self {
        Self {
            name: "export-ext".into(),
            tonemap,
            ten_bit,
            ..Self::export()
        }
    }

    /// Bind the preset to an output and a trim window.
    pub fn request(&self, output: impl Into<PathBuf>, start: f64, end: f64) -> TranscodeRequest {
        TranscodeRequest {
            output: output.into(),
            start,
            end,
            target_height: self.target_height,
            target_fps: self.target_fps,
            encoder: self.encoder.clone(),
            knobs: self.knobs.clone(),
            scale_kernel: self.scale_kernel,
            filter_chain: self.filter_chain,
            tonemap: self.tonemap,
            ten_bit: self.ten_bit,
            timescale: self.timescale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CodecId;

    #[test]
    fn test_prepare_preset() {
        let p = RenditionProfile::prepare();
        assert_eq!(p.encoder.as_deref(), Some("hevc_videotoolbox"));
        assert_eq!(p.knobs.bitrate, Some(10_000_000));
        assert_eq!(p.scale_kernel, ScaleKernel::Point);
        assert!(!p.filter_chain);
        assert_eq!(p.timescale, 0);
    }

    #[test]
    fn test_export_preset() {
        let r = RenditionProfile::export().request("out.mov", 2.0, 5.0);
        assert_eq!(r.encoder.as_deref(), Some("libx265"));
        assert_eq!(r.knobs.crf.as_deref(), Some("22"));
        assert_eq!(r.knobs.preset.as_deref(), Some("medium"));
        assert!(r.knobs.codec_params.as_deref().unwrap().contains("keyint=240"));
        assert!(r.filter_chain && r.ten_bit && !r.tonemap);
        assert_eq!(r.timescale, 240_000);
        assert_eq!((r.start, r.end), (2.0, 5.0));
    }

    #[test]
    fn test_export_ext_overrides_flags_only() {
        let p = RenditionProfile::export_ext(true, false);
        assert!(p.tonemap);
        assert!(!p.ten_bit);
        assert_eq!(p.knobs, RenditionProfile::export().knobs);
    }

    #[test]
    fn test_knobs_filtered_by_capability() {
        let knobs = RenditionProfile::export().knobs;
        let hw = knobs.for_capability(&Capability::Hardware(CodecId::Hevc));
        assert_eq!(hw, EncoderKnobs::default());

        let knobs = RenditionProfile::prepare().knobs;
        let sw = knobs.for_capability(&Capability::SoftwareGeneric(CodecId::Hevc));
        assert_eq!(sw, EncoderKnobs::default());
        let hw = knobs.for_capability(&Capability::Hardware(CodecId::Hevc));
        assert_eq!(hw.bitrate, Some(10_000_000));
        assert!(hw.realtime);
    }

    #[test]
    fn test_profile_deserializes_with_defaults() {
        let p: RenditionProfile =
            serde_json::from_str(r#"{ "name": "small", "target_height": 720 }"#).unwrap();
        assert_eq!(p.target_height, 720);
        assert_eq!(p.encoder.as_deref(), Some("libx265"));
        assert_eq!(p.timescale, 240_000);
    }
}
