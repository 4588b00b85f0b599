//! Decoder/encoder inventory from `ffmpeg -decoders`, `-encoders`,
//! `-hwaccels` and `-h decoder=<name>`.

use crate::capability::{Capability, CodecId, DecoderCandidate, EncoderCandidate};
use crate::negotiate::DecoderInventory;
use std::process::Command;
use tracing::{debug, warn};

/// Codecs whose hardware acceleration methods are worth offering.
const HWACCEL_CODECS: [CodecId; 4] = [CodecId::H264, CodecId::Hevc, CodecId::Vp9, CodecId::Av1];

/// Decoder implementations that are bit-exact reference-quality software.
const PRECISE_DECODERS: [&str; 1] = ["libdav1d"];

/// One row of a `-decoders`/`-encoders` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecListing {
    pub name: String,
    pub flags: String,
    /// Codec descriptor; the implementation name when not stated
    pub codec: String,
    /// Capability flags from `-h decoder=`/`-h encoder=`
    pub hardware: bool,
}

impl CodecListing {
    pub fn is_video(&self) -> bool {
        self.flags.starts_with('V')
    }
}

/// Everything the sidecar backend knows about the local ffmpeg build.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    pub decoders: Vec<CodecListing>,
    pub encoders: Vec<CodecListing>,
    pub hwaccels: Vec<String>,
}

impl Inventory {
    /// Query the ffmpeg binary. Missing or failing queries yield an empty
    /// inventory section.
    pub fn query() -> Self {
        let mut decoders = parse_codec_list(&run(&["-decoders"]));
        let mut encoders = parse_codec_list(&run(&["-encoders"]));
        let hwaccels = parse_hwaccels(&run(&["-hwaccels"]));

        for (kind, list) in [("decoder", &mut decoders), ("encoder", &mut encoders)] {
            for listing in list.iter_mut().filter(|l| l.is_video() && needs_help(l)) {
                let help = run(&["-h", &format!("{}={}", kind, listing.name)]);
                listing.hardware = has_hardware_capability(&help);
            }
        }

        debug!(
            "ffmpeg inventory: {} decoders, {} encoders, hwaccels [{}]",
            decoders.len(),
            encoders.len(),
            hwaccels.join(", ")
        );
        Self {
            decoders,
            encoders,
            hwaccels,
        }
    }

    /// Tagged decoder candidates for `codec`, hardware first.
    pub fn decoders_for(&self, codec: &CodecId) -> DecoderInventory {
        let mut candidates = Vec::new();
        if HWACCEL_CODECS.contains(codec) {
            for method in &self.hwaccels {
                candidates.push(
                    DecoderCandidate::new(codec.name(), Capability::Hardware(codec.clone()))
                        .with_hwaccel(method.clone()),
                );
            }
        }

        let mut default = None;
        for listing in self
            .decoders
            .iter()
            .filter(|l| l.is_video() && l.codec == codec.name())
        {
            let capability = if listing.hardware {
                Capability::Hardware(codec.clone())
            } else if PRECISE_DECODERS.contains(&listing.name.as_str()) {
                Capability::SoftwarePrecise(codec.clone())
            } else {
                Capability::SoftwareGeneric(codec.clone())
            };
            let candidate = DecoderCandidate::new(listing.name.clone(), capability);
            if default.is_none() && !listing.hardware {
                default = Some(candidate.clone());
            }
            candidates.push(candidate);
        }
        // ffmpeg picks the native decoder named after the codec when present
        if let Some(native) = candidates
            .iter()
            .find(|c| c.hwaccel.is_none() && c.name == codec.name())
        {
            default = Some(native.clone());
        }

        DecoderInventory {
            candidates,
            default,
        }
    }

    pub fn encoder(&self, name: &str) -> Option<EncoderCandidate> {
        let listing = self
            .encoders
            .iter()
            .find(|l| l.is_video() && l.name == name)?;
        let codec = CodecId::from_name(&listing.codec);
        let capability = if listing.hardware {
            Capability::Hardware(codec)
        } else {
            Capability::SoftwareGeneric(codec)
        };
        Some(EncoderCandidate::new(listing.name.clone(), capability))
    }

    /// Preferred software encoder for `codec`.
    pub fn default_encoder(&self, codec: &CodecId) -> Option<EncoderCandidate> {
        let preferred = match codec {
            CodecId::Hevc => Some("libx265"),
            CodecId::H264 => Some("libx264"),
            _ => None,
        };
        preferred.and_then(|name| self.encoder(name)).or_else(|| {
            self.encoders
                .iter()
                .find(|l| l.is_video() && !l.hardware && l.codec == codec.name())
                .and_then(|l| self.encoder(&l.name))
        })
    }
}

/// Only wrapper implementations can be hardware; native and `lib*`
/// decoders never are.
fn needs_help(listing: &CodecListing) -> bool {
    listing.name != listing.codec && !listing.name.starts_with("lib")
}

fn run(args: &[&str]) -> String {
    let binary = ffmpeg_sidecar::paths::ffmpeg_path();
    match Command::new(&binary).arg("-hide_banner").args(args).output() {
        Ok(out) => String::from_utf8_lossy(&out.stdout).into_owned(),
        Err(e) => {
            warn!("Cannot run {}: {}", binary.display(), e);
            String::new()
        }
    }
}

/// Parse a `-decoders`/`-encoders` listing.
///
/// Rows follow a ` ------` separator and read `FLAGS name description`,
/// where the description ends in `(codec X)` when the implementation name
/// differs from the codec.
pub fn parse_codec_list(text: &str) -> Vec<CodecListing> {
    text.lines()
        .skip_while(|l| !l.trim_start().starts_with("---"))
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let flags = parts.next()?.to_string();
            let name = parts.next()?.to_string();
            let codec = line
                .rfind("(codec ")
                .and_then(|i| {
                    let rest = &line[i + "(codec ".len()..];
                    rest.split(')').next()
                })
                .map(|c| c.trim().to_string())
                .unwrap_or_else(|| name.clone());
            Some(CodecListing {
                name,
                flags,
                codec,
                hardware: false,
            })
        })
        .collect()
}

/// Parse `-hwaccels`: one method per line after the heading.
pub fn parse_hwaccels(text: &str) -> Vec<String> {
    text.lines()
        .skip_while(|l| !l.starts_with("Hardware acceleration methods"))
        .skip(1)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// True when the `General capabilities:` line of a codec help page lists
/// `hardware`.
pub fn has_hardware_capability(help: &str) -> bool {
    help.lines()
        .filter_map(|l| l.trim().strip_prefix("General capabilities:"))
        .any(|caps| caps.split_whitespace().any(|c| c == "hardware"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECODERS: &str = "Decoders:
 V..... = Video
 A..... = Audio
 ------
 V....D av1                  Alliance for Open Media AV1
 V....D libdav1d             dav1d AV1 decoder by VideoLAN (codec av1)
 V....D av1_cuvid            Nvidia CUVID AV1 decoder (codec av1)
 VFS..D hevc                 HEVC (High Efficiency Video Coding)
 V..... hevc_cuvid           Nvidia CUVID HEVC decoder (codec hevc)
 VFS..D vp9                  Google VP9
 A....D aac                  AAC (Advanced Audio Coding)
";

    fn inventory() -> Inventory {
        let mut decoders = parse_codec_list(DECODERS);
        for d in decoders.iter_mut() {
            d.hardware = d.name.ends_with("_cuvid");
        }
        let mut encoders = parse_codec_list(
            " ------\n V....D libx265   libx265 H.265 / HEVC (codec hevc)\n V....D hevc_videotoolbox VideoToolbox H.265 Encoder (codec hevc)\n",
        );
        encoders[1].hardware = true;
        Inventory {
            decoders,
            encoders,
            hwaccels: vec!["videotoolbox".into()],
        }
    }

    #[test]
    fn test_parse_codec_list() {
        let list = parse_codec_list(DECODERS);
        assert_eq!(list.len(), 7);
        assert_eq!(list[1].name, "libdav1d");
        assert_eq!(list[1].codec, "av1");
        assert_eq!(list[0].codec, "av1");
        assert!(!list[6].is_video());
    }

    #[test]
    fn test_parse_hwaccels() {
        let text = "Hardware acceleration methods:\nvdpau\ncuda\nvideotoolbox\n\n";
        assert_eq!(parse_hwaccels(text), vec!["vdpau", "cuda", "videotoolbox"]);
        assert!(parse_hwaccels("").is_empty());
    }

    #[test]
    fn test_hardware_capability_flag() {
        let help = "Decoder hevc_cuvid [Nvidia CUVID HEVC decoder]:\n    General capabilities: delay avoidprobe hardware \n    Threading capabilities: none\n";
        assert!(has_hardware_capability(help));
        assert!(!has_hardware_capability(
            "    General capabilities: dr1 delay threads\n"
        ));
    }

    #[test]
    fn test_av1_inventory_tags() {
        let inv = inventory().decoders_for(&CodecId::Av1);
        let tags: Vec<_> = inv
            .candidates
            .iter()
            .map(|c| (c.name.as_str(), c.capability.is_hardware()))
            .collect();
        assert_eq!(
            tags,
            vec![("av1", true), ("av1", false), ("libdav1d", false), ("av1_cuvid", true)]
        );
        assert!(matches!(
            inv.candidates[2].capability,
            Capability::SoftwarePrecise(CodecId::Av1)
        ));
        assert_eq!(inv.default.map(|d| d.name), Some("av1".to_string()));
    }

    #[test]
    fn test_encoder_lookup() {
        let inv = inventory();
        let hw = inv.encoder("hevc_videotoolbox").unwrap();
        assert_eq!(hw.capability, Capability::Hardware(CodecId::Hevc));
        assert_eq!(
            inv.default_encoder(&CodecId::Hevc).map(|e| e.name),
            Some("libx265".to_string())
        );
        assert!(inv.encoder("libsvtav1").is_none());
    }
}
