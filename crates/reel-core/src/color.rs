//! Color tags carried by streams and frames.
//!
//! Names follow the identifiers ffmpeg and ffprobe print, so probing output
//! can be parsed directly and tags can be handed back to the tools.

use serde::{Deserialize, Serialize};

/// Transfer characteristic (OETF/EOTF) of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TransferCharacteristic {
    /// ITU-R BT.709 (also used by BT.601 and 10/12-bit BT.2020 SDR)
    Bt709,
    /// SMPTE ST 2084 perceptual quantizer (HDR10)
    Smpte2084,
    /// ARIB STD-B67 hybrid log-gamma
    AribStdB67,
    /// IEC 61966-2-1 (sRGB)
    Srgb,
    /// Linear light
    Linear,
    #[default]
    Unspecified,
}

impl TransferCharacteristic {
    /// Parse the ffmpeg identifier of a transfer characteristic.
    pub fn from_ffmpeg_name(name: &str) -> Self {
        match name {
            "bt709" | "smpte170m" | "bt470bg" | "bt2020-10" | "bt2020-12" | "bt601" => Self::Bt709,
            "smpte2084" => Self::Smpte2084,
            "arib-std-b67" => Self::AribStdB67,
            "iec61966-2-1" => Self::Srgb,
            "linear" => Self::Linear,
            _ => Self::Unspecified,
        }
    }

    /// ffmpeg identifier.
    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            Self::Bt709 => "bt709",
            Self::Smpte2084 => "smpte2084",
            Self::AribStdB67 => "arib-std-b67",
            Self::Srgb => "iec61966-2-1",
            Self::Linear => "linear",
            Self::Unspecified => "unknown",
        }
    }

    /// True for the two recognized high-dynamic-range curves.
    #[inline]
    pub fn is_hdr(self) -> bool {
        matches!(self, Self::Smpte2084 | Self::AribStdB67)
    }
}

/// Color primaries (gamut).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorPrimaries {
    Bt709,
    Bt2020,
    /// SMPTE EG 432-1 (Display P3)
    DisplayP3,
    /// SMPTE 170M / BT.470BG (standard definition)
    Bt601,
    #[default]
    Unspecified,
}

impl ColorPrimaries {
    /// Parse the ffmpeg identifier of a primaries set.
    pub fn from_ffmpeg_name(name: &str) -> Self {
        match name {
            "bt709" => Self::Bt709,
            "bt2020" => Self::Bt2020,
            "smpte432" => Self::DisplayP3,
            "smpte170m" | "bt470bg" => Self::Bt601,
            _ => Self::Unspecified,
        }
    }

    /// ffmpeg identifier.
    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            Self::Bt709 => "bt709",
            Self::Bt2020 => "bt2020",
            Self::DisplayP3 => "smpte432",
            Self::Bt601 => "smpte170m",
            Self::Unspecified => "unknown",
        }
    }
}

/// Y'CbCr matrix coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MatrixCoefficients {
    Bt709,
    /// BT.2020 non-constant luminance
    Bt2020Ncl,
    /// BT.601 (smpte170m / bt470bg)
    Bt601,
    #[default]
    Unspecified,
}

impl MatrixCoefficients {
    /// Parse the ffmpeg identifier of a matrix.
    pub fn from_ffmpeg_name(name: &str) -> Self {
        match name {
            "bt709" => Self::Bt709,
            "bt2020nc" | "bt2020_ncl" => Self::Bt2020Ncl,
            "smpte170m" | "bt470bg" => Self::Bt601,
            _ => Self::Unspecified,
        }
    }

    /// ffmpeg identifier.
    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            Self::Bt709 => "bt709",
            Self::Bt2020Ncl => "bt2020nc",
            Self::Bt601 => "smpte170m",
            Self::Unspecified => "unknown",
        }
    }

    /// Luma weights `(Kr, Kb)`; unspecified falls back to BT.709.
    pub fn luma_weights(self) -> (f32, f32) {
        match self {
            Self::Bt2020Ncl => (0.2627, 0.0593),
            Self::Bt601 => (0.299, 0.114),
            Self::Bt709 | Self::Unspecified => (0.2126, 0.0722),
        }
    }
}

/// Quantization range of the signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorRange {
    /// "tv" / MPEG range (16-235 at 8 bits)
    Limited,
    /// "pc" / JPEG range
    Full,
    #[default]
    Unspecified,
}

impl ColorRange {
    /// Parse the ffmpeg identifier of a range.
    pub fn from_ffmpeg_name(name: &str) -> Self {
        match name {
            "tv" | "mpeg" | "limited" => Self::Limited,
            "pc" | "jpeg" | "full" => Self::Full,
            _ => Self::Unspecified,
        }
    }

    /// ffmpeg identifier.
    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            Self::Limited => "tv",
            Self::Full => "pc",
            Self::Unspecified => "unknown",
        }
    }

    /// Unspecified signals are treated as limited range.
    #[inline]
    pub fn is_full(self) -> bool {
        self == Self::Full
    }
}

/// The full set of color tags attached to a stream or frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ColorTags {
    pub transfer: TransferCharacteristic,
    pub primaries: ColorPrimaries,
    pub matrix: MatrixCoefficients,
    pub range: ColorRange,
}

impl ColorTags {
    /// Standard-dynamic-range BT.709, limited range.
    pub const SDR_BT709: Self = Self {
        transfer: TransferCharacteristic::Bt709,
        primaries: ColorPrimaries::Bt709,
        matrix: MatrixCoefficients::Bt709,
        range: ColorRange::Limited,
    };

    /// HDR10: PQ over BT.2020, limited range.
    pub const HDR10: Self = Self {
        transfer: TransferCharacteristic::Smpte2084,
        primaries: ColorPrimaries::Bt2020,
        matrix: MatrixCoefficients::Bt2020Ncl,
        range: ColorRange::Limited,
    };

    /// True when the transfer is one of the HDR curves.
    #[inline]
    pub fn is_hdr(&self) -> bool {
        self.transfer.is_hdr()
    }

    /// True when primaries and matrix are already BT.709 (or unspecified,
    /// which decoders treat as BT.709 for HD content).
    pub fn is_bt709_colorimetry(&self) -> bool {
        matches!(
            self.primaries,
            ColorPrimaries::Bt709 | ColorPrimaries::Unspecified
        ) && matches!(
            self.matrix,
            MatrixCoefficients::Bt709 | MatrixCoefficients::Unspecified
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hdr_detection() {
        assert!(TransferCharacteristic::Smpte2084.is_hdr());
        assert!(TransferCharacteristic::AribStdB67.is_hdr());
        assert!(!TransferCharacteristic::Bt709.is_hdr());
        assert!(ColorTags::HDR10.is_hdr());
        assert!(!ColorTags::SDR_BT709.is_hdr());
    }

    #[test]
    fn test_parse_ffprobe_names() {
        assert_eq!(
            TransferCharacteristic::from_ffmpeg_name("smpte2084"),
            TransferCharacteristic::Smpte2084
        );
        assert_eq!(
            MatrixCoefficients::from_ffmpeg_name("bt2020nc"),
            MatrixCoefficients::Bt2020Ncl
        );
        assert_eq!(ColorRange::from_ffmpeg_name("tv"), ColorRange::Limited);
        assert_eq!(
            ColorPrimaries::from_ffmpeg_name("something-new"),
            ColorPrimaries::Unspecified
        );
    }

    #[test]
    fn test_bt709_colorimetry() {
        assert!(ColorTags::SDR_BT709.is_bt709_colorimetry());
        assert!(ColorTags::default().is_bt709_colorimetry());
        assert!(!ColorTags::HDR10.is_bt709_colorimetry());
    }
}
