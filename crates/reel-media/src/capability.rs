//! Codec identities and tagged decode/encode capabilities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical codec identity of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodecId {
    H264,
    Hevc,
    Vp9,
    Av1,
    ProRes,
    Other(String),
}

impl CodecId {
    /// Parse a codec descriptor name as printed by ffprobe.
    pub fn from_name(name: &str) -> Self {
        match name {
            "h264" => Self::H264,
            "hevc" | "h265" => Self::Hevc,
            "vp9" => Self::Vp9,
            "av1" => Self::Av1,
            "prores" => Self::ProRes,
            other => Self::Other(other.to_string()),
        }
    }

    /// Canonical descriptor name.
    pub fn name(&self) -> &str {
        match self {
            Self::H264 => "h264",
            Self::Hevc => "hevc",
            Self::Vp9 => "vp9",
            Self::Av1 => "av1",
            Self::ProRes => "prores",
            Self::Other(name) => name,
        }
    }

    /// How hardware decoding is treated for this codec.
    pub fn class(&self) -> CodecClass {
        match self {
            Self::Vp9 => CodecClass::HardwarePreferred,
            Self::Av1 => CodecClass::HardwareExcluded,
            _ => CodecClass::PlatformDefault,
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoder policy class of a codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecClass {
    /// Broad, reliable hardware support: try hardware first.
    HardwarePreferred,
    /// Hardware decode is unreliable: never select it.
    HardwareExcluded,
    /// Whatever the platform default decoder is.
    PlatformDefault,
}

/// What kind of implementation a decoder or encoder is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    Hardware(CodecId),
    /// A software implementation known to be exact and fast for its codec
    SoftwarePrecise(CodecId),
    SoftwareGeneric(CodecId),
}

impl Capability {
    pub fn codec(&self) -> &CodecId {
        match self {
            Self::Hardware(c) | Self::SoftwarePrecise(c) | Self::SoftwareGeneric(c) => c,
        }
    }

    #[inline]
    pub fn is_hardware(&self) -> bool {
        matches!(self, Self::Hardware(_))
    }
}

/// A decoder the backend can instantiate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderCandidate {
    /// Decoder implementation name
    pub name: String,
    pub capability: Capability,
    /// Hardware acceleration method layered on the decoder, if any
    pub hwaccel: Option<String>,
}

impl DecoderCandidate {
    pub fn new(name: impl Into<String>, capability: Capability) -> Self {
        Self {
            name: name.into(),
            capability,
            hwaccel: None,
        }
    }

    pub fn with_hwaccel(mut self, method: impl Into<String>) -> Self {
        self.hwaccel = Some(method.into());
        self
    }

    /// Name used in logs: the decoder, plus the acceleration method.
    pub fn display_name(&self) -> String {
        match &self.hwaccel {
            Some(method) => format!("{} ({})", self.name, method),
            None => self.name.clone(),
        }
    }
}

/// An encoder the backend can instantiate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderCandidate {
    pub name: String,
    pub capability: Capability,
}

impl EncoderCandidate {
    pub fn new(name: impl Into<String>, capability: Capability) -> Self {
        Self {
            name: name.into(),
            capability,
        }
    }
}
