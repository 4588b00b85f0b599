//! Transfer curves a decoded source can carry.
//!
//! Each curve lives in its own small module with an `eotf` (signal to
//! linear light) and an `inverse` (linear light to signal). Signals and
//! linear values are normalized to `[0, 1]`; for PQ, 1.0 is 10000 nits.
#![allow(clippy::excessive_precision)]

use reel_core::TransferCharacteristic;
use serde::{Deserialize, Serialize};

/// A transfer curve, resolved from a stream's transfer characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferFunction {
    SRGB,
    Rec709,
    PQ,
    HLG,
    Linear,
}

impl TransferFunction {
    /// Unspecified signals are treated as BT.709.
    pub fn for_characteristic(tc: TransferCharacteristic) -> Self {
        use TransferCharacteristic as Tc;
        match tc {
            Tc::Smpte2084 => Self::PQ,
            Tc::AribStdB67 => Self::HLG,
            Tc::Srgb => Self::SRGB,
            Tc::Linear => Self::Linear,
            Tc::Bt709 | Tc::Unspecified => Self::Rec709,
        }
    }

    /// Luminance a linear 1.0 stands for, for the curves that define one.
    pub fn reference_peak_nits(&self) -> Option<f32> {
        match self {
            Self::PQ => Some(pq::PEAK_NITS),
            Self::HLG => Some(hlg::NOMINAL_PEAK_NITS),
            Self::SRGB | Self::Rec709 | Self::Linear => None,
        }
    }

    pub fn is_hdr(&self) -> bool {
        self.reference_peak_nits().is_some()
    }

    pub fn to_linear(&self, signal: f32) -> f32 {
        match self {
            Self::Linear => signal,
            Self::SRGB => srgb::eotf(signal),
            Self::Rec709 => bt709::eotf(signal),
            Self::PQ => pq::eotf(signal),
            Self::HLG => hlg::eotf(signal),
        }
    }

    pub fn from_linear(&self, linear: f32) -> f32 {
        match self {
            Self::Linear => linear,
            Self::SRGB => srgb::inverse(linear),
            Self::Rec709 => bt709::inverse(linear),
            Self::PQ => pq::inverse(linear),
            Self::HLG => hlg::inverse(linear),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::SRGB => "sRGB",
            Self::Rec709 => "BT.709",
            Self::PQ => "SMPTE ST 2084",
            Self::HLG => "ARIB STD-B67",
            Self::Linear => "linear",
        }
    }
}

mod srgb {
    const KNEE: f32 = 0.04045;

    pub fn eotf(v: f32) -> f32 {
        if v > KNEE {
            ((v + 0.055) / 1.055).powf(2.4)
        } else {
            v / 12.92
        }
    }

    pub fn inverse(l: f32) -> f32 {
        if l > KNEE / 12.92 {
            1.055 * l.powf(1.0 / 2.4) - 0.055
        } else {
            l * 12.92
        }
    }
}

mod bt709 {
    const ALPHA: f32 = 1.099;
    const BETA: f32 = 0.018;

    pub fn eotf(v: f32) -> f32 {
        if v >= BETA * 4.5 {
            ((v + (ALPHA - 1.0)) / ALPHA).powf(1.0 / 0.45)
        } else {
            v / 4.5
        }
    }

    pub fn inverse(l: f32) -> f32 {
        if l >= BETA {
            ALPHA * l.powf(0.45) - (ALPHA - 1.0)
        } else {
            l * 4.5
        }
    }
}

mod pq {
    pub const PEAK_NITS: f32 = 10000.0;

    const M1: f32 = 2610.0 / 16384.0;
    const M2: f32 = 2523.0 / 4096.0 * 128.0;
    const C1: f32 = 3424.0 / 4096.0;
    const C2: f32 = 2413.0 / 4096.0 * 32.0;
    const C3: f32 = 2392.0 / 4096.0 * 32.0;

    pub fn eotf(v: f32) -> f32 {
        let e = v.clamp(0.0, 1.0).powf(1.0 / M2);
        let denom = C2 - C3 * e;
        if denom <= f32::EPSILON {
            return 1.0;
        }
        ((e - C1).max(0.0) / denom).powf(1.0 / M1)
    }

    pub fn inverse(l: f32) -> f32 {
        let y = l.max(0.0).powf(M1);
        ((C1 + C2 * y) / (1.0 + C3 * y)).powf(M2)
    }
}

mod hlg {
    /// Display peak assumed when HLG is treated as display-referred.
    pub const NOMINAL_PEAK_NITS: f32 = 1000.0;

    const A: f32 = 0.17883277;
    const B: f32 = 1.0 - 4.0 * A;
    const C: f32 = 0.55991073;

    pub fn eotf(v: f32) -> f32 {
        let v = v.max(0.0);
        if v > 0.5 {
            (((v - C) / A).exp() + B) / 12.0
        } else {
            v * v / 3.0
        }
    }

    pub fn inverse(l: f32) -> f32 {
        let l = l.max(0.0);
        if l > 1.0 / 12.0 {
            A * (12.0 * l - B).ln() + C
        } else {
            (3.0 * l).sqrt()
        }
    }
}
