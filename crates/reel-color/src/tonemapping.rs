//! Tone mapping operators for HDR→SDR conversion.
//!
//! Operators work on linear light normalized to the nominal peak, so 1.0
//! is SDR reference white and brighter highlights sit above it. The curve
//! is applied to the largest channel and the triplet is scaled by the
//! same ratio, which keeps hue stable in saturated highlights.

use serde::{Deserialize, Serialize};

/// Available tone mapping operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ToneMapOperator {
    Reinhard,
    #[default]
    Hable,
    Clip,
}

impl ToneMapOperator {
    /// Apply the operator to a linear RGB triplet whose brightest
    /// representable value is `peak`. Output is in `[0, 1]`.
    pub fn apply(&self, rgb: [f32; 3], peak: f32) -> [f32; 3] {
        let sig = rgb[0].max(rgb[1]).max(rgb[2]);
        if sig <= 1e-6 {
            return [0.0, 0.0, 0.0];
        }
        let mapped = self.map_channel(sig, peak.max(1.0));
        let ratio = mapped / sig;
        [
            (rgb[0] * ratio).clamp(0.0, 1.0),
            (rgb[1] * ratio).clamp(0.0, 1.0),
            (rgb[2] * ratio).clamp(0.0, 1.0),
        ]
    }

    fn map_channel(&self, x: f32, peak: f32) -> f32 {
        match self {
            Self::Clip => x.min(1.0),
            Self::Reinhard => {
                // Extended Reinhard with the white point at `peak`
                x * (1.0 + x / (peak * peak)) / (1.0 + x)
            }
            Self::Hable => hable(x) / hable(peak),
        }
    }

    /// Name understood by ffmpeg's `tonemap` filter.
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            Self::Reinhard => "reinhard",
            Self::Hable => "hable",
            Self::Clip => "clip",
        }
    }

    /// Display name.
    pub fn name(&self) -> &str {
        match self {
            Self::Reinhard => "Reinhard",
            Self::Hable => "Hable (Uncharted 2)",
            Self::Clip => "Clip",
        }
    }
}

/// Hable (Uncharted 2) filmic curve.
fn hable(x: f32) -> f32 {
    let a = 0.15;
    let b = 0.50;
    let c = 0.10;
    let d = 0.20;
    let e = 0.02;
    let f = 0.30;
    ((x * (a * x + c * b) + d * e) / (x * (a * x + b) + d * f)) - e / f
}
