//! Timebases, frame rates and timestamp rescaling
//!
//! Timestamps are integers counted in the timebase of the stream that
//! produced them. Moving a timestamp between timebases goes through integer
//! rational arithmetic so long runs do not accumulate float drift.

use num_rational::Rational64;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The duration of one timestamp tick, `numerator / denominator` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timebase {
    pub numerator: i64,
    pub denominator: i64,
}

impl Timebase {
    /// Create a new timebase.
    #[inline]
    pub const fn new(numerator: i64, denominator: i64) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Microsecond ticks, the container-level unit for seeking.
    pub const MICROSECONDS: Self = Self::new(1, 1_000_000);

    /// Nanosecond ticks.
    pub const NANOSECONDS: Self = Self::new(1, 1_000_000_000);

    /// A timebase is usable when both terms are positive.
    #[inline]
    pub fn is_valid(self) -> bool {
        self.numerator > 0 && self.denominator > 0
    }

    /// Tick length in seconds.
    #[inline]
    pub fn to_f64(self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// Convert a timestamp to seconds.
    #[inline]
    pub fn seconds(self, ts: i64) -> f64 {
        ts as f64 * self.numerator as f64 / self.denominator as f64
    }

    /// Convert seconds to the nearest timestamp in this timebase.
    pub fn from_seconds(self, seconds: f64) -> i64 {
        (seconds * self.denominator as f64 / self.numerator as f64).round() as i64
    }

    /// Swap numerator and denominator (a rate becomes a tick length).
    #[inline]
    pub fn invert(self) -> Self {
        Self::new(self.denominator, self.numerator)
    }

    /// Rescale `ts` from this timebase into `to`, rounding half away from zero.
    pub fn rescale(self, ts: i64, to: Timebase) -> i64 {
        let num = ts as i128 * self.numerator as i128 * to.denominator as i128;
        let den = self.denominator as i128 * to.numerator as i128;
        div_round(num, den)
    }
}

impl Default for Timebase {
    fn default() -> Self {
        Self::MICROSECONDS
    }
}

impl fmt::Display for Timebase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

fn div_round(num: i128, den: i128) -> i64 {
    if den == 0 {
        return 0;
    }
    let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
    let half = den / 2;
    let q = if num >= 0 {
        (num + half) / den
    } else {
        -((-num + half) / den)
    };
    q.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Frame rate as a rational number (e.g., 24000/1001 for 23.976 fps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    /// Numerator (e.g., 24000)
    pub numerator: u32,
    /// Denominator (e.g., 1001)
    pub denominator: u32,
}

impl FrameRate {
    /// Create a new frame rate.
    #[inline]
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Whole frames per second.
    #[inline]
    pub const fn from_fps(fps: u32) -> Self {
        Self::new(fps, 1)
    }

    /// Nearest rate in thousandths of a frame, reduced. Rates that round to
    /// zero or overflow come back invalid.
    pub fn from_fps_f64(fps: f64) -> Self {
        let milli = (fps * 1000.0).round();
        if !(1.0..=u32::MAX as f64).contains(&milli) {
            return Self::new(0, 1);
        }
        let ratio = Rational64::new(milli as i64, 1000);
        Self::new(*ratio.numer() as u32, *ratio.denom() as u32)
    }

    /// Both terms must be non-zero for the rate to mean anything.
    #[inline]
    pub fn is_valid(self) -> bool {
        self.numerator > 0 && self.denominator > 0
    }

    /// Convert to frames per second as f64.
    #[inline]
    pub fn to_fps_f64(self) -> f64 {
        if self.denominator == 0 {
            return 0.0;
        }
        self.numerator as f64 / self.denominator as f64
    }

    /// The tick length of one frame; encoders run in this timebase.
    #[inline]
    pub fn frame_timebase(self) -> Timebase {
        Timebase::new(self.denominator as i64, self.numerator as i64)
    }

    /// Duration of a single frame expressed in `tb` ticks (at least one tick).
    pub fn frame_duration_in(self, tb: Timebase) -> i64 {
        self.frame_timebase().rescale(1, tb).max(1)
    }

    /// Parse an ffprobe-style `"30000/1001"` or `"25"` rate.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (num, den) = match text.split_once('/') {
            Some((n, d)) => (n.trim().parse().ok()?, d.trim().parse().ok()?),
            None => (text.parse().ok()?, 1),
        };
        let rate = Self::new(num, den);
        rate.is_valid().then_some(rate)
    }

    /// Estimate the display rate of a stream from its real base rate and its
    /// average rate.
    ///
    /// The base rate wins unless it is implausibly high (above 210 fps) while
    /// the average looks like an ordinary video rate (below 70 fps), which is
    /// what field-based or timestamp-jittered containers report.
    pub fn guess(real_base: Option<FrameRate>, average: Option<FrameRate>) -> Option<FrameRate> {
        let real_base = real_base.filter(|r| r.is_valid());
        let average = average.filter(|r| r.is_valid());
        match (real_base, average) {
            (Some(base), Some(avg)) if avg.to_fps_f64() < 70.0 && base.to_fps_f64() > 210.0 => {
                Some(avg)
            }
            (Some(base), _) => Some(base),
            (None, avg) => avg,
        }
    }

    /// Common frame rates
    pub const FPS_23_976: Self = Self::new(24000, 1001);
    pub const FPS_24: Self = Self::new(24, 1);
    pub const FPS_25: Self = Self::new(25, 1);
    pub const FPS_29_97: Self = Self::new(30000, 1001);
    pub const FPS_30: Self = Self::new(30, 1);
    pub const FPS_50: Self = Self::new(50, 1);
    pub const FPS_59_94: Self = Self::new(60000, 1001);
    pub const FPS_60: Self = Self::new(60, 1);
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::FPS_60
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fps = self.to_fps_f64();
        if (fps - fps.round()).abs() < 0.001 {
            write!(f, "{} fps", fps.round() as u32)
        } else {
            write!(f, "{:.3} fps", fps)
        }
    }
}
