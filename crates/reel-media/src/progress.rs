//! Progress over the trim window.

/// Length of the trim window in seconds.
///
/// `end == 0` means the end of the asset, and an `end` past the asset is
/// clamped to it. Never negative.
pub fn window_duration(start: f64, end: f64, asset_duration: f64) -> f64 {
    let effective_end = if end > 0.0 && end < asset_duration {
        end
    } else {
        asset_duration
    };
    (effective_end - start).max(0.0)
}

/// Fraction of the window covered at time `t`, clamped to `[0, 1]`.
pub fn progress_at(t: f64, start: f64, duration: f64) -> f64 {
    if duration <= 0.0 {
        return 0.0;
    }
    ((t - start) / duration).clamp(0.0, 1.0)
}

/// Emits clamped, non-decreasing progress to an optional sink.
pub struct ProgressReporter<'a> {
    sink: Option<&'a mut dyn FnMut(f64)>,
    start: f64,
    duration: f64,
    last: f64,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: Option<&'a mut dyn FnMut(f64)>, start: f64, duration: f64) -> Self {
        Self {
            sink,
            start,
            duration,
            last: 0.0,
        }
    }

    /// Report the frame at time `t`. The sink is not called for empty
    /// windows.
    pub fn report(&mut self, t: f64) {
        if self.duration <= 0.0 {
            return;
        }
        let value = progress_at(t, self.start, self.duration).max(self.last);
        self.last = value;
        if let Some(sink) = self.sink.as_mut() {
            sink(value);
        }
    }

    /// Last emitted value.
    pub fn last(&self) -> f64 {
        self.last
    }
}
