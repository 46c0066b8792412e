use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrendDirection {
    Rising,
    Falling,
    Steady,
}

impl TrendDirection {
    pub fn symbol(self) -> char {
        match self {
            Self::Rising => '+',
            Self::Falling => '-',
            Self::Steady => '=',
        }
    }
}

/// Running total of the samples seen since the last reset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrendState {
    pub cumulative_sum: f64,
    pub sample_count: u64,
    pub window_start: OffsetDateTime,
}

impl TrendState {
    fn new(now: OffsetDateTime) -> Self {
        Self {
            cumulative_sum: 0.,
            sample_count: 0,
            window_start: now,
        }
    }

    /// Mean of the samples in the window, or `None` before the first sample.
    pub fn average(&self) -> Option<f64> {
        if self.sample_count > 0 {
            Some(self.cumulative_sum / self.sample_count as f64)
        } else {
            None
        }
    }
}

/// Tracks whether the temperature is climbing or dropping relative to its recent average.
///
/// The average only covers roughly the last `reset_window_minutes` worth of polls. Once the
/// samples in the window represent more time than that, the window starts over, so a slow
/// drift over a day doesn't mask the current trend.
pub struct TrendAccumulator {
    state: TrendState,
    poll_interval_secs: u64,
    reset_window_minutes: u64,
}

impl TrendAccumulator {
    pub fn new(poll_interval_secs: u64, reset_window_minutes: u64, now: OffsetDateTime) -> Self {
        Self {
            state: TrendState::new(now),
            poll_interval_secs,
            reset_window_minutes,
        }
    }

    pub fn average(&self) -> Option<f64> {
        self.state.average()
    }

    pub fn sample_count(&self) -> u64 {
        self.state.sample_count
    }

    pub fn cumulative_sum(&self) -> f64 {
        self.state.cumulative_sum
    }

    pub fn window_start(&self) -> OffsetDateTime {
        self.state.window_start
    }

    /// Whether the samples collected so far span more than the reset window.
    pub fn window_elapsed(&self) -> bool {
        self.state.sample_count as f64 * self.poll_interval_secs as f64 / 60.
            > self.reset_window_minutes as f64
    }

    pub fn reset(&mut self, now: OffsetDateTime) {
        self.state = TrendState::new(now);
    }

    /// Add a sample and classify it against the average including that sample.
    pub fn record(&mut self, sample: f64, now: OffsetDateTime) -> TrendDirection {
        if self.window_elapsed() {
            log::debug!(
                "Resetting average temp after {} samples",
                self.state.sample_count
            );
            self.reset(now);
        }

        self.state.cumulative_sum += sample;
        self.state.sample_count += 1;

        match self.state.average() {
            Some(average) if sample > average => TrendDirection::Rising,
            Some(average) if sample < average => TrendDirection::Falling,
            _ => TrendDirection::Steady,
        }
    }
}
