//! Deciding when a streamed measurement has settled.
//!
//! The detector keeps the last `window` samples and reports their mean as
//! soon as their spread (max - min) drops below `threshold`. If the deadline
//! passes first it still reports the mean of whatever it has, or 0.0 when
//! nothing arrived. Per-sample read failures never end the wait.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use rig_traits::MeasurementSource;
use rig_traits::clock::{Clock, MonotonicClock};

use crate::error::BuildError;

/// Bounded buffer of the most recent samples; the oldest is evicted first.
#[derive(Debug, Clone)]
pub struct StabilizationWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl StabilizationWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    /// max - min, or None when empty.
    pub fn spread(&self) -> Option<f64> {
        let mut it = self.samples.iter().copied();
        let first = it.next()?;
        let (lo, hi) = it.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
        Some(hi - lo)
    }

    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }
}

/// Parameters for one `await_stable` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilizeParams {
    /// Samples compared per decision (W).
    pub window: usize,
    /// Converged when spread < threshold (T).
    pub threshold: f64,
    /// Wall-clock budget (D).
    pub timeout: Duration,
    /// Delay between read attempts.
    pub poll: Duration,
}

impl Default for StabilizeParams {
    fn default() -> Self {
        Self {
            window: 3,
            threshold: 0.001,
            timeout: Duration::from_secs(6),
            poll: Duration::from_millis(50),
        }
    }
}

impl StabilizeParams {
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.window == 0 {
            return Err(BuildError::InvalidConfig("window must be >= 1"));
        }
        if !(self.threshold.is_finite() && self.threshold > 0.0) {
            return Err(BuildError::InvalidConfig("threshold must be > 0"));
        }
        if self.timeout.is_zero() {
            return Err(BuildError::InvalidConfig("timeout must be > 0"));
        }
        Ok(())
    }
}

/// How an `await_stable` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settle {
    Converged,
    TimedOut,
}

/// Result of `await_stable`: always carries a usable value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StableReading {
    pub value: f64,
    pub outcome: Settle,
    /// Samples accepted into the window during the call.
    pub samples: usize,
    /// Per-sample read failures seen during the call.
    pub failures: usize,
    pub elapsed: Duration,
}

impl StableReading {
    pub fn converged(&self) -> bool {
        self.outcome == Settle::Converged
    }
}

pub struct StabilizationDetector {
    params: StabilizeParams,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl StabilizationDetector {
    pub fn new(params: StabilizeParams) -> Result<Self, BuildError> {
        Self::with_clock(params, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(
        params: StabilizeParams,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Result<Self, BuildError> {
        params.validate()?;
        Ok(Self { params, clock })
    }

    pub fn params(&self) -> StabilizeParams {
        self.params
    }

    /// Poll `source` until the window settles or the deadline passes.
    ///
    /// The source is consumed and dropped before returning, releasing the
    /// underlying port or sampler thread.
    pub fn await_stable<S: MeasurementSource>(&self, mut source: S) -> StableReading {
        let StabilizeParams {
            window,
            threshold,
            timeout,
            poll,
        } = self.params;
        let started = self.clock.now();
        let mut win = StabilizationWindow::new(window);
        let mut samples = 0;
        let mut failures = 0;

        let reading = loop {
            match source.try_read() {
                Ok(Some(v)) if v.is_finite() => {
                    win.push(v);
                    samples += 1;
                    tracing::trace!(sample = v, "stabilization sample");
                    if win.is_full()
                        && let (Some(spread), Some(mean)) = (win.spread(), win.mean())
                        && spread < threshold
                    {
                        break (mean, Settle::Converged);
                    }
                }
                Ok(Some(v)) => {
                    failures += 1;
                    tracing::warn!(sample = v, "ignoring non-finite sample");
                }
                Ok(None) => {}
                Err(e) => {
                    failures += 1;
                    tracing::warn!(error = %e, "measurement read failed");
                }
            }
            if self.clock.elapsed(started) > timeout {
                break (win.mean().unwrap_or(0.0), Settle::TimedOut);
            }
            self.clock.sleep(poll);
        };
        drop(source);

        let (value, outcome) = reading;
        let elapsed = self.clock.elapsed(started);
        match outcome {
            Settle::Converged => tracing::info!(value, samples, ?elapsed, "measurement settled"),
            Settle::TimedOut => {
                tracing::warn!(value, samples, failures, ?elapsed, "measurement did not settle")
            }
        }
        StableReading {
            value,
            outcome,
            samples,
            failures,
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{FnSource, Reading, ScriptedSource};
    use rig_traits::clock::test_clock::TestClock;
    use std::sync::atomic::Ordering;

    fn detector(window: usize, threshold: f64, timeout_ms: u64) -> (StabilizationDetector, TestClock) {
        let clock = TestClock::new();
        let det = StabilizationDetector::with_clock(
            StabilizeParams {
                window,
                threshold,
                timeout: Duration::from_millis(timeout_ms),
                poll: Duration::from_millis(50),
            },
            Arc::new(clock.clone()),
        )
        .unwrap();
        (det, clock)
    }

    #[test]
    fn window_evicts_oldest() {
        let mut w = StabilizationWindow::new(3);
        for v in [1.0, 2.0, 3.0, 10.0] {
            w.push(v);
        }
        assert_eq!(w.len(), 3);
        assert_eq!(w.spread(), Some(8.0));
        assert_eq!(w.mean(), Some(5.0));
    }

    #[test]
    fn empty_window_has_no_statistics() {
        let w = StabilizationWindow::new(3);
        assert_eq!(w.spread(), None);
        assert_eq!(w.mean(), None);
    }

    #[test]
    fn settled_samples_converge_to_their_mean() {
        let (det, _clock) = detector(3, 0.001, 6000);
        let r = det.await_stable(ScriptedSource::samples(&[10.000, 10.0004, 10.0009]));
        assert_eq!(r.outcome, Settle::Converged);
        assert!((r.value - 10.000_433).abs() < 1e-5, "value {}", r.value);
        assert_eq!(r.samples, 3);
    }

    #[test]
    fn drifting_signal_times_out_with_recent_mean() {
        let (det, clock) = detector(3, 0.001, 1000);
        let mut next = 0.0;
        let source = FnSource(move || {
            next += 0.002;
            Ok::<_, rig_traits::BoxError>(Some(next))
        });

        let r = det.await_stable(source);

        assert_eq!(r.outcome, Settle::TimedOut);
        let n = r.samples as f64;
        let expected = 0.002 * (n + (n - 1.0) + (n - 2.0)) / 3.0;
        assert!((r.value - expected).abs() < 1e-9);
        assert!(clock.offset() > Duration::from_millis(1000));
        assert!(clock.offset() <= Duration::from_millis(1100));
    }

    #[test]
    fn no_samples_yields_zero() {
        let (det, _clock) = detector(3, 0.001, 300);
        let r = det.await_stable(ScriptedSource::new([]));
        assert_eq!(r.outcome, Settle::TimedOut);
        assert_eq!(r.value, 0.0);
        assert_eq!(r.samples, 0);
    }

    #[test]
    fn read_errors_do_not_reset_the_window() {
        let (det, _clock) = detector(3, 0.01, 6000);
        let source = ScriptedSource::new([
            Reading::Sample(5.0),
            Reading::Fail("ERR"),
            Reading::Sample(5.001),
            Reading::Nothing,
            Reading::Fail("ERR"),
            Reading::Sample(5.002),
        ]);
        let r = det.await_stable(source);
        assert_eq!(r.outcome, Settle::Converged);
        assert_eq!(r.failures, 2);
        assert!((r.value - 5.001).abs() < 1e-9);
    }

    #[test]
    fn partial_window_times_out_with_its_mean() {
        let (det, _clock) = detector(5, 0.001, 500);
        let r = det.await_stable(ScriptedSource::samples(&[2.0, 4.0]));
        assert_eq!(r.outcome, Settle::TimedOut);
        assert_eq!(r.value, 3.0);
    }

    #[test]
    fn spread_equal_to_threshold_is_not_settled() {
        let (det, _clock) = detector(2, 0.5, 300);
        let r = det.await_stable(ScriptedSource::samples(&[1.0, 1.5]));
        assert_eq!(r.outcome, Settle::TimedOut);
    }

    #[test]
    fn source_is_released_on_every_exit() {
        let (det, _clock) = detector(1, 0.1, 100);
        let converged = ScriptedSource::samples(&[1.0]);
        let flag = converged.released_flag();
        det.await_stable(converged);
        assert!(flag.load(Ordering::Relaxed));

        let timed_out = ScriptedSource::new([]);
        let flag = timed_out.released_flag();
        det.await_stable(timed_out);
        assert!(flag.load(Ordering::Relaxed));
    }

    #[test]
    fn invalid_params_are_rejected() {
        let clock: Arc<dyn Clock + Send + Sync> = Arc::new(TestClock::new());
        for params in [
            StabilizeParams { window: 0, ..StabilizeParams::default() },
            StabilizeParams { threshold: 0.0, ..StabilizeParams::default() },
            StabilizeParams { timeout: Duration::ZERO, ..StabilizeParams::default() },
        ] {
            assert!(StabilizationDetector::with_clock(params, clock.clone()).is_err());
        }
    }
}
