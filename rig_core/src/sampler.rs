//! Background measurement sampling.
//!
//! Spawns a thread that owns a `MeasurementSource`, polls it at a fixed rate
//! and forwards readings through a bounded channel. The `Sampler` is itself a
//! `MeasurementSource`, so it can be handed to the stabilization detector in
//! place of the device it wraps.
//!
//! Each `Sampler` owns exactly one thread; dropping the `Sampler` stops and
//! joins it, which also drops (and closes) the wrapped source.
use crossbeam_channel as xch;
use rig_traits::clock::Clock;
use rig_traits::{BoxError, MeasurementSource};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Readings buffered between the thread and the consumer. While the queue is
/// full new readings are discarded.
const QUEUE_DEPTH: usize = 8;

pub struct Sampler {
    rx: xch::Receiver<f64>,
    last_ok: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
    epoch: Instant,
    clock: Arc<dyn Clock + Send + Sync>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl Sampler {
    pub fn spawn<S: MeasurementSource + Send + 'static>(
        mut source: S,
        hz: u32,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let (tx, rx) = xch::bounded(QUEUE_DEPTH);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let last_ok = Arc::new(AtomicU64::new(0));
        let last_ok_clone = last_ok.clone();
        let failures = Arc::new(AtomicU64::new(0));
        let failures_clone = failures.clone();
        let period = Duration::from_micros(crate::util::period_us(hz));
        let epoch = clock.now();
        let thread_clock = clock.clone();

        let join_handle = std::thread::spawn(move || {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("sampler thread received shutdown signal");
                    break;
                }

                match source.try_read() {
                    Ok(Some(v)) => {
                        match tx.try_send(v) {
                            Ok(()) | Err(xch::TrySendError::Full(_)) => {}
                            Err(xch::TrySendError::Disconnected(_)) => {
                                tracing::debug!("sampler consumer disconnected, exiting thread");
                                break;
                            }
                        }
                        last_ok_clone.store(thread_clock.ms_since(epoch), Ordering::Relaxed);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        failures_clone.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(error = %e, "sampler read failed");
                    }
                }

                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                thread_clock.sleep(period);
            }
            tracing::trace!("sampler thread exiting cleanly");
        });

        Self {
            rx,
            last_ok,
            failures,
            epoch,
            clock,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Most recent buffered reading, discarding older ones.
    pub fn latest(&self) -> Option<f64> {
        self.rx.try_iter().last()
    }

    /// Milliseconds since the last successful reading.
    pub fn stalled_for(&self) -> u64 {
        self.clock
            .ms_since(self.epoch)
            .saturating_sub(self.last_ok.load(Ordering::Relaxed))
    }

    /// Read failures seen by the thread so far.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl MeasurementSource for Sampler {
    fn try_read(&mut self) -> Result<Option<f64>, BoxError> {
        match self.rx.try_recv() {
            Ok(v) => Ok(Some(v)),
            Err(xch::TryRecvError::Empty) => Ok(None),
            Err(xch::TryRecvError::Disconnected) => Err("sampler thread has stopped".into()),
        }
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("sampler thread joined"),
                Err(e) => tracing::warn!(?e, "sampler thread panicked during shutdown"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{Reading, ScriptedSource};
    use rig_traits::clock::MonotonicClock;

    fn clock() -> Arc<dyn Clock + Send + Sync> {
        Arc::new(MonotonicClock::new())
    }

    fn drain(sampler: &mut Sampler, want: usize) -> Vec<f64> {
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut got = Vec::new();
        while got.len() < want && Instant::now() < deadline {
            match sampler.try_read() {
                Ok(Some(v)) => got.push(v),
                _ => std::thread::sleep(Duration::from_millis(1)),
            }
        }
        got
    }

    #[test]
    fn forwards_readings_in_order() {
        let mut sampler = Sampler::spawn(ScriptedSource::samples(&[1.0, 2.0, 3.0]), 1000, clock());
        assert_eq!(drain(&mut sampler, 3), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn counts_failures_without_stopping() {
        let source = ScriptedSource::new([
            Reading::Fail("ERR"),
            Reading::Sample(4.0),
            Reading::Fail("ERR"),
            Reading::Sample(5.0),
        ]);
        let mut sampler = Sampler::spawn(source, 1000, clock());
        assert_eq!(drain(&mut sampler, 2), vec![4.0, 5.0]);
        assert_eq!(sampler.failures(), 2);
    }

    #[test]
    fn drop_releases_the_source() {
        let source = ScriptedSource::samples(&[1.0]);
        let flag = source.released_flag();
        let sampler = Sampler::spawn(source, 200, clock());
        drop(sampler);
        assert!(flag.load(Ordering::Relaxed));
    }
}
