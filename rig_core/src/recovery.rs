//! Write path with bounded reopen-and-retry.
//!
//! `ConnectionRecovery` is the only owner of the live transport. A failed
//! write of a retryable command closes it, opens a fresh one against the same
//! target and writes again; the attempt budget comes from `RetryPolicy`.
//! Reads never retry: a hung read is the protocol's timeout to report.

use std::sync::Arc;
use std::time::Duration;

use rig_traits::clock::Clock;
use rig_traits::{BoxError, Connector, Transport};

use crate::error::{Result, RigError};

/// Reopen-and-retry policy for the write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total write attempts, the first one included. 2 = one retry.
    pub max_attempts: u32,
    /// Pause between closing the failed transport and opening a new one.
    pub close_delay: Duration,
    /// Pause after reopening before the retried write.
    pub settle_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            close_delay: Duration::from_millis(300),
            settle_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// No reopen at all; the first write failure is fatal.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

pub struct ConnectionRecovery<C: Connector> {
    connector: C,
    transport: Option<C::Transport>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock + Send + Sync>,
    /// Bumped every time a new transport is opened.
    generation: u64,
}

impl<C: Connector> ConnectionRecovery<C> {
    /// Open the initial transport.
    pub fn open(
        connector: C,
        policy: RetryPolicy,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Result<Self> {
        let transport = connector
            .open()
            .map_err(|e| connection_error(&connector, 1, &e))?;
        tracing::debug!(target = %connector.target(), "link opened");
        Ok(Self {
            connector,
            transport: Some(transport),
            policy,
            clock,
            generation: 1,
        })
    }

    pub fn target(&self) -> String {
        self.connector.target()
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Session counter; changes whenever the transport is replaced.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Write one encoded command, reopening and retrying per policy when the
    /// command allows it.
    pub fn write(&mut self, bytes: &[u8], retryable: bool) -> Result<()> {
        let max = if retryable {
            self.policy.max_attempts.max(1)
        } else {
            1
        };
        let mut attempt = 1;
        loop {
            let err = match self.try_write(bytes) {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            if attempt >= max {
                tracing::error!(attempt, error = %err, "write failed, giving up");
                return Err(connection_error(&self.connector, attempt, &err));
            }
            tracing::warn!(attempt, error = %err, "write failed, reopening link");
            self.reopen()
                .map_err(|e| connection_error(&self.connector, attempt, &e))?;
            attempt += 1;
        }
    }

    fn try_write(&mut self, bytes: &[u8]) -> std::result::Result<(), BoxError> {
        let transport = self.transport.as_mut().ok_or("link is closed")?;
        if let Err(e) = transport.discard_input() {
            tracing::debug!(error = %e, "could not discard stale input");
        }
        transport.write_all(bytes)
    }

    /// Close the current transport and open a fresh one against the same target.
    pub fn reopen(&mut self) -> std::result::Result<(), BoxError> {
        self.transport = None;
        self.clock.sleep(self.policy.close_delay);
        let fresh = self.connector.open()?;
        self.transport = Some(fresh);
        self.generation += 1;
        tracing::info!(
            target = %self.connector.target(),
            generation = self.generation,
            "link reopened"
        );
        self.clock.sleep(self.policy.settle_delay);
        Ok(())
    }

    /// Read path; see `Transport::read`.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| RigError::Protocol("link is closed".to_string()))?;
        transport
            .read(buf)
            .map_err(|e| RigError::Protocol(format!("read failed: {e}")))
    }

    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            tracing::debug!(target = %self.connector.target(), "link closed");
        }
    }
}

fn connection_error<C: Connector>(connector: &C, attempts: u32, err: &BoxError) -> RigError {
    RigError::Connection {
        target: connector.target(),
        attempts,
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{ScriptedConnector, ScriptedDevice};
    use rig_traits::clock::test_clock::TestClock;

    fn recovery(device: &ScriptedDevice) -> (ConnectionRecovery<ScriptedConnector>, TestClock) {
        let clock = TestClock::new();
        let rec = ConnectionRecovery::open(
            device.connector(),
            RetryPolicy::default(),
            Arc::new(clock.clone()),
        )
        .unwrap();
        (rec, clock)
    }

    #[test]
    fn single_failure_reopens_once_and_succeeds() {
        let device = ScriptedDevice::new();
        device.fail_next_writes(1);
        let (mut rec, clock) = recovery(&device);

        rec.write(b"M114\r\n", true).unwrap();

        assert_eq!(device.opens(), 2);
        assert_eq!(device.write_attempts(), 2);
        assert_eq!(device.written_lines(), vec!["M114".to_string()]);
        assert_eq!(rec.generation(), 2);
        // close + settle delays were honored
        assert_eq!(clock.offset(), Duration::from_millis(1300));
    }

    #[test]
    fn second_failure_is_fatal_without_third_attempt() {
        let device = ScriptedDevice::new();
        device.fail_next_writes(5);
        let (mut rec, _clock) = recovery(&device);

        let err = rec.write(b"M114\r\n", true).unwrap_err();

        match err {
            RigError::Connection { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(device.write_attempts(), 2);
        assert_eq!(device.opens(), 2);
    }

    #[test]
    fn non_retryable_write_fails_without_reopen() {
        let device = ScriptedDevice::new();
        device.fail_next_writes(1);
        let (mut rec, _clock) = recovery(&device);

        let err = rec.write(b"G1 X1\r\n", false).unwrap_err();

        assert!(matches!(err, RigError::Connection { attempts: 1, .. }));
        assert_eq!(device.opens(), 1);
        assert_eq!(rec.generation(), 1);
    }

    #[test]
    fn failed_reopen_surfaces_and_next_write_opens_again() {
        let device = ScriptedDevice::new();
        let (mut rec, _clock) = recovery(&device);
        device.fail_next_writes(1);
        device.fail_next_opens(1);

        let err = rec.write(b"M17\r\n", true).unwrap_err();
        assert!(matches!(err, RigError::Connection { .. }));
        assert!(!rec.is_open());

        // Link is closed: the first attempt fails, the retry reopens.
        rec.write(b"M17\r\n", true).unwrap();
        assert!(rec.is_open());
        assert_eq!(device.written_lines(), vec!["M17".to_string()]);
    }

    #[test]
    fn open_failure_is_a_connection_error() {
        let device = ScriptedDevice::new();
        device.fail_next_opens(1);
        let err = ConnectionRecovery::open(
            device.connector(),
            RetryPolicy::default(),
            Arc::new(TestClock::new()),
        )
        .err()
        .unwrap();
        assert!(matches!(err, RigError::Connection { attempts: 1, .. }));
    }
}
