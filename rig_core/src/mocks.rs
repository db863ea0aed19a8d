//! Scripted fakes for driving the protocol and the detector without hardware.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rig_traits::clock::test_clock::TestClock;
use rig_traits::{BoxError, Connector, MeasurementSource, Transport};

type Responder = Box<dyn FnMut(&str) -> String + Send>;

#[derive(Default)]
struct DeviceState {
    opens: u32,
    write_attempts: u32,
    fail_writes: u32,
    fail_line: Option<String>,
    fail_opens: u32,
    fail_reads: bool,
    written: Vec<String>,
    inbound: VecDeque<u8>,
    queued: VecDeque<String>,
    responder: Option<Responder>,
    /// Advanced by `read_timeout` on every empty read, like a blocking port.
    clock: Option<(TestClock, Duration)>,
    /// Delivered on every read that finds nothing pending.
    idle_chatter: Option<String>,
    max_chunk: usize,
}

/// A fake line-oriented device shared between the test and the transports
/// opened against it. Clones share state.
///
/// Every successfully written line gets one reply: the next queued reply if
/// any, else the responder's output, else `ok\n`.
#[derive(Clone, Default)]
pub struct ScriptedDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl ScriptedDevice {
    pub fn new() -> Self {
        let dev = Self::default();
        dev.lock().max_chunk = 16;
        dev
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        // A panicking test thread must not hide the state from the others.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn connector(&self) -> ScriptedConnector {
        ScriptedConnector {
            device: self.clone(),
        }
    }

    /// Queue the raw reply to the next written line.
    pub fn queue_reply(&self, reply: impl Into<String>) {
        self.lock().queued.push_back(reply.into());
    }

    /// Compute replies from the written line once the queue is empty.
    pub fn respond_with(&self, f: impl FnMut(&str) -> String + Send + 'static) {
        self.lock().responder = Some(Box::new(f));
    }

    /// Inject unsolicited inbound bytes.
    pub fn push_inbound(&self, bytes: &[u8]) {
        self.lock().inbound.extend(bytes.iter().copied());
    }

    pub fn fail_next_writes(&self, n: u32) {
        self.lock().fail_writes = n;
    }

    /// Fail the next write of exactly `line` (terminator excluded), once.
    pub fn fail_next_write_of(&self, line: impl Into<String>) {
        self.lock().fail_line = Some(line.into());
    }

    pub fn fail_next_opens(&self, n: u32) {
        self.lock().fail_opens = n;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Empty reads advance `clock` by `read_timeout`.
    pub fn with_clock(&self, clock: TestClock, read_timeout: Duration) {
        self.lock().clock = Some((clock, read_timeout));
    }

    /// Answer every idle read with `line`, as a board stuck in a busy loop does.
    pub fn chatter_when_idle(&self, line: impl Into<String>) {
        self.lock().idle_chatter = Some(line.into());
    }

    pub fn opens(&self) -> u32 {
        self.lock().opens
    }

    pub fn write_attempts(&self) -> u32 {
        self.lock().write_attempts
    }

    /// Lines written successfully, terminators stripped.
    pub fn written_lines(&self) -> Vec<String> {
        self.lock().written.clone()
    }

    pub fn clear_written(&self) {
        self.lock().written.clear();
    }
}

pub struct ScriptedConnector {
    device: ScriptedDevice,
}

impl Connector for ScriptedConnector {
    type Transport = ScriptedTransport;

    fn open(&self) -> Result<ScriptedTransport, BoxError> {
        let mut st = self.device.lock();
        if st.fail_opens > 0 {
            st.fail_opens -= 1;
            return Err("scripted open failure".into());
        }
        st.opens += 1;
        st.inbound.clear();
        Ok(ScriptedTransport {
            device: self.device.clone(),
        })
    }

    fn target(&self) -> String {
        "scripted".to_string()
    }
}

pub struct ScriptedTransport {
    device: ScriptedDevice,
}

impl Transport for ScriptedTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), BoxError> {
        let mut st = self.device.lock();
        st.write_attempts += 1;
        if st.fail_writes > 0 {
            st.fail_writes -= 1;
            return Err("scripted write failure".into());
        }
        let text = String::from_utf8_lossy(bytes);
        if st
            .fail_line
            .as_deref()
            .is_some_and(|l| text.trim_end_matches(['\r', '\n']) == l)
        {
            st.fail_line = None;
            return Err("scripted write failure".into());
        }
        for line in text.split_terminator('\n') {
            let line = line.trim_end_matches('\r').to_string();
            let reply = match st.queued.pop_front() {
                Some(r) => r,
                None => match st.responder.as_mut() {
                    Some(f) => f(&line),
                    None => "ok\n".to_string(),
                },
            };
            st.written.push(line);
            st.inbound.extend(reply.bytes());
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BoxError> {
        let mut st = self.device.lock();
        if st.fail_reads {
            return Err("scripted read failure".into());
        }
        if st.inbound.is_empty() {
            if let Some((clock, timeout)) = &st.clock {
                clock.advance(*timeout);
            }
            let Some(chatter) = st.idle_chatter.clone() else {
                return Ok(0);
            };
            st.inbound.extend(chatter.bytes());
        }
        let n = buf.len().min(st.inbound.len()).min(st.max_chunk.max(1));
        for slot in buf.iter_mut().take(n) {
            *slot = st.inbound.pop_front().unwrap_or_default();
        }
        Ok(n)
    }

    fn bytes_available(&mut self) -> Result<usize, BoxError> {
        Ok(self.device.lock().inbound.len())
    }

    fn discard_input(&mut self) -> Result<(), BoxError> {
        self.device.lock().inbound.clear();
        Ok(())
    }
}

/// One scripted read outcome.
#[derive(Debug, Clone)]
pub enum Reading {
    Sample(f64),
    Nothing,
    Fail(&'static str),
}

/// Measurement source that replays a script, then reports nothing forever.
pub struct ScriptedSource {
    script: VecDeque<Reading>,
    released: Arc<AtomicBool>,
}

impl ScriptedSource {
    pub fn new(script: impl IntoIterator<Item = Reading>) -> Self {
        Self {
            script: script.into_iter().collect(),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn samples(values: &[f64]) -> Self {
        Self::new(values.iter().map(|v| Reading::Sample(*v)))
    }

    /// Flag set once the source is dropped.
    pub fn released_flag(&self) -> Arc<AtomicBool> {
        self.released.clone()
    }
}

impl MeasurementSource for ScriptedSource {
    fn try_read(&mut self) -> Result<Option<f64>, BoxError> {
        match self.script.pop_front() {
            Some(Reading::Sample(v)) => Ok(Some(v)),
            Some(Reading::Fail(msg)) => Err(msg.into()),
            Some(Reading::Nothing) | None => Ok(None),
        }
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.released.store(true, Ordering::Relaxed);
    }
}

/// Measurement source backed by a closure, for unbounded signals.
pub struct FnSource<F>(pub F);

impl<F> MeasurementSource for FnSource<F>
where
    F: FnMut() -> Result<Option<f64>, BoxError>,
{
    fn try_read(&mut self) -> Result<Option<f64>, BoxError> {
        (self.0)()
    }
}
