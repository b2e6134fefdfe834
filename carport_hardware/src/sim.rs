//! In-process stand-ins for the GPIO bank and the serial rangefinder.
//!
//! Both simulators are cheap to clone and share their state, so a test can
//! hand one clone to the code under test and keep another to drive inputs
//! and inspect outputs.
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use carport_traits::{
    BoxError, ByteSink, ByteSource, GpioChip, InputLine, Level, OutputLine, SerialLink,
};
use tracing::{debug, trace};

use crate::error::HwError;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── GPIO ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ChipState {
    levels: HashMap<u8, Level>,
    writes: HashMap<u8, Vec<Level>>,
    claimed: HashSet<u8>,
    failing: HashSet<u8>,
}

/// Simulated GPIO bank. Unclaimed inputs read `High` (switch open, pulled up).
#[derive(Debug, Clone)]
pub struct SimulatedChip {
    available: bool,
    state: Arc<Mutex<ChipState>>,
}

impl Default for SimulatedChip {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedChip {
    pub fn new() -> Self {
        Self {
            available: true,
            state: Arc::new(Mutex::new(ChipState::default())),
        }
    }

    /// A chip whose subsystem check fails and which refuses every request.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Drive an input pin, e.g. close a limit switch with `Level::Low`.
    pub fn set_input(&self, pin: u8, level: Level) {
        lock(&self.state).levels.insert(pin, level);
    }

    /// Current level of a pin as last written or driven.
    pub fn level(&self, pin: u8) -> Level {
        lock(&self.state)
            .levels
            .get(&pin)
            .copied()
            .unwrap_or(Level::High)
    }

    /// Every level written to an output pin, in order.
    pub fn writes(&self, pin: u8) -> Vec<Level> {
        lock(&self.state)
            .writes
            .get(&pin)
            .cloned()
            .unwrap_or_default()
    }

    /// Make subsequent reads/writes on `pin` fail.
    pub fn fail_pin(&self, pin: u8) {
        lock(&self.state).failing.insert(pin);
    }

    pub fn is_claimed(&self, pin: u8) -> bool {
        lock(&self.state).claimed.contains(&pin)
    }

    fn claim(&self, pin: u8) -> Result<(), HwError> {
        if !self.available {
            return Err(HwError::GpioUnavailable("simulated chip disabled".into()));
        }
        let mut st = lock(&self.state);
        if !st.claimed.insert(pin) {
            return Err(HwError::Gpio {
                pin,
                reason: "line busy".into(),
            });
        }
        Ok(())
    }
}

impl GpioChip for SimulatedChip {
    fn available(&self) -> bool {
        self.available
    }

    fn request_output(&self, pin: u8) -> Result<Box<dyn OutputLine>, BoxError> {
        self.claim(pin)?;
        lock(&self.state).levels.insert(pin, Level::Low);
        Ok(Box::new(SimLine {
            pin,
            chip: self.clone(),
        }))
    }

    fn request_input(&self, pin: u8) -> Result<Box<dyn InputLine>, BoxError> {
        self.claim(pin)?;
        Ok(Box::new(SimLine {
            pin,
            chip: self.clone(),
        }))
    }
}

struct SimLine {
    pin: u8,
    chip: SimulatedChip,
}

impl SimLine {
    fn check(&self, st: &ChipState) -> Result<(), HwError> {
        if st.failing.contains(&self.pin) {
            return Err(HwError::Gpio {
                pin: self.pin,
                reason: "simulated line fault".into(),
            });
        }
        Ok(())
    }
}

impl OutputLine for SimLine {
    fn set_value(&mut self, level: Level) -> Result<(), BoxError> {
        let mut st = lock(&self.chip.state);
        self.check(&st)?;
        st.levels.insert(self.pin, level);
        st.writes.entry(self.pin).or_default().push(level);
        Ok(())
    }
}

impl InputLine for SimLine {
    fn get_value(&mut self) -> Result<Level, BoxError> {
        let st = lock(&self.chip.state);
        self.check(&st)?;
        Ok(st.levels.get(&self.pin).copied().unwrap_or(Level::High))
    }
}

impl Drop for SimLine {
    fn drop(&mut self) {
        lock(&self.chip.state).claimed.remove(&self.pin);
    }
}

// ── Rangefinder ──────────────────────────────────────────────────────────────

const INFO_HEADER: u8 = 0x5A;
const MEASURE_HEADER: u8 = 0x59;

#[derive(Debug)]
struct LunaState {
    inbound: Vec<u8>,
    outbound: VecDeque<u8>,
    baud_rate: u32,
    sample_rate: u16,
    next_frame_at: Option<Instant>,
    distances: Vec<u16>,
    cursor: usize,
    amplitude: u16,
    raw_temp: u16,
    version: [u8; 3],
    muted: bool,
    fail_writes: bool,
    fail_flush: bool,
    max_chunk: usize,
    received: Vec<u8>,
}

impl Default for LunaState {
    fn default() -> Self {
        Self {
            inbound: Vec::new(),
            outbound: VecDeque::new(),
            baud_rate: 115_200,
            sample_rate: 100,
            next_frame_at: None,
            distances: vec![150],
            cursor: 0,
            amplitude: 1_000,
            // (2248 / 8) - 256 = 25 °C
            raw_temp: 2_248,
            version: [3, 0, 4],
            muted: false,
            fail_writes: false,
            fail_flush: false,
            max_chunk: usize::MAX,
            received: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct LunaShared {
    state: Mutex<LunaState>,
    ready: Condvar,
}

/// Behavioural model of the LiDAR rangefinder on the far side of a serial link.
///
/// Command frames written to the sink are answered on the source with the
/// same framing the real sensor uses; while the sample rate is non-zero,
/// 9-byte measurement frames are pushed at that rate.
#[derive(Debug, Clone, Default)]
pub struct SimulatedLuna {
    shared: Arc<LunaShared>,
}

impl SimulatedLuna {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distances reported by successive measurement frames; the last value repeats.
    pub fn set_distances(&self, distances: impl Into<Vec<u16>>) {
        let mut st = lock(&self.shared.state);
        st.distances = distances.into();
        st.cursor = 0;
    }

    pub fn set_amplitude(&self, amplitude: u16) {
        lock(&self.shared.state).amplitude = amplitude;
    }

    /// Stop answering commands (measurement push continues).
    pub fn set_muted(&self, muted: bool) {
        lock(&self.shared.state).muted = muted;
    }

    pub fn set_write_failure(&self, fail: bool) {
        lock(&self.shared.state).fail_writes = fail;
    }

    pub fn set_flush_failure(&self, fail: bool) {
        lock(&self.shared.state).fail_flush = fail;
    }

    /// Cap the number of bytes a single read returns, to exercise reassembly.
    pub fn set_max_chunk(&self, n: usize) {
        lock(&self.shared.state).max_chunk = n.max(1);
    }

    pub fn sample_rate(&self) -> u16 {
        lock(&self.shared.state).sample_rate
    }

    pub fn baud_rate(&self) -> u32 {
        lock(&self.shared.state).baud_rate
    }

    /// Command ids received so far, in order.
    pub fn received_commands(&self) -> Vec<u8> {
        lock(&self.shared.state).received.clone()
    }

    /// Queue raw bytes on the device's transmit side.
    pub fn inject(&self, bytes: &[u8]) {
        lock(&self.shared.state).outbound.extend(bytes.iter().copied());
        self.shared.ready.notify_all();
    }

    fn accept(&self, bytes: &[u8]) {
        let mut st = lock(&self.shared.state);
        st.inbound.extend_from_slice(bytes);
        loop {
            match st.inbound.first() {
                None => break,
                Some(&INFO_HEADER) => {}
                Some(_) => {
                    st.inbound.remove(0);
                    continue;
                }
            }
            let Some(&len) = st.inbound.get(1) else { break };
            let len = usize::from(len);
            if len < 4 {
                st.inbound.remove(0);
                continue;
            }
            if st.inbound.len() < len {
                break;
            }
            let frame: Vec<u8> = st.inbound.drain(..len).collect();
            st.handle(&frame);
        }
        drop(st);
        self.shared.ready.notify_all();
    }
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

impl LunaState {
    fn handle(&mut self, frame: &[u8]) {
        let id = frame[2];
        let payload = &frame[3..frame.len() - 1];
        self.received.push(id);
        trace!(id, ?payload, "simulated rangefinder command");
        match id {
            // Trigger: one frame on demand, only meaningful with push disabled.
            0x04 => {
                if self.sample_rate == 0 {
                    self.push_measurement();
                }
                return;
            }
            0x06 => {
                if let [b0, b1, b2, b3, ..] = *payload {
                    self.baud_rate = u32::from_le_bytes([b0, b1, b2, b3]);
                }
            }
            0x03 => {
                if let [lo, hi, ..] = *payload {
                    self.sample_rate = u16::from_le_bytes([lo, hi]);
                    self.next_frame_at = (self.sample_rate > 0).then(Instant::now);
                }
            }
            0x02 | 0x10 | 0x11 | 0x01 => {}
            other => {
                debug!(id = other, "simulated rangefinder ignoring command");
                return;
            }
        }
        if self.muted {
            return;
        }
        let body: Vec<u8> = match id {
            0x06 => self.baud_rate.to_le_bytes().to_vec(),
            0x03 => self.sample_rate.to_le_bytes().to_vec(),
            0x01 => self.version.to_vec(),
            _ => vec![0x00],
        };
        let mut reply = vec![INFO_HEADER, (body.len() + 4) as u8, id];
        reply.extend_from_slice(&body);
        reply.push(checksum(&reply));
        self.outbound.extend(reply);
    }

    fn push_measurement(&mut self) {
        let dist = self
            .distances
            .get(self.cursor)
            .or(self.distances.last())
            .copied()
            .unwrap_or(0);
        if self.cursor < self.distances.len() {
            self.cursor += 1;
        }
        let mut frame = vec![MEASURE_HEADER, MEASURE_HEADER];
        frame.extend_from_slice(&dist.to_le_bytes());
        frame.extend_from_slice(&self.amplitude.to_le_bytes());
        frame.extend_from_slice(&self.raw_temp.to_le_bytes());
        frame.push(checksum(&frame));
        self.outbound.extend(frame);
    }

    fn period(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.sample_rate.max(1)))
    }
}

struct LunaSource {
    device: SimulatedLuna,
    read_timeout: Duration,
}

impl ByteSource for LunaSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BoxError> {
        let shared = &self.device.shared;
        let deadline = Instant::now() + self.read_timeout;
        let mut st = lock(&shared.state);
        loop {
            let now = Instant::now();
            if st.sample_rate > 0 && st.next_frame_at.is_none() {
                st.next_frame_at = Some(now);
            }
            if st.sample_rate > 0
                && let Some(at) = st.next_frame_at
                && now >= at
            {
                st.push_measurement();
                st.next_frame_at = Some(now + st.period());
            }
            if !st.outbound.is_empty() {
                let n = buf.len().min(st.outbound.len()).min(st.max_chunk);
                for slot in buf.iter_mut().take(n) {
                    *slot = st.outbound.pop_front().unwrap_or_default();
                }
                return Ok(n);
            }
            if now >= deadline {
                return Ok(0);
            }
            let mut wake = deadline;
            if st.sample_rate > 0
                && let Some(at) = st.next_frame_at
            {
                wake = wake.min(at);
            }
            st = shared
                .ready
                .wait_timeout(st, wake.saturating_duration_since(now))
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }
}

struct LunaSink {
    device: SimulatedLuna,
}

impl ByteSink for LunaSink {
    fn write(&mut self, bytes: &[u8]) -> Result<(), BoxError> {
        if lock(&self.device.shared.state).fail_writes {
            return Err(Box::new(HwError::Write("simulated write fault".into())));
        }
        self.device.accept(bytes);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), BoxError> {
        if lock(&self.device.shared.state).fail_flush {
            return Err(Box::new(HwError::Flush("simulated drain fault".into())));
        }
        Ok(())
    }
}

/// A set of simulated rangefinders addressed by device path.
///
/// Unknown paths get a fresh default device on open unless the link is strict.
#[derive(Debug, Clone, Default)]
pub struct SimulatedSerial {
    devices: Arc<Mutex<HashMap<String, SimulatedLuna>>>,
    strict: bool,
    read_timeout: Duration,
}

impl SimulatedSerial {
    pub fn new() -> Self {
        Self {
            read_timeout: Duration::from_millis(20),
            ..Self::default()
        }
    }

    /// Only paths registered with `with_device` can be opened.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn with_device(self, path: &str, device: SimulatedLuna) -> Self {
        lock(&self.devices).insert(path.to_string(), device);
        self
    }

    pub fn device(&self, path: &str) -> Option<SimulatedLuna> {
        lock(&self.devices).get(path).cloned()
    }
}

impl SerialLink for SimulatedSerial {
    fn open(
        &self,
        path: &str,
        baud_rate: u32,
    ) -> Result<(Box<dyn ByteSource>, Box<dyn ByteSink>), BoxError> {
        let device = {
            let mut devices = lock(&self.devices);
            match devices.get(path) {
                Some(d) => d.clone(),
                None if self.strict => {
                    return Err(Box::new(HwError::SerialOpen {
                        path: path.to_string(),
                        reason: "no such device".into(),
                    }));
                }
                None => devices.entry(path.to_string()).or_default().clone(),
            }
        };
        debug!(path, baud_rate, "simulated serial open");
        Ok((
            Box::new(LunaSource {
                device: device.clone(),
                read_timeout: self.read_timeout,
            }),
            Box::new(LunaSink { device }),
        ))
    }
}
