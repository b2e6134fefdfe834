//! Per-door orchestration: GPIO lines, rangefinder session, motion tracking.
//!
//! A controller is built once per configured door, initialized once, and
//! then serves requests for the life of the process. Hardware faults during
//! `init` are logged and leave the controller `Degraded`; they never escape.
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use carport_traits::{Clock, GpioChip, InputLine, Level, OutputLine, SerialLink};
use crossbeam_channel as xch;
use tracing::{debug, error, info, trace, warn};

use crate::codec::{Command, DecodedResponse, Measurement};
use crate::config::{DoorSettings, SessionTimings};
use crate::error::CarportError;
use crate::hw_error::map_gpio_error;
use crate::motion::{MotionClassifier, MotionSample, MotionState};
use crate::session::{RangefinderSession, SessionOptions};
use crate::status::{DoorStatus, Lifecycle, ObserveTargets, RangefinderStatus};
use crate::util::{lock, millis};

/// State written by the monitor thread and read by request handlers.
struct Shared {
    status: Mutex<RangefinderStatus>,
    classifier: Mutex<MotionClassifier>,
    observe: Mutex<ObserveTargets>,
}

impl Shared {
    fn motion(&self) -> MotionState {
        lock(&self.classifier).motion()
    }

    fn on_measurement(&self, door: usize, m: &Measurement) {
        lock(&self.status).record_measurement(m);
        let motion = {
            let mut c = lock(&self.classifier);
            c.input(MotionSample::new(m.sequence, f64::from(m.distance_cm)));
            c.motion()
        };
        if lock(&self.observe).measurements {
            info!(door, sequence = m.sequence, distance_cm = m.distance_cm, amplitude = m.amplitude, temperature = %m.temperature_label(), %motion, "measurement");
        } else {
            debug!(door, sequence = m.sequence, distance_cm = m.distance_cm, amplitude = m.amplitude, %motion, "measurement");
        }
    }

    fn on_reply(&self, door: usize, reply: &DecodedResponse) {
        lock(&self.status).apply(reply);
        if lock(&self.observe).parser_command_response {
            info!(door, command = %reply.command_id(), ?reply, "rangefinder reply");
        } else {
            debug!(door, command = %reply.command_id(), ?reply, "rangefinder reply");
        }
    }
}

/// Background task: drains measurements into the classifier and reports
/// motion changes on a fixed cadence. Joined on drop.
struct Monitor {
    stop: Option<xch::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl Monitor {
    fn spawn(
        door: usize,
        measurements: xch::Receiver<Measurement>,
        shared: Arc<Shared>,
        poll: Duration,
    ) -> Self {
        let (stop_tx, stop_rx) = xch::bounded::<()>(0);
        let spawned = std::thread::Builder::new()
            .name(format!("door-monitor-{door}"))
            .spawn(move || {
                let ticker = xch::tick(poll);
                let never = xch::never();
                let mut feed_closed = false;
                let mut reported = shared.motion();
                loop {
                    let feed = if feed_closed { &never } else { &measurements };
                    let stop = xch::select! {
                        recv(feed) -> msg => {
                            match msg {
                                Ok(m) => shared.on_measurement(door, &m),
                                // Session gone (or never opened); keep polling.
                                Err(_) => feed_closed = true,
                            }
                            false
                        },
                        recv(ticker) -> _ => {
                            let now = shared.motion();
                            if now != reported {
                                info!(door, from = %reported, to = %now, "door motion changed");
                                reported = now;
                            }
                            false
                        },
                        recv(stop_rx) -> _ => true,
                    };
                    if stop {
                        break;
                    }
                }
                trace!(door, "door monitor exiting");
            });
        let join_handle = match spawned {
            Ok(h) => Some(h),
            Err(e) => {
                warn!(door, error = %e, "could not start door monitor");
                None
            }
        };
        Self {
            stop: Some(stop_tx),
            join_handle,
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        // Disconnecting the stop channel wakes the select.
        self.stop.take();
        if let Some(handle) = self.join_handle.take()
            && handle.join().is_err()
        {
            warn!("door monitor panicked during shutdown");
        }
    }
}

pub struct DoorController {
    id: usize,
    settings: DoorSettings,
    timings: SessionTimings,
    clock: Arc<dyn Clock + Send + Sync>,
    lifecycle: Lifecycle,
    /// Held for the whole pulse, so concurrent actuations queue up.
    actuator: Mutex<Option<Box<dyn OutputLine>>>,
    down_switch: Mutex<Option<Box<dyn InputLine>>>,
    up_switch: Mutex<Option<Box<dyn InputLine>>>,
    shared: Arc<Shared>,
    monitor: Option<Monitor>,
    session: Option<RangefinderSession>,
}

impl DoorController {
    pub fn new(
        id: usize,
        settings: DoorSettings,
        timings: SessionTimings,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let classifier =
            MotionClassifier::new(settings.motion.max_slope, settings.motion.jitter_slope);
        Self {
            id,
            settings,
            timings,
            clock,
            lifecycle: Lifecycle::Uninitialized,
            actuator: Mutex::new(None),
            down_switch: Mutex::new(None),
            up_switch: Mutex::new(None),
            shared: Arc::new(Shared {
                status: Mutex::new(RangefinderStatus::default()),
                classifier: Mutex::new(classifier),
                observe: Mutex::new(ObserveTargets::default()),
            }),
            monitor: None,
            session: None,
        }
    }

    /// Acquire lines, start the motion monitor, open the rangefinder and run
    /// its bring-up sequence. Never fails; returns the resulting lifecycle.
    pub fn init(&mut self, chip: &dyn GpioChip, link: &dyn SerialLink) -> Lifecycle {
        let door = self.id;
        self.lifecycle = Lifecycle::Initializing;
        info!(door, "initializing door controller");
        let mut healthy = true;

        if let Err(e) = self.acquire_lines(chip) {
            error!(door, error = %e, "gpio setup failed");
            healthy = false;
        }

        let (meas_tx, meas_rx) = xch::unbounded();
        self.monitor = Some(Monitor::spawn(
            door,
            meas_rx,
            self.shared.clone(),
            self.timings.motion_poll,
        ));

        let rf = &self.settings.rangefinder;
        let opts = SessionOptions {
            door,
            command_timeout: self.timings.command_timeout,
            frame_log: rf.frame_log,
        };
        match RangefinderSession::open(link, &rf.serial_port, rf.baud_rate, opts, meas_tx) {
            Ok(session) => {
                if let Err(e) = self.bring_up(&session) {
                    error!(door, error = %e, "rangefinder bring-up incomplete");
                    healthy = false;
                }
                self.session = Some(session);
            }
            Err(e) => {
                error!(door, path = %rf.serial_port, error = %e, "rangefinder unavailable");
                healthy = false;
            }
        }

        self.lifecycle = if healthy {
            Lifecycle::Ready
        } else {
            Lifecycle::Degraded
        };
        info!(door, lifecycle = ?self.lifecycle, "door controller initialized");
        self.lifecycle
    }

    fn acquire_lines(&self, chip: &dyn GpioChip) -> Result<(), CarportError> {
        if !chip.available() {
            return Err(CarportError::HardwareUnavailable(
                "gpio subsystem not available".into(),
            ));
        }
        let mut first_err = None;
        match chip.request_output(self.settings.actuator_pin) {
            Ok(line) => *lock(&self.actuator) = Some(line),
            Err(e) => {
                first_err.get_or_insert(map_gpio_error(e.as_ref()));
            }
        }
        for (pin, slot) in [
            (self.settings.down_switch_pin, &self.down_switch),
            (self.settings.up_switch_pin, &self.up_switch),
        ] {
            match chip.request_input(pin) {
                Ok(line) => *lock(slot) = Some(line),
                Err(e) => {
                    first_err.get_or_insert(map_gpio_error(e.as_ref()));
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Soft reset, baud rate, sampling off, save, version; each followed by
    /// its settle delay. Every step runs; the first failure is returned.
    fn bring_up(&self, session: &RangefinderSession) -> Result<(), CarportError> {
        let steps = [
            (Command::SoftReset, self.timings.reset_settle),
            (
                Command::SetBaudRate(self.settings.rangefinder.baud_rate),
                self.timings.step_settle,
            ),
            (Command::SetSampleRate(0), self.timings.step_settle),
            (Command::SaveCurrentSettings, self.timings.step_settle),
            (Command::GetVersion, self.timings.step_settle),
        ];
        let mut first_err = None;
        for (command, settle) in steps {
            match session.send_command(&command) {
                Ok(reply) => self.shared.on_reply(self.id, &reply),
                Err(e) => {
                    warn!(door = self.id, command = %command.id(), error = %e, "bring-up step failed");
                    first_err.get_or_insert(e);
                }
            }
            self.clock.sleep(settle);
        }
        first_err.map_or(Ok(()), Err)
    }

    fn session(&self) -> Result<&RangefinderSession, CarportError> {
        self.session
            .as_ref()
            .ok_or(CarportError::NotReady { door: self.id })
    }

    fn command(&self, command: Command) -> Result<(), CarportError> {
        let reply = self.session()?.send_command(&command)?;
        self.shared.on_reply(self.id, &reply);
        Ok(())
    }

    /// Pulse the actuator high for the configured width, then low.
    ///
    /// The door's new position is not awaited; callers poll [`check`](Self::check).
    pub fn actuate(&self) -> Result<DoorStatus, CarportError> {
        let mut guard = lock(&self.actuator);
        let line = guard.as_mut().ok_or_else(|| {
            CarportError::HardwareUnavailable(format!("door {} actuator line not acquired", self.id))
        })?;
        debug!(door = self.id, pulse_ms = millis(self.settings.pulse), "actuator pulse");
        let raised = line.set_value(Level::High);
        if raised.is_ok() {
            self.clock.sleep(self.settings.pulse);
        }
        // Always attempt to release the relay.
        let released = line.set_value(Level::Low);
        raised
            .and(released)
            .map_err(|e| map_gpio_error(e.as_ref()))?;
        Ok(DoorStatus::Unknown)
    }

    pub fn open(&self) -> Result<DoorStatus, CarportError> {
        info!(door = self.id, "open requested");
        self.actuate()
    }

    pub fn close(&self) -> Result<DoorStatus, CarportError> {
        info!(door = self.id, "close requested");
        self.actuate()
    }

    /// Down switch low means closed; otherwise up switch low means open.
    pub fn check(&self) -> DoorStatus {
        let made = |line: &Mutex<Option<Box<dyn InputLine>>>, which: &'static str| {
            self.read_switch(line, which).is_some_and(Level::is_low)
        };
        let status = if made(&self.down_switch, "down") {
            DoorStatus::Closed
        } else if made(&self.up_switch, "up") {
            DoorStatus::Open
        } else {
            DoorStatus::Unknown
        };
        debug!(door = self.id, %status, "door checked");
        status
    }

    fn read_switch(
        &self,
        line: &Mutex<Option<Box<dyn InputLine>>>,
        which: &'static str,
    ) -> Option<Level> {
        let mut guard = lock(line);
        let line = guard.as_mut()?;
        match line.get_value() {
            Ok(level) => Some(level),
            Err(e) => {
                warn!(door = self.id, switch = which, error = %e, "limit switch read failed");
                None
            }
        }
    }

    /// Enable push sampling at the configured rate.
    pub fn start_measurement(&self) -> Result<(), CarportError> {
        self.command(Command::SetSampleRate(self.settings.rangefinder.sample_rate))
    }

    pub fn stop_measurement(&self) -> Result<(), CarportError> {
        self.command(Command::SetSampleRate(0))
    }

    /// Request a single frame, unless push sampling already produces them.
    pub fn get_measurement(&self) -> Result<(), CarportError> {
        let session = self.session()?;
        if lock(&self.shared.status).sample_rate == 0 {
            session.trigger_measurement()?;
        } else {
            trace!(door = self.id, "sampling active; no trigger needed");
        }
        Ok(())
    }

    pub fn restore_default_settings(&self) -> Result<(), CarportError> {
        self.command(Command::RestoreDefaultSettings)
    }

    pub fn observe(&self, targets: ObserveTargets) {
        info!(door = self.id, measurements = targets.measurements, parser_command_response = targets.parser_command_response, "observe targets updated");
        *lock(&self.shared.observe) = targets;
    }

    pub fn observe_targets(&self) -> ObserveTargets {
        *lock(&self.shared.observe)
    }

    pub fn motion(&self) -> MotionState {
        self.shared.motion()
    }

    /// Current adaptive slope ceiling of the classifier.
    pub fn max_slope(&self) -> f64 {
        lock(&self.shared.classifier).max_slope
    }

    pub fn rangefinder_status(&self) -> RangefinderStatus {
        lock(&self.shared.status).clone()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn settings(&self) -> &DoorSettings {
        &self.settings
    }
}

impl Drop for DoorController {
    fn drop(&mut self) {
        // Stop the reader before the monitor so no frame is left in flight.
        self.session.take();
        self.monitor.take();
        trace!(door = self.id, "door controller stopped");
    }
}
