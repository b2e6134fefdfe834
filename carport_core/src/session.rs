//! Command/response session over one rangefinder serial channel.
//!
//! A reader thread owns the receive half, runs every byte through a
//! [`ProtocolCodec`] and routes each decoded frame to exactly one place:
//! info replies go to the command waiter, measurement frames go to the
//! observation channel handed in at `open`. Commands are serialized by the
//! sink lock, so at most one is outstanding per channel.
//!
//! Safety: each session spawns exactly one thread; dropping the session
//! raises the shutdown flag and joins it. The thread notices within one
//! transport read timeout.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use carport_traits::{ByteSink, ByteSource, SerialLink};
use crossbeam_channel as xch;
use tracing::{debug, trace, warn};

use crate::codec::{Command, DecodedResponse, Measurement, ProtocolCodec};
use crate::error::CarportError;
use crate::hw_error::map_transport_error;
use crate::util::{lock, millis};

/// Pause after a failed read so a dead port does not spin the reader.
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(100);
const READ_CHUNK: usize = 64;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Door id, for log fields.
    pub door: usize,
    pub command_timeout: Duration,
    /// Dump each frame at trace level.
    pub frame_log: bool,
}

pub struct RangefinderSession {
    door: usize,
    command_timeout: Duration,
    sink: Mutex<Box<dyn ByteSink>>,
    replies: xch::Receiver<DecodedResponse>,
    /// Shutdown flag for the reader thread
    shutdown: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

impl RangefinderSession {
    /// Open `path` at `baud_rate` (8N1) and start the reader thread.
    pub fn open(
        link: &dyn SerialLink,
        path: &str,
        baud_rate: u32,
        opts: SessionOptions,
        measurements: xch::Sender<Measurement>,
    ) -> Result<Self, CarportError> {
        let (source, sink) = link
            .open(path, baud_rate)
            .map_err(|e| map_transport_error("open", e.as_ref()))?;
        debug!(door = opts.door, path, baud_rate, "rangefinder channel open");

        let (reply_tx, replies) = xch::unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));
        let codec = ProtocolCodec::new().with_frame_log(opts.frame_log);
        let reader = Reader {
            door: opts.door,
            source,
            codec,
            replies: reply_tx,
            measurements,
            shutdown: shutdown.clone(),
        };
        let join_handle = std::thread::Builder::new()
            .name(format!("rangefinder-{}", opts.door))
            .spawn(move || reader.run())
            .map_err(|e| CarportError::Transport {
                op: "open",
                reason: format!("spawn reader thread: {e}"),
            })?;

        Ok(Self {
            door: opts.door,
            command_timeout: opts.command_timeout,
            sink: Mutex::new(sink),
            replies,
            shutdown,
            join_handle: Some(join_handle),
        })
    }

    /// Write `command`, flush, and wait for its reply.
    ///
    /// Replies with a different command id (late answers to an earlier,
    /// timed-out command) are discarded while waiting. Measurement frames
    /// never reach this path.
    pub fn send_command(&self, command: &Command) -> Result<DecodedResponse, CarportError> {
        if !command.expects_reply() {
            return Err(CarportError::Validation(format!(
                "{} has no reply; use trigger_measurement",
                command.id()
            )));
        }
        let mut sink = lock(&self.sink);
        for stale in self.replies.try_iter() {
            debug!(door = self.door, reply = ?stale, "discarding unclaimed reply");
        }

        let frame = command.encode();
        trace!(door = self.door, command = %command.id(), ?frame, "sending");
        write_frame(&mut **sink, &frame)?;

        let deadline = Instant::now() + self.command_timeout;
        loop {
            match self.replies.recv_deadline(deadline) {
                Ok(reply) if reply.command_id() == command.id() => return Ok(reply),
                Ok(other) => {
                    debug!(door = self.door, reply = ?other, expected = %command.id(), "reply for another command");
                }
                Err(xch::RecvTimeoutError::Timeout) => {
                    return Err(CarportError::Timeout {
                        command: command.id(),
                        after_ms: millis(self.command_timeout),
                    });
                }
                Err(xch::RecvTimeoutError::Disconnected) => {
                    return Err(CarportError::Transport {
                        op: "read",
                        reason: "reader thread stopped".into(),
                    });
                }
            }
        }
    }

    /// Ask for one measurement frame. It arrives on the measurement channel.
    pub fn trigger_measurement(&self) -> Result<(), CarportError> {
        let mut sink = lock(&self.sink);
        write_frame(&mut **sink, &Command::TriggerMeasurement.encode())
    }
}

fn write_frame(sink: &mut dyn ByteSink, frame: &[u8]) -> Result<(), CarportError> {
    sink.write(frame)
        .map_err(|e| map_transport_error("write", e.as_ref()))?;
    sink.flush()
        .map_err(|e| map_transport_error("flush", e.as_ref()))
}

impl Drop for RangefinderSession {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => trace!(door = self.door, "rangefinder reader joined"),
                Err(e) => warn!(door = self.door, ?e, "rangefinder reader panicked"),
            }
        }
    }
}

struct Reader {
    door: usize,
    source: Box<dyn ByteSource>,
    codec: ProtocolCodec,
    replies: xch::Sender<DecodedResponse>,
    measurements: xch::Sender<Measurement>,
    shutdown: Arc<AtomicBool>,
}

impl Reader {
    fn run(mut self) {
        let mut buf = [0u8; READ_CHUNK];
        let mut failing = false;
        while !self.shutdown.load(Ordering::Relaxed) {
            match self.source.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    failing = false;
                    self.dispatch(&buf[..n]);
                }
                Err(e) => {
                    // Log the first failure of a run, then stay quiet.
                    if !failing {
                        warn!(door = self.door, error = %e, "rangefinder read failed");
                    }
                    failing = true;
                    std::thread::sleep(READ_ERROR_BACKOFF);
                }
            }
        }
        let dropped = self.codec.finish();
        if dropped > 0 {
            debug!(door = self.door, dropped, "discarding partial frame at shutdown");
        }
        trace!(door = self.door, "rangefinder reader exiting");
    }

    fn dispatch(&mut self, bytes: &[u8]) {
        for decoded in self.codec.feed(bytes) {
            match decoded {
                Ok(DecodedResponse::Measurement(m)) => {
                    // Receiver gone means the controller is shutting down.
                    let _ = self.measurements.send(m);
                }
                Ok(reply) => {
                    let _ = self.replies.send(reply);
                }
                Err(e) => debug!(door = self.door, error = %e, "dropped rangefinder frame"),
            }
        }
    }
}
