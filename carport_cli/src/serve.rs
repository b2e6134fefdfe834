//! Line-oriented request loop: one JSON request in, one JSON response out.
//!
//! Each door gets its own worker thread, so a slow or silent rangefinder only
//! delays requests for that door. Responses are written by the loop thread in
//! completion order; requests for the same door are answered in arrival order.

use std::io::{self, BufRead, Write};
use std::thread;

use carport_core::{DoorControllerRegistry, ServiceRequest, ServiceResponse};
use crossbeam_channel as xch;
use eyre::WrapErr;
use tracing::{debug, error, info, warn};

/// Spawn a detached thread that forwards stdin lines.
///
/// The thread is never joined: a blocked stdin read cannot be interrupted,
/// and the process exits right after the loop returns.
pub fn stdin_lines() -> xch::Receiver<io::Result<String>> {
    let (tx, rx) = xch::bounded(16);
    let spawned = std::thread::Builder::new()
        .name("stdin".into())
        .spawn(move || forward_lines(io::stdin().lock(), &tx));
    if let Err(e) = spawned {
        warn!(error = %e, "could not spawn stdin reader; serving no requests");
    }
    rx
}

fn forward_lines(input: impl BufRead, tx: &xch::Sender<io::Result<String>>) {
    for line in input.lines() {
        if tx.send(line).is_err() {
            return;
        }
    }
}

enum Next {
    Line(io::Result<String>),
    Answer(ServiceResponse),
    Finished,
}

/// Answer requests until the line source closes or `stop` fires.
///
/// Requests already queued for a door are still answered after that.
/// Returns the number of responses written.
pub fn serve(
    registry: &DoorControllerRegistry,
    lines: &xch::Receiver<io::Result<String>>,
    stop: &xch::Receiver<()>,
    out: &mut impl Write,
) -> eyre::Result<usize> {
    thread::scope(|scope| -> eyre::Result<usize> {
        let (answer_tx, answers) = xch::unbounded::<ServiceResponse>();
        let mut queues = Vec::with_capacity(registry.len());
        for id in 0..registry.len() {
            queues.push(spawn_door_worker(scope, registry, id, answer_tx.clone())?);
        }
        // Only the workers hold senders now; `answers` closes once they exit.
        drop(answer_tx);

        let mut written = 0usize;
        loop {
            let next = xch::select! {
                recv(lines) -> msg => msg.map_or(Next::Finished, Next::Line),
                recv(answers) -> msg => msg.map_or(Next::Finished, Next::Answer),
                recv(stop) -> _ => {
                    info!("stop requested");
                    Next::Finished
                },
            };
            match next {
                Next::Line(line) => {
                    let line = line.wrap_err("read request line")?;
                    if let Some(response) = dispatch(registry, &queues, line.trim()) {
                        write_response(out, &response)?;
                        written += 1;
                    }
                }
                Next::Answer(response) => {
                    write_response(out, &response)?;
                    written += 1;
                }
                Next::Finished => break,
            }
        }

        debug!("request loop finished; draining door queues");
        drop(queues);
        for response in &answers {
            write_response(out, &response)?;
            written += 1;
        }
        Ok(written)
    })
}

fn spawn_door_worker<'scope, 'env>(
    scope: &'scope thread::Scope<'scope, 'env>,
    registry: &'env DoorControllerRegistry,
    id: usize,
    answers: xch::Sender<ServiceResponse>,
) -> eyre::Result<xch::Sender<ServiceRequest>> {
    let (tx, rx) = xch::unbounded::<ServiceRequest>();
    thread::Builder::new()
        .name(format!("door-{id}-requests"))
        .spawn_scoped(scope, move || {
            for request in rx {
                if answers.send(registry.handle(&request)).is_err() {
                    return;
                }
            }
        })
        .wrap_err_with(|| format!("spawn request worker for door {id}"))?;
    Ok(tx)
}

/// Queue `line` on its door's worker. Requests that never reach a door are
/// answered here and returned.
fn dispatch(
    registry: &DoorControllerRegistry,
    queues: &[xch::Sender<ServiceRequest>],
    line: &str,
) -> Option<ServiceResponse> {
    if line.is_empty() {
        return None;
    }
    let request = match ServiceRequest::from_json(line) {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "rejected request");
            return Some(ServiceResponse::rejected(&e));
        }
    };
    match queues.get(request.garage_door_id()) {
        Some(queue) => match queue.send(request) {
            Ok(()) => None,
            Err(xch::SendError(request)) => Some(registry.handle(&request)),
        },
        // Out of range: the registry answers with a 400.
        None => Some(registry.handle(&request)),
    }
}

fn write_response(out: &mut impl Write, response: &ServiceResponse) -> eyre::Result<()> {
    serde_json::to_writer(&mut *out, response).wrap_err("encode response")?;
    out.write_all(b"\n").wrap_err("write response")?;
    out.flush().wrap_err("flush response")
}

#[cfg(test)]
mod tests {
    use super::*;
    use carport_core::{
        DoorPlatform, DoorSettings, MotionThresholds, RangefinderSettings, SessionTimings,
    };
    use carport_hardware::{SimulatedChip, SimulatedSerial};
    use carport_traits::MonotonicClock;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn door(actuator_pin: u8, serial_port: &str) -> DoorSettings {
        DoorSettings {
            actuator_pin,
            down_switch_pin: actuator_pin + 1,
            up_switch_pin: actuator_pin + 2,
            pulse: Duration::from_millis(1),
            check_delay: Duration::from_secs(13),
            motion: MotionThresholds::default(),
            rangefinder: RangefinderSettings {
                serial_port: serial_port.into(),
                baud_rate: 115_200,
                sample_rate: 5,
                closed_limit_cm: 0,
                open_limit_cm: 0,
                frame_log: false,
            },
        }
    }

    fn registry_with(
        doors: Vec<DoorSettings>,
        serial: SimulatedSerial,
        command_timeout: Duration,
    ) -> DoorControllerRegistry {
        let timings = SessionTimings {
            command_timeout,
            reset_settle: Duration::ZERO,
            step_settle: Duration::ZERO,
            motion_poll: Duration::from_millis(50),
        };
        let platform = DoorPlatform {
            gpio: Arc::new(SimulatedChip::new()),
            serial: Arc::new(serial),
        };
        DoorControllerRegistry::start(doors, timings, platform, Arc::new(MonotonicClock))
            .unwrap()
    }

    fn registry() -> DoorControllerRegistry {
        registry_with(
            vec![door(17, "/dev/sim0")],
            SimulatedSerial::new(),
            Duration::from_millis(500),
        )
    }

    /// Records each flushed line with the time it was written.
    struct Timestamped {
        start: Instant,
        pending: Vec<u8>,
        lines: Vec<(Duration, serde_json::Value)>,
    }

    impl Write for Timestamped {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.pending.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            let text = String::from_utf8_lossy(&self.pending).trim().to_string();
            if !text.is_empty() {
                let value = serde_json::from_str(&text).map_err(io::Error::other)?;
                self.lines.push((self.start.elapsed(), value));
            }
            self.pending.clear();
            Ok(())
        }
    }

    #[test]
    fn answers_each_line_and_skips_blanks() {
        let reg = registry();
        let (tx, rx) = xch::unbounded();
        let (_stop_tx, stop_rx) = xch::unbounded::<()>();
        for l in [
            r#"{"garageDoorId":0,"action":"check"}"#,
            "   ",
            r#"{"garageDoorId":3,"action":"check"}"#,
            "not json",
        ] {
            tx.send(Ok(l.to_string())).unwrap();
        }
        drop(tx);

        let mut out = Vec::new();
        let n = serve(&reg, &rx, &stop_rx, &mut out).unwrap();
        assert_eq!(n, 3);

        let text = String::from_utf8(out).unwrap();
        let replies: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        let ok: Vec<_> = replies.iter().filter(|r| r["statusCode"] == 201).collect();
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0]["data"]["status"], "unknown");
        let rejected: Vec<_> = replies.iter().filter(|r| r["statusCode"] == 400).collect();
        assert_eq!(rejected.len(), 2);
        assert!(rejected.iter().all(|r| r["succeeded"] == false));
    }

    #[test]
    fn silent_rangefinder_does_not_hold_up_other_doors() {
        let serial = SimulatedSerial::new();
        let reg = registry_with(
            vec![door(17, "/dev/sim0"), door(5, "/dev/sim1")],
            serial.clone(),
            Duration::from_millis(1500),
        );
        serial.device("/dev/sim0").expect("door 0 device").set_muted(true);

        let (tx, rx) = xch::unbounded();
        let (_stop_tx, stop_rx) = xch::unbounded::<()>();
        tx.send(Ok(r#"{"garageDoorId":0,"action":"startMeasurement"}"#.to_string()))
            .unwrap();
        tx.send(Ok(r#"{"garageDoorId":1,"action":"check"}"#.to_string()))
            .unwrap();
        drop(tx);

        let mut out = Timestamped {
            start: Instant::now(),
            pending: Vec::new(),
            lines: Vec::new(),
        };
        assert_eq!(serve(&reg, &rx, &stop_rx, &mut out).unwrap(), 2);

        let (door1_at, door1) = &out.lines[0];
        assert_eq!(
            door1["message"],
            "Carport request for garageDoorId 1, action check was processed with status unknown"
        );
        assert!(
            *door1_at < Duration::from_millis(500),
            "door 1 waited {door1_at:?} behind door 0"
        );
        let (door0_at, door0) = &out.lines[1];
        assert_eq!(door0["succeeded"], false);
        assert!(*door0_at >= Duration::from_millis(1500));
    }

    #[test]
    fn requests_for_one_door_keep_their_order() {
        let reg = registry();
        let (tx, rx) = xch::unbounded();
        let (_stop_tx, stop_rx) = xch::unbounded::<()>();
        for action in ["check", "stopMeasurement", "check"] {
            tx.send(Ok(format!(r#"{{"garageDoorId":0,"action":"{action}"}}"#)))
                .unwrap();
        }
        drop(tx);

        let mut out = Vec::new();
        assert_eq!(serve(&reg, &rx, &stop_rx, &mut out).unwrap(), 3);
        let text = String::from_utf8(out).unwrap();
        let actions: Vec<bool> = text
            .lines()
            .map(|l| {
                let v: serde_json::Value = serde_json::from_str(l).unwrap();
                v["message"].as_str().unwrap().contains("action check")
            })
            .collect();
        assert_eq!(actions, vec![true, false, true]);
    }

    #[test]
    fn stop_signal_ends_the_loop() {
        let reg = registry();
        let (_tx, rx) = xch::unbounded::<io::Result<String>>();
        let (stop_tx, stop_rx) = xch::unbounded();
        stop_tx.send(()).unwrap();
        let mut out = Vec::new();
        assert_eq!(serve(&reg, &rx, &stop_rx, &mut out).unwrap(), 0);
        assert!(out.is_empty());
    }
}
