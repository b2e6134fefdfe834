//! All door controllers of the installation, plus the request envelope the
//! control surface speaks.
use std::fmt;
use std::sync::Arc;

use carport_traits::{Clock, GpioChip, SerialLink};
use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::{DoorSettings, SessionTimings};
use crate::controller::DoorController;
use crate::error::{CarportError, Result};
use crate::status::{DoorStatus, Lifecycle, ObserveTargets};

/// Success code of the response envelope.
pub const STATUS_OK: u16 = 201;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DoorAction {
    Actuate,
    Open,
    Close,
    Check,
    StartMeasurement,
    StopMeasurement,
    GetMeasurement,
}

impl fmt::Display for DoorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DoorAction::Actuate => "actuate",
            DoorAction::Open => "open",
            DoorAction::Close => "close",
            DoorAction::Check => "check",
            DoorAction::StartMeasurement => "startMeasurement",
            DoorAction::StopMeasurement => "stopMeasurement",
            DoorAction::GetMeasurement => "getMeasurement",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ObserveRequest {
    pub garage_door_id: usize,
    pub observe_targets: ObserveTargets,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ControlRequest {
    pub garage_door_id: usize,
    pub action: DoorAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceRequest {
    Observe(ObserveRequest),
    Control(ControlRequest),
}

impl ServiceRequest {
    /// Parse one JSON request. Objects carrying `observeTargets` are observe
    /// requests; everything else must be a control request.
    pub fn from_json(s: &str) -> std::result::Result<Self, CarportError> {
        let value: serde_json::Value = serde_json::from_str(s)
            .map_err(|e| CarportError::Validation(format!("request is not JSON: {e}")))?;
        let Some(obj) = value.as_object() else {
            return Err(CarportError::Validation("request must be a JSON object".into()));
        };
        if obj.contains_key("observeTargets") {
            serde_json::from_value(value)
                .map(ServiceRequest::Observe)
                .map_err(|e| CarportError::Validation(format!("observe request: {e}")))
        } else {
            serde_json::from_value(value)
                .map(ServiceRequest::Control)
                .map_err(|e| CarportError::Validation(format!("control request: {e}")))
        }
    }

    pub fn garage_door_id(&self) -> usize {
        match self {
            ServiceRequest::Observe(r) => r.garage_door_id,
            ServiceRequest::Control(r) => r.garage_door_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusData {
    pub status: DoorStatus,
}

/// Response envelope returned for every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResponse {
    pub succeeded: bool,
    pub status_code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<StatusData>,
}

impl ServiceResponse {
    fn ok(message: String, data: Option<StatusData>) -> Self {
        Self {
            succeeded: true,
            status_code: STATUS_OK,
            message,
            data,
        }
    }

    fn failed(err: &CarportError, message: String, data: Option<StatusData>) -> Self {
        Self {
            succeeded: false,
            status_code: err.status_code(),
            message,
            data,
        }
    }

    /// Envelope for a request that never reached a door.
    pub fn rejected(err: &CarportError) -> Self {
        Self::failed(err, err.to_string(), None)
    }
}

/// GPIO chip and serial link a door is wired to.
#[derive(Clone)]
pub struct DoorPlatform {
    pub gpio: Arc<dyn GpioChip>,
    pub serial: Arc<dyn SerialLink>,
}

pub struct DoorControllerRegistry {
    doors: Vec<DoorController>,
}

impl DoorControllerRegistry {
    /// Build and initialize one controller per door, all on the same platform.
    pub fn start(
        doors: Vec<DoorSettings>,
        timings: SessionTimings,
        platform: DoorPlatform,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Result<Self> {
        let wired = doors.into_iter().map(|d| (d, platform.clone())).collect();
        Self::start_each(wired, timings, clock)
    }

    /// Build and initialize controllers, each on its own platform.
    ///
    /// Doors come up in parallel; a door whose hardware fails ends up
    /// `Degraded` without holding up the others. The only error is an empty
    /// door list.
    pub fn start_each(
        doors: Vec<(DoorSettings, DoorPlatform)>,
        timings: SessionTimings,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Result<Self> {
        if doors.is_empty() {
            eyre::bail!("no garage doors configured");
        }
        let (settings, platforms): (Vec<_>, Vec<_>) = doors.into_iter().unzip();
        let mut controllers: Vec<DoorController> = settings
            .into_iter()
            .enumerate()
            .map(|(id, s)| DoorController::new(id, s, timings, clock.clone()))
            .collect();

        std::thread::scope(|scope| {
            for (controller, platform) in controllers.iter_mut().zip(&platforms) {
                scope.spawn(move || {
                    controller.init(platform.gpio.as_ref(), platform.serial.as_ref());
                });
            }
        });

        for c in &controllers {
            info!(door = c.id(), lifecycle = ?c.lifecycle(), "door ready for requests");
        }
        Ok(Self { doors: controllers })
    }

    /// Convert a validated config and start every door on `platform`.
    pub fn from_config(
        cfg: &carport_config::Config,
        platform: DoorPlatform,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Result<Self> {
        cfg.validate().wrap_err("configuration rejected")?;
        let doors = cfg.doors.iter().map(DoorSettings::from).collect();
        Self::start(doors, SessionTimings::from(&cfg.session), platform, clock)
    }

    pub fn door(&self, id: usize) -> Option<&DoorController> {
        self.doors.get(id)
    }

    pub fn doors(&self) -> &[DoorController] {
        &self.doors
    }

    pub fn len(&self) -> usize {
        self.doors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doors.is_empty()
    }

    /// Doors that finished `init` without a hardware fault.
    pub fn ready_count(&self) -> usize {
        self.doors
            .iter()
            .filter(|d| d.lifecycle() == Lifecycle::Ready)
            .count()
    }

    fn lookup(&self, id: usize) -> std::result::Result<&DoorController, CarportError> {
        self.door(id).ok_or_else(|| {
            CarportError::Validation(format!(
                "garageDoorId {id} is out of range (0..{})",
                self.doors.len()
            ))
        })
    }

    pub fn handle(&self, request: &ServiceRequest) -> ServiceResponse {
        match request {
            ServiceRequest::Observe(r) => self.observe(r),
            ServiceRequest::Control(r) => self.control(r),
        }
    }

    /// Parse and dispatch one JSON request; parse failures are 400s.
    pub fn handle_json(&self, line: &str) -> ServiceResponse {
        match ServiceRequest::from_json(line) {
            Ok(request) => self.handle(&request),
            Err(e) => {
                error!(error = %e, "rejected request");
                ServiceResponse::rejected(&e)
            }
        }
    }

    pub fn observe(&self, request: &ObserveRequest) -> ServiceResponse {
        let id = request.garage_door_id;
        let door = match self.lookup(id) {
            Ok(d) => d,
            Err(e) => return ServiceResponse::rejected(&e),
        };
        door.observe(request.observe_targets);
        let message = format!("Carport request for garageDoorId {id} was processed.");
        info!(door = id, "{message}");
        ServiceResponse::ok(message, None)
    }

    pub fn control(&self, request: &ControlRequest) -> ServiceResponse {
        let id = request.garage_door_id;
        let action = request.action;
        let door = match self.lookup(id) {
            Ok(d) => d,
            Err(e) => return ServiceResponse::rejected(&e),
        };
        info!(door = id, %action, "control request received");

        let outcome = match action {
            DoorAction::Actuate => door.actuate(),
            DoorAction::Open => door.open(),
            DoorAction::Close => door.close(),
            DoorAction::Check => Ok(door.check()),
            DoorAction::StartMeasurement => door.start_measurement().map(|()| DoorStatus::Unknown),
            DoorAction::StopMeasurement => door.stop_measurement().map(|()| DoorStatus::Unknown),
            DoorAction::GetMeasurement => door.get_measurement().map(|()| DoorStatus::Unknown),
        };

        match outcome {
            Ok(status) => {
                let message = match action {
                    DoorAction::StartMeasurement => {
                        "Garage door distance measurement started...".to_string()
                    }
                    DoorAction::StopMeasurement => {
                        "Garage door distance measurement stopped".to_string()
                    }
                    _ => format!(
                        "Carport request for garageDoorId {id}, action {action} was processed with status {status}"
                    ),
                };
                info!(door = id, %action, %status, "control request processed");
                ServiceResponse::ok(message, Some(StatusData { status }))
            }
            Err(e) => {
                let message =
                    format!("Carport request for garageDoorId {id}, action {action} failed: {e}");
                error!(door = id, %action, error = %e, "control request failed");
                ServiceResponse::failed(
                    &e,
                    message,
                    Some(StatusData {
                        status: DoorStatus::Unknown,
                    }),
                )
            }
        }
    }
}
