//! Registry startup isolation and the request/response envelope.

use std::sync::Arc;
use std::time::Duration;

use carport_core::config::{DoorSettings, MotionThresholds, RangefinderSettings, SessionTimings};
use carport_core::registry::{
    ControlRequest, DoorAction, DoorControllerRegistry, DoorPlatform, ServiceRequest,
};
use carport_core::status::{DoorStatus, Lifecycle};
use carport_hardware::{SimulatedChip, SimulatedSerial};
use carport_traits::Level;
use carport_traits::clock::test_clock::TestClock;
use rstest::rstest;

fn door(actuator: u8, down: u8, up: u8, port: &str) -> DoorSettings {
    DoorSettings {
        actuator_pin: actuator,
        down_switch_pin: down,
        up_switch_pin: up,
        pulse: Duration::from_millis(250),
        check_delay: Duration::from_secs(13),
        motion: MotionThresholds::default(),
        rangefinder: RangefinderSettings {
            serial_port: port.into(),
            baud_rate: 115_200,
            sample_rate: 5,
            closed_limit_cm: 10,
            open_limit_cm: 200,
            frame_log: false,
        },
    }
}

fn timings() -> SessionTimings {
    SessionTimings {
        command_timeout: Duration::from_millis(500),
        ..SessionTimings::default()
    }
}

fn platform(chip: &SimulatedChip) -> DoorPlatform {
    DoorPlatform {
        gpio: Arc::new(chip.clone()),
        serial: Arc::new(SimulatedSerial::new()),
    }
}

fn two_doors(chip: &SimulatedChip) -> DoorControllerRegistry {
    DoorControllerRegistry::start(
        vec![
            door(17, 27, 22, "/dev/ttyAMA0"),
            door(5, 6, 13, "/dev/ttyAMA1"),
        ],
        timings(),
        platform(chip),
        Arc::new(TestClock::new()),
    )
    .expect("registry")
}

#[test]
fn empty_door_list_is_fatal() {
    let chip = SimulatedChip::new();
    let err = DoorControllerRegistry::start(
        Vec::new(),
        timings(),
        platform(&chip),
        Arc::new(TestClock::new()),
    )
    .err()
    .expect("must fail");
    assert!(err.to_string().contains("no garage doors"));
}

#[test]
fn gpio_failure_on_one_door_does_not_block_another() {
    let broken = SimulatedChip::unavailable();
    let healthy = SimulatedChip::new();
    let registry = DoorControllerRegistry::start_each(
        vec![
            (door(17, 27, 22, "/dev/ttyAMA0"), platform(&broken)),
            (door(5, 6, 13, "/dev/ttyAMA1"), platform(&healthy)),
        ],
        timings(),
        Arc::new(TestClock::new()),
    )
    .expect("registry");

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.door(0).map(|d| d.lifecycle()), Some(Lifecycle::Degraded));
    assert_eq!(registry.door(1).map(|d| d.lifecycle()), Some(Lifecycle::Ready));
    assert_eq!(registry.ready_count(), 1);

    let resp = registry.control(&ControlRequest {
        garage_door_id: 0,
        action: DoorAction::Actuate,
    });
    assert!(!resp.succeeded);
    assert_eq!(resp.status_code, 500);
    assert_eq!(resp.data.map(|d| d.status), Some(DoorStatus::Unknown));

    let resp = registry.control(&ControlRequest {
        garage_door_id: 1,
        action: DoorAction::Actuate,
    });
    assert!(resp.succeeded, "{}", resp.message);
    assert_eq!(healthy.writes(5), vec![Level::High, Level::Low]);
}

#[test]
fn shared_chip_serves_both_doors() {
    let chip = SimulatedChip::new();
    let registry = two_doors(&chip);
    assert_eq!(registry.ready_count(), 2);

    chip.set_input(27, Level::Low);
    chip.set_input(13, Level::Low);
    let check = |id| {
        registry
            .control(&ControlRequest {
                garage_door_id: id,
                action: DoorAction::Check,
            })
            .data
            .map(|d| d.status)
    };
    assert_eq!(check(0), Some(DoorStatus::Closed));
    assert_eq!(check(1), Some(DoorStatus::Open));
}

#[test]
fn control_response_shape() {
    let chip = SimulatedChip::new();
    let registry = two_doors(&chip);
    let resp = registry.handle_json(r#"{"garageDoorId":1,"action":"check"}"#);
    let json = serde_json::to_value(&resp).expect("serialize");
    assert_eq!(json["succeeded"], true);
    assert_eq!(json["statusCode"], 201);
    assert_eq!(json["data"]["status"], "unknown");
    assert!(
        json["message"]
            .as_str()
            .is_some_and(|m| m.contains("action check was processed with status unknown"))
    );
}

#[test]
fn measurement_actions_report_progress() {
    let chip = SimulatedChip::new();
    let registry = two_doors(&chip);
    let resp = registry.handle_json(r#"{"garageDoorId":0,"action":"startMeasurement"}"#);
    assert!(resp.succeeded);
    assert_eq!(resp.message, "Garage door distance measurement started...");
    let resp = registry.handle_json(r#"{"garageDoorId":0,"action":"stopMeasurement"}"#);
    assert_eq!(resp.message, "Garage door distance measurement stopped");
    let resp = registry.handle_json(r#"{"garageDoorId":0,"action":"getMeasurement"}"#);
    assert!(resp.succeeded);
}

#[test]
fn observe_request_updates_door() {
    let chip = SimulatedChip::new();
    let registry = two_doors(&chip);
    let resp = registry.handle_json(
        r#"{"garageDoorId":1,"observeTargets":{"measurements":true,"parserCommandResponse":false}}"#,
    );
    assert!(resp.succeeded);
    assert_eq!(resp.status_code, 201);
    assert!(resp.data.is_none());
    let targets = registry.door(1).map(|d| d.observe_targets()).expect("door 1");
    assert!(targets.measurements);
    assert!(!targets.parser_command_response);
}

#[rstest]
#[case(r#"{"garageDoorId":0}"#)]
#[case(r#"{"action":"open"}"#)]
#[case(r#"{"garageDoorId":0,"action":"explode"}"#)]
#[case(r#"{"garageDoorId":7,"action":"check"}"#)]
#[case(r#"{"garageDoorId":0,"action":"check","extra":1}"#)]
#[case(r#"{"garageDoorId":0,"observeTargets":{"everything":true}}"#)]
#[case(r#"[0,"check"]"#)]
#[case("not json")]
fn malformed_requests_are_client_errors(#[case] line: &str) {
    let chip = SimulatedChip::new();
    let registry = two_doors(&chip);
    let resp = registry.handle_json(line);
    assert!(!resp.succeeded);
    assert_eq!(resp.status_code, 400, "{}", resp.message);
    assert!(chip.writes(17).is_empty());
}

#[test]
fn request_parsing_distinguishes_shapes() {
    let r = ServiceRequest::from_json(r#"{"garageDoorId":2,"action":"stopMeasurement"}"#)
        .expect("control");
    assert_eq!(
        r,
        ServiceRequest::Control(ControlRequest {
            garage_door_id: 2,
            action: DoorAction::StopMeasurement
        })
    );
    assert_eq!(r.garage_door_id(), 2);
    let r = ServiceRequest::from_json(r#"{"garageDoorId":0,"observeTargets":{}}"#)
        .expect("observe");
    assert!(matches!(r, ServiceRequest::Observe(_)));
    assert_eq!(r.garage_door_id(), 0);
}
