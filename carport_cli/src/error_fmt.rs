//! Human-readable error descriptions and structured JSON error formatting.

use carport_core::CarportError;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(ce) = err.downcast_ref::<CarportError>() {
        return match ce {
            CarportError::HardwareUnavailable(msg) => format!(
                "What happened: Hardware is not accessible ({msg}).\nLikely causes: Not running on the controller board, or missing permission for /dev/gpiomem.\nHow to fix: Run on the Pi as a user in the gpio group, or build without the `hardware` feature to use the simulators."
            ),
            CarportError::Transport { op, reason } => format!(
                "What happened: Serial {op} on the rangefinder channel failed ({reason}).\nLikely causes: Wrong tf_luna.serial_port, the device is unplugged, or another process holds the port.\nHow to fix: Check the port path and wiring, and make sure the serial console is disabled on that UART."
            ),
            CarportError::Timeout { command, after_ms } => format!(
                "What happened: The rangefinder did not answer {command} within {after_ms} ms.\nLikely causes: Baud rate mismatch, TX/RX swapped, or the sensor is unpowered.\nHow to fix: Verify wiring and tf_luna.baud_rate; raise session.command_timeout_ms if the link is slow."
            ),
            CarportError::Validation(msg) => format!(
                "What happened: Invalid request ({msg}).\nLikely causes: Unknown door id or action.\nHow to fix: Door ids start at 0 and follow the order of the door table."
            ),
            _ => format!(
                "What happened: {ce}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from config loading
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("read config") {
        return format!(
            "What happened: The config file could not be read.\nLikely causes: Wrong --config path or missing read permission.\nHow to fix: Pass the path of an existing TOML file. Original: {msg}"
        );
    }

    if lower.contains("parse config toml") {
        return format!(
            "What happened: The config file is not valid TOML for this schema.\nLikely causes: A typo, a missing required key, or a value of the wrong type.\nHow to fix: Compare the file with etc/carport.toml. Original: {msg}"
        );
    }

    if lower.contains("no garage doors configured") {
        return "What happened: No garage doors are configured.\nLikely causes: Empty [[doors]] table and no doors_file, or an empty door file.\nHow to fix: Add at least one [[doors]] entry or point doors_file at the JSON door list.".to_string();
    }

    if lower.contains("is invalid") || lower.contains("door configuration") {
        return format!(
            "What happened: Configuration is invalid.\nLikely causes: Duplicate pins, an unsupported baud rate, or out-of-range values.\nHow to fix: Edit the config and try again. Original: {msg}"
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable short name for the JSON `reason` field.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    match err.downcast_ref::<CarportError>() {
        Some(CarportError::Transport { .. }) => "Transport",
        Some(CarportError::Timeout { .. }) => "Timeout",
        Some(CarportError::HardwareUnavailable(_)) => "HardwareUnavailable",
        Some(CarportError::Protocol(_)) => "Protocol",
        Some(CarportError::Validation(_)) => "Validation",
        Some(CarportError::NotReady { .. }) => "NotReady",
        None => "Error",
    }
}

/// Exit codes: 2 config, 3 hardware, 4 transport/timeout, 1 anything else.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(ce) = err.downcast_ref::<CarportError>() {
        return match ce {
            CarportError::HardwareUnavailable(_) => 3,
            CarportError::Transport { .. } | CarportError::Timeout { .. } => 4,
            _ => 1,
        };
    }
    let lower = format!("{err:#}").to_ascii_lowercase();
    if lower.contains("config") || lower.contains("no garage doors configured") {
        return 2;
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let mut obj = json!({ "reason": reason_name(err), "message": humanize(err) });
    if let Some(ce) = err.downcast_ref::<CarportError>() {
        obj["statusCode"] = json!(ce.status_code());
    }
    obj.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use carport_core::CommandId;

    #[test]
    fn typed_errors_keep_their_reason() {
        let err = eyre::Report::new(CarportError::Timeout {
            command: CommandId::GetVersion,
            after_ms: 2000,
        });
        assert_eq!(exit_code_for_error(&err), 4);
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "Timeout");
        assert_eq!(v["statusCode"], 500);
        assert!(v["message"].as_str().unwrap().contains("2000 ms"));
    }

    #[test]
    fn config_errors_exit_with_two() {
        let err = eyre::eyre!("no garage doors configured");
        assert_eq!(exit_code_for_error(&err), 2);
        assert!(humanize(&err).contains("No garage doors"));
    }
}
