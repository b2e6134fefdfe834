//! Maps `Box<dyn Error>` from trait boundaries to typed `CarportError`.
//!
//! The traits in `carport_traits` use `Box<dyn Error + Send + Sync>`; this
//! module converts those to the core taxonomy, with an optional feature-gated
//! path for `carport_hardware::HwError` downcasting.

use crate::error::CarportError;

/// Map a serial-side failure during `op` ("open", "write", "flush", "read").
pub fn map_transport_error(op: &'static str, e: &(dyn std::error::Error + 'static)) -> CarportError {
    #[cfg(feature = "hardware-errors")]
    {
        use carport_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            let op = match hw {
                HwError::SerialOpen { .. } => "open",
                HwError::Write(_) => "write",
                HwError::Flush(_) => "flush",
                _ => op,
            };
            return CarportError::Transport {
                op,
                reason: hw.to_string(),
            };
        }
    }

    CarportError::Transport {
        op,
        reason: e.to_string(),
    }
}

/// Map a GPIO-side failure (subsystem missing, line busy, line fault).
pub fn map_gpio_error(e: &(dyn std::error::Error + 'static)) -> CarportError {
    #[cfg(feature = "hardware-errors")]
    {
        use carport_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return CarportError::HardwareUnavailable(hw.to_string());
        }
    }

    CarportError::HardwareUnavailable(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_errors_keep_the_operation() {
        let e = std::io::Error::other("cable pulled");
        match map_transport_error("write", &e) {
            CarportError::Transport { op, reason } => {
                assert_eq!(op, "write");
                assert!(reason.contains("cable pulled"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn flush_fault_is_reported_as_flush() {
        let e = carport_hardware::HwError::Flush("drain".into());
        let mapped = map_transport_error("write", &e);
        assert!(matches!(mapped, CarportError::Transport { op: "flush", .. }));
    }
}
