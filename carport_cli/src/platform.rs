//! Picks the GPIO chip and serial link the doors are wired to.

use std::sync::Arc;

use carport_config::Config;
use carport_core::DoorPlatform;

/// Real hardware when built with `hardware`, simulators otherwise.
pub fn build(cfg: &Config) -> DoorPlatform {
    #[cfg(feature = "hardware")]
    let serial: Arc<dyn carport_traits::SerialLink> = Arc::new(
        carport_hardware::SerialPortLink::new(std::time::Duration::from_millis(
            cfg.session.read_timeout_ms,
        )),
    );
    #[cfg(not(feature = "hardware"))]
    let serial: Arc<dyn carport_traits::SerialLink> = {
        let _ = cfg;
        tracing::info!("hardware feature off; using simulated rangefinders");
        Arc::new(carport_hardware::SimulatedSerial::new())
    };

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    let gpio: Arc<dyn carport_traits::GpioChip> = Arc::new(carport_hardware::RppalChip::new());
    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    let gpio: Arc<dyn carport_traits::GpioChip> =
        Arc::new(carport_hardware::SimulatedChip::new());

    DoorPlatform { gpio, serial }
}
