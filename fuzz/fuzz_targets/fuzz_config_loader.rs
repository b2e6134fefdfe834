#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // TOML config: parse or validation errors are fine, panics are not.
    if let Ok(cfg) = carport_config::load_toml(data) {
        let _ = cfg.validate();
    }
    // Same input through the legacy JSON door file path.
    if let Ok(doors) = carport_config::parse_doors_json(data) {
        for door in &doors {
            let _ = door.validate();
        }
    }
});
