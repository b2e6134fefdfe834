#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! `carport` binary: config loading, logging, and the request surface.

mod cli;
mod error_fmt;
mod logging;
mod platform;
mod serve;

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use carport_config::Config;
use carport_core::hw_error::map_transport_error;
use carport_core::{CarportError, ControlRequest, DoorAction, DoorControllerRegistry, DoorPlatform};
use carport_traits::MonotonicClock;
use clap::Parser;
use crossbeam_channel as xch;
use eyre::WrapErr;
use serde_json::json;
use tracing::{error, info};

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() -> ExitCode {
    // Pretty panics and reports; harmless if already installed.
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            let detail = format!("{e:#}");
            error!(error = %detail, "carport failed");
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", format_error_json(&e));
            } else {
                eprintln!("{}", humanize(&e));
            }
            ExitCode::from(u8::try_from(exit_code_for_error(&e)).unwrap_or(1))
        }
    }
}

fn run(cli: Cli) -> eyre::Result<ExitCode> {
    let cfg = Config::load(&cli.config)?;
    logging::init(cli.json, &cli.log_level, &cfg.logging)?;
    info!(
        config = %cli.config.display(),
        doors = cfg.doors.len(),
        "config loaded"
    );

    let platform = platform::build(&cfg);
    match cli.cmd {
        Commands::SelfCheck => self_check(&cfg, &platform, cli.json),
        Commands::Control { door, action } => control(&cfg, platform, door, action.into()),
        Commands::Serve => serve_stdin(&cfg, platform),
    }
}

fn start_registry(cfg: &Config, platform: DoorPlatform) -> eyre::Result<DoorControllerRegistry> {
    let registry = DoorControllerRegistry::from_config(cfg, platform, Arc::new(MonotonicClock))?;
    info!(
        doors = registry.len(),
        ready = registry.ready_count(),
        "door controllers started"
    );
    Ok(registry)
}

fn serve_stdin(cfg: &Config, platform: DoorPlatform) -> eyre::Result<ExitCode> {
    let registry = start_registry(cfg, platform)?;

    let (stop_tx, stop_rx) = xch::bounded(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .wrap_err("install Ctrl-C handler")?;

    let lines = serve::stdin_lines();
    let mut out = std::io::stdout().lock();
    let handled = serve::serve(&registry, &lines, &stop_rx, &mut out)?;
    info!(handled, "request loop stopped; shutting doors down");
    drop(registry);
    Ok(ExitCode::SUCCESS)
}

fn control(
    cfg: &Config,
    platform: DoorPlatform,
    door: usize,
    action: DoorAction,
) -> eyre::Result<ExitCode> {
    let registry = start_registry(cfg, platform)?;
    let response = registry.control(&ControlRequest {
        garage_door_id: door,
        action,
    });
    let mut out = std::io::stdout().lock();
    serde_json::to_writer(&mut out, &response).wrap_err("encode response")?;
    writeln!(out).wrap_err("write response")?;
    Ok(if response.succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn self_check(cfg: &Config, platform: &DoorPlatform, json: bool) -> eyre::Result<ExitCode> {
    cfg.validate().wrap_err("configuration rejected")?;

    let gpio = platform.gpio.available();
    let mut first_failure: Option<CarportError> = None;
    let mut doors = Vec::with_capacity(cfg.doors.len());
    for (id, door) in cfg.doors.iter().enumerate() {
        let port = &door.tf_luna.serial_port;
        // Open and immediately drop: only reachability is checked.
        let opened = platform
            .serial
            .open(port, door.tf_luna.baud_rate)
            .map(drop)
            .map_err(|e| map_transport_error("open", e.as_ref()));
        let detail = match &opened {
            Ok(()) => None,
            Err(e) => Some(e.to_string()),
        };
        if let Err(e) = opened
            && first_failure.is_none()
        {
            first_failure = Some(e);
        }
        doors.push((id, port.clone(), detail));
    }

    if json {
        let report = json!({
            "gpio": gpio,
            "doors": doors
                .iter()
                .map(|(id, port, err)| json!({
                    "garageDoorId": id,
                    "serialPort": port,
                    "ok": err.is_none(),
                    "error": err,
                }))
                .collect::<Vec<_>>(),
        });
        println!("{report}");
    } else {
        println!("gpio: {}", if gpio { "available" } else { "unavailable" });
        for (id, port, err) in &doors {
            match err {
                None => println!("door {id}: {port} ok"),
                Some(e) => println!("door {id}: {port} FAILED ({e})"),
            }
        }
    }

    if !gpio {
        return Err(CarportError::HardwareUnavailable("gpio subsystem not accessible".into()).into());
    }
    if let Some(e) = first_failure {
        return Err(e.into());
    }
    if !json {
        println!("self-check ok");
    }
    Ok(ExitCode::SUCCESS)
}
