//! Subscriber setup: console on stderr, optional rolling JSON file.
//!
//! stdout is reserved for response envelopes, so console logs always go to
//! stderr. `RUST_LOG` overrides `--log-level` for the console layer.

use std::path::Path;

use carport_config::Logging;
use eyre::{WrapErr, eyre};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::cli::FILE_GUARD;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

pub fn parse_rotation(s: Option<&str>) -> eyre::Result<Rotation> {
    match s.unwrap_or("never") {
        "never" => Ok(Rotation::NEVER),
        "daily" => Ok(Rotation::DAILY),
        "hourly" => Ok(Rotation::HOURLY),
        other => Err(eyre!(
            "logging.rotation must be one of never|daily|hourly, got {other:?}"
        )),
    }
}

pub fn init(json: bool, log_level: &str, cfg: &Logging) -> eyre::Result<()> {
    let console_filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(log_level)
            .wrap_err_with(|| format!("invalid --log-level {log_level:?}"))?,
    };
    let console: BoxedLayer = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(console_filter)
            .boxed()
    };

    let mut layers = vec![console];
    if let Some(file) = cfg.file.as_deref() {
        layers.push(file_layer(file, cfg)?);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| eyre!("install tracing subscriber: {e}"))
}

fn file_layer(file: &str, cfg: &Logging) -> eyre::Result<BoxedLayer> {
    let rotation = parse_rotation(cfg.rotation.as_deref())?;
    let path = Path::new(file);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .ok_or_else(|| eyre!("logging.file {file:?} has no file name"))?;
    let level = cfg.level.as_deref().unwrap_or("info");
    let filter =
        EnvFilter::try_new(level).wrap_err_with(|| format!("invalid logging.level {level:?}"))?;

    let (writer, guard) = tracing_appender::non_blocking(RollingFileAppender::new(
        rotation, dir, name,
    ));
    // Keep the worker alive for the whole process so buffered lines are flushed.
    let _ = FILE_GUARD.set(guard);

    Ok(fmt::layer()
        .json()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(filter)
        .boxed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_names() {
        assert_eq!(parse_rotation(None).unwrap(), Rotation::NEVER);
        assert_eq!(parse_rotation(Some("daily")).unwrap(), Rotation::DAILY);
        assert_eq!(parse_rotation(Some("hourly")).unwrap(), Rotation::HOURLY);
        assert!(parse_rotation(Some("weekly")).is_err());
    }
}
