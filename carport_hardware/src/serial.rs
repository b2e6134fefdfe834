//! serialport-backed byte duplex.
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use carport_traits::{BoxError, ByteSink, ByteSource, SerialLink};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::error::HwError;

/// Opens real tty devices (`/dev/serial0`, `/dev/ttyAMA0`, ...).
#[derive(Debug, Clone)]
pub struct SerialPortLink {
    read_timeout: Duration,
}

impl SerialPortLink {
    /// `read_timeout` bounds each blocking read so the reader thread can
    /// notice shutdown requests.
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }
}

impl SerialLink for SerialPortLink {
    fn open(
        &self,
        path: &str,
        baud_rate: u32,
    ) -> Result<(Box<dyn ByteSource>, Box<dyn ByteSink>), BoxError> {
        let open_err = |e: serialport::Error| HwError::SerialOpen {
            path: path.to_string(),
            reason: e.to_string(),
        };
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(self.read_timeout)
            .open()
            .map_err(open_err)?;
        let reader = port.try_clone().map_err(open_err)?;
        tracing::info!(path, baud_rate, "serial port open");
        Ok((
            Box::new(PortSource { port: reader }),
            Box::new(PortSink { port }),
        ))
    }
}

struct PortSource {
    port: Box<dyn SerialPort>,
}

impl ByteSource for PortSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BoxError> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(0),
            Err(e) => Err(Box::new(HwError::Io(e))),
        }
    }
}

struct PortSink {
    port: Box<dyn SerialPort>,
}

impl ByteSink for PortSink {
    fn write(&mut self, bytes: &[u8]) -> Result<(), BoxError> {
        self.port
            .write_all(bytes)
            .map_err(|e| Box::new(HwError::Write(e.to_string())) as BoxError)
    }

    fn flush(&mut self) -> Result<(), BoxError> {
        self.port
            .flush()
            .map_err(|e| Box::new(HwError::Flush(e.to_string())) as BoxError)
    }
}
