use std::{
    io::{self, Write},
    time::Duration,
};

use log::{debug, info};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::protocol::{command::QUERY_DATA, Frame};

use super::{
    ConnectionError, ConnectionReason, Connector, DeviceSelector, FrameAssembler, FrameLink,
    LinkError,
};

pub const DEFAULT_BAUD_RATE: u32 = 9600;

// Per-syscall port timeout. The frame deadline is enforced by the assembler.
const PORT_READ_SLICE: Duration = Duration::from_millis(100);

/// Opens the SDS011 over a serial port (9600 8N1, no flow control).
#[derive(Debug, Clone)]
pub struct SerialConnector {
    selector: DeviceSelector,
    baud_rate: u32,
    query_mode: bool,
}

impl SerialConnector {
    pub fn new(selector: DeviceSelector) -> Self {
        Self {
            selector,
            baud_rate: DEFAULT_BAUD_RATE,
            query_mode: false,
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Send the query-data command before every frame read. Needed when the
    /// sensor has been switched out of active reporting.
    pub fn with_query_mode(mut self, query_mode: bool) -> Self {
        self.query_mode = query_mode;
        self
    }
}

impl Connector for SerialConnector {
    fn open(&self) -> Result<Box<dyn FrameLink>, ConnectionError> {
        let port_name = self.selector.resolve()?;

        let port = serialport::new(port_name.as_str(), self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(PORT_READ_SLICE)
            .open()
            .map_err(|err| open_error(&port_name, err))?;

        info!("Opened sensor port {} at {} baud", port_name, self.baud_rate);

        Ok(Box::new(SerialLink {
            port_name,
            assembler: FrameAssembler::new(port),
            query_mode: self.query_mode,
        }))
    }

    fn describe(&self) -> String {
        self.selector.to_string()
    }
}

fn open_error(port_name: &str, err: serialport::Error) -> ConnectionError {
    let reason = match err.kind() {
        serialport::ErrorKind::NoDevice => ConnectionReason::NotFound,
        serialport::ErrorKind::Io(io::ErrorKind::NotFound) => ConnectionReason::NotFound,
        serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied) => ConnectionReason::Permission,
        _ => ConnectionReason::Busy,
    };
    ConnectionError::new(reason, format!("failed to open {port_name}: {err}"))
}

pub struct SerialLink {
    port_name: String,
    assembler: FrameAssembler<Box<dyn SerialPort>>,
    query_mode: bool,
}

impl FrameLink for SerialLink {
    fn read_frame(&mut self, timeout: Duration) -> Result<Frame, LinkError> {
        if self.query_mode {
            let port = self.assembler.get_mut();
            port.write_all(&QUERY_DATA)?;
            port.flush()?;
        }
        self.assembler.read_frame(timeout)
    }

    fn close(self: Box<Self>) {
        debug!(
            "Closing sensor port {} ({} byte(s) skipped while resynchronizing)",
            self.port_name,
            self.assembler.skipped_bytes()
        );
    }
}
