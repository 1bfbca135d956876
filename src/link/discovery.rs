use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serialport::{SerialPortInfo, SerialPortType};

use super::ConnectionError;

/// How the sensor's serial device is located.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceSelector {
    /// An explicit device node such as `/dev/ttyUSB0` or `COM3`.
    Path(PathBuf),
    /// Case-insensitive substring of the port description, e.g. `USB-SERIAL`.
    Description(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortInfo {
    pub port_name: String,
    pub description: String,
}

impl PortInfo {
    fn matches(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.port_name.to_lowercase().contains(&needle)
            || self.description.to_lowercase().contains(&needle)
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let description = match info.port_type {
            SerialPortType::UsbPort(usb) => {
                let mut parts = Vec::new();
                if let Some(manufacturer) = usb.manufacturer {
                    parts.push(manufacturer);
                }
                if let Some(product) = usb.product {
                    parts.push(product);
                }
                parts.push(format!("{:04x}:{:04x}", usb.vid, usb.pid));
                parts.join(" ")
            }
            SerialPortType::PciPort => "PCI".to_string(),
            SerialPortType::BluetoothPort => "Bluetooth".to_string(),
            SerialPortType::Unknown => String::new(),
        };

        Self {
            port_name: info.port_name,
            description,
        }
    }
}

/// Serial ports currently visible to the OS.
pub fn list_ports() -> Result<Vec<PortInfo>, ConnectionError> {
    serialport::available_ports()
        .map(|ports| ports.into_iter().map(PortInfo::from).collect())
        .map_err(|err| ConnectionError::not_found(format!("failed to enumerate serial ports: {err}")))
}

impl DeviceSelector {
    /// Resolves the selector to a concrete port name.
    pub fn resolve(&self) -> Result<String, ConnectionError> {
        match self {
            DeviceSelector::Path(path) => {
                if !path.exists() {
                    return Err(ConnectionError::not_found(format!(
                        "no device at {}",
                        path.display()
                    )));
                }
                Ok(path.to_string_lossy().into_owned())
            }
            DeviceSelector::Description(needle) => {
                let ports = list_ports()?;
                find_port(&ports, needle)
                    .map(|port| port.port_name.clone())
                    .ok_or_else(|| {
                        ConnectionError::not_found(format!(
                            "no serial port matching \"{needle}\" among {} port(s)",
                            ports.len()
                        ))
                    })
            }
        }
    }
}

fn find_port<'a>(ports: &'a [PortInfo], needle: &str) -> Option<&'a PortInfo> {
    ports.iter().find(|port| port.matches(needle))
}

impl std::fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceSelector::Path(path) => write!(f, "{}", path.display()),
            DeviceSelector::Description(needle) => write!(f, "port matching \"{needle}\""),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::ConnectionReason;

    fn port(name: &str, description: &str) -> PortInfo {
        PortInfo {
            port_name: name.into(),
            description: description.into(),
        }
    }

    #[test]
    fn description_match_is_case_insensitive() {
        let ports = vec![
            port("/dev/ttyS0", ""),
            port("/dev/ttyUSB0", "QinHeng Electronics USB-Serial CH340 1a86:7523"),
        ];
        let found = find_port(&ports, "usb-serial").unwrap();
        assert_eq!(found.port_name, "/dev/ttyUSB0");
    }

    #[test]
    fn description_can_match_port_name() {
        let ports = vec![port("/dev/ttyACM0", "")];
        assert!(find_port(&ports, "ttyACM").is_some());
        assert!(find_port(&ports, "ttyUSB").is_none());
    }

    #[test]
    fn missing_path_is_not_found() {
        let selector = DeviceSelector::Path("/definitely/not/a/tty".into());
        let err = selector.resolve().unwrap_err();
        assert_eq!(err.reason, ConnectionReason::NotFound);
    }

    #[test]
    fn unmatched_description_is_not_found() {
        let selector = DeviceSelector::Description("no-such-sensor-7f3a".into());
        let err = selector.resolve().unwrap_err();
        assert_eq!(err.reason, ConnectionReason::NotFound);
    }
}
