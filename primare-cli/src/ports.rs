//! Serial port listing for the `ports` subcommand

use serialport::{available_ports, SerialPortType};
use tracing::debug;

/// A serial port that could host an amplifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortEntry {
    pub port: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub product: Option<String>,
}

impl PortEntry {
    fn from_serialport(name: String, port_type: &SerialPortType) -> Self {
        match port_type {
            SerialPortType::UsbPort(usb) => Self {
                port: name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                product: usb.product.clone(),
            },
            _ => Self {
                port: name,
                vid: None,
                pid: None,
                product: None,
            },
        }
    }

    /// One display line, e.g. `/dev/ttyUSB0  0403:6001  FT232R`
    pub fn describe(&self) -> String {
        match (self.vid, self.pid) {
            (Some(vid), Some(pid)) => format!(
                "{:<20} {:04x}:{:04x}  {}",
                self.port,
                vid,
                pid,
                self.product.as_deref().unwrap_or("Unknown")
            ),
            _ => self.port.clone(),
        }
    }
}

/// Enumerate serial ports, skipping Bluetooth ones
pub fn list() -> Result<Vec<PortEntry>, serialport::Error> {
    let ports = available_ports()?;
    let entries: Vec<_> = ports
        .into_iter()
        .map(|p| PortEntry::from_serialport(p.port_name, &p.port_type))
        .filter(|p| !p.port.contains("Bluetooth"))
        .collect();
    debug!("Found {} serial port(s)", entries.len());
    Ok(entries)
}
