//! Serial port handling
//!
//! Opening, configuring and discovering the serial device the vehicle
//! microcontroller is attached to.

use serde::Serialize;
use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::time::Duration;

use super::ProtocolError;

/// Information about an available serial port
#[derive(Debug, Clone, Serialize)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyACM0" or "COM4")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl PortInfo {
    fn bare(name: String) -> Self {
        Self {
            name,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
        }
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                manufacturer: usb.manufacturer,
                product: usb.product,
            },
            _ => Self::bare(info.port_name),
        }
    }
}

/// Sort key placing Arduino-style ports first:
///  - ttyACM* (numerically by suffix)
///  - then ttyUSB* (numerically)
///  - then everything else by name
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        return (0, rest.parse().unwrap_or(usize::MAX), basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        return (1, rest.parse().unwrap_or(usize::MAX), basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("COM") {
        if let Ok(num) = rest.parse() {
            return (2, num, basename.to_string());
        }
    }
    (3, 0, basename.to_string())
}

/// List available serial ports in a deterministic order
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    match serialport::available_ports() {
        Ok(ports) => {
            for info in ports {
                let p = PortInfo::from(info);
                map.entry(p.name.clone()).or_insert(p);
            }
        }
        Err(e) => tracing::warn!("Serial port enumeration failed: {e}"),
    }

    // Linux: pick up /dev/ttyACM* and /dev/ttyUSB* nodes the API missed
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyACM") || fname.starts_with("ttyUSB") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone())
                        .or_insert_with(|| PortInfo::bare(full));
                }
            }
        }
    }

    let mut v: Vec<PortInfo> = map.into_values().collect();
    v.sort_by_key(|p| port_sort_key(&p.name));
    v
}

/// Open a serial port with the given baud rate and read timeout
pub fn open_port(
    name: &str,
    baud_rate: u32,
    timeout: Duration,
) -> Result<Box<dyn SerialPort>, ProtocolError> {
    serialport::new(name, baud_rate)
        .timeout(timeout)
        .open()
        .map_err(|e| ProtocolError::OpenFailed {
            port: name.to_string(),
            reason: e.to_string(),
        })
}

/// Configure a serial port for the vehicle firmware (8N1, no flow control)
pub fn configure_port(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    port.set_data_bits(serialport::DataBits::Eight)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_parity(serialport::Parity::None)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_stop_bits(serialport::StopBits::One)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_flow_control(serialport::FlowControl::None)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;

    // Keep DTR asserted; dropping it resets Arduino-class boards
    if let Err(e) = port.write_data_terminal_ready(true) {
        tracing::debug!("Failed to set DTR high: {e} (continuing)");
    }

    Ok(())
}
