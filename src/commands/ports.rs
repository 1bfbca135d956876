//! `aqmon ports`: show candidate serial devices.

use anyhow::Result;
use aqmon_lib::link::list_ports;

pub fn execute() -> Result<()> {
    let ports = list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }

    for port in ports {
        if port.description.is_empty() {
            println!("{}", port.port_name);
        } else {
            println!("{:<20} {}", port.port_name, port.description);
        }
    }
    Ok(())
}
