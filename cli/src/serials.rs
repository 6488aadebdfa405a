use std::{fs, path::Path};

use depthcam::UsbDeviceDirectory;
use fleet::{DeviceAttribute, DeviceDirectory, SdkError};

use crate::CliError;

/// Enumerate attached cameras and record their serial numbers, one
/// `#<index> <serial>` line per device, to stdout and to `output`.
pub(crate) fn write_serials(output: &Path) -> Result<(), CliError> {
    let directory = UsbDeviceDirectory::new();
    let devices = directory.list_devices()?;
    println!("Found {} devices", devices.len());

    let mut lines = String::new();
    for (index, device) in devices.iter().enumerate() {
        let serial = directory
            .attribute(device, DeviceAttribute::SerialNumber)
            .and_then(|serial| {
                serial.ok_or_else(|| {
                    SdkError::new(
                        "attribute",
                        "serial_number",
                        "attribute not reported",
                    )
                })
            })
            .map_err(|source| CliError::SerialRead {
                index: index + 1,
                source,
            })?;
        let line = serial_line(index, &serial);
        println!("{line}");
        lines.push_str(&line);
        lines.push('\n');
    }
    fs::write(output, lines)?;
    Ok(())
}

fn serial_line(index: usize, serial: &str) -> String {
    format!("#{index} {serial}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_line_format() {
        assert_eq!(serial_line(0, "829212070538"), "#0 829212070538");
        assert_eq!(serial_line(12, "x"), "#12 x");
    }
}
