use std::{fmt::Display, io, path::PathBuf};

use depthcam::UsbError;
use fleet::{SdkError, UpdateError};

pub enum CliError {
    IO(io::Error),
    Update(UpdateError),
    Usb(UsbError),
    NoFirmware(PathBuf),
    SerialRead { index: usize, source: SdkError },
}

impl From<io::Error> for CliError {
    fn from(value: io::Error) -> Self {
        CliError::IO(value)
    }
}

impl From<UpdateError> for CliError {
    fn from(value: UpdateError) -> Self {
        CliError::Update(value)
    }
}

impl From<UsbError> for CliError {
    fn from(value: UsbError) -> Self {
        CliError::Usb(value)
    }
}

impl From<SdkError> for CliError {
    fn from(value: SdkError) -> Self {
        CliError::Update(UpdateError::Sdk(value))
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::IO(err) => write!(f, "IO error: {err}"),
            CliError::Update(err) => write!(f, "{err}"),
            CliError::Usb(err) => write!(f, "{err}"),
            CliError::NoFirmware(dir) => {
                write!(f, "No firmware image found in {}", dir.display())
            }
            CliError::SerialRead { index, source } => {
                write!(
                    f,
                    "Failed reading serial number of {index}th device: {source}"
                )
            }
        }
    }
}
