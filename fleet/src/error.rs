use std::{io, path::PathBuf};

use crate::directory::SdkError;

/// Structural failure that aborts a whole update run.
///
/// Per-device flashing failures never show up here; they are collected as
/// [`FlashOutcome::Failed`](crate::FlashOutcome) instead.
#[derive(Debug)]
pub enum UpdateError {
    /// The selected firmware image could not be read.
    FirmwareRead { path: PathBuf, source: io::Error },
    /// The selected firmware image is empty.
    EmptyFirmware(PathBuf),
    /// The initial enumeration found no devices at all.
    NoDevices,
    /// The directory failed outside any per-device phase.
    Sdk(SdkError),
    /// Commanding one device into update mode failed. Issuance failures
    /// leave the fleet in a state not worth partially flashing, so the run
    /// stops before any image is pushed.
    EnterUpdateMode { index: usize, source: SdkError },
    /// The fleet never re-enumerated completely before the flashing phase.
    ConvergenceStalled { seen: usize, expected: usize },
}

impl std::error::Error for UpdateError {}

impl std::fmt::Display for UpdateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateError::FirmwareRead { path, source } => {
                write!(
                    f,
                    "failed to read firmware image {}: {source}",
                    path.display()
                )
            }
            UpdateError::EmptyFirmware(path) => {
                write!(f, "firmware image {} is empty", path.display())
            }
            UpdateError::NoDevices => write!(f, "no devices found"),
            UpdateError::Sdk(err) => write!(f, "SDK error: {err}"),
            UpdateError::EnterUpdateMode { index, source } => {
                write!(
                    f,
                    "failed to switch device #{index} into update mode: {source}"
                )
            }
            UpdateError::ConvergenceStalled { seen, expected } => {
                write!(
                    f,
                    "only {seen} of {expected} devices re-enumerated for flashing"
                )
            }
        }
    }
}

impl From<SdkError> for UpdateError {
    fn from(err: SdkError) -> Self {
        UpdateError::Sdk(err)
    }
}
