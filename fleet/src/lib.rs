//! Concurrent firmware-update orchestration for a fleet of USB depth cameras
//!
//! The crate is built around the [`DeviceDirectory`] capability trait: a
//! snapshot-style view of the attached fleet that can read identity
//! attributes, command a device into firmware-update mode and push an image
//! to a device that is already there. [`UpdateOrchestrator`] drives the full
//! run against any directory implementation: discovery, update-mode entry,
//! a polled convergence wait, and a bounded-concurrency flashing phase with
//! per-device outcome isolation.
//!
//! Firmware images are picked up from a local directory by version encoded
//! in the filename:
//!
//! ```
//! use fleet::latest_firmware;
//!
//! match latest_firmware("./fw".as_ref()) {
//!     Some(path) => println!("{}", path.display()),
//!     None => println!("No firmware image found"),
//! }
//! ```

use std::time::Duration;

mod directory;
mod error;
mod firmware;
mod identity;
mod orchestrator;
mod sink;

/// Conventional firmware image directory.
pub const DEFAULT_FIRMWARE_DIR: &str = "./fw";
/// Upper bound on simultaneously running flash operations.
pub const DEFAULT_MAX_CONCURRENT: usize = 20;

pub(crate) const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub(crate) const DEFAULT_CONVERGENCE_TIMEOUT: Duration =
    Duration::from_secs(15);
pub(crate) const DEFAULT_RELIST_ATTEMPTS: u32 = 120;

// Re-exports
pub use directory::{DeviceAttribute, DeviceDirectory, SdkError};
pub use error::UpdateError;
pub use firmware::{FirmwareImage, FirmwareVersion, latest_firmware};
pub use identity::IdentityMap;
pub use orchestrator::{
    DeviceReport, FlashOutcome, FleetReport, UpdateConfig, UpdateOrchestrator,
};
pub use sink::OutputSink;
