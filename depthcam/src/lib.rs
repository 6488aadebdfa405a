//! USB transport for depth-camera firmware updates, built on [`nusb`]
//!
//! The camera modules carry a DFU-capable update interface. In normal
//! operation it is a runtime stub that only accepts a detach request; after
//! the module reboots it re-enumerates in recovery mode, under a different
//! identity, and accepts firmware downloads. [`UsbDeviceDirectory`] exposes
//! the bus as a [`fleet::DeviceDirectory`] so the update orchestrator never
//! touches USB details directly.
//!
//! # Example
//!
//! ```
//! use depthcam::find_depth_cameras;
//!
//! match find_depth_cameras(None, None) {
//!     Ok(cameras) => {
//!         if cameras.is_empty() {
//!             println!("No depth cameras found");
//!         } else {
//!             println!("Found {} depth cameras", cameras.len());
//!         }
//!     }
//!     Err(e) => println!("Error: {e}"),
//! }
//! ```
//!
//! [`nusb`]: https://docs.rs/nusb

use std::time::Duration;

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000u64);
pub(crate) const DEFAULT_TRANSFER_SIZE: u16 = 1024;

mod connection;
mod descriptor;
mod device;
mod directory;
mod error;

// Re-exports
pub use connection::UpdateConnection;
pub use descriptor::FunctionalDescriptor;
pub use device::{DEPTH_CAMERA_VID, DepthCamera, find_depth_cameras};
pub use directory::UsbDeviceDirectory;
pub use error::UsbError;
