use fleet::{DeviceAttribute, DeviceDirectory, SdkError};

use crate::device::{DepthCamera, find_depth_cameras};

/// [`fleet::DeviceDirectory`] over the USB bus.
///
/// Stateless: every `list_devices` call takes a fresh enumeration
/// snapshot, which is what lets the orchestrator re-find the fleet after
/// the mode transition.
#[derive(Clone, Copy, Debug, Default)]
pub struct UsbDeviceDirectory;

impl UsbDeviceDirectory {
    pub fn new() -> Self {
        UsbDeviceDirectory
    }
}

impl DeviceDirectory for UsbDeviceDirectory {
    type Handle = DepthCamera;

    fn list_devices(&self) -> Result<Vec<DepthCamera>, SdkError> {
        find_depth_cameras(None, None)
            .map_err(|err| SdkError::new("list_devices", "", err))
    }

    fn attribute(
        &self,
        device: &DepthCamera,
        attribute: DeviceAttribute,
    ) -> Result<Option<String>, SdkError> {
        // Both attributes come from the cached enumeration snapshot; the
        // bootloader preserves the descriptor serial, so it doubles as the
        // update-mode id. A missing attribute is Ok(None), not an error.
        Ok(match attribute {
            DeviceAttribute::SerialNumber if device.in_update_mode() => None,
            DeviceAttribute::SerialNumber | DeviceAttribute::UpdateId => {
                device.serial().map(str::to_owned)
            }
        })
    }

    fn update_capable(&self, device: &DepthCamera) -> bool {
        device.update_capable()
    }

    fn in_update_mode(&self, device: &DepthCamera) -> bool {
        device.in_update_mode()
    }

    fn enter_update_mode(
        &self,
        device: &DepthCamera,
    ) -> Result<(), SdkError> {
        device.enter_update_mode().map_err(|err| {
            SdkError::new("enter_update_mode", device_args(device), err)
        })
    }

    fn flash(
        &self,
        device: &DepthCamera,
        image: &[u8],
    ) -> Result<(), SdkError> {
        device.flash(image).map_err(|err| {
            SdkError::new(
                "flash",
                format!("{}, {} bytes", device_args(device), image.len()),
                err,
            )
        })
    }
}

fn device_args(device: &DepthCamera) -> String {
    format!(
        "{:04x}:{:04x} serial={}",
        device.vendor_id(),
        device.product_id(),
        device.serial().unwrap_or("?")
    )
}
