use nusb::{self, MaybeFuture};

use crate::{
    connection::UpdateConnection, descriptor::FunctionalDescriptor,
    error::UsbError,
};

const DFU_CLASS: u8 = 0xFE;
const DFU_SUBCLASS: u8 = 0x01;
const DFU_PROTOCOL_RUNTIME: u8 = 0x01;
const DFU_PROTOCOL_DFU: u8 = 0x02;

/// Vendor id the depth-camera modules enumerate under.
pub const DEPTH_CAMERA_VID: u16 = 0x8086;

/// Product ids the modules report while in recovery (update) mode.
const RECOVERY_PIDS: &[u16] = &[0x0ab3, 0x0adb, 0x0adc];

struct UpdatePort {
    interface: u8,
    protocol: u8,
}

/// One enumerated depth camera.
///
/// Valid only for the enumeration snapshot it came from: a module that
/// reboots into recovery mode comes back as a different camera with a
/// different identity.
pub struct DepthCamera {
    dev: nusb::DeviceInfo,
    port: Option<UpdatePort>,
}

impl DepthCamera {
    fn from_device_info(dev: nusb::DeviceInfo) -> Self {
        let port = dev
            .interfaces()
            .find(|intf| {
                intf.class() == DFU_CLASS && intf.subclass() == DFU_SUBCLASS
            })
            .map(|intf| UpdatePort {
                interface: intf.interface_number(),
                protocol: intf.protocol(),
            });
        DepthCamera { dev, port }
    }

    pub fn device_info(&self) -> &nusb::DeviceInfo {
        &self.dev
    }

    pub fn bus_id(&self) -> &str {
        self.dev.bus_id()
    }

    pub fn device_address(&self) -> u8 {
        self.dev.device_address()
    }

    pub fn vendor_id(&self) -> u16 {
        self.dev.vendor_id()
    }

    pub fn product_id(&self) -> u16 {
        self.dev.product_id()
    }

    /// Serial string from the USB descriptor, if the module reports one.
    pub fn serial(&self) -> Option<&str> {
        self.dev.serial_number()
    }

    /// Whether the module is currently in recovery (update) mode.
    pub fn in_update_mode(&self) -> bool {
        RECOVERY_PIDS.contains(&self.dev.product_id())
            || self
                .port
                .as_ref()
                .is_some_and(|port| port.protocol == DFU_PROTOCOL_DFU)
    }

    /// Whether the module exposes an update interface at all.
    pub fn update_capable(&self) -> bool {
        self.port.is_some()
    }

    /// Functional descriptor of the update interface. Falls back to the
    /// defaults when the module does not publish one.
    pub fn functional_descriptor(
        &self,
    ) -> Result<FunctionalDescriptor, UsbError> {
        let open_dev = self.dev.open().wait()?;
        Ok(open_dev
            .configurations()
            .find_map(|config| {
                config.interface_alt_settings().find_map(|alt_setting| {
                    alt_setting
                        .descriptors()
                        .find_map(|desc| FunctionalDescriptor::parse(&desc))
                })
            })
            .unwrap_or_default())
    }

    /// Ask a normal-mode module to reboot into recovery. The effect is
    /// asynchronous: the module drops off the bus and a recovery-mode
    /// camera appears in a later enumeration.
    pub fn enter_update_mode(&self) -> Result<(), UsbError> {
        let Some(port) = &self.port else {
            return Err(UsbError::NoUpdateInterface);
        };
        if port.protocol != DFU_PROTOCOL_RUNTIME {
            // already rebooted
            return Ok(());
        }
        let descriptor = self.functional_descriptor().unwrap_or_default();
        let connection = self.connect()?;
        log::debug!(
            "detaching {:04x}:{:04x} (will_detach={})",
            self.vendor_id(),
            self.product_id(),
            descriptor.will_detach(),
        );
        connection.detach(descriptor.detach_timeout().min(1000))
    }

    /// Push a firmware image to a module in recovery mode.
    pub fn flash(&self, image: &[u8]) -> Result<(), UsbError> {
        if !self.in_update_mode() {
            return Err(UsbError::NotInUpdateMode);
        }
        self.connect()?.download(image)
    }

    fn connect(&self) -> Result<UpdateConnection, UsbError> {
        let Some(port) = &self.port else {
            return Err(UsbError::NoUpdateInterface);
        };
        let xfer_size = self
            .functional_descriptor()
            .map(|desc| desc.transfer_size())
            .unwrap_or(0);
        let open_dev = self.dev.open().wait()?;
        let interface = open_dev.claim_interface(port.interface).wait()?;
        Ok(UpdateConnection::new(interface, xfer_size))
    }
}

/// Enumerate attached depth cameras, in both normal and recovery mode.
///
/// `vid` defaults to [`DEPTH_CAMERA_VID`]; `pid` narrows the snapshot to a
/// single product.
pub fn find_depth_cameras(
    vid: Option<u16>,
    pid: Option<u16>,
) -> Result<Vec<DepthCamera>, UsbError> {
    let vid = vid.unwrap_or(DEPTH_CAMERA_VID);
    Ok(nusb::list_devices()
        .wait()?
        .filter(|dev| {
            dev.vendor_id() == vid
                && pid.is_none_or(|id| dev.product_id() == id)
        })
        .map(DepthCamera::from_device_info)
        .collect())
}
