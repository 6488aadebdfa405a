#[derive(Debug)]
pub enum UsbError {
    Usb(nusb::Error),
    Transfer(nusb::transfer::TransferError),
    Status(u8),
    NoUpdateInterface,
    NotInUpdateMode,
    Timeout,
}

impl std::error::Error for UsbError {}

impl std::fmt::Display for UsbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UsbError::Usb(err) => write!(f, "USB error: {}", err),
            UsbError::Transfer(err) => write!(f, "Transfer error: {}", err),
            UsbError::Status(code) => {
                write!(f, "Update status error: code {}", code)
            }
            UsbError::NoUpdateInterface => {
                write!(f, "No firmware-update interface")
            }
            UsbError::NotInUpdateMode => {
                write!(f, "Device is not in update mode")
            }
            UsbError::Timeout => {
                write!(f, "Timeout")
            }
        }
    }
}

impl From<nusb::Error> for UsbError {
    fn from(err: nusb::Error) -> Self {
        UsbError::Usb(err)
    }
}

impl From<nusb::transfer::TransferError> for UsbError {
    fn from(err: nusb::transfer::TransferError) -> Self {
        UsbError::Transfer(err)
    }
}
