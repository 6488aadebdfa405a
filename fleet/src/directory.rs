/// Identity attributes a device may expose.
///
/// A device is free to expose either, both or neither; a missing attribute
/// only degrades its display name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceAttribute {
    /// Stable, human-facing serial number, readable in normal operation.
    SerialNumber,
    /// Identifier the device reports once it has entered update mode.
    UpdateId,
}

/// Failure reported by the device directory.
///
/// Carries the failing operation, its arguments and a human-readable
/// message, so a run can always say which call against which device fell
/// over.
#[derive(Clone, Debug)]
pub struct SdkError {
    operation: &'static str,
    args: String,
    message: String,
}

impl SdkError {
    pub fn new(
        operation: &'static str,
        args: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        SdkError {
            operation,
            args: args.into(),
            message: message.to_string(),
        }
    }

    pub fn operation(&self) -> &str {
        self.operation
    }

    pub fn args(&self) -> &str {
        &self.args
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::error::Error for SdkError {}

impl std::fmt::Display for SdkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({}): {}", self.operation, self.args, self.message)
    }
}

/// Snapshot-style view of the attached device fleet.
///
/// `list_devices` takes a fresh enumeration snapshot; handles are only
/// meaningful within the snapshot they came from. A device that reboots
/// into update mode re-enumerates under a different identity, so the
/// orchestrator never reuses a handle across that transition.
///
/// All operations block; [`DeviceDirectory::flash`] is long-running and
/// requires the device to already be in update mode.
pub trait DeviceDirectory: Send + Sync + 'static {
    type Handle: Send + 'static;

    /// Enumerate the currently attached devices. May be empty.
    fn list_devices(&self) -> Result<Vec<Self::Handle>, SdkError>;

    /// Read an identity attribute. `Ok(None)` means the device does not
    /// expose it; `Err` is reserved for genuine communication failures.
    fn attribute(
        &self,
        device: &Self::Handle,
        attribute: DeviceAttribute,
    ) -> Result<Option<String>, SdkError>;

    /// Whether the device can be commanded into update mode.
    fn update_capable(&self, device: &Self::Handle) -> bool;

    /// Whether the device is currently in update mode.
    fn in_update_mode(&self, device: &Self::Handle) -> bool;

    /// Ask the device to reboot into update mode. The effect is
    /// asynchronous: the device drops off the bus and reappears in a later
    /// snapshot under its update-mode identity.
    fn enter_update_mode(&self, device: &Self::Handle)
    -> Result<(), SdkError>;

    /// Push a firmware image to a device that is in update mode.
    fn flash(
        &self,
        device: &Self::Handle,
        image: &[u8],
    ) -> Result<(), SdkError>;
}
