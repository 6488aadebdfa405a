use std::time::{Duration, Instant};

use nusb::{
    MaybeFuture,
    transfer::{ControlIn, ControlOut, ControlType, Recipient},
};

use crate::DEFAULT_TIMEOUT;
use crate::error::*;

const DFU_CMD_DETACH: u8 = 0;
const DFU_CMD_DNLOAD: u8 = 1;
const DFU_CMD_GETSTATUS: u8 = 3;
const DFU_CMD_CLRSTATUS: u8 = 4;
const DFU_CMD_ABORT: u8 = 6;

const DFU_STATUS_LEN: u16 = 6;

const DFU_STATE_DFU_IDLE: u8 = 0x02;
const DFU_STATE_DNLOAD_IDLE: u8 = 0x05;

/// Claimed update interface of a single camera.
pub struct UpdateConnection {
    interface: nusb::Interface,
    xfer_size: u16,
}

#[derive(Clone, Debug)]
pub struct UpdateStatus {
    status: u8,
    poll_timeout: u32,
    state: u8,
}

impl UpdateStatus {
    fn from_raw(data: &[u8]) -> Self {
        UpdateStatus {
            status: data[0],
            poll_timeout: (data[3] as u32) << 16
                | (data[2] as u32) << 8
                | (data[1] as u32),
            state: data[4],
        }
    }

    pub fn ok(&self) -> Result<(), UsbError> {
        if self.status != 0 {
            Err(UsbError::Status(self.status))
        } else {
            Ok(())
        }
    }
}

impl UpdateConnection {
    pub(crate) fn new(interface: nusb::Interface, xfer_size: u16) -> Self {
        UpdateConnection {
            interface,
            xfer_size: if xfer_size > 0 {
                xfer_size
            } else {
                crate::DEFAULT_TRANSFER_SIZE
            },
        }
    }

    pub fn transfer_size(&self) -> u16 {
        self.xfer_size
    }

    /// Ask the module to leave normal operation. It drops off the bus and
    /// re-enumerates in recovery mode under a different identity.
    pub fn detach(&self, timeout_ms: u16) -> Result<(), UsbError> {
        self.cmd_out(DFU_CMD_DETACH, timeout_ms, &[])
    }

    pub fn reset_state(&self) -> Result<(), UsbError> {
        let mut st = self.get_status()?;
        if st.status != 0 {
            self.clear_status()?;
            st = self.get_status()?;
        }
        if st.state != DFU_STATE_DFU_IDLE {
            self.abort()?;
            st = self.get_status()?;
        }
        st.ok()
    }

    pub fn get_status(&self) -> Result<UpdateStatus, UsbError> {
        let data = self.cmd_in(DFU_CMD_GETSTATUS, 0, DFU_STATUS_LEN)?;
        Ok(UpdateStatus::from_raw(&data))
    }

    pub fn clear_status(&self) -> Result<(), UsbError> {
        self.cmd_out(DFU_CMD_CLRSTATUS, 0, &[])
    }

    pub fn abort(&self) -> Result<(), UsbError> {
        self.cmd_out(DFU_CMD_ABORT, 0, &[])
    }

    /// Push a complete firmware image: chunked downloads with incrementing
    /// block numbers, then a zero-length download to start manifestation.
    pub fn download(&self, image: &[u8]) -> Result<(), UsbError> {
        self.reset_state()?;
        let chunk_size = self.xfer_size as usize;
        let chunks = image.len().div_ceil(chunk_size);
        let mut block: u16 = 0;
        for (nr, chunk) in image.chunks(chunk_size).enumerate() {
            log::debug!("downloading block {} of {}", nr + 1, chunks);
            self.dnload(block, chunk)?;
            block = block.wrapping_add(1);
        }
        // Manifestation; the module reboots into the new image and may drop
        // off the bus before answering the final status request.
        self.cmd_out(DFU_CMD_DNLOAD, block, &[])?;
        let _ = self.get_status();
        Ok(())
    }

    fn dnload(&self, block: u16, data: &[u8]) -> Result<(), UsbError> {
        self.cmd_out(DFU_CMD_DNLOAD, block, data)?;
        self.poll_until_idle()
    }

    fn poll_until_idle(&self) -> Result<(), UsbError> {
        let start = Instant::now();
        loop {
            let st = self.get_status()?;
            if st.state == DFU_STATE_DNLOAD_IDLE
                || st.state == DFU_STATE_DFU_IDLE
            {
                return st.ok();
            }
            st.ok()?;
            if start.elapsed() >= DEFAULT_TIMEOUT * 2 {
                return Err(UsbError::Timeout);
            }
            // the module names its own repoll delay
            if st.poll_timeout > 0 {
                std::thread::sleep(Duration::from_millis(
                    st.poll_timeout.into(),
                ));
            }
        }
    }

    fn cmd_out(
        &self,
        req: u8,
        value: u16,
        data: &[u8],
    ) -> Result<(), UsbError> {
        let index = self.interface.interface_number() as u16;
        Ok(self
            .interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Class,
                    recipient: Recipient::Interface,
                    request: req,
                    value,
                    index,
                    data,
                },
                DEFAULT_TIMEOUT,
            )
            .wait()?)
    }

    fn cmd_in(
        &self,
        req: u8,
        value: u16,
        length: u16,
    ) -> Result<Vec<u8>, UsbError> {
        let index = self.interface.interface_number() as u16;
        Ok(self
            .interface
            .control_in(
                ControlIn {
                    control_type: ControlType::Class,
                    recipient: Recipient::Interface,
                    request: req,
                    value,
                    index,
                    length,
                },
                DEFAULT_TIMEOUT,
            )
            .wait()?)
    }
}
