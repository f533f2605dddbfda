use std::fmt;

use crate::{ProbeError, Request, Response, TransportError, REPORT_LEN};

/// The two HID calls the battery protocol needs.
pub trait Transport {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError>;

    /// Blocks for at most `timeout_ms`; returns the number of bytes read,
    /// `0` meaning nothing arrived in time.
    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError>;
}

impl Transport for hidapi::HidDevice {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        Ok(hidapi::HidDevice::write(self, data)?)
    }

    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError> {
        Ok(hidapi::HidDevice::read_timeout(self, buf, timeout_ms)?)
    }
}

/// An open receiver interface. Dropping it closes the handle.
pub struct Device<T: Transport> {
    label: String,
    device: T,
    read_timeout_ms: i32,
}

impl<T: Transport> fmt::Debug for Device<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device").field("label", &self.label).finish()
    }
}

impl<T: Transport> Device<T> {
    pub fn new(label: impl Into<String>, device: T, read_timeout_ms: i32) -> Self {
        Device {
            label: label.into(),
            device,
            read_timeout_ms,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Sends `request` and reads back its fixed-length reply.
    pub fn send(&mut self, request: Request) -> Result<Response, TransportError> {
        let buf = request.encode();
        tracing::debug!("REQ {:?} -> {}: {:02x?}", request, self.label, buf);
        self.device.write(&buf)?;

        let mut reply = [0u8; REPORT_LEN];
        let read = self.device.read_timeout(&mut reply, self.read_timeout_ms)?;
        let response = Response::try_from(&reply[..read.min(REPORT_LEN)])?;
        tracing::debug!("RES {:?} <- {}: {}", request, self.label, response.dump());
        Ok(response)
    }

    /// Queries the headset's battery level in percent.
    ///
    /// The status query goes first: the receiver answers it even while the
    /// headset is off, but its battery byte is only meaningful once the
    /// headset channel is up. A status other than connected yields
    /// [`ProbeError::NotConnected`] without issuing the battery query.
    pub fn probe(&mut self) -> Result<u8, ProbeError> {
        let status = self.send(Request::Status)?;
        if !status.is_connected() {
            tracing::debug!("{}: status 0x{:02x}, headset not connected", self.label, status.value());
            return Err(ProbeError::NotConnected);
        }

        let battery = self.send(Request::Battery)?.value();
        if battery > 100 {
            tracing::warn!("{}: battery byte {} out of range, clamping to 100", self.label, battery);
            return Ok(100);
        }
        Ok(battery)
    }

    pub fn close(self) {
        tracing::debug!("Closing {}", self.label);
    }
}
