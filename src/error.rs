use thiserror::Error;

/// Failures below the protocol: the HID bus, the OS, or a truncated reply.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    #[error("short report: expected {expected} bytes, got {actual}")]
    ShortReport { expected: usize, actual: usize },

    #[error("device enumeration failed: {0}")]
    Enumerate(String),
}

#[derive(Debug, Error)]
pub enum ProbeError {
    /// The receiver answered but the headset channel is down.
    #[error("headset not connected")]
    NotConnected,

    #[error(transparent)]
    Io(#[from] TransportError),
}

impl ProbeError {
    pub fn is_not_connected(&self) -> bool {
        matches!(self, ProbeError::NotConnected)
    }
}

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("no HID device found for vendor 0x{vendor_id:04x}, products {product_ids:04x?}. Is the receiver plugged in?")]
    NoDeviceFound { vendor_id: u16, product_ids: Vec<u16> },

    #[error("none of the {candidates} matching interfaces answered the status query")]
    NoResponsiveInterface { candidates: usize },

    #[error(transparent)]
    Enumerate(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("startup discovery failed: {0}")]
    Startup(#[source] LocateError),

    #[error("I/O error while polling: {0}")]
    Io(#[source] TransportError),
}
