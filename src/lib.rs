use enum_iterator::Sequence;

pub mod config;
pub mod device;
pub mod error;
pub mod locator;
pub mod logging;
pub mod poller;
pub mod tray;

pub use device::{Device, Transport};
pub use error::{LocateError, PollError, ProbeError, TransportError};
pub use locator::{Backend, DeviceDescriptor, HidApiBackend, Locator};
pub use poller::{ConnectionState, IoErrorPolicy, PollSettings, Poller};
pub use tray::Renderer;

/// SteelSeries USB vendor id.
pub const STEELSERIES_VENDOR_ID: u16 = 0x1038;

/// Length of every feature-report reply the receiver sends back.
pub const REPORT_LEN: usize = 31;

/// Offset of the status / battery byte inside a reply.
pub const VALUE_OFFSET: usize = 2;

/// Status byte reported while the headset channel is active.
pub const STATUS_CONNECTED: u8 = 0x03;

/// Rendered when no reading is available.
pub const UNKNOWN_LEVEL: u8 = 0;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Sequence)]
pub enum KnownReceiver {
    Arctis7v2017,
    Arctis7v2019,
    ArctisPro,
    Arctis1Wireless,
    Arctis9,
}

impl KnownReceiver {
    pub fn product_id(&self) -> u16 {
        match self {
            KnownReceiver::Arctis7v2017 => 0x1260,
            KnownReceiver::Arctis7v2019 => 0x12ad,
            KnownReceiver::ArctisPro => 0x1252,
            KnownReceiver::Arctis1Wireless => 0x12b3,
            KnownReceiver::Arctis9 => 0x12c2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            KnownReceiver::Arctis7v2017 => "Arctis 7 (2017)",
            KnownReceiver::Arctis7v2019 => "Arctis 7 (2019)",
            KnownReceiver::ArctisPro => "Arctis Pro Wireless",
            KnownReceiver::Arctis1Wireless => "Arctis 1 Wireless",
            KnownReceiver::Arctis9 => "Arctis 9",
        }
    }

    pub fn from_product_id(product_id: u16) -> Option<Self> {
        enum_iterator::all::<KnownReceiver>().find(|r| r.product_id() == product_id)
    }
}

// Both requests are two-byte feature reports on report id 0x06:
// 06 14 = status query, reply byte 2 is 0x03 while the headset is paired
// 06 18 = battery query, reply byte 2 is the charge in percent
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Request {
    Status,
    Battery,
}

impl Request {
    const REPORT_ID: u8 = 0x06;

    fn command(&self) -> u8 {
        match self {
            Request::Status => 0x14,
            Request::Battery => 0x18,
        }
    }

    pub fn encode(&self) -> [u8; 2] {
        [Self::REPORT_ID, self.command()]
    }
}

/// A full-length reply to either [`Request`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Response {
    data: [u8; REPORT_LEN],
}

impl Response {
    /// The byte at [`VALUE_OFFSET`]: status for [`Request::Status`],
    /// percentage for [`Request::Battery`].
    pub fn value(&self) -> u8 {
        self.data[VALUE_OFFSET]
    }

    pub fn is_connected(&self) -> bool {
        self.value() == STATUS_CONNECTED
    }

    pub fn dump(&self) -> String {
        hexdump(&self.data, 8)
    }
}

impl TryFrom<&[u8]> for Response {
    type Error = TransportError;

    fn try_from(buf: &[u8]) -> Result<Self, TransportError> {
        let data: [u8; REPORT_LEN] = buf
            .get(..REPORT_LEN)
            .and_then(|head| head.try_into().ok())
            .ok_or(TransportError::ShortReport {
                expected: REPORT_LEN,
                actual: buf.len(),
            })?;
        Ok(Self { data })
    }
}

pub fn hexdump(data: &[u8], chunk_size: usize) -> String {
    let mut lines = Vec::new();
    for chunk in data.chunks(chunk_size) {
        let hex_part: Vec<String> = chunk.iter().map(|byte| format!("{:02x}", byte)).collect();
        let char_part: String = chunk
            .iter()
            .map(|&byte| {
                if byte.is_ascii() && !byte.is_ascii_control() {
                    byte as char
                } else {
                    '.'
                }
            })
            .collect();

        lines.push(format!(
            "{:<width$}  {}",
            hex_part.join(" "),
            char_part,
            width = 3 * chunk_size
        ));
    }
    lines.join(" | ")
}
