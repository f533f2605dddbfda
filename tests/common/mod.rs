#![allow(dead_code)]

use std::collections::VecDeque;
use std::ffi::CString;
use std::sync::{Arc, Mutex};

use arctis_tray::{
    Backend, DeviceDescriptor, Locator, Renderer, Transport, TransportError, REPORT_LEN,
    STEELSERIES_VENDOR_ID,
};

pub const PRODUCT_ID: u16 = 0x1260;
pub const STATUS_QUERY: [u8; 2] = [0x06, 0x14];
pub const BATTERY_QUERY: [u8; 2] = [0x06, 0x18];

/// How an interface answers one status/battery exchange.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Behaviour {
    /// Headset up, battery at the given level.
    Level(u8),
    /// Receiver answers the status query with the given non-connected byte.
    Asleep(u8),
    /// Every write fails.
    Broken,
    /// Writes succeed, nothing is ever read back.
    Silent,
    /// Status says connected, then the battery query fails.
    FailsBattery,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    Enumerate,
    Open(String),
    Write(String, Vec<u8>),
    Close(String),
}

#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    pub fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }

    pub fn enumerations(&self) -> usize {
        self.count(|e| *e == Event::Enumerate)
    }

    pub fn opens(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Open(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    pub fn closes(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Close(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Write(_, data) => Some(data),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// One scripted receiver interface. Each status query consumes the next
/// behaviour; the last one repeats forever.
#[derive(Clone)]
pub struct FakeInterface {
    pub path: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub openable: bool,
    script: Arc<Mutex<VecDeque<Behaviour>>>,
}

impl FakeInterface {
    pub fn new(path: &str, script: impl IntoIterator<Item = Behaviour>) -> Self {
        FakeInterface {
            path: path.to_string(),
            vendor_id: STEELSERIES_VENDOR_ID,
            product_id: PRODUCT_ID,
            openable: true,
            script: Arc::new(Mutex::new(script.into_iter().collect())),
        }
    }

    pub fn with_product_id(mut self, product_id: u16) -> Self {
        self.product_id = product_id;
        self
    }

    pub fn with_vendor_id(mut self, vendor_id: u16) -> Self {
        self.vendor_id = vendor_id;
        self
    }

    pub fn unopenable(mut self) -> Self {
        self.openable = false;
        self
    }

    fn next_behaviour(&self) -> Behaviour {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            *script.front().unwrap_or(&Behaviour::Broken)
        }
    }
}

fn reply(value: u8) -> Vec<u8> {
    let mut buf = vec![0u8; REPORT_LEN];
    buf[0] = 0x06;
    buf[2] = value;
    buf
}

fn hid_error(message: &str) -> TransportError {
    TransportError::Hid(hidapi::HidError::HidApiError {
        message: message.to_string(),
    })
}

pub struct FakeTransport {
    interface: FakeInterface,
    log: EventLog,
    current: Mutex<Option<Behaviour>>,
    pending: Mutex<Option<Vec<u8>>>,
}

impl Transport for FakeTransport {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        self.log
            .push(Event::Write(self.interface.path.clone(), data.to_vec()));

        let mut current = self.current.lock().unwrap();
        let mut pending = self.pending.lock().unwrap();
        if data == STATUS_QUERY {
            let behaviour = self.interface.next_behaviour();
            *current = Some(behaviour);
            *pending = match behaviour {
                Behaviour::Level(_) | Behaviour::FailsBattery => Some(reply(0x03)),
                Behaviour::Asleep(status) => Some(reply(status)),
                Behaviour::Silent => None,
                Behaviour::Broken => return Err(hid_error("broken pipe")),
            };
        } else if data == BATTERY_QUERY {
            *pending = match *current {
                Some(Behaviour::Level(level)) => Some(reply(level)),
                Some(Behaviour::Silent) => None,
                _ => return Err(hid_error("battery query rejected")),
            };
        } else {
            return Err(hid_error("unknown report"));
        }
        Ok(data.len())
    }

    fn read_timeout(&self, buf: &mut [u8], _timeout_ms: i32) -> Result<usize, TransportError> {
        match self.pending.lock().unwrap().take() {
            Some(data) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok(len)
            }
            None => Ok(0),
        }
    }
}

impl Drop for FakeTransport {
    fn drop(&mut self) {
        self.log.push(Event::Close(self.interface.path.clone()));
    }
}

/// A USB bus whose interfaces can be plugged and unplugged mid-test.
#[derive(Clone, Default)]
pub struct FakeBus {
    pub log: EventLog,
    interfaces: Arc<Mutex<Vec<FakeInterface>>>,
    enumerate_fails: Arc<Mutex<bool>>,
}

impl FakeBus {
    pub fn new(interfaces: impl IntoIterator<Item = FakeInterface>) -> Self {
        let bus = FakeBus::default();
        bus.interfaces.lock().unwrap().extend(interfaces);
        bus
    }

    pub fn plug(&self, interface: FakeInterface) {
        self.interfaces.lock().unwrap().push(interface);
    }

    pub fn unplug_all(&self) {
        self.interfaces.lock().unwrap().clear();
    }

    pub fn fail_enumeration(&self) {
        *self.enumerate_fails.lock().unwrap() = true;
    }

    pub fn transport(&self, interface: &FakeInterface) -> FakeTransport {
        self.log.push(Event::Open(interface.path.clone()));
        FakeTransport {
            interface: interface.clone(),
            log: self.log.clone(),
            current: Mutex::new(None),
            pending: Mutex::new(None),
        }
    }

    pub fn locator(&self) -> Locator<FakeBus> {
        Locator::new(self.clone(), STEELSERIES_VENDOR_ID, vec![PRODUCT_ID], 100)
    }
}

impl Backend for FakeBus {
    type Transport = FakeTransport;

    fn enumerate(
        &mut self,
        vendor_id: u16,
        product_ids: &[u16],
    ) -> Result<Vec<DeviceDescriptor>, TransportError> {
        self.log.push(Event::Enumerate);
        if *self.enumerate_fails.lock().unwrap() {
            return Err(TransportError::Enumerate("hidapi unavailable".to_string()));
        }

        let interfaces = self.interfaces.lock().unwrap();
        let mut found = Vec::new();
        for &product_id in product_ids {
            for interface in interfaces.iter() {
                if interface.vendor_id == vendor_id && interface.product_id == product_id {
                    found.push(DeviceDescriptor {
                        vendor_id,
                        product_id,
                        path: CString::new(interface.path.clone()).unwrap(),
                        interface_number: 0,
                        product: Some("SteelSeries Arctis 7".to_string()),
                    });
                }
            }
        }
        Ok(found)
    }

    fn open(&mut self, descriptor: &DeviceDescriptor) -> Result<FakeTransport, TransportError> {
        let path = descriptor.path.to_string_lossy().into_owned();
        let interface = self
            .interfaces
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.path == path)
            .cloned()
            .ok_or_else(|| hid_error("no such device"))?;
        if !interface.openable {
            return Err(hid_error("access denied"));
        }
        Ok(self.transport(&interface))
    }
}

/// Remembers every level it was asked to show.
#[derive(Clone, Default)]
pub struct RecordingRenderer(Arc<Mutex<Vec<u8>>>);

impl RecordingRenderer {
    pub fn levels(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Renderer for RecordingRenderer {
    fn render(&mut self, percentage: u8) {
        self.0.lock().unwrap().push(percentage);
    }
}
