use std::ffi::CString;

use hidapi::HidApi;

use crate::{Device, KnownReceiver, LocateError, Transport, TransportError};

/// Enumeration-time metadata for one candidate interface.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub path: CString,
    pub interface_number: i32,
    pub product: Option<String>,
}

impl DeviceDescriptor {
    pub fn label(&self) -> String {
        let name = KnownReceiver::from_product_id(self.product_id)
            .map(|r| r.name().to_string())
            .or_else(|| self.product.clone())
            .unwrap_or_else(|| "unknown receiver".to_string());
        format!(
            "{} [{:04x}:{:04x} if{} {}]",
            name,
            self.vendor_id,
            self.product_id,
            self.interface_number,
            self.path.to_string_lossy()
        )
    }
}

/// Where candidate interfaces come from.
pub trait Backend {
    type Transport: Transport;

    /// Lists every interface matching `vendor_id` and one of `product_ids`,
    /// grouped in `product_ids` order, enumeration order within a group.
    fn enumerate(
        &mut self,
        vendor_id: u16,
        product_ids: &[u16],
    ) -> Result<Vec<DeviceDescriptor>, TransportError>;

    fn open(&mut self, descriptor: &DeviceDescriptor) -> Result<Self::Transport, TransportError>;
}

pub struct HidApiBackend {
    api: HidApi,
}

impl HidApiBackend {
    pub fn new() -> Result<Self, TransportError> {
        let api = HidApi::new()?;
        Ok(HidApiBackend { api })
    }
}

impl Backend for HidApiBackend {
    type Transport = hidapi::HidDevice;

    fn enumerate(
        &mut self,
        vendor_id: u16,
        product_ids: &[u16],
    ) -> Result<Vec<DeviceDescriptor>, TransportError> {
        self.api
            .refresh_devices()
            .map_err(|e| TransportError::Enumerate(e.to_string()))?;

        let mut found = Vec::new();
        for &product_id in product_ids {
            found.extend(
                self.api
                    .device_list()
                    .filter(|info| info.vendor_id() == vendor_id && info.product_id() == product_id)
                    .map(|info| DeviceDescriptor {
                        vendor_id: info.vendor_id(),
                        product_id: info.product_id(),
                        path: info.path().to_owned(),
                        interface_number: info.interface_number(),
                        product: info.product_string().map(str::to_string),
                    }),
            );
        }
        Ok(found)
    }

    fn open(&mut self, descriptor: &DeviceDescriptor) -> Result<hidapi::HidDevice, TransportError> {
        Ok(self.api.open_path(&descriptor.path)?)
    }
}

/// Finds the receiver interface that speaks the battery protocol.
pub struct Locator<B: Backend> {
    backend: B,
    vendor_id: u16,
    product_ids: Vec<u16>,
    read_timeout_ms: i32,
}

impl<B: Backend> Locator<B> {
    pub fn new(backend: B, vendor_id: u16, product_ids: Vec<u16>, read_timeout_ms: i32) -> Self {
        Locator {
            backend,
            vendor_id,
            product_ids,
            read_timeout_ms,
        }
    }

    /// Adopts the first interface that answers the status query at all.
    ///
    /// A sleeping headset (`NotConnected`) still marks the right interface:
    /// the receiver handle stays valid while the headset is off. Interfaces
    /// that fail to open are skipped, those that fail the exchange are
    /// closed and skipped.
    pub fn locate(&mut self) -> Result<Device<B::Transport>, LocateError> {
        let candidates = self.backend.enumerate(self.vendor_id, &self.product_ids)?;
        if candidates.is_empty() {
            return Err(LocateError::NoDeviceFound {
                vendor_id: self.vendor_id,
                product_ids: self.product_ids.clone(),
            });
        }
        tracing::debug!("Found {} candidate interfaces", candidates.len());

        for descriptor in &candidates {
            let label = descriptor.label();
            let transport = match self.backend.open(descriptor) {
                Ok(transport) => transport,
                Err(e) => {
                    tracing::warn!("Unable to open receiver interface {}: {}", label, e);
                    continue;
                }
            };

            let mut device = Device::new(label, transport, self.read_timeout_ms);
            match device.probe() {
                Ok(level) => {
                    tracing::info!("Using {} (battery {}%)", device.label(), level);
                    return Ok(device);
                }
                Err(e) if e.is_not_connected() => {
                    tracing::info!("Using {} (headset not connected)", device.label());
                    return Ok(device);
                }
                Err(e) => {
                    tracing::debug!("Skipping {}: {}", device.label(), e);
                    device.close();
                }
            }
        }

        Err(LocateError::NoResponsiveInterface {
            candidates: candidates.len(),
        })
    }
}
