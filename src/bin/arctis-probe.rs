//! Receiver diagnostic tool
//!
//! Lists every interface of every known SteelSeries receiver and runs the
//! status/battery exchange against each one once.
//!
//! Usage: cargo run --bin arctis-probe

use anyhow::{bail, Context};
use enum_iterator::all;

use arctis_tray::locator::Backend;
use arctis_tray::{
    logging, Device, HidApiBackend, KnownReceiver, ProbeError, STEELSERIES_VENDOR_ID,
};

const READ_TIMEOUT_MS: i32 = 1000;

fn main() -> anyhow::Result<()> {
    logging::init_stderr("warn")?;

    let mut backend = HidApiBackend::new().context("Error when initializing HID library")?;
    let product_ids: Vec<u16> = all::<KnownReceiver>().map(|r| r.product_id()).collect();

    println!("Scanning vendor 0x{:04x} for known receivers...", STEELSERIES_VENDOR_ID);
    for receiver in all::<KnownReceiver>() {
        println!("  0x{:04x}  {}", receiver.product_id(), receiver.name());
    }
    println!();

    let candidates = backend.enumerate(STEELSERIES_VENDOR_ID, &product_ids)?;
    if candidates.is_empty() {
        bail!("No receiver found. Is it connected?");
    }

    for descriptor in &candidates {
        println!("{}", descriptor.label());
        println!("    Product: {:?}", descriptor.product);

        let transport = match backend.open(descriptor) {
            Ok(transport) => transport,
            Err(e) => {
                println!("    open failed: {}", e);
                continue;
            }
        };

        let mut device = Device::new(descriptor.label(), transport, READ_TIMEOUT_MS);
        match device.probe() {
            Ok(level) => println!("    headset connected, battery {}%", level),
            Err(ProbeError::NotConnected) => println!("    receiver answers, headset off or out of range"),
            Err(ProbeError::Io(e)) => println!("    no answer: {}", e),
        }
        device.close();
        println!();
    }

    Ok(())
}
