use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use arctis_tray::config::{self, AppConfig};
use arctis_tray::logging;
use arctis_tray::tray::{ChannelRenderer, IconStore, TrayHost, UiEvent};
use arctis_tray::{HidApiBackend, Locator, Poller};

const UI_POLL: Duration = Duration::from_millis(50);

fn poll(config: AppConfig, ui: Sender<UiEvent>, shutdown: Receiver<()>) -> anyhow::Result<()> {
    let backend = HidApiBackend::new().context("Error when initializing HID library")?;
    let locator = Locator::new(
        backend,
        config.vendor_id,
        config.product_ids.clone(),
        config.read_timeout(),
    );
    let poller = Poller::start(locator, ChannelRenderer::new(ui), config.poll_settings())?;
    poller.run(shutdown)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let config_path = config::config_path()?;
    let created = !config_path.exists();
    let config = config::load_config_from(&config_path)?;
    let _guard = logging::init(&config.log)?;
    tracing::info!("arctis-tray {} starting", env!("CARGO_PKG_VERSION"));
    if created {
        tracing::info!("Created default config file at {}", config_path.display());
    }

    let (ui_tx, ui_rx) = crossbeam_channel::unbounded();
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

    let poll_config = config.clone();
    let poller = thread::Builder::new()
        .name("poller".to_string())
        .spawn(move || {
            if let Err(e) = poll(poll_config, ui_tx.clone(), shutdown_rx) {
                tracing::error!("{:#}", e);
                if ui_tx.send(UiEvent::Fatal(format!("{:#}", e))).is_err() {
                    tracing::debug!("Tray already gone");
                }
            }
        })?;

    let mut tray = match TrayHost::new(IconStore::new(&config.icon_dir)) {
        Ok(tray) => Some(tray),
        Err(e) => {
            tracing::warn!("Could not create system tray, running without an icon: {:#}", e);
            None
        }
    };

    let result = loop {
        if tray.as_ref().is_some_and(TrayHost::quit_requested) {
            tracing::info!("Quit requested");
            break Ok(());
        }

        match ui_rx.recv_timeout(UI_POLL) {
            Ok(UiEvent::Render(percentage)) => match tray.as_mut() {
                Some(tray) => tray.show(percentage),
                None => tracing::debug!("No tray, skipping icon for {}%", percentage),
            },
            Ok(UiEvent::Fatal(message)) => break Err(anyhow!(message)),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break Err(anyhow!("Polling thread exited")),
        }
    };

    // Closing the channel stops the poller, which closes the receiver handle.
    drop(shutdown_tx);
    if poller.join().is_err() {
        tracing::error!("Polling thread panicked");
    }
    drop(tray);

    result
}
