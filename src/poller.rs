use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use retry::{delay::Fibonacci, delay::Fixed, retry_with_index, OperationResult};
use serde::{Deserialize, Serialize};

use crate::{Backend, Device, Locator, PollError, ProbeError, Renderer, UNKNOWN_LEVEL};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionState {
    Normal,
    /// The last probe reported the headset channel down.
    Disconnected,
}

/// What a transport failure during steady-state polling does.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IoErrorPolicy {
    /// Log, show the unknown icon and back off before the next tick.
    #[default]
    Continue,
    /// Stop polling and surface the error.
    Exit,
}

#[derive(Clone, Debug)]
pub struct PollSettings {
    pub interval: Duration,
    pub recovery_pause: Duration,
    pub relocate_attempts: u32,
    pub on_io_error: IoErrorPolicy,
    /// Consecutive I/O errors after which the handle is dropped and the
    /// receiver re-discovered.
    pub io_error_threshold: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        PollSettings {
            interval: Duration::from_secs(5),
            recovery_pause: Duration::from_secs(1),
            relocate_attempts: 1,
            on_io_error: IoErrorPolicy::Continue,
            io_error_threshold: 3,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
        }
    }
}

const MIN_BACKOFF: Duration = Duration::from_millis(1);

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Owns the active receiver handle and drives it on a fixed interval.
pub struct Poller<B: Backend, R: Renderer> {
    locator: Locator<B>,
    renderer: R,
    device: Option<Device<B::Transport>>,
    state: ConnectionState,
    settings: PollSettings,
    io_errors: u32,
    backoff: Fibonacci,
}

impl<B: Backend, R: Renderer> Poller<B, R> {
    /// Runs startup discovery. Nothing is rendered if it fails.
    pub fn start(
        mut locator: Locator<B>,
        renderer: R,
        mut settings: PollSettings,
    ) -> Result<Self, PollError> {
        settings.backoff_base = settings.backoff_base.max(MIN_BACKOFF);
        settings.backoff_max = settings.backoff_max.max(settings.backoff_base);
        let device = locator.locate().map_err(PollError::Startup)?;
        let backoff = Fibonacci::from_millis(millis(settings.backoff_base));

        Ok(Poller {
            locator,
            renderer,
            device: Some(device),
            state: ConnectionState::Normal,
            settings,
            io_errors: 0,
            backoff,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn has_device(&self) -> bool {
        self.device.is_some()
    }

    /// Performs one poll and returns how long to wait before the next.
    pub fn tick(&mut self) -> Result<Duration, PollError> {
        if self.state == ConnectionState::Disconnected || self.device.is_none() {
            self.recover();
        }

        let Some(device) = self.device.as_mut() else {
            self.renderer.render(UNKNOWN_LEVEL);
            return Ok(self.settings.interval);
        };

        match device.probe() {
            Ok(level) => {
                tracing::info!("Battery: {}%", level);
                self.state = ConnectionState::Normal;
                self.reset_backoff();
                self.renderer.render(level);
                Ok(self.settings.interval)
            }
            Err(ProbeError::NotConnected) => {
                if self.state == ConnectionState::Normal {
                    tracing::info!("Headset disconnected");
                }
                self.state = ConnectionState::Disconnected;
                self.reset_backoff();
                self.renderer.render(UNKNOWN_LEVEL);
                Ok(self.settings.interval)
            }
            Err(ProbeError::Io(e)) => match self.settings.on_io_error {
                IoErrorPolicy::Exit => {
                    tracing::error!("Battery read failed: {}", e);
                    self.close();
                    Err(PollError::Io(e))
                }
                IoErrorPolicy::Continue => {
                    self.io_errors += 1;
                    let wait = self
                        .backoff
                        .next()
                        .unwrap_or(self.settings.backoff_max)
                        .min(self.settings.backoff_max);
                    tracing::warn!(
                        "Battery read failed ({} in a row), retrying in {:?}: {}",
                        self.io_errors,
                        wait,
                        e
                    );
                    if self.io_errors >= self.settings.io_error_threshold {
                        tracing::warn!("Too many I/O errors, re-discovering the receiver");
                        self.close();
                        self.io_errors = 0;
                    }
                    self.renderer.render(UNKNOWN_LEVEL);
                    Ok(wait)
                }
            },
        }
    }

    /// Polls until `shutdown` receives a message or its sender is dropped.
    /// The first tick runs immediately. The handle is closed on return.
    pub fn run(mut self, shutdown: Receiver<()>) -> Result<(), PollError> {
        let mut wait = Duration::ZERO;
        loop {
            match shutdown.recv_timeout(wait) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
            wait = self.tick()?;
        }

        tracing::info!("Polling stopped");
        self.close();
        Ok(())
    }

    fn recover(&mut self) {
        tracing::info!("Reconnecting...");
        self.close();

        let attempts = self.settings.relocate_attempts.max(1) as usize;
        let delays = Fixed::from_millis(millis(self.settings.recovery_pause)).take(attempts - 1);
        let locator = &mut self.locator;
        let located = retry_with_index(delays, |attempt| match locator.locate() {
            Ok(device) => OperationResult::Ok(device),
            Err(e) => {
                tracing::debug!("Re-discovery attempt {} failed: {}", attempt, e);
                OperationResult::Retry(e)
            }
        });

        match located {
            Ok(device) => {
                self.device = Some(device);
                if !self.settings.recovery_pause.is_zero() {
                    thread::sleep(self.settings.recovery_pause);
                }
            }
            Err(e) => tracing::warn!("Receiver not found: {}", e.error),
        }
    }

    fn reset_backoff(&mut self) {
        self.io_errors = 0;
        self.backoff = Fibonacci::from_millis(millis(self.settings.backoff_base));
    }

    fn close(&mut self) {
        if let Some(device) = self.device.take() {
            device.close();
        }
    }
}
