use std::path::{Path, PathBuf};

use anyhow::Context;
use crossbeam_channel::Sender;
use tray_icon::menu::{Menu, MenuEvent, MenuItem};
use tray_icon::{Icon, TrayIcon, TrayIconBuilder};

use crate::UNKNOWN_LEVEL;

/// Shows a battery percentage, `0` meaning unknown or disconnected.
///
/// Implementations must not fail the caller: a broken icon update is logged
/// and dropped.
pub trait Renderer {
    fn render(&mut self, percentage: u8);
}

/// Messages from the polling thread to the tray thread.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UiEvent {
    Render(u8),
    Fatal(String),
}

/// Forwards renders to the thread that owns the tray icon.
pub struct ChannelRenderer {
    tx: Sender<UiEvent>,
}

impl ChannelRenderer {
    pub fn new(tx: Sender<UiEvent>) -> Self {
        ChannelRenderer { tx }
    }
}

impl Renderer for ChannelRenderer {
    fn render(&mut self, percentage: u8) {
        if let Err(e) = self.tx.send(UiEvent::Render(percentage)) {
            tracing::warn!("Tray is gone, dropping update: {}", e);
        }
    }
}

/// Pre-rendered icons, one `<percentage>.ico` per level.
pub struct IconStore {
    dir: PathBuf,
}

impl IconStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        IconStore { dir: dir.into() }
    }

    pub fn path_for(&self, percentage: u8) -> PathBuf {
        self.dir.join(format!("{}.ico", percentage))
    }

    /// Decodes the icon for `percentage` into RGBA pixels.
    pub fn load_rgba(&self, percentage: u8) -> anyhow::Result<(Vec<u8>, u32, u32)> {
        let path = self.path_for(percentage);
        let image = image::open(&path)
            .with_context(|| format!("Failed to load icon {}", path.display()))?
            .into_rgba8();
        let (width, height) = image.dimensions();
        Ok((image.into_raw(), width, height))
    }

    pub fn load(&self, percentage: u8) -> anyhow::Result<Icon> {
        let (rgba, width, height) = self.load_rgba(percentage)?;
        Ok(Icon::from_rgba(rgba, width, height)?)
    }
}

pub fn tooltip(percentage: u8) -> String {
    if percentage == UNKNOWN_LEVEL {
        "Headset disconnected".to_string()
    } else {
        format!("Headset battery: {}%", percentage)
    }
}

/// Remembers which level is on screen so repeated updates are skipped.
#[derive(Debug, Default)]
pub struct ShownLevel {
    last: Option<u8>,
}

impl ShownLevel {
    pub fn last(&self) -> Option<u8> {
        self.last
    }

    /// Runs `push` unless `percentage` is already showing. A failed push is
    /// logged and not recorded, so the next update for that level retries.
    pub fn update<F>(&mut self, percentage: u8, push: F)
    where
        F: FnOnce(u8) -> anyhow::Result<()>,
    {
        if self.last == Some(percentage) {
            return;
        }
        match push(percentage) {
            Ok(()) => self.last = Some(percentage),
            Err(e) => tracing::warn!("{:#}", e),
        }
    }
}

/// The tray icon and its "Quit" menu. Lives on the main thread.
pub struct TrayHost {
    tray: TrayIcon,
    quit: MenuItem,
    icons: IconStore,
    shown: ShownLevel,
}

impl TrayHost {
    pub fn new(icons: IconStore) -> anyhow::Result<Self> {
        platform::init()?;

        let quit = MenuItem::new("Quit", true, None);
        let menu = Menu::new();
        menu.append(&quit)?;

        let mut builder = TrayIconBuilder::new()
            .with_menu(Box::new(menu))
            .with_tooltip(tooltip(UNKNOWN_LEVEL));
        match icons.load(UNKNOWN_LEVEL) {
            Ok(icon) => builder = builder.with_icon(icon),
            Err(e) => tracing::warn!("{:#}", e),
        }

        Ok(TrayHost {
            tray: builder.build()?,
            quit,
            icons,
            shown: ShownLevel::default(),
        })
    }

    pub fn show(&mut self, percentage: u8) {
        let TrayHost {
            tray, icons, shown, ..
        } = self;
        shown.update(percentage, |percentage| {
            let icon = icons.load(percentage)?;
            tray.set_icon(Some(icon)).context("Failed to set tray icon")?;
            if let Err(e) = tray.set_tooltip(Some(tooltip(percentage))) {
                tracing::debug!("Failed to set tooltip: {}", e);
            }
            Ok(())
        });
    }

    /// Dispatches pending OS events; returns `true` once Quit was clicked.
    pub fn quit_requested(&self) -> bool {
        platform::pump();
        let mut quit = false;
        while let Ok(event) = MenuEvent::receiver().try_recv() {
            if event.id == *self.quit.id() {
                quit = true;
            }
        }
        quit
    }
}

#[cfg(windows)]
mod platform {
    use windows_sys::Win32::UI::WindowsAndMessaging::{
        DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE,
    };

    pub fn init() -> anyhow::Result<()> {
        Ok(())
    }

    pub fn pump() {
        // SAFETY: MSG is plain data and the pointers passed are valid for
        // the duration of each call.
        unsafe {
            let mut msg: MSG = std::mem::zeroed();
            while PeekMessageW(&mut msg, std::ptr::null_mut(), 0, 0, PM_REMOVE) != 0 {
                TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
    }
}

#[cfg(target_os = "linux")]
mod platform {
    pub fn init() -> anyhow::Result<()> {
        gtk::init()?;
        Ok(())
    }

    pub fn pump() {
        while gtk::events_pending() {
            gtk::main_iteration_do(false);
        }
    }
}

// Other platforms need their native run loop on the main thread, which this
// process does not drive. Refusing here sends `main` down the no-tray path.
#[cfg(not(any(windows, target_os = "linux")))]
mod platform {
    pub fn init() -> anyhow::Result<()> {
        anyhow::bail!("system tray is not supported on this platform")
    }

    pub fn pump() {}
}
