//! The queries ewmhstatus needs from the window manager, independent of how
//! they reach the X server.

use anyhow::Result;

/// An X window id. `0` is `XCB_NONE`.
pub type Window = u32;

/// The properties whose changes ewmhstatus reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Property {
    /// `_NET_DESKTOP_NAMES`
    DesktopNames,
    /// `_NET_ACTIVE_WINDOW`
    ActiveWindow,
    /// `_NET_WM_NAME`
    WindowName,
    /// `WM_NAME`
    LegacyWindowName,
    /// `_NET_NUMBER_OF_DESKTOPS`
    NumberOfDesktops,
    /// `_NET_CURRENT_DESKTOP`
    CurrentDesktop,
    Other,
}

/// A `PropertyNotify` event: `property` changed on `window`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Notification {
    pub window: Window,
    pub property: Property,
}

/// Synchronous property queries and event subscriptions.
///
/// Every query is a blocking round-trip. The window name queries return the
/// raw property value, which is not guaranteed to be valid UTF-8, or
/// `Ok(None)` if the window has no such property.
pub trait PropertySource {
    fn root(&self) -> Window;
    fn screen_width(&self) -> u16;

    fn number_of_desktops(&self) -> Result<u32>;
    fn current_desktop(&self) -> Result<u32>;
    /// The raw `_NET_DESKTOP_NAMES` value: names separated by NUL bytes.
    fn desktop_names(&self) -> Result<Vec<u8>>;
    fn active_window(&self) -> Result<Window>;
    fn window_name(&self, window: Window) -> Result<Option<Vec<u8>>>;
    fn legacy_window_name(&self, window: Window) -> Result<Option<Vec<u8>>>;

    /// Registers for `PropertyNotify` events on `window`, waiting for the
    /// server to acknowledge.
    fn subscribe(&self, window: Window) -> Result<()>;
    fn unsubscribe(&self, window: Window) -> Result<()>;
    fn flush(&self);
}
