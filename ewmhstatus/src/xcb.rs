use anyhow::{anyhow, Context as _AnyhowContext, Result};
use std::os::unix::io::AsRawFd;
use std::os::unix::io::RawFd;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use tokio::io::unix::AsyncFd;
use tokio_stream::Stream;
use xcb::xproto::{PropertyNotifyEvent, PROPERTY_NOTIFY};
use xcb_util::ewmh;

use crate::protocol::{Notification, Property, PropertySource, Window};

fn x_error(err: xcb::GenericError) -> anyhow::Error {
    // xcb-util replies with a null error when the property is not set.
    if err.ptr.is_null() {
        anyhow!("Property is not set")
    } else {
        anyhow!("X error {}", err.error_code())
    }
}

/// Re-encodes a `STRING` (ISO 8859-1) property value as UTF-8. Other
/// encodings are passed through and decoded lossily later.
fn text_property(type_: xcb::Atom, value: &[u8]) -> Vec<u8> {
    if type_ == xcb::ATOM_STRING {
        value.iter().map(|&b| b as char).collect::<String>().into_bytes()
    } else {
        value.to_vec()
    }
}

/// An EWMH connection to the X server, answering property queries for one
/// screen.
pub struct XcbProperties {
    conn: ewmh::Connection,
    screen_idx: i32,
    root: Window,
    width: u16,
    utf8_string: xcb::Atom,
}

impl XcbProperties {
    pub fn connect() -> Result<XcbProperties> {
        let (xcb_conn, screen_idx) =
            xcb::Connection::connect(None).context("Failed to connect to X server")?;
        let (root, width) = {
            let screen = xcb_conn
                .get_setup()
                .roots()
                .nth(screen_idx as usize)
                .ok_or_else(|| anyhow!("Invalid screen"))?;
            (screen.root(), screen.width_in_pixels())
        };
        let conn = ewmh::Connection::connect(xcb_conn)
            .map_err(|(e, _)| x_error(e))
            .context("Failed to wrap xcb::Connection in ewmh::Connection")?;
        let utf8_string = xcb::intern_atom(&conn, false, "UTF8_STRING")
            .get_reply()
            .map_err(x_error)
            .context("Failed to intern UTF8_STRING")?
            .atom();

        Ok(XcbProperties {
            conn,
            screen_idx,
            root,
            width,
            utf8_string,
        })
    }

    /// Reads a whole property, returning its type and raw value, or `None`
    /// if `window` does not have it.
    fn get_property(
        &self,
        window: Window,
        property: xcb::Atom,
        type_: xcb::Atom,
    ) -> Result<Option<(xcb::Atom, Vec<u8>)>> {
        let cookie = xcb::get_property(&self.conn, false, window, property, type_, 0, u32::MAX);
        let reply = match cookie.get_reply() {
            Ok(reply) => reply,
            Err(err) if err.ptr.is_null() => return Ok(None),
            Err(err) => return Err(x_error(err)),
        };
        if reply.type_() == xcb::ATOM_NONE {
            return Ok(None);
        }
        Ok(Some((reply.type_(), reply.value::<u8>().to_vec())))
    }

    /// Registers for `PROPERTY_CHANGE` notifications on the root window,
    /// which is where the window manager publishes desktop state and the
    /// active window.
    pub fn register_root(&self) -> Result<()> {
        self.subscribe(self.root)
            .context("Failed to register for property changes on the root window")
    }

    fn decode(&self, event: &xcb::GenericEvent) -> Option<Notification> {
        if event.response_type() & !0x80 != PROPERTY_NOTIFY {
            return None;
        }
        let event: &PropertyNotifyEvent = unsafe { xcb::cast_event(event) };

        let atom = event.atom();
        let property = if atom == self.conn.DESKTOP_NAMES() {
            Property::DesktopNames
        } else if atom == self.conn.ACTIVE_WINDOW() {
            Property::ActiveWindow
        } else if atom == self.conn.WM_NAME() {
            Property::WindowName
        } else if atom == xcb::ATOM_WM_NAME {
            Property::LegacyWindowName
        } else if atom == self.conn.NUMBER_OF_DESKTOPS() {
            Property::NumberOfDesktops
        } else if atom == self.conn.CURRENT_DESKTOP() {
            Property::CurrentDesktop
        } else {
            Property::Other
        };

        Some(Notification {
            window: event.window(),
            property,
        })
    }

    // Everything already queued on the connection, including events read
    // while waiting for replies.
    fn drain(&self) -> Vec<Notification> {
        let mut batch = Vec::new();
        while let Some(event) = self.conn.poll_for_event() {
            if let Some(notification) = self.decode(&event) {
                batch.push(notification);
            }
        }
        batch
    }
}

impl PropertySource for XcbProperties {
    fn root(&self) -> Window {
        self.root
    }

    fn screen_width(&self) -> u16 {
        self.width
    }

    fn number_of_desktops(&self) -> Result<u32> {
        ewmh::get_number_of_desktops(&self.conn, self.screen_idx)
            .get_reply()
            .map_err(x_error)
    }

    fn current_desktop(&self) -> Result<u32> {
        ewmh::get_current_desktop(&self.conn, self.screen_idx)
            .get_reply()
            .map_err(x_error)
    }

    fn desktop_names(&self) -> Result<Vec<u8>> {
        self.get_property(self.root, self.conn.DESKTOP_NAMES(), self.utf8_string)?
            .map(|(_, value)| value)
            .ok_or_else(|| anyhow!("_NET_DESKTOP_NAMES is not set"))
    }

    fn active_window(&self) -> Result<Window> {
        ewmh::get_active_window(&self.conn, self.screen_idx)
            .get_reply()
            .map_err(x_error)
    }

    fn window_name(&self, window: Window) -> Result<Option<Vec<u8>>> {
        let name = self.get_property(window, self.conn.WM_NAME(), self.utf8_string)?;
        Ok(name.map(|(_, value)| value))
    }

    fn legacy_window_name(&self, window: Window) -> Result<Option<Vec<u8>>> {
        let name = self.get_property(window, xcb::ATOM_WM_NAME, xcb::ATOM_ANY)?;
        Ok(name.map(|(type_, value)| text_property(type_, &value)))
    }

    fn subscribe(&self, window: Window) -> Result<()> {
        let attributes = [(xcb::CW_EVENT_MASK, xcb::EVENT_MASK_PROPERTY_CHANGE)];
        xcb::change_window_attributes_checked(&self.conn, window, &attributes)
            .request_check()
            .map_err(x_error)
    }

    fn unsubscribe(&self, window: Window) -> Result<()> {
        // Unchecked: an error here only means the window is already gone.
        let attributes = [(xcb::CW_EVENT_MASK, xcb::EVENT_MASK_NO_EVENT)];
        xcb::change_window_attributes(&self.conn, window, &attributes);
        Ok(())
    }

    fn flush(&self) {
        self.conn.flush();
    }
}

// Lets tokio watch the X connection's socket.
struct XcbEvented(Rc<XcbProperties>);

impl AsRawFd for XcbEvented {
    fn as_raw_fd(&self) -> RawFd {
        let conn: &xcb::Connection = &self.0.conn;
        conn.as_raw_fd()
    }
}

/// A `Stream` of the property change notifications arriving on an
/// [`XcbProperties`] connection.
///
/// Each item is every notification queued at the time the connection
/// became readable, in delivery order.
pub struct XcbEventStream {
    conn: Rc<XcbProperties>,
    poll: AsyncFd<XcbEvented>,
}

impl XcbEventStream {
    pub fn new(conn: Rc<XcbProperties>) -> Result<XcbEventStream> {
        let evented = XcbEvented(conn.clone());
        let poll = AsyncFd::with_interest(evented, tokio::io::Interest::READABLE)?;

        Ok(XcbEventStream { conn, poll })
    }
}

impl Stream for XcbEventStream {
    type Item = Vec<Notification>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        let self_ = &mut *self;
        loop {
            let batch = self_.conn.drain();
            if !batch.is_empty() {
                return Poll::Ready(Some(batch));
            }

            if let Err(err) = self_.conn.conn.has_error() {
                log::error!("Lost connection to the X server: {:?}", err);
                return Poll::Ready(None);
            }

            match self_.poll.poll_read_ready(cx) {
                Poll::Ready(Ok(mut ready)) => ready.clear_ready(),
                Poll::Ready(Err(e)) => {
                    log::error!("Error polling xcb::Connection: {}", e);
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
