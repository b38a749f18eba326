//! The latest known desktop, window and feed state.

use crate::protocol::{PropertySource, Window};
use crate::text::BoundedText;

/// Returns the `idx`th of `num_items` NUL-separated strings in `buf`.
///
/// An `idx` past the last item is clamped to the last item, which covers
/// `_NET_CURRENT_DESKTOP` briefly pointing past the end of
/// `_NET_DESKTOP_NAMES` while the window manager updates both. With at most
/// one item, the whole buffer is the value. The result never includes the
/// terminating NUL.
///
/// # Examples
///
/// ```
/// use ewmhstatus::properties::nth_string;
///
/// let names = b"1:web\02:code\03:chat\0";
/// assert_eq!(nth_string(names, 1, 3), b"2:code");
/// assert_eq!(nth_string(names, 7, 3), b"3:chat");
/// assert_eq!(nth_string(names, 2, 1), b"1:web");
/// ```
pub fn nth_string(buf: &[u8], idx: usize, num_items: usize) -> &[u8] {
    if num_items <= 1 {
        return until_nul(buf);
    }

    let last = num_items - 1;
    let mut pos = 0;
    let mut count = 0;
    while count < idx && count < last && pos < buf.len() {
        pos += until_nul(&buf[pos..]).len() + 1;
        count += 1;
    }

    until_nul(&buf[pos.min(buf.len())..])
}

fn until_nul(buf: &[u8]) -> &[u8] {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    &buf[..end]
}

/// Holds everything the status line is built from.
///
/// Every `refresh_*` method queries the [`PropertySource`] and never fails:
/// a failed query resets the affected field to its placeholder (or to
/// `None` for numeric fields) rather than leaving a stale value behind.
#[derive(Debug)]
pub struct PropertyStore {
    current_desktop: Option<u32>,
    desktop_count: Option<u32>,
    desktop_names: Vec<u8>,
    desktop_name: BoundedText,
    active_window: Option<Window>,
    window_title: BoundedText,
    feed: BoundedText,
}

impl Default for PropertyStore {
    fn default() -> Self {
        PropertyStore {
            current_desktop: None,
            desktop_count: None,
            desktop_names: Vec::new(),
            desktop_name: BoundedText::missing(),
            active_window: None,
            window_title: BoundedText::missing(),
            feed: BoundedText::missing(),
        }
    }
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_desktop(&self) -> Option<u32> {
        self.current_desktop
    }

    pub fn desktop_count(&self) -> Option<u32> {
        self.desktop_count
    }

    /// Name of the current desktop.
    pub fn desktop_name(&self) -> &BoundedText {
        &self.desktop_name
    }

    /// The window whose property changes we are subscribed to.
    pub fn active_window(&self) -> Option<Window> {
        self.active_window
    }

    pub fn window_title(&self) -> &BoundedText {
        &self.window_title
    }

    pub fn feed(&self) -> &BoundedText {
        &self.feed
    }

    pub fn refresh_desktop_count(&mut self, source: &dyn PropertySource) {
        self.desktop_count = source
            .number_of_desktops()
            .map_err(|err| log::debug!("Failed to read _NET_NUMBER_OF_DESKTOPS: {:#}", err))
            .ok();
    }

    pub fn refresh_current_desktop(&mut self, source: &dyn PropertySource) {
        self.current_desktop = source
            .current_desktop()
            .map_err(|err| log::debug!("Failed to read _NET_CURRENT_DESKTOP: {:#}", err))
            .ok();
    }

    /// Re-reads the desktop names and picks out the current desktop's.
    pub fn refresh_desktop_names(&mut self, source: &dyn PropertySource) {
        match source.desktop_names() {
            Ok(names) => {
                self.desktop_names = names;
                self.select_desktop_name();
            }
            Err(err) => {
                log::debug!("Failed to read _NET_DESKTOP_NAMES: {:#}", err);
                self.desktop_names.clear();
                self.desktop_name = BoundedText::missing();
            }
        }
    }

    fn select_desktop_name(&mut self) {
        self.desktop_name = match (self.current_desktop, self.desktop_count) {
            (Some(current), Some(count)) => {
                if current >= count {
                    log::debug!("Current desktop {} of {}: using last name", current, count);
                }
                let name = nth_string(&self.desktop_names, current as usize, count as usize);
                BoundedText::from_bytes(name)
            }
            _ => BoundedText::missing(),
        };
    }

    /// Re-reads the active window and its title.
    ///
    /// When the active window changed, the property change subscription is
    /// moved to it before its title is read.
    pub fn refresh_active_window_and_title(&mut self, source: &dyn PropertySource) {
        let window = match source.active_window() {
            Ok(window) if window == 0 || window == source.root() => None,
            Ok(window) => Some(window),
            Err(err) => {
                log::debug!("Failed to read _NET_ACTIVE_WINDOW: {:#}", err);
                self.window_title = BoundedText::missing();
                return;
            }
        };

        if window != self.active_window {
            self.move_subscription(source, window);
        }

        self.window_title = match window {
            Some(window) => read_title(source, window),
            None => BoundedText::missing(),
        };
    }

    fn move_subscription(&mut self, source: &dyn PropertySource, window: Option<Window>) {
        if let Some(old) = self.active_window.take() {
            // The old window may already be gone.
            if let Err(err) = source.unsubscribe(old) {
                log::debug!("Failed to unsubscribe from window {:#X}: {:#}", old, err);
            }
        }

        if let Some(new) = window {
            if let Err(err) = source.subscribe(new) {
                log::warn!(
                    "Could not capture property change events on window {:#X}: {:#}",
                    new,
                    err
                );
            }
        }

        self.active_window = window;
    }

    /// Drops the subscription on the active window, if any.
    pub fn release(&mut self, source: &dyn PropertySource) {
        self.move_subscription(source, None);
    }

    pub fn set_window_title(&mut self, title: BoundedText) {
        self.window_title = title;
    }

    pub fn set_feed(&mut self, feed: BoundedText) {
        self.feed = feed;
    }

    pub fn clear_feed(&mut self) {
        self.feed = BoundedText::missing();
    }
}

fn read_title(source: &dyn PropertySource, window: Window) -> BoundedText {
    let primary = source
        .window_name(window)
        .map_err(|err| log::debug!("Failed to read _NET_WM_NAME of {:#X}: {:#}", window, err))
        .ok()
        .flatten()
        .filter(|title| !until_nul(title).is_empty());

    let title = primary.or_else(|| {
        source
            .legacy_window_name(window)
            .map_err(|err| log::debug!("Failed to read WM_NAME of {:#X}: {:#}", window, err))
            .ok()
            .flatten()
            .filter(|title| !until_nul(title).is_empty())
    });

    match title {
        Some(title) => BoundedText::from_bytes(&title),
        None => BoundedText::missing(),
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use anyhow::{anyhow, Result};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::collections::HashMap;

    use crate::config::MISSING_VALUE;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub(crate) enum Call {
        ActiveWindow,
        Subscribe(Window),
        Unsubscribe(Window),
        Flush,
    }

    /// An in-memory window manager. `None` fields answer with an error.
    pub(crate) struct FakeSource {
        pub root: Window,
        pub width: u16,
        pub count: Option<u32>,
        pub current: Option<u32>,
        pub names: Option<Vec<u8>>,
        pub active: Option<Window>,
        pub titles: HashMap<Window, Vec<u8>>,
        pub legacy_titles: HashMap<Window, Vec<u8>>,
        pub refuse_subscription: Vec<Window>,
        pub calls: RefCell<Vec<Call>>,
    }

    impl FakeSource {
        pub(crate) fn new() -> FakeSource {
            FakeSource {
                root: 1,
                width: 1000,
                count: Some(3),
                current: Some(0),
                names: Some(names(&["1:web", "2:code", "3:chat"])),
                active: None,
                titles: HashMap::new(),
                legacy_titles: HashMap::new(),
                refuse_subscription: Vec::new(),
                calls: RefCell::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> Vec<Call> {
            self.calls.borrow_mut().drain(..).collect()
        }
    }

    /// Encodes names the way `_NET_DESKTOP_NAMES` stores them.
    pub(crate) fn names(names: &[&str]) -> Vec<u8> {
        let mut buf = Vec::new();
        for name in names {
            buf.extend_from_slice(name.as_bytes());
            buf.push(0);
        }
        buf
    }

    fn missing<T>(property: &str) -> Result<T> {
        Err(anyhow!("{} is not set", property))
    }

    impl PropertySource for FakeSource {
        fn root(&self) -> Window {
            self.root
        }

        fn screen_width(&self) -> u16 {
            self.width
        }

        fn number_of_desktops(&self) -> Result<u32> {
            self.count.map_or_else(|| missing("count"), Ok)
        }

        fn current_desktop(&self) -> Result<u32> {
            self.current.map_or_else(|| missing("current"), Ok)
        }

        fn desktop_names(&self) -> Result<Vec<u8>> {
            self.names.clone().map_or_else(|| missing("names"), Ok)
        }

        fn active_window(&self) -> Result<Window> {
            self.calls.borrow_mut().push(Call::ActiveWindow);
            self.active.map_or_else(|| missing("active"), Ok)
        }

        fn window_name(&self, window: Window) -> Result<Option<Vec<u8>>> {
            Ok(self.titles.get(&window).cloned())
        }

        fn legacy_window_name(&self, window: Window) -> Result<Option<Vec<u8>>> {
            Ok(self.legacy_titles.get(&window).cloned())
        }

        fn subscribe(&self, window: Window) -> Result<()> {
            self.calls.borrow_mut().push(Call::Subscribe(window));
            if self.refuse_subscription.contains(&window) {
                return Err(anyhow!("BadWindow"));
            }
            Ok(())
        }

        fn unsubscribe(&self, window: Window) -> Result<()> {
            self.calls.borrow_mut().push(Call::Unsubscribe(window));
            Ok(())
        }

        fn flush(&self) {
            self.calls.borrow_mut().push(Call::Flush);
        }
    }

    fn refreshed(source: &FakeSource) -> PropertyStore {
        let mut store = PropertyStore::new();
        store.refresh_desktop_count(source);
        store.refresh_current_desktop(source);
        store.refresh_desktop_names(source);
        store.refresh_active_window_and_title(source);
        store
    }

    #[test]
    fn nth_string_returns_each_item() {
        let buf = names(&["one", "two", "three"]);
        assert_eq!(nth_string(&buf, 0, 3), b"one");
        assert_eq!(nth_string(&buf, 1, 3), b"two");
        assert_eq!(nth_string(&buf, 2, 3), b"three");
    }

    #[test]
    fn nth_string_clamps_to_last_item() {
        let buf = names(&["one", "two", "three"]);
        assert_eq!(nth_string(&buf, 3, 3), b"three");
        assert_eq!(nth_string(&buf, 100, 3), b"three");
    }

    #[test]
    fn nth_string_single_item_is_whole_value() {
        let buf = names(&["one", "two"]);
        assert_eq!(nth_string(&buf, 0, 1), b"one");
        assert_eq!(nth_string(&buf, 5, 0), b"one");
        assert_eq!(nth_string(b"unterminated", 0, 1), b"unterminated");
    }

    #[test]
    fn nth_string_tolerates_short_buffers() {
        // Fewer names than desktops.
        let buf = names(&["one", "two"]);
        assert_eq!(nth_string(&buf, 3, 5), b"");
        assert_eq!(nth_string(b"one\0two", 1, 2), b"two");
        assert_eq!(nth_string(b"one", 2, 4), b"");
        assert_eq!(nth_string(b"", 2, 4), b"");
    }

    #[test]
    fn picks_current_desktop_name() {
        let mut source = FakeSource::new();
        source.current = Some(1);
        let store = refreshed(&source);
        assert_eq!(store.desktop_count(), Some(3));
        assert_eq!(store.current_desktop(), Some(1));
        assert_eq!(store.desktop_name().as_str(), "2:code");
    }

    #[test]
    fn shrinking_desktop_count_clamps_to_remaining_name() {
        let mut source = FakeSource::new();
        source.current = Some(2);
        let mut store = refreshed(&source);
        assert_eq!(store.desktop_name().as_str(), "3:chat");

        // The count drops before the current desktop is updated.
        source.count = Some(1);
        source.names = Some(names(&["1:web"]));
        store.refresh_desktop_count(&source);
        store.refresh_desktop_names(&source);
        assert_eq!(store.current_desktop(), Some(2));
        assert_eq!(store.desktop_name().as_str(), "1:web");
    }

    #[test]
    fn failed_queries_fall_back_to_placeholder() {
        let mut source = FakeSource::new();
        let mut store = refreshed(&source);
        assert_eq!(store.desktop_name().as_str(), "1:web");

        source.names = None;
        store.refresh_desktop_names(&source);
        assert_eq!(store.desktop_name().as_str(), MISSING_VALUE);

        source.names = Some(names(&["1:web"]));
        source.current = None;
        store.refresh_current_desktop(&source);
        store.refresh_desktop_names(&source);
        assert_eq!(store.current_desktop(), None);
        assert_eq!(store.desktop_name().as_str(), MISSING_VALUE);
    }

    #[test]
    fn starts_out_with_placeholders() {
        let store = PropertyStore::new();
        assert_eq!(store.desktop_name().as_str(), MISSING_VALUE);
        assert_eq!(store.window_title().as_str(), MISSING_VALUE);
        assert_eq!(store.feed().as_str(), MISSING_VALUE);
        assert_eq!(store.active_window(), None);
    }

    #[test]
    fn moves_subscription_with_active_window() {
        let mut source = FakeSource::new();
        source.active = Some(0x10);
        source.titles.insert(0x10, "vim".into());
        source.titles.insert(0x20, "Firefox".into());

        let mut store = refreshed(&source);
        assert_eq!(store.active_window(), Some(0x10));
        assert_eq!(store.window_title().as_str(), "vim");
        assert_eq!(source.calls(), vec![Call::ActiveWindow, Call::Subscribe(0x10)]);

        // Same window again: the subscription stays put.
        store.refresh_active_window_and_title(&source);
        assert_eq!(source.calls(), vec![Call::ActiveWindow]);

        source.active = Some(0x20);
        store.refresh_active_window_and_title(&source);
        assert_eq!(store.active_window(), Some(0x20));
        assert_eq!(store.window_title().as_str(), "Firefox");
        assert_eq!(
            source.calls(),
            vec![
                Call::ActiveWindow,
                Call::Unsubscribe(0x10),
                Call::Subscribe(0x20)
            ]
        );
    }

    #[test]
    fn subscription_failure_is_not_fatal() {
        let mut source = FakeSource::new();
        source.active = Some(0x10);
        source.titles.insert(0x10, "vim".into());
        source.refuse_subscription.push(0x10);

        let store = refreshed(&source);
        assert_eq!(store.active_window(), Some(0x10));
        assert_eq!(store.window_title().as_str(), "vim");
    }

    #[test]
    fn title_falls_back_to_legacy_name() {
        let mut source = FakeSource::new();
        source.active = Some(0x10);
        source.legacy_titles.insert(0x10, "xterm".into());
        let mut store = refreshed(&source);
        assert_eq!(store.window_title().as_str(), "xterm");

        source.titles.insert(0x10, Vec::new());
        store.refresh_active_window_and_title(&source);
        assert_eq!(store.window_title().as_str(), "xterm");

        source.titles.insert(0x10, "vim".into());
        store.refresh_active_window_and_title(&source);
        assert_eq!(store.window_title().as_str(), "vim");

        source.titles.clear();
        source.legacy_titles.clear();
        store.refresh_active_window_and_title(&source);
        assert_eq!(store.window_title().as_str(), MISSING_VALUE);
    }

    #[test]
    fn title_bytes_are_decoded_lossily() {
        let mut source = FakeSource::new();
        source.active = Some(0x10);
        source.legacy_titles.insert(0x10, b"caf\xe9 menu".to_vec());
        let mut store = refreshed(&source);
        assert_eq!(store.window_title().as_str(), "caf\u{fffd} menu");

        source.titles.insert(0x10, b"vim\0garbage".to_vec());
        store.refresh_active_window_and_title(&source);
        assert_eq!(store.window_title().as_str(), "vim");
    }

    #[test]
    fn no_active_window_drops_subscription() {
        let mut source = FakeSource::new();
        source.active = Some(0x10);
        source.titles.insert(0x10, "vim".into());
        let mut store = refreshed(&source);
        source.calls();

        source.active = Some(0);
        store.refresh_active_window_and_title(&source);
        assert_eq!(store.active_window(), None);
        assert_eq!(store.window_title().as_str(), MISSING_VALUE);
        assert_eq!(source.calls(), vec![Call::ActiveWindow, Call::Unsubscribe(0x10)]);
    }

    #[test]
    fn root_is_never_treated_as_active_window() {
        let mut source = FakeSource::new();
        source.active = Some(source.root);
        let store = refreshed(&source);
        assert_eq!(store.active_window(), None);
        assert_eq!(source.calls(), vec![Call::ActiveWindow]);
    }

    #[test]
    fn active_window_failure_keeps_subscription() {
        let mut source = FakeSource::new();
        source.active = Some(0x10);
        source.titles.insert(0x10, "vim".into());
        let mut store = refreshed(&source);

        source.active = None;
        store.refresh_active_window_and_title(&source);
        assert_eq!(store.active_window(), Some(0x10));
        assert_eq!(store.window_title().as_str(), MISSING_VALUE);
    }
}
