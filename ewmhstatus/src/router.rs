//! Maps property change notifications onto [`PropertyStore`] refreshes.

use crate::properties::PropertyStore;
use crate::protocol::{Notification, Property, PropertySource};

/// Applies `notification` to `store`, returning whether the visible line
/// may have changed.
///
/// Title changes are only trusted from the window we currently track as
/// active: a notification from a previously active window can still arrive
/// after the subscription has moved, and is dropped.
pub fn route(
    store: &mut PropertyStore,
    source: &dyn PropertySource,
    notification: Notification,
) -> bool {
    match notification.property {
        Property::DesktopNames => {
            store.refresh_desktop_names(source);
            true
        }
        Property::ActiveWindow => {
            store.refresh_active_window_and_title(source);
            true
        }
        Property::WindowName | Property::LegacyWindowName => {
            if notification.window == source.root() {
                return false;
            }
            if Some(notification.window) != store.active_window() {
                log::debug!(
                    "Ignoring title change on inactive window {:#X}",
                    notification.window
                );
                return false;
            }
            store.refresh_active_window_and_title(source);
            true
        }
        // Only the current desktop's name is shown, so a new count alone
        // changes nothing visible.
        Property::NumberOfDesktops => {
            store.refresh_desktop_count(source);
            false
        }
        Property::CurrentDesktop => {
            store.refresh_current_desktop(source);
            store.refresh_desktop_names(source);
            true
        }
        Property::Other => false,
    }
}
