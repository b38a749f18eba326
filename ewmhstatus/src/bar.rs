use std::fmt;
use std::io::{self, Write};

use crate::properties::PropertyStore;
use crate::text::{truncate, BoundedText, Measure};

/// Absolute x offsets, in pixels, of the three segments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Positions {
    pub left: i32,
    pub center: i32,
    pub right: i32,
}

/// A laid out status line.
///
/// Displays as three `^pa(x)text` pairs in the order center, right, left,
/// which is the order the bar process expects them in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Line {
    pub positions: Positions,
    pub left: BoundedText,
    pub center: BoundedText,
    pub right: BoundedText,
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "^pa({}){}^pa({}){}^pa({}){}",
            self.positions.center,
            self.center,
            self.positions.right,
            self.right,
            self.positions.left,
            self.left,
        )
    }
}

/// Lays out `left`, `center` and `right` across `screen_width` pixels.
///
/// The center segment gets whatever the other two and four paddings leave
/// over. It is truncated if it does not fit, then centred within that space
/// (rounding towards the left).
pub fn compose<M>(
    measure: &M,
    left: &BoundedText,
    center: &BoundedText,
    right: &BoundedText,
    screen_width: i32,
    padding: i32,
) -> Line
where
    M: Measure + ?Sized,
{
    let left_width = measure.text_width(left);
    let right_width = measure.text_width(right);
    let mut center_width = measure.text_width(center);
    let available_center = screen_width - (left_width + right_width + 4 * padding);

    let center = if center_width > available_center {
        let truncated = truncate(center, available_center, measure);
        center_width = measure.text_width(&truncated);
        truncated
    } else {
        center.clone()
    };

    let positions = Positions {
        left: padding,
        center: left_width + 2 * padding + (available_center - center_width) / 2,
        right: screen_width - padding - right_width,
    };

    Line {
        positions,
        left: left.clone(),
        center,
        right: right.clone(),
    }
}

/// Turns the [`PropertyStore`] into status lines for a screen of a fixed
/// width.
pub struct Bar<M> {
    measure: M,
    screen_width: i32,
    padding: i32,
}

impl<M: Measure> Bar<M> {
    pub fn new(measure: M, screen_width: u16, padding: u16) -> Bar<M> {
        Bar {
            measure,
            screen_width: i32::from(screen_width),
            padding: i32::from(padding),
        }
    }

    /// Lays out the current state.
    ///
    /// A truncated window title is written back into `store`, and stays
    /// truncated until the title is next refreshed.
    pub fn compose(&self, store: &mut PropertyStore) -> Line {
        let line = compose(
            &self.measure,
            store.desktop_name(),
            store.window_title(),
            store.feed(),
            self.screen_width,
            self.padding,
        );
        if &line.center != store.window_title() {
            store.set_window_title(line.center.clone());
        }
        line
    }

    /// Writes the current state to `out` as a single line and flushes it.
    pub fn render<W: Write>(&self, store: &mut PropertyStore, out: &mut W) -> io::Result<()> {
        let line = self.compose(store);
        writeln!(out, "{}", line)?;
        out.flush()
    }
}
