//! Startup parameters and the fixed limits shared by every component.

use std::path::PathBuf;

/// Environment variable naming the feed pipe.
pub const FIFO_ENV_VAR: &str = "EWMHSTATUS_FIFO";

/// Written into any field whose source could not be read.
pub const MISSING_VALUE: &str = " ";

/// Hard upper bound, in bytes, on every piece of text taken in from the
/// X server or the feed pipe.
pub const MAX_TEXT_LEN: usize = 8192;

pub const DEFAULT_FONT_FAMILY: &str = "sans-serif";
pub const DEFAULT_FONT_SIZE: u16 = 11;
pub const DEFAULT_PADDING: u16 = 9;

/// Configuration for an [`EwmhStatus`](crate::EwmhStatus) instance.
///
/// # Examples
///
/// ```
/// use ewmhstatus::Config;
///
/// let config = Config {
///     font_family: "Ubuntu Mono".into(),
///     ..Config::default()
/// };
/// assert_eq!(config.font_size, 11);
/// assert_eq!(config.padding, 9);
/// assert!(config.fifo.is_none());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Font family used to measure every segment.
    pub font_family: String,
    /// Font size, in pixels.
    pub font_size: u16,
    /// Horizontal padding, in pixels, placed around each segment.
    pub padding: u16,
    /// Path of the feed pipe. `None` disables the feed input.
    pub fifo: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            font_family: DEFAULT_FONT_FAMILY.to_owned(),
            font_size: DEFAULT_FONT_SIZE,
            padding: DEFAULT_PADDING,
            fifo: None,
        }
    }
}
