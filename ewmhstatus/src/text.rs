//! Text measurement, bounded text ingestion and width-driven truncation.

use std::fmt;
use std::ops::Deref;

use anyhow::{Context as _AnyhowContext, Result};
use cairo::{Context, Format, ImageSurface};
use pango::FontDescription;
use thiserror::Error;

use crate::config::{MAX_TEXT_LEN, MISSING_VALUE};

#[derive(Clone, PartialEq, Eq)]
pub struct Font(FontDescription);

impl Font {
    /// Creates a font of the given family, sized in pixels.
    pub fn new(family: &str, size: u16) -> Font {
        let mut description = FontDescription::new();
        description.set_family(family);
        description.set_absolute_size(f64::from(size) * f64::from(pango::SCALE));
        Font(description)
    }
}

impl fmt::Debug for Font {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Anything able to tell how many pixels a string advances when drawn.
pub trait Measure {
    fn text_width(&self, text: &str) -> i32;
}

fn create_pango_layout(cairo_context: &Context) -> pango::Layout {
    pangocairo::functions::create_layout(cairo_context)
}

/// Measures text with Pango, laid out on a throwaway 1x1 Cairo surface.
pub struct PangoMeasurer {
    layout: pango::Layout,
}

impl PangoMeasurer {
    pub fn new(font: Font) -> Result<PangoMeasurer> {
        let surface = ImageSurface::create(Format::Rgb24, 1, 1)
            .context("Failed to create Cairo surface for text measurement")?;
        let context = Context::new(&surface).context("Failed to create Cairo context")?;
        let layout = create_pango_layout(&context);
        layout.set_font_description(Some(&font.0));
        log::debug!("Measuring text with font {:?}", font);
        Ok(PangoMeasurer { layout })
    }
}

impl Measure for PangoMeasurer {
    fn text_width(&self, text: &str) -> i32 {
        self.layout.set_text(text);
        let (width, _height) = self.layout.pixel_size();
        width
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum IngestError {
    /// The input was longer than [`MAX_TEXT_LEN`]. `truncated` holds the
    /// longest valid prefix that fits.
    #[error("text of {len} bytes exceeds the {max} byte limit")]
    TooLong {
        len: usize,
        max: usize,
        truncated: BoundedText,
    },
}

/// A string that never holds more than [`MAX_TEXT_LEN`] bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BoundedText(String);

impl BoundedText {
    /// The placeholder shown for fields whose source failed.
    pub fn missing() -> BoundedText {
        BoundedText(MISSING_VALUE.to_owned())
    }

    /// Takes in `text`, failing if it does not fit within the bound.
    pub fn ingest(text: &str) -> Result<BoundedText, IngestError> {
        if text.len() <= MAX_TEXT_LEN {
            return Ok(BoundedText(text.to_owned()));
        }

        let mut end = MAX_TEXT_LEN;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        Err(IngestError::TooLong {
            len: text.len(),
            max: MAX_TEXT_LEN,
            truncated: BoundedText(text[..end].to_owned()),
        })
    }

    /// Like [`BoundedText::ingest`], but keeps the truncated prefix of an
    /// overlong input and logs a warning.
    pub fn ingest_lossy(text: &str) -> BoundedText {
        match BoundedText::ingest(text) {
            Ok(bounded) => bounded,
            Err(err) => {
                log::warn!("Truncating input: {}", err);
                let IngestError::TooLong { truncated, .. } = err;
                truncated
            }
        }
    }

    /// Decodes raw bytes (invalid UTF-8 is replaced) up to the first NUL.
    pub fn from_bytes(bytes: &[u8]) -> BoundedText {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        BoundedText::ingest_lossy(&String::from_utf8_lossy(&bytes[..end]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for BoundedText {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BoundedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns the longest prefix of `text` that `measure` reports as narrower
/// than `available` pixels, or `text` itself if it already fits.
///
/// The cut is found by binary search over the character indices
/// `[0, chars - 1]`, moving towards keeping more text whenever the probed
/// prefix still fits. Strings of fewer than two characters collapse to the
/// empty string.
pub fn truncate<M>(text: &BoundedText, available: i32, measure: &M) -> BoundedText
where
    M: Measure + ?Sized,
{
    if measure.text_width(text) <= available {
        return text.clone();
    }

    // Byte offset at which each character starts.
    let starts: Vec<usize> = text.char_indices().map(|(idx, _)| idx).collect();
    if starts.is_empty() {
        return text.clone();
    }

    let mut lower = 0;
    let mut upper = starts.len() - 1;
    while upper - lower >= 2 {
        let middle = (lower + upper) / 2;
        if measure.text_width(&text[..starts[middle]]) < available {
            lower = middle;
        } else {
            upper = middle;
        }
    }

    BoundedText(text[..starts[lower]].to_owned())
}
