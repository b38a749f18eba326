//! A status line generator for dzen2-style bars on EWMH window managers.
//!
//! ewmhstatus watches the window manager through the [`EWMH`] properties it
//! publishes on the root window, and a named pipe that any program can write
//! to. Every time something visible changes it prints one line to standard
//! output, made of three positioned segments:
//!
//! - **left**: the name of the current desktop (`_NET_DESKTOP_NAMES` at
//!   `_NET_CURRENT_DESKTOP`).
//! - **center**: the title (`_NET_WM_NAME`, or `WM_NAME` as a fallback) of
//!   the active window (`_NET_ACTIVE_WINDOW`), truncated to fit.
//! - **right**: the last line written to the feed pipe.
//!
//! Each segment is preceded by a `^pa(x)` directive giving its absolute
//! pixel offset, so the output can be piped straight into `dzen2`:
//!
//! ```text
//! ^pa(250)vim - notes.md^pa(951)12:30^pa(9)1:web
//! ```
//!
//! It does not poll: it sleeps until the X server sends a `PropertyNotify`
//! event, the pipe becomes readable, or it receives `SIGINT`, `SIGTERM` or
//! `SIGHUP` (which make it exit cleanly).
//!
//! # How to use
//!
//! The `ewmhstatus-bin` binary takes an optional font family, font size and
//! padding, and reads the path of the feed pipe from the `EWMHSTATUS_FIFO`
//! environment variable:
//!
//! ```sh
//! mkfifo /tmp/status
//! EWMHSTATUS_FIFO=/tmp/status ewmhstatus-bin "DejaVu Sans" 12 9 | dzen2 &
//! while sleep 60; do date +%H:%M > /tmp/status; done
//! ```
//!
//! The same thing from Rust:
//!
//! ```no_run
//! use ewmhstatus::{Config, EwmhStatus};
//! use anyhow::Result;
//!
//! fn main() -> Result<()> {
//!     let config = Config {
//!         fifo: Some("/tmp/status".into()),
//!         ..Config::default()
//!     };
//!     EwmhStatus::new(config).run()
//! }
//! ```
//!
//! # Dependencies
//!
//! In addition to the Rust dependencies in `Cargo.toml`, ewmhstatus links
//! against these system libraries:
//!
//!  - `xcb-util`: `xcb-ewmh` / `xcb-icccm`
//!  - `pango`
//!  - `cairo`
//!  - `pangocairo`
//!
//! [`EWMH`]: https://specifications.freedesktop.org/wm-spec/wm-spec-latest.html

pub mod bar;
pub mod config;
mod fifo;
pub mod properties;
pub mod protocol;
pub mod router;
pub mod text;
mod xcb;

use std::future;
use std::io::{self, Write};
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use tokio::runtime::Builder;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task;
use tokio_stream::StreamExt;

use crate::bar::Bar;
use crate::fifo::{feed_text, FeedPipe};
use crate::properties::PropertyStore;
use crate::protocol::{Notification, PropertySource};
use crate::text::{Font, Measure, PangoMeasurer};
use crate::xcb::{XcbEventStream, XcbProperties};

pub use crate::config::Config;

/// The main object: owns the configuration until [`run()`] is called.
///
/// [`run()`]: #method.run
pub struct EwmhStatus {
    config: Config,
}

impl EwmhStatus {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Runs until a termination signal arrives, standard output is closed
    /// or the X connection is lost.
    ///
    /// Fails only if the X server cannot be reached at startup or the
    /// connection is lost later.
    pub fn run(self) -> Result<()> {
        // Everything happens on this thread: X queries are blocking
        // round-trips made between waits.
        let rt = Builder::new_current_thread().enable_all().build()?;
        let local = task::LocalSet::new();
        local.block_on(&rt, self.run_inner())
    }

    async fn run_inner(self) -> Result<()> {
        let props = Rc::new(XcbProperties::connect()?);
        props.register_root()?;

        let font = Font::new(&self.config.font_family, self.config.font_size);
        let measure = PangoMeasurer::new(font)?;
        let bar = Bar::new(measure, props.screen_width(), self.config.padding);

        let pipe = match &self.config.fifo {
            Some(path) => match FeedPipe::open(path) {
                Ok(pipe) => {
                    log::info!("Reading feed from {}", pipe.path().display());
                    Some(pipe)
                }
                Err(err) => {
                    log::error!("{:#}", err);
                    None
                }
            },
            None => None,
        };

        let mut events = XcbEventStream::new(props.clone())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sighup = signal(SignalKind::hangup())?;

        let stdout = io::stdout();
        let mut out = stdout.lock();

        let mut status = Status::start(bar, &*props);
        let mut running = keep_running(status.render(&mut out));
        props.flush();

        while running {
            let written = tokio::select! {
                batch = events.next() => {
                    let batch = batch.ok_or_else(|| anyhow!("X event stream ended"))?;
                    status.on_notifications(&*props, batch, &mut out)
                },

                read = read_feed(pipe.as_ref()) => {
                    status.on_feed(read, &mut out)
                },

                _ = sigterm.recv() => {
                    log::info!("Received SIGTERM, shutting down");
                    running = false;
                    Ok(())
                },
                _ = sigint.recv() => {
                    log::info!("Received SIGINT, shutting down");
                    running = false;
                    Ok(())
                },
                _ = sighup.recv() => {
                    log::info!("Received SIGHUP, shutting down");
                    running = false;
                    Ok(())
                },
            };
            running = running && keep_running(written);
        }

        status.store.release(&*props);
        props.flush();
        Ok(())
    }
}

// A failed write means whoever reads our output has gone away.
fn keep_running(written: Result<()>) -> bool {
    match written {
        Ok(()) => true,
        Err(err) => {
            log::info!("{:#}, shutting down", err);
            false
        }
    }
}

// Never resolves when there is no pipe, leaving only the other branches.
async fn read_feed(pipe: Option<&FeedPipe>) -> io::Result<Vec<u8>> {
    match pipe {
        Some(pipe) => pipe.read().await,
        None => future::pending().await,
    }
}

/// Everything the main loop mutates between waits.
struct Status<M> {
    store: PropertyStore,
    bar: Bar<M>,
}

impl<M: Measure> Status<M> {
    fn start(bar: Bar<M>, source: &dyn PropertySource) -> Self {
        let mut store = PropertyStore::new();
        store.refresh_desktop_count(source);
        store.refresh_current_desktop(source);
        store.refresh_desktop_names(source);
        store.refresh_active_window_and_title(source);
        Status { store, bar }
    }

    fn render<W: Write>(&mut self, out: &mut W) -> Result<()> {
        self.bar
            .render(&mut self.store, out)
            .context("Failed to write status line")
    }

    /// Routes a batch of notifications in order, rendering once at the end
    /// if any of them changed something visible.
    fn on_notifications<W: Write>(
        &mut self,
        source: &dyn PropertySource,
        batch: Vec<Notification>,
        out: &mut W,
    ) -> Result<()> {
        let mut changed = false;
        for notification in batch {
            log::debug!("{:?}", notification);
            changed |= router::route(&mut self.store, source, notification);
        }
        source.flush();

        if changed {
            self.render(out)?;
        }
        Ok(())
    }

    fn on_feed<W: Write>(&mut self, read: io::Result<Vec<u8>>, out: &mut W) -> Result<()> {
        match read {
            Ok(bytes) if bytes.is_empty() => Ok(()),
            Ok(bytes) => {
                self.store.set_feed(feed_text(&bytes));
                self.render(out)
            }
            Err(err) => {
                log::debug!("Failed to read feed pipe: {}", err);
                self.store.clear_feed();
                Ok(())
            }
        }
    }
}
