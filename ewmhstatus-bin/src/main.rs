use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use ewmhstatus::config::{DEFAULT_FONT_FAMILY, DEFAULT_FONT_SIZE, DEFAULT_PADDING, FIFO_ENV_VAR};
use ewmhstatus::{Config, EwmhStatus};

/// Prints a dzen2 status line showing the current desktop, the active
/// window's title and the text written to a named pipe.
#[derive(Parser, Debug)]
#[command(version)]
struct Opt {
    /// Font family used to measure text.
    #[arg(default_value = DEFAULT_FONT_FAMILY)]
    font_family: String,

    /// Font size, in pixels.
    #[arg(default_value_t = DEFAULT_FONT_SIZE)]
    font_size: u16,

    /// Horizontal padding around each segment, in pixels.
    #[arg(default_value_t = DEFAULT_PADDING)]
    padding: u16,

    /// Named pipe to read the right-hand text from.
    #[arg(long, env = FIFO_ENV_VAR)]
    fifo: Option<PathBuf>,

    /// Write out debug logs.
    #[arg(long = "debug")]
    log_debug: bool,
}

impl From<Opt> for Config {
    fn from(opt: Opt) -> Self {
        Config {
            font_family: opt.font_family,
            font_size: opt.font_size,
            padding: opt.padding,
            fifo: opt.fifo,
        }
    }
}

fn main() -> Result<()> {
    let opt = Opt::parse();

    let log_level_filter = if opt.log_debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    if std::env::var("RUST_LOG").is_ok() {
        pretty_env_logger::init_timed();
    } else {
        pretty_env_logger::formatted_timed_builder()
            .filter(Some("ewmhstatus"), log_level_filter)
            .filter(Some("ewmhstatus_bin"), log_level_filter)
            .init();
    }

    log::debug!("{:?}", opt);
    EwmhStatus::new(opt.into()).run()
}
