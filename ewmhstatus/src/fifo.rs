//! The feed pipe: free-form text written by an external program.

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use nix::fcntl::OFlag;
use tokio::io::unix::AsyncFd;

use crate::config::MAX_TEXT_LEN;
use crate::text::BoundedText;

/// A named pipe, read without blocking the event loop.
pub struct FeedPipe {
    path: PathBuf,
    fd: AsyncFd<File>,
}

impl FeedPipe {
    /// Opens the pipe at `path`.
    ///
    /// The pipe is opened for writing as well as reading, so it is never
    /// seen as closed while no writer is attached. Must be called from
    /// within a Tokio runtime.
    pub fn open(path: &Path) -> Result<FeedPipe> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(path)
            .with_context(|| format!("Failed to open feed pipe {}", path.display()))?;
        let fd = AsyncFd::with_interest(file, tokio::io::Interest::READABLE)
            .context("Failed to register feed pipe")?;

        Ok(FeedPipe {
            path: path.to_owned(),
            fd,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Waits for data and returns what is available, at most
    /// [`MAX_TEXT_LEN`] bytes. May return an empty buffer.
    pub async fn read(&self) -> io::Result<Vec<u8>> {
        let mut buf = vec![0; MAX_TEXT_LEN];
        loop {
            let mut guard = self.fd.readable().await?;
            match guard.try_io(|inner| {
                let mut file = inner.get_ref();
                file.read(&mut buf)
            }) {
                Ok(result) => {
                    let len = result?;
                    buf.truncate(len);
                    return Ok(buf);
                }
                Err(_would_block) => continue,
            }
        }
    }
}

/// Turns bytes read from the pipe into feed text.
///
/// Trailing whitespace and control characters are dropped. When a single
/// read holds several lines, only the last one is kept.
pub fn feed_text(bytes: &[u8]) -> BoundedText {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_end_matches(|c: char| c.is_whitespace() || c.is_control());
    let line = match text.rfind('\n') {
        Some(idx) => &text[idx + 1..],
        None => text,
    };
    BoundedText::ingest_lossy(line)
}
