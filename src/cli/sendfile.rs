use anyhow::{Context, Result};
use clap::Args;
use nix::errno::Errno;
use std::fs::{File, OpenOptions};
use std::os::fd::AsFd;
use std::path::PathBuf;
use tracing::debug;

use posixkit::sendfile::sendfile;

/// Largest chunk handed to one sendfile call.
const MAX_CHUNK: usize = 1 << 30;

#[derive(Args, Debug)]
pub struct SendfileArgs {
    /// File to copy from
    pub source: PathBuf,

    /// File to copy to (created or truncated)
    pub destination: PathBuf,

    /// Byte offset in the source to start from
    #[arg(long, default_value_t = 0)]
    pub offset: u64,

    /// Bytes to copy (default: to end of file)
    #[arg(long)]
    pub count: Option<u64>,
}

pub fn run(args: SendfileArgs) -> Result<()> {
    let source = File::open(&args.source)
        .with_context(|| format!("Failed to open {}", args.source.display()))?;
    let len = source.metadata()?.len();
    let end = match args.count {
        Some(count) => args.offset.saturating_add(count).min(len),
        None => len,
    };

    let destination = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&args.destination)
        .with_context(|| format!("Failed to open {}", args.destination.display()))?;

    let copied = copy_range(&source, &destination, args.offset, end)?;
    println!(
        "Copied {} bytes from {} to {}",
        copied,
        args.source.display(),
        args.destination.display()
    );
    Ok(())
}

/// Move bytes `[start, end)` of `source` to `destination`, looping over short transfers.
fn copy_range(source: &File, destination: &File, start: u64, end: u64) -> Result<u64> {
    let mut offset = start;
    while offset < end {
        let chunk = usize::try_from(end - offset).unwrap_or(MAX_CHUNK).min(MAX_CHUNK);
        let at = i64::try_from(offset).context("Offset out of range")?;
        let sent = match sendfile(destination.as_fd(), source.as_fd(), at, chunk) {
            Ok(0) => break,
            Ok(sent) => sent,
            Err(Errno::EINTR | Errno::EAGAIN) => continue,
            Err(e) => return Err(e).context("sendfile failed"),
        };
        offset += sent as u64;
        debug!(sent, offset, "sendfile chunk");
    }
    Ok(offset.saturating_sub(start))
}
