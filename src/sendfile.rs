//! Zero-copy transfer between two descriptors.
//!
//! One call maps onto the platform's sendfile variant. Short transfers are
//! returned as-is; looping until `count` bytes have moved is the caller's job.

use nix::errno::Errno;
use std::os::fd::BorrowedFd;

/// Copy up to `count` bytes from `in_fd` at `offset` to `out_fd`.
///
/// The file position of `in_fd` is left untouched. Platforms without a
/// sendfile primitive fail with `ENOSYS`.
pub fn sendfile(
    out_fd: BorrowedFd<'_>,
    in_fd: BorrowedFd<'_>,
    offset: i64,
    count: usize,
) -> Result<usize, Errno> {
    if offset < 0 {
        return Err(Errno::EINVAL);
    }
    let offset = libc::off_t::try_from(offset).map_err(|_| Errno::EOVERFLOW)?;
    transfer(out_fd, in_fd, offset, count)
}

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "illumos",
    target_os = "solaris"
))]
fn transfer(
    out_fd: BorrowedFd<'_>,
    in_fd: BorrowedFd<'_>,
    offset: libc::off_t,
    count: usize,
) -> Result<usize, Errno> {
    let mut offset = offset;
    nix::sys::sendfile::sendfile(out_fd, in_fd, Some(&mut offset), count)
}

#[cfg(target_os = "freebsd")]
fn transfer(
    out_fd: BorrowedFd<'_>,
    in_fd: BorrowedFd<'_>,
    offset: libc::off_t,
    count: usize,
) -> Result<usize, Errno> {
    use nix::sys::sendfile::SfFlags;

    // A zero count means "to end of file" here.
    if count == 0 {
        return Ok(0);
    }
    let (res, sent) = nix::sys::sendfile::sendfile(
        in_fd,
        out_fd,
        offset,
        Some(count),
        None,
        None,
        SfFlags::from_bits_retain(libc::SF_MNOWAIT),
        0,
    );
    partial(res, sent)
}

#[cfg(target_os = "dragonfly")]
fn transfer(
    out_fd: BorrowedFd<'_>,
    in_fd: BorrowedFd<'_>,
    offset: libc::off_t,
    count: usize,
) -> Result<usize, Errno> {
    if count == 0 {
        return Ok(0);
    }
    let (res, sent) = nix::sys::sendfile::sendfile(in_fd, out_fd, offset, Some(count), None, None);
    partial(res, sent)
}

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "tvos",
    target_os = "watchos",
    target_os = "visionos"
))]
fn transfer(
    out_fd: BorrowedFd<'_>,
    in_fd: BorrowedFd<'_>,
    offset: libc::off_t,
    count: usize,
) -> Result<usize, Errno> {
    if count == 0 {
        return Ok(0);
    }
    let len = libc::off_t::try_from(count).unwrap_or(libc::off_t::MAX);
    let (res, sent) = nix::sys::sendfile::sendfile(in_fd, out_fd, offset, Some(len), None, None);
    partial(res, sent)
}

/// BSD-style calls report bytes moved even when they fail midway.
#[cfg(any(
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "macos",
    target_os = "ios",
    target_os = "tvos",
    target_os = "watchos",
    target_os = "visionos"
))]
fn partial(res: nix::Result<()>, sent: libc::off_t) -> Result<usize, Errno> {
    match res {
        Ok(()) => Ok(sent as usize),
        Err(Errno::EAGAIN | Errno::EBUSY | Errno::EINTR) if sent > 0 => Ok(sent as usize),
        Err(e) => Err(e),
    }
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "illumos",
    target_os = "solaris",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "macos",
    target_os = "ios",
    target_os = "tvos",
    target_os = "watchos",
    target_os = "visionos"
)))]
fn transfer(
    _out_fd: BorrowedFd<'_>,
    _in_fd: BorrowedFd<'_>,
    _offset: libc::off_t,
    _count: usize,
) -> Result<usize, Errno> {
    Err(Errno::ENOSYS)
}
