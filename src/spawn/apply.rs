use libc::c_int;
use nix::errno::Errno;
use nix::fcntl::{self, OFlag};
use nix::sys::signal::{SigSet, SigmaskHow, sigprocmask};
use nix::sys::stat::Mode;
use nix::unistd::{self, Pid};
use std::ffi::CStr;
use std::os::fd::AsRawFd;

use super::attr::SpawnAttr;
use super::error::{Result, SpawnError, Step};
use super::flags::SpawnFlags;
use super::signals;

/// Apply `attr` to the calling process. `None` is a successful no-op.
///
/// Meant to run in a freshly forked child before exec. See [`SpawnAttr::apply`].
pub fn apply_attributes(attr: Option<&SpawnAttr>) -> Result<()> {
    match attr {
        Some(attr) => attr.apply(),
        None => Ok(()),
    }
}

impl SpawnAttr {
    /// Mutate the calling process to match this store.
    ///
    /// Steps run in a fixed order and stop at the first failure; earlier steps
    /// are not undone. Identity changes come last so that process group,
    /// session, terminal and directory changes still run with the original
    /// privileges. Nothing here allocates or takes a lock, so it is safe to
    /// call between `fork` and `exec` of a multithreaded parent. Debug builds
    /// name a failing step on stderr with plain `write(2)` calls.
    pub fn apply(&self) -> Result<()> {
        let flags = self.flags();

        run(Step::Validate, || validate(self))?;

        if flags.contains(SpawnFlags::SETSIGMASK) {
            run(Step::SigMask, || {
                sigprocmask(SigmaskHow::SIG_SETMASK, Some(self.sigmask()), None)
            })?;
        }

        if flags.contains(SpawnFlags::SETSIGDEFAULT) {
            run(Step::SigDefault, || reset_signal_defaults(self.sigdefault()))?;
        }

        if flags.contains(SpawnFlags::SETPGROUP) {
            run(Step::ProcessGroup, || {
                unistd::setpgid(Pid::from_raw(0), self.pgroup())
            })?;
        }

        if flags.contains(SpawnFlags::SETSID) {
            run(Step::Session, || unistd::setsid().map(drop))?;
        }

        if flags.contains(SpawnFlags::SETCTTY) {
            run(Step::ControllingTerminal, || {
                acquire_controlling_terminal(self.ctty().ok_or(Errno::EINVAL)?)
            })?;
        }

        if flags.contains(SpawnFlags::SETCWD) {
            run(Step::WorkingDirectory, || {
                unistd::chdir(self.cwd().ok_or(Errno::EINVAL)?)
            })?;
        }

        if flags.contains(SpawnFlags::RESETIDS) {
            run(Step::ResetIds, || {
                unistd::seteuid(unistd::getuid())?;
                unistd::setegid(unistd::getgid())
            })?;
        }

        if flags.contains(SpawnFlags::SETUID) {
            run(Step::SetUid, || unistd::seteuid(self.uid().ok_or(Errno::EINVAL)?))?;
        }

        if flags.contains(SpawnFlags::SETGID) {
            run(Step::SetGid, || unistd::setegid(self.gid().ok_or(Errno::EINVAL)?))?;
        }

        Ok(())
    }
}

fn run<F>(step: Step, op: F) -> Result<()>
where
    F: FnOnce() -> nix::Result<()>,
{
    op().map_err(|errno| {
        #[cfg(debug_assertions)]
        report_failure(step, errno);
        SpawnError::step(step, errno)
    })
}

/// `perror`-style line on stderr: raw writes only, no allocation or locks.
#[cfg(debug_assertions)]
fn report_failure(step: Step, errno: Errno) {
    let stderr = std::io::stderr();
    for part in [
        b"posixkit: ".as_slice(),
        step.label().as_bytes(),
        b": ",
        errno.desc().as_bytes(),
        b"\n",
    ] {
        let _ = unistd::write(&stderr, part);
    }
}

/// Reject contradictory or incomplete stores before touching the process.
fn validate(attr: &SpawnAttr) -> nix::Result<()> {
    let flags = attr.flags();
    if flags.has_identity_conflict() {
        return Err(Errno::EINVAL);
    }

    let missing_payload = (flags.contains(SpawnFlags::SETUID) && attr.uid().is_none())
        || (flags.contains(SpawnFlags::SETGID) && attr.gid().is_none())
        || (flags.contains(SpawnFlags::SETCWD) && attr.cwd().is_none())
        || (flags.contains(SpawnFlags::SETCTTY) && attr.ctty().is_none());
    if missing_payload {
        return Err(Errno::EINVAL);
    }

    Ok(())
}

fn reset_signal_defaults(set: &SigSet) -> nix::Result<()> {
    for signo in signals::members(set) {
        reset_disposition(signo)?;
    }
    Ok(())
}

fn reset_disposition(signo: c_int) -> nix::Result<()> {
    // Raw sigaction: nix's Signal has no realtime variants.
    let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
    action.sa_sigaction = libc::SIG_DFL;
    unsafe { libc::sigemptyset(&mut action.sa_mask) };
    Errno::result(unsafe { libc::sigaction(signo, &action, std::ptr::null_mut()) }).map(drop)
}

/// Open `path` without letting open() assign it, then claim it explicitly.
///
/// The descriptor is closed on return; the session keeps the terminal.
fn acquire_controlling_terminal(path: &CStr) -> nix::Result<()> {
    let fd = fcntl::open(path, OFlag::O_RDWR | OFlag::O_NOCTTY, Mode::empty())?;
    Errno::result(unsafe { libc::ioctl(fd.as_raw_fd(), libc::TIOCSCTTY as _, 0 as c_int) })
        .map(drop)
}
