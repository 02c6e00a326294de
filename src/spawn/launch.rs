//! fork → apply attributes → exec, with failure reporting to the parent.
//!
//! The child reports a pre-exec failure over a close-on-exec pipe as eight
//! bytes: the failing stage (a [`Step`] code, or 0 for exec itself) and the
//! errno, both big-endian. A successful exec closes the pipe, so the parent
//! sees EOF with nothing read.

use libc::c_char;
use nix::errno::Errno;
use nix::sys::wait::waitpid;
use nix::unistd::{self, AccessFlags, ForkResult, Pid};
use std::ffi::{CStr, CString, OsStr};
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::OwnedFd;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use tracing::debug;

use super::apply::apply_attributes;
use super::attr::SpawnAttr;
use super::error::{Result, SpawnError, Step};

const REPORT_LEN: usize = 8;
const EXEC_STAGE: i32 = 0;

/// What to exec in the child.
#[derive(Debug, Clone)]
pub struct Program {
    path: CString,
    argv: Vec<CString>,
    envp: Option<Vec<CString>>,
    search_path: bool,
}

impl Program {
    /// A program with `argv[0]` set to `path` and the parent's environment.
    pub fn new<S: AsRef<OsStr>>(path: S) -> Result<Self> {
        let path = to_cstring(path.as_ref())?;
        Ok(Self {
            argv: vec![path.clone()],
            path,
            envp: None,
            search_path: false,
        })
    }

    pub fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> Result<&mut Self> {
        self.argv.push(to_cstring(arg.as_ref())?);
        Ok(self)
    }

    pub fn args<I, S>(&mut self, args: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.arg(arg)?;
        }
        Ok(self)
    }

    /// Replace the child's environment with exactly `vars`.
    pub fn env<I, K, V>(&mut self, vars: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        let mut envp = Vec::new();
        for (key, value) in vars {
            let mut pair = key.as_ref().as_bytes().to_vec();
            pair.push(b'=');
            pair.extend_from_slice(value.as_ref().as_bytes());
            envp.push(to_cstring(OsStr::from_bytes(&pair))?);
        }
        self.envp = Some(envp);
        Ok(self)
    }

    /// Look a slash-less program name up in `PATH` before forking.
    pub fn search_path(&mut self, search: bool) -> &mut Self {
        self.search_path = search;
        self
    }

    pub fn path(&self) -> &CStr {
        &self.path
    }

    fn resolve(&self) -> Result<CString> {
        if !self.search_path || self.path.to_bytes().contains(&b'/') {
            return Ok(self.path.clone());
        }

        let name = OsStr::from_bytes(self.path.to_bytes());
        let search = std::env::var_os("PATH").unwrap_or_else(|| "/usr/bin:/bin".into());
        for dir in std::env::split_paths(&search) {
            let candidate: PathBuf = dir.join(name);
            if unistd::access(&candidate, AccessFlags::X_OK).is_ok() && candidate.is_file() {
                return to_cstring(candidate.as_os_str());
            }
        }
        Err(SpawnError::Exec(Errno::ENOENT))
    }
}

fn to_cstring(s: &OsStr) -> Result<CString> {
    CString::new(s.as_bytes())
        .map_err(|_| SpawnError::InvalidArgument("argument contains a NUL byte"))
}

fn null_terminated(strings: &[CString]) -> Vec<*const c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}

/// Fork, apply `attr` in the child, and exec `program`.
///
/// Returns the child's pid once exec has succeeded. If the child fails before
/// exec, it is reaped and the failing step and errno are returned. The caller
/// owns the running child.
pub fn spawn(program: &Program, attr: Option<&SpawnAttr>) -> Result<Pid> {
    let path = program.resolve()?;
    // Everything the child touches is built before fork.
    let argv = null_terminated(&program.argv);
    let envp = program.envp.as_deref().map(null_terminated);

    let (reader, writer) = report_pipe()?;

    debug!(program = ?path, args = program.argv.len(), "forking child");
    match unsafe { unistd::fork() }.map_err(|e| launch_error("fork", e))? {
        ForkResult::Child => {
            drop(reader);
            let (stage, errno) = match apply_attributes(attr) {
                Ok(()) => {
                    exec(&path, &argv, envp.as_deref());
                    (EXEC_STAGE, Errno::last())
                }
                Err(SpawnError::Step { step, source }) => (step.code(), source),
                Err(other) => (Step::Validate.code(), other.errno()),
            };

            let mut report = [0u8; REPORT_LEN];
            report[..4].copy_from_slice(&stage.to_be_bytes());
            report[4..].copy_from_slice(&(errno as i32).to_be_bytes());
            let _ = File::from(writer).write_all(&report);
            unsafe { libc::_exit(127) }
        }
        ForkResult::Parent { child } => {
            drop(writer);
            read_report(reader, child)
        }
    }
}

fn exec(path: &CStr, argv: &[*const c_char], envp: Option<&[*const c_char]>) {
    unsafe {
        match envp {
            Some(envp) => libc::execve(path.as_ptr(), argv.as_ptr(), envp.as_ptr()),
            None => libc::execv(path.as_ptr(), argv.as_ptr()),
        };
    }
}

fn report_pipe() -> Result<(OwnedFd, OwnedFd)> {
    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    {
        unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC).map_err(|e| launch_error("pipe", e))
    }

    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
    {
        use std::os::fd::AsRawFd;

        let (reader, writer) = unistd::pipe().map_err(|e| launch_error("pipe", e))?;
        for fd in [&reader, &writer] {
            Errno::result(unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) })
                .map_err(|e| launch_error("pipe", e))?;
        }
        Ok((reader, writer))
    }
}

fn read_report(reader: OwnedFd, child: Pid) -> Result<Pid> {
    let mut report = Vec::with_capacity(REPORT_LEN);
    if let Err(e) = File::from(reader).read_to_end(&mut report) {
        reap(child);
        let errno = e.raw_os_error().map(Errno::from_raw).unwrap_or(Errno::EIO);
        return Err(launch_error("read", errno));
    }

    if report.is_empty() {
        debug!(pid = child.as_raw(), "child exec'd");
        return Ok(child);
    }

    reap(child);
    if report.len() != REPORT_LEN {
        return Err(launch_error("read", Errno::EIO));
    }

    let stage = i32::from_be_bytes([report[0], report[1], report[2], report[3]]);
    let errno = Errno::from_raw(i32::from_be_bytes([report[4], report[5], report[6], report[7]]));
    let err = match stage {
        EXEC_STAGE => SpawnError::Exec(errno),
        code => match Step::from_code(code) {
            Some(step) => SpawnError::Step { step, source: errno },
            None => launch_error("read", Errno::EIO),
        },
    };
    debug!(pid = child.as_raw(), error = %err, "child failed before exec");
    Err(err)
}

fn reap(child: Pid) {
    let _ = waitpid(child, None);
}

fn launch_error(stage: &'static str, source: Errno) -> SpawnError {
    SpawnError::Launch { stage, source }
}
