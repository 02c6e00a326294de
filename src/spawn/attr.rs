use nix::sys::signal::SigSet;
use nix::unistd::{Gid, Pid, Uid};
use std::ffi::{CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use super::error::{Result, SpawnError};
use super::flags::SpawnFlags;

/// Optional adjustments to apply to a child between `fork` and `exec`.
///
/// Every value setter also marks its flag, so a value is never stored without
/// being active. Values that have no meaningful zero (ids, paths) are kept as
/// `Option` and are never read unless assigned.
#[derive(Debug, Clone)]
pub struct SpawnAttr {
    flags: SpawnFlags,
    sigmask: SigSet,
    sigdefault: SigSet,
    pgroup: Pid,
    uid: Option<Uid>,
    gid: Option<Gid>,
    cwd: Option<CString>,
    ctty: Option<CString>,
}

impl Default for SpawnAttr {
    fn default() -> Self {
        Self::new()
    }
}

impl SpawnAttr {
    /// An empty store: no flags, empty signal sets, process group 0.
    pub fn new() -> Self {
        Self {
            flags: SpawnFlags::empty(),
            sigmask: SigSet::empty(),
            sigdefault: SigSet::empty(),
            pgroup: Pid::from_raw(0),
            uid: None,
            gid: None,
            cwd: None,
            ctty: None,
        }
    }

    pub fn flags(&self) -> SpawnFlags {
        self.flags
    }

    /// Replace the whole flag set.
    pub fn set_flags(&mut self, flags: SpawnFlags) {
        self.flags = flags;
    }

    /// Replace the flag set from raw bits, rejecting bits outside the known set.
    pub fn set_flags_bits(&mut self, bits: u32) -> Result<()> {
        let flags = SpawnFlags::from_bits(bits)
            .ok_or(SpawnError::InvalidArgument("unknown spawn flag bits"))?;
        self.flags = flags;
        Ok(())
    }

    pub fn sigmask(&self) -> &SigSet {
        &self.sigmask
    }

    pub fn set_sigmask(&mut self, mask: SigSet) {
        self.flags |= SpawnFlags::SETSIGMASK;
        self.sigmask = mask;
    }

    pub fn sigdefault(&self) -> &SigSet {
        &self.sigdefault
    }

    pub fn set_sigdefault(&mut self, signals: SigSet) {
        self.flags |= SpawnFlags::SETSIGDEFAULT;
        self.sigdefault = signals;
    }

    pub fn pgroup(&self) -> Pid {
        self.pgroup
    }

    /// Join process group `pgroup`; 0 makes the child lead a group of its own.
    pub fn set_pgroup(&mut self, pgroup: Pid) {
        self.flags |= SpawnFlags::SETPGROUP;
        self.pgroup = pgroup;
    }

    /// Request a new session.
    pub fn set_sid(&mut self) {
        self.flags |= SpawnFlags::SETSID;
    }

    /// Request the effective ids be reset to the real ids.
    pub fn set_reset_ids(&mut self) {
        self.flags |= SpawnFlags::RESETIDS;
    }

    pub fn ctty(&self) -> Option<&CStr> {
        self.ctty.as_deref()
    }

    pub fn set_ctty<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path_to_cstring(path.as_ref())?;
        self.set_ctty_cstr(&path);
        Ok(())
    }

    pub fn set_ctty_cstr(&mut self, path: &CStr) {
        self.flags |= SpawnFlags::SETCTTY;
        self.ctty = Some(path.to_owned());
    }

    pub fn cwd(&self) -> Option<&CStr> {
        self.cwd.as_deref()
    }

    pub fn set_cwd<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path_to_cstring(path.as_ref())?;
        self.set_cwd_cstr(&path);
        Ok(())
    }

    pub fn set_cwd_cstr(&mut self, path: &CStr) {
        self.flags |= SpawnFlags::SETCWD;
        self.cwd = Some(path.to_owned());
    }

    pub fn uid(&self) -> Option<Uid> {
        self.uid
    }

    pub fn set_uid(&mut self, uid: Uid) {
        self.flags |= SpawnFlags::SETUID;
        self.uid = Some(uid);
    }

    pub fn gid(&self) -> Option<Gid> {
        self.gid
    }

    pub fn set_gid(&mut self, gid: Gid) {
        self.flags |= SpawnFlags::SETGID;
        self.gid = Some(gid);
    }
}

fn path_to_cstring(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| SpawnError::InvalidArgument("path contains a NUL byte"))
}
