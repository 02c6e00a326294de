//! C ABI over the attribute store, the applicator and sendfile.
//!
//! Conventions follow libc: store operations return 0, or -1 with `errno`
//! set. `pk_spawn_apply_attributes` returns the errno directly. A store is an
//! opaque handle created by `pk_spawnattr_init` and released by
//! `pk_spawnattr_destroy`. Strings handed out by getters are `malloc`ed copies
//! the caller must `free`.

use libc::{c_char, c_int, gid_t, off_t, pid_t, sigset_t, size_t, ssize_t, uid_t};
use nix::errno::Errno;
use nix::sys::signal::SigSet;
use nix::unistd::{Gid, Pid, Uid};
use std::ffi::CStr;
use std::os::fd::BorrowedFd;

use crate::sendfile::sendfile;
use crate::spawn::SpawnAttr;

fn fail(errno: Errno) -> c_int {
    errno.set();
    -1
}

fn dup_cstr(value: Option<&CStr>) -> Result<*mut c_char, Errno> {
    match value {
        None => Ok(std::ptr::null_mut()),
        Some(s) => {
            let copy = unsafe { libc::strdup(s.as_ptr()) };
            if copy.is_null() { Err(Errno::ENOMEM) } else { Ok(copy) }
        }
    }
}

/// Allocate an empty store and write its handle to `*attr`.
///
/// # Safety
///
/// `attr` must be NULL or valid for a pointer-sized write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pk_spawnattr_init(attr: *mut *mut SpawnAttr) -> c_int {
    if attr.is_null() {
        return fail(Errno::EINVAL);
    }
    unsafe { *attr = Box::into_raw(Box::new(SpawnAttr::new())) };
    0
}

/// Release a store and any strings it owns.
///
/// # Safety
///
/// `attr` must be NULL or a handle from `pk_spawnattr_init` that has not
/// been destroyed yet. The handle is dangling afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pk_spawnattr_destroy(attr: *mut SpawnAttr) -> c_int {
    if attr.is_null() {
        return fail(Errno::EINVAL);
    }
    drop(unsafe { Box::from_raw(attr) });
    0
}

/// # Safety
///
/// `attr` must be NULL or a live handle from `pk_spawnattr_init`.
/// `flags` must be NULL or valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pk_spawnattr_getflags(attr: *const SpawnAttr, flags: *mut u32) -> c_int {
    let (Some(attr), false) = (unsafe { attr.as_ref() }, flags.is_null()) else {
        return fail(Errno::EINVAL);
    };
    unsafe { *flags = attr.flags().bits() };
    0
}

/// # Safety
///
/// `attr` must be NULL or a live handle from `pk_spawnattr_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pk_spawnattr_setflags(attr: *mut SpawnAttr, flags: u32) -> c_int {
    let Some(attr) = (unsafe { attr.as_mut() }) else {
        return fail(Errno::EINVAL);
    };
    match attr.set_flags_bits(flags) {
        Ok(()) => 0,
        Err(e) => fail(e.errno()),
    }
}

/// # Safety
///
/// `attr` must be NULL or a live handle from `pk_spawnattr_init`.
/// `sigmask` must be NULL or valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pk_spawnattr_getsigmask(
    attr: *const SpawnAttr,
    sigmask: *mut sigset_t,
) -> c_int {
    let (Some(attr), false) = (unsafe { attr.as_ref() }, sigmask.is_null()) else {
        return fail(Errno::EINVAL);
    };
    unsafe { *sigmask = *attr.sigmask().as_ref() };
    0
}

/// # Safety
///
/// `attr` must be NULL or a live handle from `pk_spawnattr_init`.
/// `sigmask` must be NULL or point to an initialized `sigset_t`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pk_spawnattr_setsigmask(
    attr: *mut SpawnAttr,
    sigmask: *const sigset_t,
) -> c_int {
    let (Some(attr), false) = (unsafe { attr.as_mut() }, sigmask.is_null()) else {
        return fail(Errno::EINVAL);
    };
    attr.set_sigmask(unsafe { SigSet::from_sigset_t_unchecked(*sigmask) });
    0
}

/// # Safety
///
/// `attr` must be NULL or a live handle from `pk_spawnattr_init`.
/// `sigdefault` must be NULL or valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pk_spawnattr_getsigdefault(
    attr: *const SpawnAttr,
    sigdefault: *mut sigset_t,
) -> c_int {
    let (Some(attr), false) = (unsafe { attr.as_ref() }, sigdefault.is_null()) else {
        return fail(Errno::EINVAL);
    };
    unsafe { *sigdefault = *attr.sigdefault().as_ref() };
    0
}

/// # Safety
///
/// `attr` must be NULL or a live handle from `pk_spawnattr_init`.
/// `sigdefault` must be NULL or point to an initialized `sigset_t`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pk_spawnattr_setsigdefault(
    attr: *mut SpawnAttr,
    sigdefault: *const sigset_t,
) -> c_int {
    let (Some(attr), false) = (unsafe { attr.as_mut() }, sigdefault.is_null()) else {
        return fail(Errno::EINVAL);
    };
    attr.set_sigdefault(unsafe { SigSet::from_sigset_t_unchecked(*sigdefault) });
    0
}

/// # Safety
///
/// `attr` must be NULL or a live handle from `pk_spawnattr_init`.
/// `pgroup` must be NULL or valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pk_spawnattr_getpgroup(
    attr: *const SpawnAttr,
    pgroup: *mut pid_t,
) -> c_int {
    let (Some(attr), false) = (unsafe { attr.as_ref() }, pgroup.is_null()) else {
        return fail(Errno::EINVAL);
    };
    unsafe { *pgroup = attr.pgroup().as_raw() };
    0
}

/// # Safety
///
/// `attr` must be NULL or a live handle from `pk_spawnattr_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pk_spawnattr_setpgroup(attr: *mut SpawnAttr, pgroup: pid_t) -> c_int {
    let Some(attr) = (unsafe { attr.as_mut() }) else {
        return fail(Errno::EINVAL);
    };
    attr.set_pgroup(Pid::from_raw(pgroup));
    0
}

/// # Safety
///
/// `attr` must be NULL or a live handle from `pk_spawnattr_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pk_spawnattr_setsid(attr: *mut SpawnAttr) -> c_int {
    let Some(attr) = (unsafe { attr.as_mut() }) else {
        return fail(Errno::EINVAL);
    };
    attr.set_sid();
    0
}

/// `*path` receives a copy of the terminal path, or NULL if none was set.
///
/// # Safety
///
/// `attr` must be NULL or a live handle from `pk_spawnattr_init`.
/// `path` must be NULL or valid for a pointer-sized write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pk_spawnattr_getctty(
    attr: *const SpawnAttr,
    path: *mut *mut c_char,
) -> c_int {
    let (Some(attr), false) = (unsafe { attr.as_ref() }, path.is_null()) else {
        return fail(Errno::EINVAL);
    };
    match dup_cstr(attr.ctty()) {
        Ok(copy) => {
            unsafe { *path = copy };
            0
        }
        Err(e) => fail(e),
    }
}

/// # Safety
///
/// `attr` must be NULL or a live handle from `pk_spawnattr_init`.
/// `path` must be NULL or point to a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pk_spawnattr_setctty(attr: *mut SpawnAttr, path: *const c_char) -> c_int {
    let (Some(attr), false) = (unsafe { attr.as_mut() }, path.is_null()) else {
        return fail(Errno::EINVAL);
    };
    attr.set_ctty_cstr(unsafe { CStr::from_ptr(path) });
    0
}

/// `*path` receives a copy of the working directory, or NULL if none was set.
///
/// # Safety
///
/// `attr` must be NULL or a live handle from `pk_spawnattr_init`.
/// `path` must be NULL or valid for a pointer-sized write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pk_spawnattr_getcwd(
    attr: *const SpawnAttr,
    path: *mut *mut c_char,
) -> c_int {
    let (Some(attr), false) = (unsafe { attr.as_ref() }, path.is_null()) else {
        return fail(Errno::EINVAL);
    };
    match dup_cstr(attr.cwd()) {
        Ok(copy) => {
            unsafe { *path = copy };
            0
        }
        Err(e) => fail(e),
    }
}

/// # Safety
///
/// `attr` must be NULL or a live handle from `pk_spawnattr_init`.
/// `path` must be NULL or point to a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pk_spawnattr_setcwd(attr: *mut SpawnAttr, path: *const c_char) -> c_int {
    let (Some(attr), false) = (unsafe { attr.as_mut() }, path.is_null()) else {
        return fail(Errno::EINVAL);
    };
    attr.set_cwd_cstr(unsafe { CStr::from_ptr(path) });
    0
}

/// An unset uid reads back as 0, as in a zeroed `posix_spawnattr_t`.
///
/// # Safety
///
/// `attr` must be NULL or a live handle from `pk_spawnattr_init`.
/// `uid` must be NULL or valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pk_spawnattr_getuid(attr: *const SpawnAttr, uid: *mut uid_t) -> c_int {
    let (Some(attr), false) = (unsafe { attr.as_ref() }, uid.is_null()) else {
        return fail(Errno::EINVAL);
    };
    unsafe { *uid = attr.uid().map_or(0, Uid::as_raw) };
    0
}

/// # Safety
///
/// `attr` must be NULL or a live handle from `pk_spawnattr_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pk_spawnattr_setuid(attr: *mut SpawnAttr, uid: uid_t) -> c_int {
    let Some(attr) = (unsafe { attr.as_mut() }) else {
        return fail(Errno::EINVAL);
    };
    attr.set_uid(Uid::from_raw(uid));
    0
}

/// # Safety
///
/// `attr` must be NULL or a live handle from `pk_spawnattr_init`.
/// `gid` must be NULL or valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pk_spawnattr_getgid(attr: *const SpawnAttr, gid: *mut gid_t) -> c_int {
    let (Some(attr), false) = (unsafe { attr.as_ref() }, gid.is_null()) else {
        return fail(Errno::EINVAL);
    };
    unsafe { *gid = attr.gid().map_or(0, Gid::as_raw) };
    0
}

/// # Safety
///
/// `attr` must be NULL or a live handle from `pk_spawnattr_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pk_spawnattr_setgid(attr: *mut SpawnAttr, gid: gid_t) -> c_int {
    let Some(attr) = (unsafe { attr.as_mut() }) else {
        return fail(Errno::EINVAL);
    };
    attr.set_gid(Gid::from_raw(gid));
    0
}

/// Apply `attr` to the calling process. Returns 0 or the failing step's errno.
///
/// A NULL store is a successful no-op.
///
/// # Safety
///
/// `attr` must be NULL or a live handle from `pk_spawnattr_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pk_spawn_apply_attributes(attr: *const SpawnAttr) -> c_int {
    let Some(attr) = (unsafe { attr.as_ref() }) else {
        return 0;
    };
    match attr.apply() {
        Ok(()) => 0,
        Err(e) => {
            let errno = e.errno();
            errno.set();
            errno as c_int
        }
    }
}

/// Transfer up to `nbytes` from `in_fd` at `offset` to `out_fd`.
///
/// Returns the number of bytes moved, or -1 with `errno` set (`ENOSYS` where
/// the platform has no sendfile).
///
/// # Safety
///
/// Non-negative descriptors must stay open for the duration of the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pk_sendfile(
    out_fd: c_int,
    in_fd: c_int,
    offset: off_t,
    nbytes: size_t,
) -> ssize_t {
    if out_fd < 0 || in_fd < 0 {
        return fail(Errno::EBADF) as ssize_t;
    }
    let (out_fd, in_fd) =
        unsafe { (BorrowedFd::borrow_raw(out_fd), BorrowedFd::borrow_raw(in_fd)) };
    match sendfile(out_fd, in_fd, i64::from(offset), nbytes) {
        Ok(sent) => sent as ssize_t,
        Err(e) => fail(e) as ssize_t,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spawn::SpawnFlags;
    use crate::spawn::testing::in_child;
    use std::ffi::CString;
    use std::os::unix::ffi::OsStringExt;
    use std::ptr;

    fn new_attr() -> *mut SpawnAttr {
        let mut attr = ptr::null_mut();
        assert_eq!(unsafe { pk_spawnattr_init(&mut attr) }, 0);
        assert!(!attr.is_null());
        attr
    }

    fn take_string(ptr: *mut c_char) -> Option<String> {
        if ptr.is_null() {
            return None;
        }
        let s = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
        unsafe { libc::free(ptr.cast()) };
        Some(s)
    }

    #[test]
    fn destroy_without_strings_succeeds() {
        let attr = new_attr();
        assert_eq!(unsafe { pk_spawnattr_destroy(attr) }, 0);
    }

    #[test]
    fn null_pointers_are_invalid() {
        unsafe {
            assert_eq!(pk_spawnattr_init(ptr::null_mut()), -1);
            assert_eq!(Errno::last(), Errno::EINVAL);
            assert_eq!(pk_spawnattr_destroy(ptr::null_mut()), -1);
            assert_eq!(pk_spawnattr_setsid(ptr::null_mut()), -1);

            let attr = new_attr();
            assert_eq!(pk_spawnattr_getflags(attr, ptr::null_mut()), -1);
            assert_eq!(pk_spawnattr_setcwd(attr, ptr::null()), -1);
            assert_eq!(pk_spawnattr_setsigmask(attr, ptr::null()), -1);
            assert_eq!(Errno::last(), Errno::EINVAL);
            pk_spawnattr_destroy(attr);
        }
    }

    #[test]
    fn setflags_rejects_unknown_bits() {
        let attr = new_attr();
        unsafe {
            assert_eq!(pk_spawnattr_setflags(attr, 1 << 20), -1);
            assert_eq!(Errno::last(), Errno::EINVAL);

            assert_eq!(pk_spawnattr_setflags(attr, SpawnFlags::SETSID.bits()), 0);
            let mut flags = 0;
            assert_eq!(pk_spawnattr_getflags(attr, &mut flags), 0);
            assert_eq!(flags, SpawnFlags::SETSID.bits());
            pk_spawnattr_destroy(attr);
        }
    }

    #[test]
    fn path_setters_keep_only_the_latest_value() {
        let attr = new_attr();
        let first = CString::new("/var").unwrap();
        let second = CString::new("/tmp").unwrap();
        let tty = CString::new("/dev/pts/7").unwrap();
        unsafe {
            let mut out = ptr::null_mut();
            assert_eq!(pk_spawnattr_getcwd(attr, &mut out), 0);
            assert_eq!(take_string(out), None);

            assert_eq!(pk_spawnattr_setcwd(attr, first.as_ptr()), 0);
            assert_eq!(pk_spawnattr_setcwd(attr, second.as_ptr()), 0);
            assert_eq!(pk_spawnattr_getcwd(attr, &mut out), 0);
            assert_eq!(take_string(out).as_deref(), Some("/tmp"));

            assert_eq!(pk_spawnattr_setctty(attr, tty.as_ptr()), 0);
            assert_eq!(pk_spawnattr_getctty(attr, &mut out), 0);
            assert_eq!(take_string(out).as_deref(), Some("/dev/pts/7"));

            let mut flags = 0;
            pk_spawnattr_getflags(attr, &mut flags);
            assert_eq!(flags, (SpawnFlags::SETCWD | SpawnFlags::SETCTTY).bits());
            assert_eq!(pk_spawnattr_destroy(attr), 0);
        }
    }

    #[test]
    fn numeric_fields_round_trip() {
        let attr = new_attr();
        unsafe {
            let (mut uid, mut gid, mut pgroup): (uid_t, gid_t, pid_t) = (1, 1, 1);
            assert_eq!(pk_spawnattr_getuid(attr, &mut uid), 0);
            assert_eq!(uid, 0);

            pk_spawnattr_setuid(attr, 1234);
            pk_spawnattr_setgid(attr, 5678);
            pk_spawnattr_setpgroup(attr, 0);
            pk_spawnattr_getuid(attr, &mut uid);
            pk_spawnattr_getgid(attr, &mut gid);
            pk_spawnattr_getpgroup(attr, &mut pgroup);
            assert_eq!((uid, gid, pgroup), (1234, 5678, 0));
            pk_spawnattr_destroy(attr);
        }
    }

    #[test]
    fn signal_sets_round_trip() {
        let attr = new_attr();
        unsafe {
            let mut set: sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut set);
            libc::sigaddset(&mut set, libc::SIGTERM);
            assert_eq!(pk_spawnattr_setsigdefault(attr, &set), 0);

            let mut out: sigset_t = std::mem::zeroed();
            assert_eq!(pk_spawnattr_getsigdefault(attr, &mut out), 0);
            assert_eq!(libc::sigismember(&out, libc::SIGTERM), 1);
            assert_eq!(libc::sigismember(&out, libc::SIGINT), 0);

            // The mask was never set and reads back empty.
            assert_eq!(pk_spawnattr_getsigmask(attr, &mut out), 0);
            assert_eq!(libc::sigismember(&out, libc::SIGTERM), 0);
            pk_spawnattr_destroy(attr);
        }
    }

    #[test]
    fn apply_reports_errno() {
        unsafe {
            assert_eq!(pk_spawn_apply_attributes(ptr::null()), 0);

            let attr = new_attr();
            pk_spawnattr_setflags(attr, SpawnFlags::RESETIDS.bits());
            pk_spawnattr_setuid(attr, libc::getuid());
            assert_eq!(pk_spawn_apply_attributes(attr), libc::EINVAL);
            pk_spawnattr_destroy(attr);
        }
    }

    #[test]
    fn apply_reports_os_errno_from_failed_step() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = CString::new(
            tmp.path()
                .join("does-not-exist")
                .into_os_string()
                .into_vec(),
        )
        .unwrap();
        let attr = new_attr();
        unsafe { pk_spawnattr_setcwd(attr, missing.as_ptr()) };

        let code = in_child(|| {
            let rc = unsafe { pk_spawn_apply_attributes(attr) };
            if rc != libc::ENOENT {
                return 1;
            }
            if Errno::last() != Errno::ENOENT {
                return 2;
            }
            0
        });
        assert_eq!(code, 0);
        unsafe { pk_spawnattr_destroy(attr) };
    }

    #[test]
    fn sendfile_rejects_bad_descriptors() {
        unsafe {
            assert_eq!(pk_sendfile(-1, 0, 0, 16), -1);
            assert_eq!(Errno::last(), Errno::EBADF);
        }
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn sendfile_moves_bytes() {
        use std::io::{Read, Seek, SeekFrom, Write};
        use std::os::fd::AsRawFd;

        let mut src = tempfile::tempfile().unwrap();
        src.write_all(b"0123456789").unwrap();
        let mut dst = tempfile::tempfile().unwrap();

        let sent = unsafe { pk_sendfile(dst.as_raw_fd(), src.as_raw_fd(), 4, 3) };
        assert_eq!(sent, 3);

        dst.seek(SeekFrom::Start(0)).unwrap();
        let mut out = String::new();
        dst.read_to_string(&mut out).unwrap();
        assert_eq!(out, "456");
    }
}
