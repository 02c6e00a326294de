//! Fork helpers for tests that must mutate a disposable process.

use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork};

/// Run `check` in a forked child and return its exit code.
///
/// The child exits with whatever `check` returns, or 101 if it panics.
pub(crate) fn in_child<F: FnOnce() -> i32>(check: F) -> i32 {
    match unsafe { fork() }.expect("fork failed") {
        ForkResult::Child => {
            let code = std::panic::catch_unwind(std::panic::AssertUnwindSafe(check)).unwrap_or(101);
            unsafe { libc::_exit(code) }
        }
        ForkResult::Parent { child } => exit_code(child),
    }
}

/// Wait for `child` and return its exit code, panicking on signal death.
pub(crate) fn exit_code(child: Pid) -> i32 {
    match waitpid(child, None).expect("waitpid failed") {
        WaitStatus::Exited(_, code) => code,
        other => panic!("child did not exit normally: {:?}", other),
    }
}
