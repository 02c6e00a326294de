//! Signal numbering helpers shared by the applicator, the C ABI and the CLI.

use libc::c_int;
use nix::sys::signal::{SigSet, Signal};
use std::str::FromStr;

use super::error::{Result, SpawnError};

/// Highest signal number the platform can deliver.
///
/// On Linux this includes the realtime range, which nix's `Signal` enum does
/// not cover.
pub fn max_signal() -> c_int {
    #[cfg(target_os = "linux")]
    {
        libc::SIGRTMAX()
    }

    #[cfg(not(target_os = "linux"))]
    {
        Signal::iterator().map(|s| s as c_int).max().unwrap_or(0)
    }
}

/// Whether raw signal number `signo` is a member of `set`.
pub fn is_member(set: &SigSet, signo: c_int) -> bool {
    // sigismember returns -1 for numbers outside the platform range.
    unsafe { libc::sigismember(set.as_ref(), signo) == 1 }
}

/// Every signal number in `set`, in ascending order.
pub fn members(set: &SigSet) -> impl Iterator<Item = c_int> + '_ {
    (1..=max_signal()).filter(move |&signo| is_member(set, signo))
}

/// Parse `SIGUSR1`, `usr1` or `10` into a signal.
pub fn parse_signal(name: &str) -> Result<Signal> {
    let trimmed = name.trim();
    if let Ok(number) = trimmed.parse::<c_int>() {
        return Signal::try_from(number)
            .map_err(|_| SpawnError::InvalidArgument("unknown signal number"));
    }

    let upper = trimmed.to_ascii_uppercase();
    let full = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{}", upper)
    };
    Signal::from_str(&full).map_err(|_| SpawnError::InvalidArgument("unknown signal name"))
}

/// Build a signal set from a list of names.
pub fn parse_sigset<S: AsRef<str>>(names: &[S]) -> Result<SigSet> {
    let mut set = SigSet::empty();
    for name in names {
        set.add(parse_signal(name.as_ref())?);
    }
    Ok(set)
}
