use bitflags::bitflags;

bitflags! {
    /// Which optional attributes of a [`SpawnAttr`](super::SpawnAttr) are active.
    ///
    /// Bit values are part of the C ABI and must not change.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SpawnFlags: u32 {
        /// Replace the child's signal mask with `sigmask`.
        const SETSIGMASK    = 1 << 0;
        /// Reset every signal in `sigdefault` to `SIG_DFL`.
        const SETSIGDEFAULT = 1 << 1;
        /// Move the child into process group `pgroup` (0 = its own pid).
        const SETPGROUP     = 1 << 2;
        /// Set the effective uid/gid back to the real uid/gid.
        const RESETIDS      = 1 << 3;
        /// Set the effective uid to `uid`.
        const SETUID        = 1 << 4;
        /// Set the effective gid to `gid`.
        const SETGID        = 1 << 5;
        /// Change the working directory to `cwd`.
        const SETCWD        = 1 << 6;
        /// Start a new session.
        const SETSID        = 1 << 7;
        /// Acquire `ctty` as the controlling terminal.
        const SETCTTY       = 1 << 8;
    }
}

impl SpawnFlags {
    /// `RESETIDS` contradicts an explicit `SETUID` or `SETGID`.
    pub fn has_identity_conflict(self) -> bool {
        self.contains(Self::RESETIDS) && self.intersects(Self::SETUID | Self::SETGID)
    }
}
