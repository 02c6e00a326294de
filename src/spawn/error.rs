//! Error types for attribute configuration, application and launch.

use nix::errno::Errno;
use std::fmt;
use thiserror::Error;

/// One step of attribute application, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Step {
    Validate = 1,
    SigMask = 2,
    SigDefault = 3,
    ProcessGroup = 4,
    Session = 5,
    ControllingTerminal = 6,
    WorkingDirectory = 7,
    ResetIds = 8,
    SetUid = 9,
    SetGid = 10,
}

impl Step {
    pub const ALL: [Step; 10] = [
        Step::Validate,
        Step::SigMask,
        Step::SigDefault,
        Step::ProcessGroup,
        Step::Session,
        Step::ControllingTerminal,
        Step::WorkingDirectory,
        Step::ResetIds,
        Step::SetUid,
        Step::SetGid,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    /// `ATTRIBUTE:syscall` label used in diagnostics.
    pub fn label(self) -> &'static str {
        match self {
            Step::Validate => "VALIDATE",
            Step::SigMask => "SETSIGMASK:sigprocmask",
            Step::SigDefault => "SETSIGDEFAULT:sigaction",
            Step::ProcessGroup => "SETPGROUP:setpgid",
            Step::Session => "SETSID:setsid",
            Step::ControllingTerminal => "SETCTTY:open/ioctl",
            Step::WorkingDirectory => "SETCWD:chdir",
            Step::ResetIds => "RESETIDS:seteuid/setegid",
            Step::SetUid => "SETUID:seteuid",
            Step::SetGid => "SETGID:setegid",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Error, Debug)]
pub enum SpawnError {
    /// The caller broke the store's contract (bad flag bits, NUL in a path).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// An application step failed inside the child.
    #[error("{step} failed: {source}")]
    Step {
        step: Step,
        #[source]
        source: Errno,
    },

    /// exec itself failed after all attributes were applied.
    #[error("exec failed: {0}")]
    Exec(#[source] Errno),

    /// Parent-side failure while setting up or reading the launch report.
    #[error("launch failed during {stage}: {source}")]
    Launch {
        stage: &'static str,
        #[source]
        source: Errno,
    },
}

impl SpawnError {
    pub(crate) fn step(step: Step, source: Errno) -> Self {
        SpawnError::Step { step, source }
    }

    /// The errno a C caller sees for this error.
    pub fn errno(&self) -> Errno {
        match self {
            SpawnError::InvalidArgument(_) => Errno::EINVAL,
            SpawnError::Step { source, .. } => *source,
            SpawnError::Exec(e) => *e,
            SpawnError::Launch { source, .. } => *source,
        }
    }

    /// The failing step, when the error came from attribute application.
    pub fn failed_step(&self) -> Option<Step> {
        match self {
            SpawnError::Step { step, .. } => Some(*step),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SpawnError>;
