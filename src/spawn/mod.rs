//! Spawn attributes: configure a child's execution context between fork and exec.
//!
//! A [`SpawnAttr`] records which optional attributes are wanted. Inside the
//! forked child, [`SpawnAttr::apply`] performs them in a fixed order:
//!
//! 1. validate (`RESETIDS` excludes `SETUID`/`SETGID`)
//! 2. signal mask, then signal dispositions
//! 3. process group, session, controlling terminal, working directory
//! 4. identity: reset ids, effective uid, effective gid
//!
//! Identity goes last because the earlier steps may need the privileges it
//! drops. The first failing step aborts the sequence; nothing is rolled back
//! since the child either execs or exits.
//!
//! [`spawn`] wraps the whole fork/apply/exec dance and reports a pre-exec
//! failure back to the parent.

pub mod apply;
pub mod attr;
pub mod error;
pub mod flags;
pub mod launch;
pub mod signals;
#[cfg(test)]
pub(crate) mod testing;

pub use apply::apply_attributes;
pub use attr::SpawnAttr;
pub use error::{Result, SpawnError, Step};
pub use flags::SpawnFlags;
pub use launch::{Program, spawn};
