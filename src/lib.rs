//! posixkit - platform-normalizing POSIX shims with a C ABI
//!
//! This crate provides:
//! - Spawn attributes applied between fork and exec (signal mask and
//!   dispositions, process group, session, controlling terminal, working
//!   directory, effective ids)
//! - A fork/exec launcher that reports pre-exec failures to the parent
//! - Zero-copy sendfile across Linux, FreeBSD and macOS
//! - `extern "C"` entry points for all of the above

#[cfg(not(unix))]
compile_error!("posixkit only supports Unix targets");

pub mod config;
pub mod ffi;
pub mod paths;
pub mod sendfile;
pub mod spawn;

pub use config::Config;
pub use spawn::{Program, SpawnAttr, SpawnError, SpawnFlags, apply_attributes, spawn};
