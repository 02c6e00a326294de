use anyhow::{Context, Result};
use clap::Args;
use nix::errno::Errno;
use nix::sys::wait::{WaitStatus, waitpid};
use tracing::{debug, info};

use posixkit::config::ProfileConfig;
use posixkit::{Config, Program, spawn};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Start from a named profile in the config file
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Working directory for the child
    #[arg(long)]
    pub cwd: Option<String>,

    /// Terminal to acquire as controlling terminal (needs --setsid)
    #[arg(long)]
    pub ctty: Option<String>,

    /// Start a new session
    #[arg(long)]
    pub setsid: bool,

    /// Join process group PGID (0: lead a new group)
    #[arg(long, value_name = "PGID")]
    pub pgroup: Option<i32>,

    /// Reset effective ids to the real ids
    #[arg(long, conflicts_with_all = ["uid", "gid", "user", "group"])]
    pub reset_ids: bool,

    /// Effective user id
    #[arg(long, conflicts_with = "user")]
    pub uid: Option<u32>,

    /// Effective group id
    #[arg(long, conflicts_with = "group")]
    pub gid: Option<u32>,

    /// Effective user, by name
    #[arg(long)]
    pub user: Option<String>,

    /// Effective group, by name
    #[arg(long)]
    pub group: Option<String>,

    /// Signals to block, comma separated ('' unblocks all)
    #[arg(long, value_delimiter = ',', value_name = "SIGNALS")]
    pub sigmask: Option<Vec<String>>,

    /// Signals to reset to their default action, comma separated
    #[arg(long, value_delimiter = ',', value_name = "SIGNALS")]
    pub sigdefault: Vec<String>,

    /// Start the child with an empty environment
    #[arg(long)]
    pub clear_env: bool,

    /// Program and arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl RunArgs {
    fn overrides(&self) -> ProfileConfig {
        ProfileConfig {
            cwd: self.cwd.clone(),
            ctty: self.ctty.clone(),
            setsid: self.setsid,
            pgroup: self.pgroup,
            reset_ids: self.reset_ids,
            uid: self.uid,
            gid: self.gid,
            user: self.user.clone(),
            group: self.group.clone(),
            sigmask: self.sigmask.clone(),
            sigdefault: self.sigdefault.clone(),
        }
    }
}

/// Launch the command and wait for it. Returns the exit code to propagate.
pub fn run(args: RunArgs, config: &Config) -> Result<i32> {
    let base = match &args.profile {
        Some(name) => config.profile(name)?.clone(),
        None => ProfileConfig::default(),
    };
    let attr = base.overlay(&args.overrides()).to_attr()?;
    debug!(flags = ?attr.flags(), "Spawn attributes");

    let (name, rest) = args
        .command
        .split_first()
        .context("No program given")?;
    let mut program = Program::new(name)?;
    program.search_path(true).args(rest)?;
    if args.clear_env {
        program.env(std::iter::empty::<(String, String)>())?;
    }

    let pid = spawn(&program, Some(&attr)).with_context(|| format!("Failed to launch {}", name))?;
    info!(pid = pid.as_raw(), program = %name, "Launched");

    let status = loop {
        match waitpid(pid, None) {
            Err(Errno::EINTR) => continue,
            other => break other.with_context(|| format!("Failed to wait for {}", name))?,
        }
    };
    debug!(?status, "Child finished");

    Ok(match status {
        WaitStatus::Exited(_, code) => code,
        WaitStatus::Signaled(_, signal, _) => 128 + signal as i32,
        _ => 1,
    })
}
