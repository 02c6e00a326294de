use anyhow::{Context, Result};
use nix::unistd::{Gid, Group, Pid, Uid, User};
use serde::{Deserialize, Serialize};

use crate::spawn::SpawnAttr;
use crate::spawn::signals::parse_sigset;

/// One named set of spawn attributes, as written in `[profiles.<name>]`.
///
/// Unset fields leave the corresponding attribute off. `sigmask = []` is not
/// the same as no `sigmask`: the former unblocks everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctty: Option<String>,

    #[serde(default)]
    pub setsid: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pgroup: Option<i32>,

    #[serde(default)]
    pub reset_ids: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,

    /// User name, resolved to a uid at launch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Group name, resolved to a gid at launch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sigmask: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sigdefault: Vec<String>,
}

impl ProfileConfig {
    /// Layer `top` over `self`; every field `top` sets wins.
    pub fn overlay(&self, top: &ProfileConfig) -> ProfileConfig {
        ProfileConfig {
            cwd: top.cwd.clone().or_else(|| self.cwd.clone()),
            ctty: top.ctty.clone().or_else(|| self.ctty.clone()),
            setsid: top.setsid || self.setsid,
            pgroup: top.pgroup.or(self.pgroup),
            reset_ids: top.reset_ids || self.reset_ids,
            uid: top.uid.or(self.uid),
            gid: top.gid.or(self.gid),
            user: top.user.clone().or_else(|| self.user.clone()),
            group: top.group.clone().or_else(|| self.group.clone()),
            sigmask: top.sigmask.clone().or_else(|| self.sigmask.clone()),
            sigdefault: if top.sigdefault.is_empty() {
                self.sigdefault.clone()
            } else {
                top.sigdefault.clone()
            },
        }
    }

    /// Build the spawn attributes this profile describes.
    ///
    /// Names (users, groups, signals) are resolved here, in the parent, so the
    /// child never has to consult the user database.
    pub fn to_attr(&self) -> Result<SpawnAttr> {
        let mut attr = SpawnAttr::new();

        if let Some(names) = &self.sigmask {
            let names: Vec<&str> = names
                .iter()
                .map(String::as_str)
                .filter(|n| !n.is_empty())
                .collect();
            attr.set_sigmask(parse_sigset(&names).context("Invalid sigmask")?);
        }
        if !self.sigdefault.is_empty() {
            attr.set_sigdefault(parse_sigset(&self.sigdefault).context("Invalid sigdefault")?);
        }
        if let Some(pgroup) = self.pgroup {
            if pgroup < 0 {
                anyhow::bail!("Process group must not be negative: {}", pgroup);
            }
            attr.set_pgroup(Pid::from_raw(pgroup));
        }
        if self.setsid {
            attr.set_sid();
        }
        if let Some(ctty) = &self.ctty {
            attr.set_ctty(&*shellexpand::tilde(ctty))?;
        }
        if let Some(cwd) = &self.cwd {
            attr.set_cwd(&*shellexpand::tilde(cwd))?;
        }
        if self.reset_ids {
            attr.set_reset_ids();
        }
        if let Some(uid) = self.resolve_uid()? {
            attr.set_uid(uid);
        }
        if let Some(gid) = self.resolve_gid()? {
            attr.set_gid(gid);
        }

        if attr.flags().has_identity_conflict() {
            anyhow::bail!("reset_ids cannot be combined with uid/user or gid/group");
        }

        Ok(attr)
    }

    fn resolve_uid(&self) -> Result<Option<Uid>> {
        match (self.uid, &self.user) {
            (Some(_), Some(_)) => anyhow::bail!("Set either uid or user, not both"),
            (Some(uid), None) => Ok(Some(Uid::from_raw(uid))),
            (None, Some(name)) => {
                let user = User::from_name(name)
                    .with_context(|| format!("Failed to look up user '{}'", name))?
                    .with_context(|| format!("No such user: {}", name))?;
                Ok(Some(user.uid))
            }
            (None, None) => Ok(None),
        }
    }

    fn resolve_gid(&self) -> Result<Option<Gid>> {
        match (self.gid, &self.group) {
            (Some(_), Some(_)) => anyhow::bail!("Set either gid or group, not both"),
            (Some(gid), None) => Ok(Some(Gid::from_raw(gid))),
            (None, Some(name)) => {
                let group = Group::from_name(name)
                    .with_context(|| format!("Failed to look up group '{}'", name))?
                    .with_context(|| format!("No such group: {}", name))?;
                Ok(Some(group.gid))
            }
            (None, None) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spawn::SpawnFlags;
    use nix::sys::signal::Signal;

    #[test]
    fn empty_profile_sets_nothing() {
        let attr = ProfileConfig::default().to_attr().unwrap();
        assert!(attr.flags().is_empty());
    }

    #[test]
    fn fields_map_to_flags() {
        let profile = ProfileConfig {
            cwd: Some("/srv".to_string()),
            setsid: true,
            pgroup: Some(0),
            sigdefault: vec!["SIGPIPE".to_string()],
            ..Default::default()
        };
        let attr = profile.to_attr().unwrap();
        assert_eq!(
            attr.flags(),
            SpawnFlags::SETCWD
                | SpawnFlags::SETSID
                | SpawnFlags::SETPGROUP
                | SpawnFlags::SETSIGDEFAULT
        );
        assert_eq!(attr.cwd().unwrap().to_bytes(), b"/srv");
        assert!(attr.sigdefault().contains(Signal::SIGPIPE));
    }

    #[test]
    fn empty_sigmask_still_sets_the_mask() {
        let profile = ProfileConfig {
            sigmask: Some(Vec::new()),
            ..Default::default()
        };
        let attr = profile.to_attr().unwrap();
        assert_eq!(attr.flags(), SpawnFlags::SETSIGMASK);
        assert!(!attr.sigmask().contains(Signal::SIGINT));
    }

    #[test]
    fn root_user_resolves_to_zero() {
        let profile = ProfileConfig {
            user: Some("root".to_string()),
            ..Default::default()
        };
        let attr = profile.to_attr().unwrap();
        assert_eq!(attr.uid(), Some(Uid::from_raw(0)));
    }

    #[test]
    fn conflicting_fields_are_rejected() {
        let both = ProfileConfig {
            uid: Some(1),
            user: Some("root".to_string()),
            ..Default::default()
        };
        assert!(both.to_attr().is_err());

        let reset_and_set = ProfileConfig {
            reset_ids: true,
            gid: Some(0),
            ..Default::default()
        };
        assert!(reset_and_set.to_attr().is_err());

        let negative = ProfileConfig {
            pgroup: Some(-2),
            ..Default::default()
        };
        assert!(negative.to_attr().is_err());

        let bad_signal = ProfileConfig {
            sigdefault: vec!["SIGNOPE".to_string()],
            ..Default::default()
        };
        assert!(bad_signal.to_attr().is_err());
    }

    #[test]
    fn overlay_prefers_top_fields() {
        let base = ProfileConfig {
            cwd: Some("/base".to_string()),
            setsid: true,
            sigdefault: vec!["SIGHUP".to_string()],
            ..Default::default()
        };
        let top = ProfileConfig {
            cwd: Some("/top".to_string()),
            uid: Some(7),
            ..Default::default()
        };
        let merged = base.overlay(&top);
        assert_eq!(merged.cwd.as_deref(), Some("/top"));
        assert!(merged.setsid);
        assert_eq!(merged.uid, Some(7));
        assert_eq!(merged.sigdefault, vec!["SIGHUP"]);
    }
}
