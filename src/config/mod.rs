mod profile;

pub use profile::ProfileConfig;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths::Paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// File this config was read from, or would be written to (not serialized)
    #[serde(skip)]
    pub path: PathBuf,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Named attribute sets for `posixkit run --profile`
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from `explicit` if given, otherwise from the XDG location.
    ///
    /// A missing file is not an error: defaults are returned with `path`
    /// pointing at where `config init` would create it.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_from(&Self::resolve_path(explicit)?)
    }

    /// `explicit` with `~` expanded, or the XDG location.
    pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
        match explicit {
            Some(path) => Ok(PathBuf::from(
                shellexpand::tilde(&path.to_string_lossy()).into_owned(),
            )),
            None => Self::config_path(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config {
                path: path.to_path_buf(),
                ..Config::default()
            });
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.path = path.to_path_buf();
        Ok(config)
    }

    pub fn config_path() -> Result<PathBuf> {
        let paths = Paths::resolve()?;
        Ok(paths.config_file())
    }

    pub fn profile(&self, name: &str) -> Result<&ProfileConfig> {
        self.profiles.get(name).with_context(|| {
            format!(
                "Unknown profile '{}' (defined: {})",
                name,
                if self.profiles.is_empty() {
                    "none".to_string()
                } else {
                    self.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
                }
            )
        })
    }

    /// Write the commented template to `self.path`.
    pub fn save_with_template(&self, force: bool) -> Result<()> {
        if self.path.exists() && !force {
            anyhow::bail!(
                "Config file already exists at {} (use --force to overwrite)",
                self.path.display()
            );
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&self.path, DEFAULT_CONFIG_TEMPLATE)?;
        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Result<String> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["logging", "level"] => Ok(self.logging.level.clone()),
            ["profiles", name] => Ok(toml::to_string_pretty(self.profile(name)?)?),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
    }
}

/// Config template with helpful comments (written by `posixkit config init`)
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# posixkit configuration

[logging]
# error | warn | info | debug | trace (RUST_LOG overrides)
level = "info"

# Named attribute sets, used with `posixkit run --profile NAME -- PROGRAM`.
# Command-line flags override the profile field by field.
#
# [profiles.daemon]
# setsid = true                         # start a new session
# cwd = "~/srv"                         # working directory (~ expands)
# sigmask = []                          # unblock every signal
# sigdefault = ["SIGPIPE", "SIGHUP"]    # reset these to SIG_DFL
#
# [profiles.console]
# setsid = true
# ctty = "/dev/tty2"                    # acquire as controlling terminal
#
# [profiles.nobody]
# pgroup = 0                            # own process group
# user = "nobody"                       # effective uid (or uid = 65534)
# group = "nogroup"                     # effective gid (or gid = 65534)
# reset_ids = false                     # true: effective ids back to real ids
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.path, path);
        assert_eq!(config.logging.level, "info");
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn parses_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[logging]
level = "debug"

[profiles.daemon]
setsid = true
cwd = "/srv"
sigdefault = ["SIGPIPE", "hup"]
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.logging.level, "debug");
        let daemon = config.profile("daemon").unwrap();
        assert!(daemon.setsid);
        assert_eq!(daemon.cwd.as_deref(), Some("/srv"));
        assert_eq!(daemon.sigdefault, vec!["SIGPIPE", "hup"]);
        assert!(daemon.sigmask.is_none());
    }

    #[test]
    fn unknown_profile_lists_known_names() {
        let mut config = Config::default();
        config
            .profiles
            .insert("daemon".to_string(), ProfileConfig::default());
        let err = config.profile("nope").unwrap_err().to_string();
        assert!(err.contains("nope"));
        assert!(err.contains("daemon"));
    }

    #[test]
    fn unknown_profile_field_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[profiles.bad]\nsetsidd = true\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn template_round_trips_and_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            path: dir.path().join("nested").join("config.toml"),
            ..Config::default()
        };
        config.save_with_template(false).unwrap();
        assert!(config.save_with_template(false).is_err());
        config.save_with_template(true).unwrap();

        let loaded = Config::load_from(&config.path).unwrap();
        assert_eq!(loaded.logging.level, "info");
        assert!(loaded.profiles.is_empty());
    }

    #[test]
    fn get_value_keys() {
        let config = Config::default();
        assert_eq!(config.get_value("logging.level").unwrap(), "info");
        assert!(config.get_value("logging.file").is_err());
        assert!(config.get_value("profiles.missing").is_err());
    }
}
