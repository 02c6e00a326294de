//! XDG-compliant location of the config file.
//!
//! Resolution order:
//! 1. POSIXKIT_CONFIG_DIR (absolute paths only)
//! 2. XDG_CONFIG_HOME via `etcetera`
//! 3. Platform default (~/.config)

use anyhow::Result;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    /// Config directory: config.toml lives here
    pub config_dir: PathBuf,
}

impl Paths {
    /// Resolve paths using real environment variables.
    pub fn resolve() -> Result<Self> {
        Self::resolve_with_env(|key| std::env::var(key))
    }

    /// Resolve paths with a custom env var lookup (for testing).
    pub fn resolve_with_env<F>(env_fn: F) -> Result<Self>
    where
        F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
    {
        use etcetera::BaseStrategy;

        let config_dir = match env_fn("POSIXKIT_CONFIG_DIR")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .filter(|p| p.is_absolute()) // XDG spec: ignore relative paths
        {
            Some(dir) => dir,
            None => {
                let strategy = etcetera::choose_base_strategy()
                    .map_err(|e| anyhow::anyhow!("Failed to determine base directories: {}", e))?;
                strategy.config_dir().join("posixkit")
            }
        };

        Ok(Self { config_dir })
    }

    /// Config file: config_dir/config.toml
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env::VarError;

    #[test]
    fn env_override_wins() {
        let paths = Paths::resolve_with_env(|key| match key {
            "POSIXKIT_CONFIG_DIR" => Ok("/etc/posixkit".to_string()),
            _ => Err(VarError::NotPresent),
        })
        .unwrap();
        assert_eq!(paths.config_file(), PathBuf::from("/etc/posixkit/config.toml"));
    }

    #[test]
    fn relative_override_is_ignored() {
        let paths = Paths::resolve_with_env(|key| match key {
            "POSIXKIT_CONFIG_DIR" => Ok("relative/dir".to_string()),
            _ => Err(VarError::NotPresent),
        })
        .unwrap();
        assert!(paths.config_dir.is_absolute());
        assert!(paths.config_dir.ends_with("posixkit"));
    }
}
