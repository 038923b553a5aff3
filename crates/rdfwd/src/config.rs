//! `rdfwd-host` configuration: TOML file + CLI overrides.
//!
//! Defaults are baked into `#[serde(default = "...")]` functions, CLI
//! flags (via `clap::Parser` in `main.rs`) take precedence over file
//! values, and `~` expansion for file paths goes through the `dirs`
//! crate. The `Forwarder` itself has no knowledge of this file —
//! `rdfwd-host` reads it once at startup and calls
//! `associate_remote`/`associate_local` per configured rule.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub forward: ForwardSection,
}

/// `[agent]` section: how to reach the guest agent's control channel.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_agent_addr")]
    pub addr: String,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            addr: default_agent_addr(),
        }
    }
}

/// `[forward]` section: association rules to apply at startup.
///
/// ```toml
/// [forward]
/// remote = ["5000:localhost:5000"]
/// local = ["127.0.0.1:7000:echo.host:9000"]
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ForwardSection {
    /// `associate_remote` rule strings, applied in order at startup.
    #[serde(default)]
    pub remote: Vec<String>,
    /// `associate_local` rule strings, applied in order at startup.
    #[serde(default)]
    pub local: Vec<String>,
}

fn default_agent_addr() -> String {
    "127.0.0.1:9900".to_string()
}

/// Resolved host configuration (CLI overrides applied).
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Address to connect to for the agent control channel.
    pub agent_addr: String,
    /// `associate_remote` rules to apply at startup.
    pub remote_rules: Vec<String>,
    /// `associate_local` rules to apply at startup.
    pub local_rules: Vec<String>,
}

impl HostConfig {
    /// Load configuration from a TOML file, then apply CLI overrides.
    ///
    /// If `config_path` points to a file that does not exist, defaults are
    /// used silently. `cli_agent_addr`, when `Some`, takes precedence over
    /// the file's `[agent] addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or
    /// contains invalid TOML.
    pub fn load(
        config_path: Option<&Path>,
        cli_agent_addr: Option<&str>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let file_config = if let Some(path) = config_path {
            let expanded = expand_tilde(path);
            if expanded.exists() {
                info!(path = %expanded.display(), "loading config file");
                let content = std::fs::read_to_string(&expanded)?;
                toml::from_str::<ConfigFile>(&content)
                    .map_err(|e| format!("config parse error: {e}"))?
            } else {
                info!(path = %expanded.display(), "config file not found, using defaults");
                ConfigFile::default()
            }
        } else {
            ConfigFile::default()
        };

        let agent_addr = cli_agent_addr
            .map(|s| s.to_string())
            .unwrap_or(file_config.agent.addr);

        Ok(Self {
            agent_addr,
            remote_rules: file_config.forward.remote,
            local_rules: file_config.forward.local,
        })
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = HostConfig::load(Some(Path::new("/nonexistent/rdfwd.toml")), None).unwrap();
        assert_eq!(cfg.agent_addr, "127.0.0.1:9900");
        assert!(cfg.remote_rules.is_empty());
        assert!(cfg.local_rules.is_empty());
    }

    #[test]
    fn cli_override_takes_precedence() {
        let cfg = HostConfig::load(
            Some(Path::new("/nonexistent/rdfwd.toml")),
            Some("10.0.0.1:1234"),
        )
        .unwrap();
        assert_eq!(cfg.agent_addr, "10.0.0.1:1234");
    }
}
