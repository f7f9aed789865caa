//! Persisted client configuration.
//!
//! `GlobalConfig` lives at `<user-config-dir>/godig/config.yaml` (mode 0600, directory 0755) and
//! holds the user's API key and default server address. `TunnelConfig` is optional, per-working-
//! directory state at `./godig-tunnel.yaml` that keeps the tunnel ID and bearer stable across
//! client restarts when `--persist-config` is set.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const GLOBAL_CONFIG_DIR: &str = "godig";
const GLOBAL_CONFIG_FILE: &str = "config.yaml";
const TUNNEL_CONFIG_FILE: &str = "godig-tunnel.yaml";

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

impl GlobalConfig {
    pub fn path() -> anyhow::Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("could not determine user config directory"))?
            .join(GLOBAL_CONFIG_DIR);
        Ok(dir.join(GLOBAL_CONFIG_FILE))
    }

    pub fn load() -> anyhow::Result<Self> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(serde_yaml::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::path()?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
            set_permissions(dir, 0o755)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(&path, yaml)?;
        set_permissions(&path, 0o600)?;
        Ok(())
    }

    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "api-key" => self.api_key = Some(value.to_string()),
            "server" => self.server = Some(value.to_string()),
            other => anyhow::bail!("unknown config key: {other} (valid keys: api-key, server)"),
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        match key {
            "api-key" => Ok(self.api_key.clone()),
            "server" => Ok(self.server.clone()),
            other => anyhow::bail!("unknown config key: {other} (valid keys: api-key, server)"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TunnelConfig {
    pub tunnel_id: String,
    pub bearer: String,
}

impl TunnelConfig {
    fn path() -> PathBuf {
        PathBuf::from(TUNNEL_CONFIG_FILE)
    }

    pub fn load() -> anyhow::Result<Option<Self>> {
        Self::load_from(&Self::path())
    }

    fn load_from(path: &Path) -> anyhow::Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(Some(serde_yaml::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::path())
    }

    fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        set_permissions(path, 0o600)?;
        Ok(())
    }
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) -> anyhow::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_config_round_trips_through_yaml() {
        let cfg = GlobalConfig { api_key: Some("secret".into()), server: Some("example.com:8080".into()) };
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: GlobalConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(cfg, parsed);
    }

    #[test]
    fn global_config_set_rejects_unknown_key() {
        let mut cfg = GlobalConfig::default();
        assert!(cfg.set("bogus", "x").is_err());
    }

    #[test]
    fn global_config_set_and_get_round_trip() {
        let mut cfg = GlobalConfig::default();
        cfg.set("api-key", "tok123").unwrap();
        assert_eq!(cfg.get("api-key").unwrap(), Some("tok123".to_string()));
    }

    #[test]
    fn tunnel_config_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TUNNEL_CONFIG_FILE);
        let cfg = TunnelConfig { tunnel_id: "abcde".into(), bearer: "tok123".into() };
        cfg.save_to(&path).unwrap();
        let loaded = TunnelConfig::load_from(&path).unwrap().unwrap();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn tunnel_config_absent_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.yaml");
        assert!(TunnelConfig::load_from(&path).unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn tunnel_config_file_has_restricted_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TUNNEL_CONFIG_FILE);
        let cfg = TunnelConfig { tunnel_id: "abcde".into(), bearer: "tok123".into() };
        cfg.save_to(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
