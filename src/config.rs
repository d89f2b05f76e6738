use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level dashboard config, loaded from TOML.
///
/// Every field is optional; command-line flags and environment variables
/// take precedence, and built-in defaults fill whatever remains.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Gateway connection section.
    pub gateway: Option<GatewaySection>,
    /// Dashboard authentication section.
    pub auth: Option<AuthSection>,
    /// Snapshot broadcast interval in milliseconds.
    pub poll_interval_ms: Option<u64>,
    /// Session cache TTL in milliseconds.
    pub cache_ttl_ms: Option<u64>,
    /// Directory for the JSON task/feed store.
    pub data_dir: Option<PathBuf>,
}

/// Gateway connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewaySection {
    /// Base URL of the gateway control plane.
    pub url: Option<String>,
    /// API key sent on every gateway request.
    pub api_key: Option<String>,
}

/// Dashboard authentication settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthSection {
    /// Login password.
    pub password: Option<String>,
    /// Secret used to sign dashboard JWTs.
    pub jwt_secret: Option<String>,
}

/// Errors that can occur when loading or saving config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {0}: {1}")]
    ReadFailed(PathBuf, #[source] std::io::Error),
    #[error("failed to parse config {0}: {1}")]
    ParseFailed(PathBuf, #[source] toml::de::Error),
    #[error("failed to write config {0}: {1}")]
    WriteFailed(PathBuf, #[source] std::io::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
}

impl DashboardConfig {
    /// Load config from a TOML file path. Returns None if the file doesn't
    /// exist.
    ///
    /// Checks file permissions and warns if world-readable -- the file may
    /// carry the gateway API key and the JWT secret.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        check_config_permissions(path);

        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?;
        Ok(Some(config))
    }

    /// Save config to a TOML file path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))
    }
}

/// Default location of the config file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("opsdeck")
        .join("config.toml")
}

/// Default location of the JSON store.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("opsdeck")
}

/// Check file permissions on a config file and warn if world-readable.
///
/// On Unix, checks `st_mode & 0o004` (world-readable bit). If set, logs a
/// warning because the config file may contain secrets.
#[cfg(unix)]
pub fn check_config_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return, // File doesn't exist or can't be read; nothing to warn about.
    };

    let mode = metadata.permissions().mode();
    if is_world_readable(mode) {
        tracing::warn!(
            "config file {} is world-readable (mode {:o}). \
             It may contain secrets -- consider restricting permissions to 600.",
            path.display(),
            mode & 0o7777,
        );
    }
}

/// No-op on non-Unix platforms.
#[cfg(not(unix))]
pub fn check_config_permissions(_path: &Path) {}

/// Returns true if the given file mode has the world-readable bit set.
///
/// Pure helper for testing; does NOT read the filesystem.
#[cfg(unix)]
pub fn is_world_readable(mode: u32) -> bool {
    mode & 0o004 != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
            [gateway]
            url = "http://10.0.1.10:3002"
        "#;
        let config: DashboardConfig = toml::from_str(toml).unwrap();
        assert_eq!(
            config.gateway.unwrap().url.as_deref(),
            Some("http://10.0.1.10:3002")
        );
        assert!(config.auth.is_none());
        assert!(config.poll_interval_ms.is_none());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            poll_interval_ms = 2500
            cache_ttl_ms = 10000
            data_dir = "/var/lib/opsdeck"

            [gateway]
            url = "http://10.0.1.10:3002"
            api_key = "gw-key"

            [auth]
            password = "hunter2"
            jwt_secret = "signing-secret"
        "#;
        let config: DashboardConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.poll_interval_ms, Some(2500));
        assert_eq!(config.cache_ttl_ms, Some(10_000));
        let gateway = config.gateway.unwrap();
        assert_eq!(gateway.api_key.as_deref(), Some("gw-key"));
        let auth = config.auth.unwrap();
        assert_eq!(auth.password.as_deref(), Some("hunter2"));
        assert_eq!(auth.jwt_secret.as_deref(), Some("signing-secret"));
    }

    #[test]
    fn parse_empty_config() {
        let config: DashboardConfig = toml::from_str("").unwrap();
        assert!(config.gateway.is_none());
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn load_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let result = DashboardConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn serialize_roundtrip() {
        let config = DashboardConfig {
            gateway: Some(GatewaySection {
                url: Some("http://10.0.1.10:3002".into()),
                api_key: Some("key".into()),
            }),
            auth: Some(AuthSection {
                password: Some("pw".into()),
                jwt_secret: None,
            }),
            poll_interval_ms: Some(5000),
            cache_ttl_ms: None,
            data_dir: None,
        };
        let serialized = toml::to_string_pretty(&config).unwrap();
        let reparsed: DashboardConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(reparsed.poll_interval_ms, Some(5000));
        assert_eq!(reparsed.gateway.unwrap().api_key.as_deref(), Some("key"));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = DashboardConfig {
            cache_ttl_ms: Some(1234),
            ..Default::default()
        };
        config.save(&path).unwrap();
        let loaded = DashboardConfig::load(&path).unwrap().unwrap();
        assert_eq!(loaded.cache_ttl_ms, Some(1234));
    }

    #[cfg(unix)]
    #[test]
    fn is_world_readable_detects_644() {
        assert!(is_world_readable(0o644));
    }

    #[cfg(unix)]
    #[test]
    fn is_world_readable_rejects_600() {
        assert!(!is_world_readable(0o600));
    }

    #[cfg(unix)]
    #[test]
    fn check_permissions_does_not_panic() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "# test").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        check_config_permissions(&path);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
        check_config_permissions(&path);
    }
}
