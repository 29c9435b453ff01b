use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Proxy settings, read from a TOML file.
///
/// ```toml
/// host = "127.0.0.1"
/// port = 8080
/// max_users = 10
/// colorful = true
/// exclude_domains = []
/// blocklist_dir = "blacklists"
///
/// [upstream]
/// http_port = 80
/// tunnel_port = 443
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Distinct client addresses admitted at the same time.
    pub max_users: usize,
    /// ANSI colors in console output.
    pub colorful: bool,
    /// Loaded and reported at startup. Block decisions never consult it.
    pub exclude_domains: Vec<String>,
    /// Every file in this directory is read as a blocklist.
    pub blocklist_dir: PathBuf,
    pub upstream: UpstreamPorts,
}

/// Ports used for outbound connections. The CONNECT authority's own port is never used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamPorts {
    pub http_port: u16,
    pub tunnel_port: u16,
}

impl Default for UpstreamPorts {
    fn default() -> Self {
        Self {
            http_port: 80,
            tunnel_port: 443,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_users: 10,
            colorful: true,
            exclude_domains: Vec::new(),
            blocklist_dir: PathBuf::from("blacklists"),
            upstream: UpstreamPorts::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        if self.max_users == 0 {
            return Err(ConfigError::Invalid("max_users must be at least 1".into()));
        }
        if self.upstream.http_port == 0 || self.upstream.tunnel_port == 0 {
            return Err(ConfigError::Invalid("upstream ports must be non-zero".into()));
        }
        Ok(())
    }

    /// `host:port` suitable for binding, with IPv6 literals bracketed.
    pub fn listen_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_when_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.upstream.http_port, 80);
        assert_eq!(config.upstream.tunnel_port, 443);
    }

    #[test]
    fn test_full_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
host = "0.0.0.0"
port = 3128
max_users = 4
colorful = false
exclude_domains = ["example.org", "example.net"]
blocklist_dir = "/etc/void-proxy/lists"

[upstream]
tunnel_port = 8443
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3128);
        assert_eq!(config.max_users, 4);
        assert!(!config.colorful);
        assert_eq!(config.exclude_domains, vec!["example.org", "example.net"]);
        assert_eq!(config.blocklist_dir, PathBuf::from("/etc/void-proxy/lists"));
        assert_eq!(config.upstream.http_port, 80);
        assert_eq!(config.upstream.tunnel_port, 8443);
    }

    #[test]
    fn test_type_errors_rejected() {
        assert!(matches!(
            Config::from_toml("port = \"eighty\""),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            Config::from_toml("max_user = 3"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            Config::from_toml("max_users = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("host = \"  \""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("[upstream]\nhttp_port = 0"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load(Path::new("/nonexistent/void-proxy.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_listen_addr() {
        let mut config = Config::default();
        assert_eq!(config.listen_addr(), "127.0.0.1:8080");
        config.host = "::1".into();
        assert_eq!(config.listen_addr(), "[::1]:8080");
    }
}
