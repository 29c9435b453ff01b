use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Client I/O error: {0}")]
    ClientIo(#[source] std::io::Error),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Failed to connect to {host}:{port}: {source}")]
    UpstreamConnect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start listener on {addr}: {source}")]
    ListenerStartup {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// Client hangups and unreachable origins are routine; they log at debug.
    pub fn is_quiet(&self) -> bool {
        matches!(self, ProxyError::ClientIo(_) | ProxyError::UpstreamConnect { .. })
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ProxyError>;
