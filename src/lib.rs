//! # void-proxy
//!
//! Forward proxy for plain HTTP `GET` and tunneled `CONNECT` traffic that drops
//! requests for blocklisted hostnames.
//!
//! ```text
//! [Client] → accept → registry admission ─ full ─→ close
//!                          │
//!                          └─ session task → classify (one read)
//!                                              │
//!                                              ├── blocked → close
//!                                              ├── GET     → origin:80, stream response
//!                                              └── CONNECT → "200 Connection Established",
//!                                                            origin:443, blind relay
//! ```

pub mod blocklist;
pub mod config;
pub mod error;
pub mod registry;
pub mod relay;
pub mod request;
pub mod server;
pub mod stats;

pub use blocklist::{BlockSet, Decision};
pub use config::{Config, UpstreamPorts};
pub use error::{ConfigError, ProxyError};
pub use registry::{AddressLease, ConnectionRegistry};
pub use request::{ClientRequest, Method};
pub use server::{ProxyServer, SessionState};
pub use stats::{Stats, StatsSnapshot};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
