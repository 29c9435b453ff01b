use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::blocklist::{BlockSet, Decision};
use crate::config::{Config, UpstreamPorts};
use crate::error::{ProxyError, Result};
use crate::registry::{AddressLease, ConnectionRegistry};
use crate::relay::{relay_get, relay_tunnel};
use crate::request::{read_request, Method};
use crate::stats::Stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accepted,
    Classifying,
    Blocked,
    RelayingGet,
    Tunneling,
    Closed,
}

/// Everything a session needs besides its own socket.
#[derive(Clone)]
struct SessionContext {
    blocklist: Arc<BlockSet>,
    upstream: UpstreamPorts,
    stats: Stats,
    shutdown: CancellationToken,
}

/// One accepted client connection. The socket closes when the session drops.
struct Session {
    client: TcpStream,
    addr: SocketAddr,
    state: SessionState,
    _lease: AddressLease,
}

impl Session {
    fn new(client: TcpStream, addr: SocketAddr, lease: AddressLease) -> Self {
        Self {
            client,
            addr,
            state: SessionState::Accepted,
            _lease: lease,
        }
    }

    fn transition(&mut self, next: SessionState) {
        trace!("{}: {:?} -> {:?}", self.addr, self.state, next);
        self.state = next;
    }

    async fn run(mut self, ctx: SessionContext) {
        let _guard = ctx.stats.session_guard();
        let result = self.serve(&ctx).await;
        self.transition(SessionState::Closed);

        if let Err(e) = result {
            if matches!(e, ProxyError::UpstreamConnect { .. }) {
                ctx.stats.inc_failed();
            }
            if e.is_quiet() {
                debug!("Error handling client {}: {}", self.addr, e);
            } else {
                warn!("Error handling client {}: {}", self.addr, e);
            }
        }
    }

    async fn serve(&mut self, ctx: &SessionContext) -> Result<()> {
        self.transition(SessionState::Classifying);
        let Some(request) = read_request(&mut self.client).await? else {
            return Ok(());
        };

        if ctx.blocklist.decide(&request.host, self.addr) == Decision::Blocked {
            self.transition(SessionState::Blocked);
            ctx.stats.inc_blocked();
            return Ok(());
        }

        match request.method {
            Method::Get => {
                self.transition(SessionState::RelayingGet);
                relay_get(
                    &mut self.client,
                    &request.raw,
                    &request.host,
                    ctx.upstream.http_port,
                    &ctx.shutdown,
                    &ctx.stats,
                )
                .await
            }
            Method::Connect => {
                self.transition(SessionState::Tunneling);
                relay_tunnel(
                    &mut self.client,
                    &request.host,
                    ctx.upstream.tunnel_port,
                    &ctx.shutdown,
                    &ctx.stats,
                )
                .await
            }
            Method::Other(ref method) => {
                debug!("Unsupported method {} from {}, closing", method, self.addr);
                Ok(())
            }
        }
    }
}

/// Listening proxy. Binding and serving are split so callers learn about bind
/// failures before the accept loop exists.
pub struct ProxyServer {
    listener: TcpListener,
    registry: ConnectionRegistry,
    ctx: SessionContext,
}

impl ProxyServer {
    pub async fn bind(config: &Config, blocklist: Arc<BlockSet>, stats: Stats) -> Result<Self> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ProxyError::ListenerStartup {
                addr: addr.clone(),
                source,
            })?;

        Ok(Self {
            listener,
            registry: ConnectionRegistry::new(config.max_users),
            ctx: SessionContext {
                blocklist,
                upstream: config.upstream,
                stats,
                shutdown: CancellationToken::new(),
            },
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Accepts until `shutdown` is cancelled. Running sessions observe the same token.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        self.ctx.shutdown = shutdown.clone();
        info!("Proxy listening on {}", self.local_addr()?);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    let active = self.ctx.stats.active_count();
                    if active > 0 {
                        info!("Stopped accepting, {} sessions still draining", active);
                    }
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.dispatch(stream, addr),
                    Err(e) => error!("Failed to accept connection: {}", e),
                }
            }
        }

        Ok(())
    }

    fn dispatch(&self, stream: TcpStream, addr: SocketAddr) {
        let Some(lease) = self.registry.admit(addr.ip()) else {
            self.ctx.stats.inc_rejected();
            debug!(
                "Capacity of {} addresses reached, closing {}",
                self.registry.capacity(),
                addr
            );
            return;
        };

        let session = Session::new(stream, addr, lease);
        tokio::spawn(session.run(self.ctx.clone()));
    }
}
