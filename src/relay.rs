//! Outbound relays: one-shot GET forwarding and blind CONNECT tunnels.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ProxyError, Result};
use crate::stats::Stats;

pub const GET_BUFFER_SIZE: usize = 16384;
pub const TUNNEL_BUFFER_SIZE: usize = 4096;
pub const CONNECT_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

async fn connect_upstream(host: &str, port: u16) -> Result<TcpStream> {
    TcpStream::connect((host, port))
        .await
        .map_err(|source| ProxyError::UpstreamConnect {
            host: host.to_string(),
            port,
            source,
        })
}

/// Forwards the captured request to `(host, port)` and streams the response back
/// until the origin closes or shutdown is signalled.
pub async fn relay_get<C>(
    client: &mut C,
    request: &[u8],
    host: &str,
    port: u16,
    shutdown: &CancellationToken,
    stats: &Stats,
) -> Result<()>
where
    C: AsyncWrite + Unpin,
{
    let mut target = connect_upstream(host, port).await?;
    target.write_all(request).await?;
    stats.add_out(request.len() as u64);

    let mut buffer = vec![0u8; GET_BUFFER_SIZE];
    loop {
        let n = tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                debug!("GET relay to {} stopped by shutdown", host);
                break;
            }
            read = target.read(&mut buffer) => read?,
        };
        if n == 0 {
            break;
        }
        client.write_all(&buffer[..n]).await.map_err(ProxyError::ClientIo)?;
        stats.add_in(n as u64);
    }

    Ok(())
}

/// Tells the client the tunnel is up, then connects to `(host, port)` and pumps
/// bytes both ways.
///
/// The success line goes out before the connect attempt. A failed connect leaves
/// the client with that line and nothing else.
pub async fn relay_tunnel<C>(
    client: &mut C,
    host: &str,
    port: u16,
    shutdown: &CancellationToken,
    stats: &Stats,
) -> Result<()>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    client
        .write_all(CONNECT_ESTABLISHED)
        .await
        .map_err(ProxyError::ClientIo)?;
    client.flush().await.map_err(ProxyError::ClientIo)?;

    let mut target = connect_upstream(host, port).await?;
    pump(client, &mut target, shutdown, stats).await
}

/// Readiness-multiplexed copy loop. Ends on EOF from either side or on shutdown.
pub async fn pump<C, T>(
    client: &mut C,
    target: &mut T,
    shutdown: &CancellationToken,
    stats: &Stats,
) -> Result<()>
where
    C: AsyncRead + AsyncWrite + Unpin,
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut client_buf = vec![0u8; TUNNEL_BUFFER_SIZE];
    let mut target_buf = vec![0u8; TUNNEL_BUFFER_SIZE];

    let (mut client_rd, mut client_wr) = tokio::io::split(client);
    let (mut target_rd, mut target_wr) = tokio::io::split(target);

    loop {
        // Unbiased: a busy side must not starve the other.
        tokio::select! {
            () = shutdown.cancelled() => {
                debug!("Tunnel stopped by shutdown");
                break;
            }
            read = client_rd.read(&mut client_buf) => {
                let n = read.map_err(ProxyError::ClientIo)?;
                if n == 0 {
                    break;
                }
                target_wr.write_all(&client_buf[..n]).await?;
                stats.add_out(n as u64);
            }
            read = target_rd.read(&mut target_buf) => {
                let n = read?;
                if n == 0 {
                    break;
                }
                client_wr.write_all(&target_buf[..n]).await.map_err(ProxyError::ClientIo)?;
                stats.add_in(n as u64);
            }
        }
    }

    Ok(())
}
