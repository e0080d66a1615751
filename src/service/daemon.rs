// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::net::{TcpStream, UdpSocket};
use tokio::{runtime, signal};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::network::{resolve_host_ip, PacketServer, TcpServer};
use super::echo::{packet_echo, StreamEcho};

use super::{AppError, AppResult, ServeMode, ServerConfig, GLOBAL_CONFIG};

/// Runs the echo service described by a [`ServerConfig`] until Ctrl-C.
#[derive(Debug, Clone, Copy)]
pub struct Daemon {
    config: &'static ServerConfig,
}

impl Daemon {
    /// Uses the configuration stored in [`GLOBAL_CONFIG`].
    pub fn new() -> AppResult<Self> {
        let config = GLOBAL_CONFIG
            .get()
            .ok_or_else(|| AppError::IllegalStateError("global config not set".to_string()))?;
        Ok(Self::with_config(config))
    }

    pub fn with_config(config: &'static ServerConfig) -> Self {
        Daemon { config }
    }

    /// Builds the runtime and blocks the calling thread until shutdown
    /// completes.
    pub fn start(&self) -> AppResult<()> {
        let rt = runtime::Builder::new_multi_thread()
            .worker_threads(self.config.general.worker_threads())
            .thread_name("netserve-worker")
            .enable_all()
            .build()?;
        rt.block_on(self.run())?;
        info!("netserve shutdown complete");
        Ok(())
    }

    pub async fn run(&self) -> AppResult<()> {
        let listen_address = self.listen_address()?;
        let echo = StreamEcho::new(
            self.config.network.read_timeout(),
            self.config.network.write_timeout(),
        );
        let options = self.config.serve.serve_options();

        match self.config.general.mode {
            ServeMode::Tcp => {
                let server = TcpServer::bind_tcp(
                    &listen_address,
                    move |ctx: CancellationToken, conn: TcpStream| async move {
                        echo.handle(ctx, conn).await
                    },
                )
                .await?;
                info!("tcp server binding to {} for listening", server.local_addr());
                serve_until_shutdown(server.serve(options), || server.close()).await
            }
            ServeMode::Udp => {
                let socket = UdpSocket::bind(&listen_address).await?;
                let server = PacketServer::with_buffer_size(
                    socket,
                    |ctx: CancellationToken,
                     socket: Arc<UdpSocket>,
                     peer: SocketAddr,
                     data: BytesMut| packet_echo(ctx, socket, peer, data),
                    self.config.network.recv_buffer_size,
                )?;
                info!("udp server binding to {} for listening", server.local_addr());
                serve_until_shutdown(server.serve(options), || server.close()).await
            }
            #[cfg(unix)]
            ServeMode::Unix => {
                let path = &self.config.network.unix_path;
                let server = crate::network::UnixServer::bind_unix(
                    path,
                    move |ctx: CancellationToken, conn: tokio::net::UnixStream| async move {
                        echo.handle(ctx, conn).await
                    },
                )?;
                info!("unix server binding to {} for listening", path);
                serve_until_shutdown(server.serve(options), || server.close()).await
            }
            #[cfg(not(unix))]
            ServeMode::Unix => Err(AppError::InvalidValue(
                "unix mode is not supported on this platform".to_string(),
            )),
        }
    }

    fn listen_address(&self) -> AppResult<String> {
        let network = &self.config.network;
        if !network.ip.is_empty() {
            return Ok(network.listen_address());
        }
        let ip = resolve_host_ip(None)?;
        trace!("no ip configured, resolved host ip {}", ip);
        Ok(SocketAddr::new(ip, network.port).to_string())
    }
}

async fn serve_until_shutdown<S, F, C>(serve: S, close: F) -> AppResult<()>
where
    S: Future<Output = AppResult<()>>,
    F: FnOnce() -> C,
    C: Future<Output = AppResult<()>>,
{
    serve_until(serve, ctrl_c(), close).await
}

async fn ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("get shutdown signal"),
        Err(err) => error!(cause = %err, "failed to listen for shutdown signal"),
    }
}

/// Drives `serve` until it returns on its own or `shutdown` completes. On
/// shutdown the server is closed while `serve` keeps draining, and both are
/// awaited.
async fn serve_until<S, T, F, C>(serve: S, shutdown: T, close: F) -> AppResult<()>
where
    S: Future<Output = AppResult<()>>,
    T: Future<Output = ()>,
    F: FnOnce() -> C,
    C: Future<Output = AppResult<()>>,
{
    tokio::pin!(serve);
    tokio::select! {
        res = &mut serve => {
            if let Err(err) = &res {
                error!(cause = %err, "server stopped unexpectedly");
            }
            return res;
        }
        _ = shutdown => {}
    }

    trace!("waiting for server shutdown complete...");
    let (served, closed) = tokio::join!(serve, close());
    served?;
    match closed {
        // someone else closed it first, the drain is still complete
        Err(err) if err.is_lifecycle() => {
            debug!(cause = %err, "server already closed");
            Ok(())
        }
        other => other,
    }
}
