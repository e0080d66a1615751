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
use parking_lot::Mutex;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{info, trace};

use crate::{AppError, AppResult};

use super::{GenericServer, ServeOptions, ServerState, Source, Work};

/// Receive buffer capacity. Path MTU is unknown here, so take the largest IP
/// packet to never truncate a datagram.
pub const MAX_DATAGRAM_SIZE: usize = u16::MAX as usize;

/// Handles one received datagram.
///
/// `data` is a private copy of the payload. The socket is shared by every
/// in-flight handler and may be used to send replies to `peer`.
pub trait PacketHandler: Send + Sync + 'static {
    fn handle(
        &self,
        ctx: CancellationToken,
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
        data: BytesMut,
    ) -> impl Future<Output = ()> + Send;
}

impl<F, Fut> PacketHandler for F
where
    F: Fn(CancellationToken, Arc<UdpSocket>, SocketAddr, BytesMut) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send,
{
    fn handle(
        &self,
        ctx: CancellationToken,
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
        data: BytesMut,
    ) -> impl Future<Output = ()> + Send {
        self(ctx, socket, peer, data)
    }
}

#[derive(Debug)]
pub struct PacketSource<H> {
    socket: Mutex<Option<Arc<UdpSocket>>>,
    // polls are sequential, the lock is only held across one recv
    recv_buffer: tokio::sync::Mutex<Vec<u8>>,
    handler: Arc<H>,
}

impl<H: PacketHandler> Source for PacketSource<H> {
    async fn poll(&self, ctx: &CancellationToken) -> AppResult<Work> {
        let socket = self.socket.lock().clone();
        let socket =
            socket.ok_or_else(|| AppError::Accept("use of closed packet socket".to_string()))?;

        let (data, peer) = {
            let mut buffer = self.recv_buffer.lock().await;
            let (n, peer) = socket
                .recv_from(&mut buffer[..])
                .await
                .map_err(|e| AppError::Accept(e.to_string()))?;
            // the receive buffer is reused by the next poll, hand out a copy
            (BytesMut::from(&buffer[..n]), peer)
        };
        trace!(?peer, len = data.len(), "received datagram");

        let handler = self.handler.clone();
        let ctx = ctx.clone();
        Ok(Box::pin(async move {
            handler.handle(ctx, socket, peer, data).await;
        }))
    }

    fn close(&self) -> AppResult<()> {
        self.socket.lock().take();
        Ok(())
    }
}

/// Serves a datagram socket, one task per received datagram.
///
/// There is no bound on the number of in-flight handlers unless the serve
/// options set one, so use with caution.
#[derive(Debug)]
pub struct PacketServer<H> {
    server: GenericServer<PacketSource<H>>,
    local_addr: SocketAddr,
}

impl<H: PacketHandler> PacketServer<H> {
    pub async fn bind<A: ToSocketAddrs>(addr: A, handler: H) -> AppResult<Self> {
        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            AppError::DetailedIoError(format!("failed to bind udp socket: {}", e))
        })?;
        Self::from_socket(socket, handler)
    }

    pub fn from_socket(socket: UdpSocket, handler: H) -> AppResult<Self> {
        Self::with_buffer_size(socket, handler, MAX_DATAGRAM_SIZE)
    }

    /// Builds a server whose receive buffer holds `buffer_size` bytes. Longer
    /// datagrams are truncated by the OS, so size it for the transport in use.
    pub fn with_buffer_size(socket: UdpSocket, handler: H, buffer_size: usize) -> AppResult<Self> {
        if buffer_size == 0 {
            return Err(AppError::InvalidValue(
                "packet receive buffer size must be positive".to_string(),
            ));
        }
        let local_addr = socket.local_addr()?;
        Ok(PacketServer {
            server: GenericServer::new(PacketSource {
                socket: Mutex::new(Some(Arc::new(socket))),
                recv_buffer: tokio::sync::Mutex::new(vec![0u8; buffer_size]),
                handler: Arc::new(handler),
            }),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ServerState {
        self.server.state()
    }

    pub async fn serve(&self, options: ServeOptions) -> AppResult<()> {
        info!(addr = %self.local_addr, "packet server serving");
        self.server.serve(options).await
    }

    pub async fn close(&self) -> AppResult<()> {
        self.server.close().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_zero_buffer_rejected() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let result = PacketServer::with_buffer_size(
            socket,
            |_ctx: CancellationToken,
             _socket: Arc<UdpSocket>,
             _peer: SocketAddr,
             _data: BytesMut| async {},
            0,
        );
        assert!(matches!(result, Err(AppError::InvalidValue(_))));
    }

    #[tokio::test]
    async fn test_large_datagram_not_truncated() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<BytesMut>();
        let handler = move |_ctx: CancellationToken,
                            _socket: Arc<UdpSocket>,
                            _peer: SocketAddr,
                            data: BytesMut| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(data);
            }
        };
        let server = Arc::new(PacketServer::bind("127.0.0.1:0", handler).await.unwrap());
        let addr = server.local_addr();
        let serving = {
            let server = server.clone();
            tokio::spawn(async move { server.serve(ServeOptions::default()).await })
        };

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let payload: Vec<u8> = (0..8192).map(|i| (i % 251) as u8).collect();
        client.send_to(&payload, addr).await.unwrap();
        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&received[..], &payload[..]);

        server.close().await.unwrap();
        assert!(serving.await.unwrap().is_ok());
    }
}
