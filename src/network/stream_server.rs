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

use std::fmt::Debug;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_util::sync::CancellationToken;
use tracing::{info, trace};

use crate::{AppError, AppResult};

use super::{GenericServer, ServeOptions, ServerState, Source, Work};

/// A connection oriented listener the stream server can accept from.
pub trait StreamListener: Send + Sync + 'static {
    type Conn: Send + 'static;
    type Addr: Debug + Clone + Send + Sync + 'static;

    fn accept(&self) -> impl Future<Output = io::Result<(Self::Conn, Self::Addr)>> + Send;

    fn local_addr(&self) -> io::Result<Self::Addr>;

    /// Cleans up anything the listener leaves behind once closed.
    fn release(&self) -> io::Result<()> {
        Ok(())
    }
}

impl StreamListener for TcpListener {
    type Conn = TcpStream;
    type Addr = SocketAddr;

    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(self)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

#[cfg(unix)]
impl StreamListener for tokio::net::UnixListener {
    type Conn = tokio::net::UnixStream;
    type Addr = tokio::net::unix::SocketAddr;

    fn accept(
        &self,
    ) -> impl Future<Output = io::Result<(tokio::net::UnixStream, tokio::net::unix::SocketAddr)>> + Send
    {
        tokio::net::UnixListener::accept(self)
    }

    fn local_addr(&self) -> io::Result<tokio::net::unix::SocketAddr> {
        tokio::net::UnixListener::local_addr(self)
    }

    fn release(&self) -> io::Result<()> {
        let addr = tokio::net::UnixListener::local_addr(self)?;
        match addr.as_pathname() {
            Some(path) => match std::fs::remove_file(path) {
                Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
                _ => Ok(()),
            },
            None => Ok(()),
        }
    }
}

/// Handles one accepted connection.
///
/// The handler owns the connection for the duration of the call and closes it
/// by dropping it. It should return promptly once `ctx` is cancelled.
pub trait ConnHandler<C>: Send + Sync + 'static {
    fn handle(&self, ctx: CancellationToken, conn: C) -> impl Future<Output = ()> + Send;
}

impl<C, F, Fut> ConnHandler<C> for F
where
    F: Fn(CancellationToken, C) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send,
{
    fn handle(&self, ctx: CancellationToken, conn: C) -> impl Future<Output = ()> + Send {
        self(ctx, conn)
    }
}

#[derive(Debug)]
pub struct StreamSource<L, H> {
    listener: Mutex<Option<Arc<L>>>,
    handler: Arc<H>,
}

impl<L, H> Source for StreamSource<L, H>
where
    L: StreamListener,
    H: ConnHandler<L::Conn>,
{
    async fn poll(&self, ctx: &CancellationToken) -> AppResult<Work> {
        let listener = self.listener.lock().clone();
        let listener =
            listener.ok_or_else(|| AppError::Accept("use of closed listener".to_string()))?;
        let (conn, peer) = listener
            .accept()
            .await
            .map_err(|e| AppError::Accept(e.to_string()))?;
        trace!(?peer, "accepted connection");

        let handler = self.handler.clone();
        let ctx = ctx.clone();
        Ok(Box::pin(async move {
            handler.handle(ctx, conn).await;
        }))
    }

    fn close(&self) -> AppResult<()> {
        // a pending accept keeps its own reference until the loop drops it
        match self.listener.lock().take() {
            Some(listener) => listener.release().map_err(AppError::from),
            None => Ok(()),
        }
    }
}

/// Serves a stream listener, one task per accepted connection.
#[derive(Debug)]
pub struct StreamServer<L: StreamListener, H> {
    server: GenericServer<StreamSource<L, H>>,
    local_addr: L::Addr,
}

pub type TcpServer<H> = StreamServer<TcpListener, H>;

#[cfg(unix)]
pub type UnixServer<H> = StreamServer<tokio::net::UnixListener, H>;

impl<L, H> StreamServer<L, H>
where
    L: StreamListener,
    H: ConnHandler<L::Conn>,
{
    pub fn from_listener(listener: L, handler: H) -> AppResult<Self> {
        let local_addr = listener.local_addr()?;
        Ok(StreamServer {
            server: GenericServer::new(StreamSource {
                listener: Mutex::new(Some(Arc::new(listener))),
                handler: Arc::new(handler),
            }),
            local_addr,
        })
    }

    /// The effective address the listener is bound to.
    pub fn local_addr(&self) -> &L::Addr {
        &self.local_addr
    }

    pub fn state(&self) -> ServerState {
        self.server.state()
    }

    pub async fn serve(&self, options: ServeOptions) -> AppResult<()> {
        info!(addr = ?self.local_addr, "stream server serving");
        self.server.serve(options).await
    }

    pub async fn close(&self) -> AppResult<()> {
        self.server.close().await
    }
}

impl<H: ConnHandler<TcpStream>> StreamServer<TcpListener, H> {
    pub async fn bind_tcp<A: ToSocketAddrs>(addr: A, handler: H) -> AppResult<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            AppError::DetailedIoError(format!("failed to bind tcp listener: {}", e))
        })?;
        Self::from_listener(listener, handler)
    }
}

#[cfg(unix)]
impl<H: ConnHandler<tokio::net::UnixStream>> StreamServer<tokio::net::UnixListener, H> {
    pub fn bind_unix<P: AsRef<std::path::Path>>(path: P, handler: H) -> AppResult<Self> {
        let listener = tokio::net::UnixListener::bind(path.as_ref()).map_err(|e| {
            AppError::DetailedIoError(format!(
                "failed to bind unix listener {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_listener(listener, handler)
    }
}
