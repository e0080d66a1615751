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

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use once_cell::sync::Lazy;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::network::TimedStream;
use crate::utils::BytesPool;
use crate::AppResult;

const SCRATCH_SIZE: usize = 4 * 1024;

static SCRATCH_POOL: Lazy<BytesPool> = Lazy::new(BytesPool::default);

/// Echo handler for stream connections, with per operation deadlines.
#[derive(Debug, Clone, Copy)]
pub struct StreamEcho {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl StreamEcho {
    pub fn new(read_timeout: Duration, write_timeout: Duration) -> Self {
        StreamEcho {
            read_timeout,
            write_timeout,
        }
    }

    pub async fn handle<S>(&self, ctx: CancellationToken, conn: S)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut stream = TimedStream::new(conn, self.read_timeout, self.write_timeout);
        let mut scratch = SCRATCH_POOL.acquire(SCRATCH_SIZE);
        if let Err(err) = echo_stream(&ctx, &mut stream, &mut scratch).await {
            error!("echo connection error: {:?}", err);
        }
        SCRATCH_POOL.release(scratch);
    }
}

async fn echo_stream<S>(
    ctx: &CancellationToken,
    stream: &mut TimedStream<S>,
    scratch: &mut BytesMut,
) -> AppResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        scratch.clear();
        let n = tokio::select! {
            res = stream.read_buf(scratch) => res?,
            _ = ctx.cancelled() => {
                debug!("echo connection exit read loop after cancellation");
                break;
            }
        };
        // peer closed the connection
        if n == 0 {
            break;
        }
        stream.write_all(scratch).await?;
    }
    stream.shutdown().await?;
    Ok(())
}

/// Sends every datagram back to its sender.
pub async fn packet_echo(
    _ctx: CancellationToken,
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    data: BytesMut,
) {
    if let Err(err) = socket.send_to(&data, peer).await {
        error!("echo datagram to {} failed: {:?}", peer, err);
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn test_stream_echo() {
        let (client, server) = duplex(1024);
        let echo = StreamEcho::new(Duration::from_secs(1), Duration::from_secs(1));
        let ctx = CancellationToken::new();
        let handle = tokio::spawn(async move { echo.handle(ctx, server).await });

        let mut client = client;
        client.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        drop(client);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_echo_stops_on_cancel() {
        let (_client, server) = duplex(1024);
        let echo = StreamEcho::new(Duration::ZERO, Duration::ZERO);
        let ctx = CancellationToken::new();
        let handle = {
            let ctx = ctx.clone();
            tokio::spawn(async move { echo.handle(ctx, server).await })
        };
        ctx.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("handler should observe cancellation")
            .unwrap();
    }
}
