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
use std::io::{self, ErrorKind};
use std::time::Duration;

use bytes::BufMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time;

/// A stream whose every read and write call must finish within a timeout.
///
/// Each call owns its deadline, armed when the call starts. Dropping a
/// pending call drops its deadline too, so the next call always gets a full
/// window. A zero timeout disables the deadline for that direction.
#[derive(Debug)]
pub struct TimedStream<S> {
    inner: S,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl<S> TimedStream<S> {
    pub fn new(inner: S, read_timeout: Duration, write_timeout: Duration) -> Self {
        TimedStream {
            inner,
            read_timeout,
            write_timeout,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

async fn within<F, T>(timeout: Duration, op: &str, call: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    if timeout.is_zero() {
        return call.await;
    }
    match time::timeout(timeout, call).await {
        Ok(res) => res,
        Err(_) => Err(io::Error::new(
            ErrorKind::TimedOut,
            format!("{} deadline exceeded", op),
        )),
    }
}

impl<S: AsyncRead + Unpin> TimedStream<S> {
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        within(self.read_timeout, "read", self.inner.read(buf)).await
    }

    pub async fn read_buf<B: BufMut + ?Sized>(&mut self, buf: &mut B) -> io::Result<usize> {
        within(self.read_timeout, "read", self.inner.read_buf(buf)).await
    }

    /// One deadline covers the whole fill, not each underlying read.
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        within(self.read_timeout, "read", self.inner.read_exact(buf)).await
    }
}

impl<S: AsyncWrite + Unpin> TimedStream<S> {
    pub async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        within(self.write_timeout, "write", self.inner.write(buf)).await
    }

    /// One deadline covers the whole buffer, not each underlying write.
    pub async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        within(self.write_timeout, "write", self.inner.write_all(buf)).await
    }

    pub async fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().await
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn test_read_times_out_without_data() {
        let (client, _server) = duplex(64);
        let mut stream = TimedStream::new(client, Duration::from_millis(50), Duration::ZERO);
        let mut buf = [0u8; 8];
        let err = stream.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_zero_timeout_never_arms() {
        let (client, _server) = duplex(64);
        let mut stream = TimedStream::new(client, Duration::ZERO, Duration::ZERO);
        let mut buf = [0u8; 8];
        // the read stays pending well past any deadline
        let result = time::timeout(Duration::from_millis(200), stream.read(&mut buf)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_deadline_rearmed_per_read() {
        let (client, mut server) = duplex(64);
        let mut stream = TimedStream::new(client, Duration::from_millis(100), Duration::ZERO);
        let mut buf = [0u8; 8];
        for round in 0..4u8 {
            // each read finishes inside its own window even though the total exceeds it
            time::sleep(Duration::from_millis(60)).await;
            server.write_all(&[round]).await.unwrap();
            let n = stream.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], &[round]);
        }
    }

    #[tokio::test]
    async fn test_abandoned_read_leaves_no_deadline_behind() {
        let (client, mut server) = duplex(64);
        let mut stream = TimedStream::new(client, Duration::from_millis(100), Duration::ZERO);
        let mut buf = [0u8; 8];

        // the caller gives up on this read before its deadline fires
        let abandoned = time::timeout(Duration::from_millis(80), stream.read(&mut buf)).await;
        assert!(abandoned.is_err());
        time::sleep(Duration::from_millis(50)).await;

        let writer = tokio::spawn(async move {
            time::sleep(Duration::from_millis(20)).await;
            server.write_all(&[7]).await.unwrap();
            server
        });
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[7]);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_abandoned_write_leaves_no_deadline_behind() {
        let (client, mut server) = duplex(4);
        let mut stream = TimedStream::new(client, Duration::ZERO, Duration::from_millis(100));

        // fills the pipe, then stalls until the caller gives up
        let abandoned = time::timeout(Duration::from_millis(80), stream.write_all(&[1u8; 8])).await;
        assert!(abandoned.is_err());
        time::sleep(Duration::from_millis(50)).await;

        let reader = tokio::spawn(async move {
            time::sleep(Duration::from_millis(20)).await;
            let mut drained = [0u8; 12];
            server.read_exact(&mut drained).await.unwrap();
            drained
        });
        // needs the peer to drain first, well inside a fresh window
        stream.write_all(&[2u8; 8]).await.unwrap();
        let drained = reader.await.unwrap();
        assert_eq!(&drained[..4], &[1u8; 4]);
        assert_eq!(&drained[4..], &[2u8; 8]);
    }

    #[rstest]
    #[case(Duration::ZERO)]
    #[case(Duration::from_secs(1))]
    #[tokio::test]
    async fn test_write_passes_through(#[case] timeout: Duration) {
        let (client, mut server) = duplex(64);
        let mut stream = TimedStream::new(client, Duration::ZERO, timeout);
        stream.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn test_write_times_out_when_peer_stalls() {
        let (client, _server) = duplex(4);
        let mut stream = TimedStream::new(client, Duration::ZERO, Duration::from_millis(50));
        let err = stream.write_all(&[0u8; 64]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
    }
}
