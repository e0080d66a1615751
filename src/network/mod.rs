//! Network Module Implementation
//!
//! This module provides the generic server runtime: a dispatch loop that turns
//! a "produce one unit of work" operation into a supervised, concurrently
//! dispatched, gracefully stoppable service.
//!
//! # Architecture
//!
//! - `GenericServer`: the dispatch engine, owning the poll loop, the
//!   lifecycle state machine and the graceful drain
//! - `StreamServer`: the engine over a stream listener (TCP, unix socket),
//!   one task per accepted connection
//! - `PacketServer`: the engine over a UDP socket, one task per datagram
//! - `ServeOptions`: cancellation context, graceful timeout and an optional
//!   concurrency cap for a single `serve` call
//!
//! # Companions
//!
//! - `TimedStream`: per operation read/write deadlines for a connection
//! - `resolve_host_ip`: the host's non-loopback address

pub use host_ip::resolve_host_ip;
pub use options::{ServeOptions, DEFAULT_GRACEFUL_TIMEOUT};
pub use packet_server::{PacketHandler, PacketServer, PacketSource, MAX_DATAGRAM_SIZE};
pub use server::{GenericServer, ServerState, Source, Work};
#[cfg(unix)]
pub use stream_server::UnixServer;
pub use stream_server::{ConnHandler, StreamListener, StreamServer, StreamSource, TcpServer};
pub use timed_stream::TimedStream;

mod host_ip;
mod options;
mod packet_server;
mod server;
mod stream_server;
mod timed_stream;
