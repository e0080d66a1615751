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
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::service::Signal;
use crate::{AppError, AppResult};

use super::ServeOptions;

/// A deferred unit of work produced by one successful poll.
pub type Work = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Anything that can produce units of work, one at a time.
///
/// `poll` is never called concurrently with itself for one server. `close`
/// may be called from any task while a poll is pending; after it returns,
/// pending and later polls are expected to fail or be dropped.
pub trait Source: Send + Sync + 'static {
    fn poll(&self, ctx: &CancellationToken) -> impl Future<Output = AppResult<Work>> + Send;

    fn close(&self) -> AppResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ServerState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl From<u8> for ServerState {
    fn from(value: u8) -> Self {
        match value {
            0 => ServerState::Idle,
            1 => ServerState::Running,
            2 => ServerState::Stopping,
            _ => ServerState::Stopped,
        }
    }
}

/// The dispatch engine shared by stream and packet servers.
///
/// Polls its [`Source`] from a single loop and spawns every produced unit of
/// work on its own task. Shutdown waits a bounded time for those tasks.
#[derive(Debug)]
pub struct GenericServer<S> {
    source: S,
    started: AtomicBool,
    stopped: AtomicBool,
    state: AtomicU8,
    stop: Signal,
    done: Signal,
}

// Fires the done signal even if the serve future is dropped half way.
struct DoneGuard<'a> {
    state: &'a AtomicU8,
    done: &'a Signal,
}

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.state.fetch_max(ServerState::Stopped as u8, Ordering::AcqRel);
        self.done.fire();
        debug!("server done");
    }
}

impl<S: Source> GenericServer<S> {
    pub fn new(source: S) -> Self {
        GenericServer {
            source,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            state: AtomicU8::new(ServerState::Idle as u8),
            stop: Signal::new(),
            done: Signal::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn state(&self) -> ServerState {
        self.state.load(Ordering::Acquire).into()
    }

    fn advance(&self, state: ServerState) {
        self.state.fetch_max(state as u8, Ordering::AcqRel);
    }

    /// Runs the dispatch loop until the server is closed, the context is
    /// cancelled, or a poll fails.
    ///
    /// Returns `Ok(())` for an explicit close, [`AppError::Cancelled`] when the
    /// parent context was cancelled, and the poll error otherwise. A poll
    /// failure caused by a concurrent `close` is reported as a clean stop.
    ///
    /// Before returning, the serve context is cancelled and dispatched units
    /// get up to the graceful timeout to finish; stragglers are abandoned.
    pub async fn serve(&self, options: ServeOptions) -> AppResult<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(AppError::AlreadyStarted);
        }
        self.advance(ServerState::Running);
        let _done = DoneGuard {
            state: &self.state,
            done: &self.done,
        };
        let ServeOptions {
            context,
            graceful_timeout,
            max_concurrency,
        } = options;
        let ctx = context.child_token();
        let limit = max_concurrency.map(|n| Arc::new(Semaphore::new(n)));
        // every dispatched unit holds a sender, the drain waits for all of them to drop
        let (complete_tx, mut complete_rx) = mpsc::channel::<()>(1);

        debug!(?graceful_timeout, ?max_concurrency, "server started");
        let result = self.run(&ctx, limit, &complete_tx).await;
        self.advance(ServerState::Stopping);

        ctx.cancel();
        drop(complete_tx);
        if time::timeout(graceful_timeout, complete_rx.recv())
            .await
            .is_err()
        {
            warn!(
                "graceful timeout {:?} elapsed, abandoning in-flight work",
                graceful_timeout
            );
        }
        match &result {
            Ok(()) => debug!("server stopped"),
            Err(err) => debug!(cause = %err, "server exited"),
        }
        result
    }

    async fn run(
        &self,
        ctx: &CancellationToken,
        limit: Option<Arc<Semaphore>>,
        complete_tx: &mpsc::Sender<()>,
    ) -> AppResult<()> {
        loop {
            // an intentional stop always wins over cancellation and poll errors
            if self.stopped.load(Ordering::Acquire) {
                return Ok(());
            }
            if ctx.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            let next = tokio::select! {
                biased;
                _ = self.stop.wait() => return Ok(()),
                _ = ctx.cancelled() => continue,
                next = self.next_work(ctx, limit.as_ref()) => next,
            };

            let (work, permit) = match next {
                Ok(next) => next,
                Err(err) => {
                    // closing the resource is exactly what makes the poll fail
                    if self.stopped.load(Ordering::Acquire) {
                        debug!(cause = %err, "poll failed after stop requested");
                        return Ok(());
                    }
                    return Err(err);
                }
            };

            let complete = complete_tx.clone();
            trace!("dispatch unit of work");
            tokio::spawn(async move {
                // panics are up to the handler, the permit and sender drop either way
                work.await;
                drop(permit);
                drop(complete);
            });
        }
    }

    async fn next_work(
        &self,
        ctx: &CancellationToken,
        limit: Option<&Arc<Semaphore>>,
    ) -> AppResult<(Work, Option<OwnedSemaphorePermit>)> {
        let permit = match limit {
            Some(limit) => Some(
                limit
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| AppError::IllegalStateError(e.to_string()))?,
            ),
            None => None,
        };
        let work = self.source.poll(ctx).await?;
        Ok((work, permit))
    }

    /// Stops the server and waits until it has fully drained.
    ///
    /// Only the first call closes the source and returns its error. Later
    /// calls return [`AppError::AlreadyStopped`], but only once the server is
    /// done, so every caller gets the drained guarantee.
    pub async fn close(&self) -> AppResult<()> {
        let result = if self.stopped.swap(true, Ordering::AcqRel) {
            Err(AppError::AlreadyStopped)
        } else {
            self.advance(ServerState::Stopping);
            let result = self.source.close();
            self.stop.fire();
            if !self.started.swap(true, Ordering::AcqRel) {
                // never served, nobody else will fire done
                self.advance(ServerState::Stopped);
                self.done.fire();
            }
            debug!("server close requested");
            result
        };
        self.done.wait().await;
        result
    }
}
