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

use std::time::Duration;

use tokio_util::sync::CancellationToken;

pub const DEFAULT_GRACEFUL_TIMEOUT: Duration = Duration::from_secs(1);

/// Options for a single `serve` call.
///
/// Every setter overwrites the previous value, so the last one wins.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub(crate) context: CancellationToken,
    pub(crate) graceful_timeout: Duration,
    pub(crate) max_concurrency: Option<usize>,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            // nobody else holds this token, so it is never cancelled
            context: CancellationToken::new(),
            graceful_timeout: DEFAULT_GRACEFUL_TIMEOUT,
            max_concurrency: None,
        }
    }
}

impl ServeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parent context of the serve loop. Cancelling it stops the loop and is
    /// propagated to every dispatched unit of work.
    pub fn with_context(mut self, context: CancellationToken) -> Self {
        self.context = context;
        self
    }

    /// How long shutdown waits for dispatched units of work to finish.
    pub fn with_graceful_timeout(mut self, graceful_timeout: Duration) -> Self {
        self.graceful_timeout = graceful_timeout;
        self
    }

    /// Caps the number of units of work running at once, `None` is unbounded.
    /// A zero cap is treated as one.
    pub fn with_max_concurrency(mut self, max_concurrency: Option<usize>) -> Self {
        self.max_concurrency = max_concurrency.map(|n| n.max(1));
        self
    }

    pub fn context(&self) -> &CancellationToken {
        &self.context
    }

    pub fn graceful_timeout(&self) -> Duration {
        self.graceful_timeout
    }

    pub fn max_concurrency(&self) -> Option<usize> {
        self.max_concurrency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ServeOptions::default();
        assert_eq!(options.graceful_timeout(), DEFAULT_GRACEFUL_TIMEOUT);
        assert!(!options.context().is_cancelled());
        assert_eq!(options.max_concurrency(), None);
    }

    #[test]
    fn test_last_write_wins() {
        let first = CancellationToken::new();
        let second = CancellationToken::new();
        second.cancel();
        let options = ServeOptions::new()
            .with_context(first)
            .with_graceful_timeout(Duration::from_millis(10))
            .with_context(second)
            .with_graceful_timeout(Duration::from_millis(30))
            .with_max_concurrency(Some(0));
        assert!(options.context().is_cancelled());
        assert_eq!(options.graceful_timeout(), Duration::from_millis(30));
        assert_eq!(options.max_concurrency(), Some(1));
    }
}
