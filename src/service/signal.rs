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

use tokio::sync::watch;

/// A one-shot broadcast event.
///
/// The signal fires at most once. Any number of tasks may wait on it, and a
/// waiter that arrives after the signal fired returns immediately.
#[derive(Debug)]
pub struct Signal {
    notify: watch::Sender<bool>,
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl Signal {
    pub fn new() -> Signal {
        let (notify, _) = watch::channel(false);
        Signal { notify }
    }

    /// Fires the signal, returns `false` if it had already fired.
    pub fn fire(&self) -> bool {
        self.notify.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    pub fn is_fired(&self) -> bool {
        *self.notify.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.notify.subscribe();
        // the sender lives in self, so the channel can not close under us
        let _ = rx.wait_for(|fired| *fired).await;
    }
}
