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

use crate::utils::MultiError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// lifecycle misuse, informational only
    #[error("server already started")]
    AlreadyStarted,

    #[error("server already stopped")]
    AlreadyStopped,

    /// the serve context was cancelled by its parent
    #[error("serve context cancelled")]
    Cancelled,

    #[error("accept error: {0}")]
    Accept(String),

    /// general errors
    #[error("illegal state: {0}")]
    IllegalStateError(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("I/O error: {0}")]
    DetailedIoError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),

    /// codec errors
    #[error("incomplete input: {0}")]
    Incomplete(String),

    #[error("varint overflows a 64-bit integer")]
    VarintOverflow,

    /// host address discovery
    #[error("network interface not found or not up")]
    NetworkInterfaceNotFound,

    #[error("no available IP address")]
    NoAvailableIpAddress,

    #[error("{0}")]
    Multi(MultiError),
}

impl AppError {
    /// Lifecycle misuse errors never alter a shutdown already in progress.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, AppError::AlreadyStarted | AppError::AlreadyStopped)
    }
}
