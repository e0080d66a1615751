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

use std::path::Path;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::network::{ServeOptions, MAX_DATAGRAM_SIZE};

use super::{AppError, AppResult};

pub static GLOBAL_CONFIG: OnceCell<ServerConfig> = OnceCell::new();

/// Panics if called before the configuration was loaded.
pub fn global_config() -> &'static ServerConfig {
    GLOBAL_CONFIG.get().expect("global config not set")
}

/// Prefix of environment variables overriding the file, e.g.
/// `NETSERVE__NETWORK__PORT=9000`.
const ENV_PREFIX: &str = "NETSERVE";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServeMode {
    #[default]
    Tcp,
    Udp,
    Unix,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub mode: ServeMode,
    /// 0 means one worker per cpu
    pub worker_threads: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            mode: ServeMode::Tcp,
            worker_threads: 0,
        }
    }
}

impl GeneralConfig {
    pub fn worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            num_cpus::get()
        } else {
            self.worker_threads
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub ip: String,
    pub port: u16,
    pub unix_path: String,
    pub recv_buffer_size: usize,
    /// per read deadline on accepted connections, 0 disables it
    pub read_timeout_ms: u64,
    /// per write deadline on accepted connections, 0 disables it
    pub write_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            ip: "127.0.0.1".to_string(),
            port: 8086,
            unix_path: "/tmp/netserve.sock".to_string(),
            recv_buffer_size: MAX_DATAGRAM_SIZE,
            read_timeout_ms: 30_000,
            write_timeout_ms: 30_000,
        }
    }
}

impl NetworkConfig {
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    pub graceful_timeout_ms: u64,
    /// 0 means unbounded
    pub max_connections: usize,
}

impl Default for ServeConfig {
    fn default() -> Self {
        ServeConfig {
            graceful_timeout_ms: 1_000,
            max_connections: 0,
        }
    }
}

impl ServeConfig {
    pub fn serve_options(&self) -> ServeOptions {
        let max_concurrency = match self.max_connections {
            0 => None,
            n => Some(n),
        };
        ServeOptions::new()
            .with_graceful_timeout(Duration::from_millis(self.graceful_timeout_ms))
            .with_max_concurrency(max_concurrency)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub dir: String,
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            dir: "logs".to_string(),
            file_prefix: "netserve.log".to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub general: GeneralConfig,
    pub network: NetworkConfig,
    pub serve: ServeConfig,
    pub log: LogConfig,
}

impl ServerConfig {
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<ServerConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(AppError::InvalidValue(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;
        Ok(server_config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.network.recv_buffer_size == 0 {
            return Err(AppError::InvalidValue(
                "network.recv_buffer_size must be positive".to_string(),
            ));
        }
        if self.general.mode == ServeMode::Unix && self.network.unix_path.is_empty() {
            return Err(AppError::InvalidValue(
                "network.unix_path is required in unix mode".to_string(),
            ));
        }
        Ok(())
    }
}
