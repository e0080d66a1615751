pub use app_error::{AppError, AppResult};
pub use config::{
    global_config, GeneralConfig, LogConfig, NetworkConfig, ServeConfig, ServeMode, ServerConfig,
    GLOBAL_CONFIG,
};
pub use daemon::Daemon;
pub use echo::{packet_echo, StreamEcho};
pub use signal::Signal;
pub use tracing_config::{setup_local_tracing, setup_tracing};

mod app_error;
mod config;
mod daemon;
mod echo;
mod signal;
mod tracing_config;
