pub mod network;
pub mod protocol;
pub mod service;
pub mod utils;

pub use service::{
    global_config, setup_local_tracing, setup_tracing, AppError, AppResult, Daemon, ServerConfig,
    GLOBAL_CONFIG,
};
