// Module naming follows project convention (MPSC = Multi-Producer Single-Consumer)
#[allow(non_snake_case)]
pub mod MPSC;

#[allow(non_snake_case)]
pub mod Core;

#[allow(non_snake_case)]
pub mod Debug {
    pub mod StructDebug;
}

pub mod bridge;
pub mod config;
pub mod error;

pub use bridge::LogBridge;
pub use config::AsyncConfig;
pub use error::{Error, Result, SinkError};
pub use Core::Level;
pub use MPSC::{AsyncDisruptor, AsyncLogger, AsyncLoggerBuilder, LifecycleState};
