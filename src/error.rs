use std::io;

use crate::MPSC::disruptor::LifecycleState;

/// Failures surfaced by construction and lifecycle calls.
///
/// Publishing never returns an error; problems on that path go to the
/// status channel instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid value `{value}` for `{key}`")]
    InvalidConfig { key: String, value: String },

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("transport is {0} and cannot be started")]
    InvalidState(LifecycleState),

    #[error("failed to spawn background consumer thread: {0}")]
    Spawn(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a sink while dispatching one event.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink `{sink}` failed: {message}")]
    Failed { sink: String, message: String },

    #[error("sink I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("sink panicked: {0}")]
    Panicked(String),

    #[error("{} of {total} sinks failed: {}", failures.len(), join_errors(failures))]
    FanOut { failures: Vec<SinkError>, total: usize },
}

impl SinkError {
    pub fn failed(sink: impl Into<String>, message: impl Into<String>) -> Self {
        SinkError::Failed {
            sink: sink.into(),
            message: message.into(),
        }
    }
}

fn join_errors(errors: &[SinkError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
