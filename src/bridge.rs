// `log` facade front end for a transport.

use std::sync::Arc;

use crate::Core::level::Level;
use crate::Core::status::STATUS_TARGET;
use crate::MPSC::AsyncDisruptor;

/// Routes `log::info!` and friends into an [`AsyncDisruptor`].
///
/// The record target becomes the logger name. Records from the status
/// channel are skipped, otherwise a status report about the transport
/// would be published back into it.
#[derive(Debug, Clone)]
pub struct LogBridge {
    disruptor: Arc<AsyncDisruptor>,
    max_level: log::LevelFilter,
}

impl LogBridge {
    pub fn new(disruptor: Arc<AsyncDisruptor>) -> Self {
        Self {
            disruptor,
            max_level: log::LevelFilter::Trace,
        }
    }

    pub fn with_max_level(mut self, max_level: log::LevelFilter) -> Self {
        self.max_level = max_level;
        self
    }

    pub fn disruptor(&self) -> &Arc<AsyncDisruptor> {
        &self.disruptor
    }

    /// Install as the global `log` logger.
    pub fn install(self) -> Result<(), log::SetLoggerError> {
        let max_level = self.max_level;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl log::Log for LogBridge {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= self.max_level
            && !metadata.target().starts_with(STATUS_TARGET)
            && self.disruptor.is_started()
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.disruptor.log_event(
            record.target(),
            Level::from(record.level()),
            *record.args(),
            None,
            None,
            None,
        );
    }

    fn flush(&self) {}
}
