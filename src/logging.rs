// src/logging.rs

//! Injectable logging.
//!
//! The facade never logs through an ambient global. Every client holds a
//! [`Logger`] handle; all handles cloned from the same client share one
//! swappable sink, so `use_custom_logger()` takes effect for every
//! subsequent log statement across the wrapper and any callbacks it has
//! already registered. The swap is not retroactive.
//!
//! The default sink forwards to `tracing` events, so a process that sets
//! up a `tracing` subscriber gets structured output with no extra wiring.

use std::sync::{Arc, RwLock};

/// Severity of a log statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Destination for log statements emitted by the facade.
///
/// Implementations must be cheap and non-blocking; sinks are called from
/// transport delivery and acknowledgement callbacks.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Default sink: forwards to `tracing` events at the matching level.
struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str) {
        // ---
        match level {
            LogLevel::Debug => tracing::debug!(target: "durapub", "{message}"),
            LogLevel::Info => tracing::info!(target: "durapub", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "durapub", "{message}"),
            LogLevel::Error => tracing::error!(target: "durapub", "{message}"),
        }
    }
}

/// Shared, swappable logger handle.
///
/// Cheap to clone; clones share the same sink slot. Swapping the sink on
/// any clone affects all of them.
#[derive(Clone)]
pub struct Logger {
    sink: Arc<RwLock<Arc<dyn LogSink>>>,
}

impl Logger {
    /// Create a logger with a custom sink.
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink: Arc::new(RwLock::new(sink)),
        }
    }

    /// Replace the sink for all subsequent log statements.
    pub fn swap(&self, sink: Arc<dyn LogSink>) {
        let mut slot = match self.sink.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = sink;
    }

    fn emit(&self, level: LogLevel, message: &str) {
        let sink = {
            let slot = match self.sink.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            slot.clone()
        };
        sink.log(level, message);
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.emit(LogLevel::Debug, message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.emit(LogLevel::Info, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.emit(LogLevel::Warn, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.emit(LogLevel::Error, message.as_ref());
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Logger")
    }
}


#[cfg(test)]
mod tests {
    // ---
    use super::test_support::RecordingSink;
    use super::*;

    #[test]
    fn test_swap_affects_subsequent_statements_only() {
        // ---
        let logger = Logger::default();
        let recorder = Arc::new(RecordingSink::default());

        // Emitted before the swap; goes to the tracing sink, not the recorder.
        logger.warn("before swap");

        logger.swap(recorder.clone());
        logger.warn("after swap");
        logger.error("also after swap");

        assert_eq!(recorder.count(LogLevel::Warn), 1);
        assert_eq!(recorder.count(LogLevel::Error), 1);
    }

    #[test]
    fn test_clones_share_one_sink_slot() {
        // ---
        let logger = Logger::default();
        let clone = logger.clone();

        let recorder = Arc::new(RecordingSink::default());
        logger.swap(recorder.clone());

        clone.debug("from the clone");
        assert_eq!(recorder.count(LogLevel::Debug), 1);
    }
}
