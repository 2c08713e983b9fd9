//! Transaction Logging and Tracing
//!
//! Structured events for transaction boundaries, useful for:
//! - Performance analysis
//! - Debugging
//!
//! Log Levels:
//! - ERROR: fatal protocol violations
//! - WARN: aborted transactions
//! - INFO: commits
//! - DEBUG: transaction start, nursery reset
//! - TRACE: per-object operations (through the `log` facade only)

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// Log level for transaction events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

/// Transaction event types
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StmEvent {
    /// Worker opened a transaction
    TransactionStart { thread: u32 },

    /// Worker discarded its transaction without committing
    TransactionAbort { thread: u32, roots: usize },

    /// Commit finished
    CommitEnd {
        thread: u32,
        roots: usize,
        promoted: usize,
        bytes_promoted: usize,
        weak_redirected: usize,
        weak_cleared: usize,
        duration_us: u64,
    },

    /// Nursery released at the end of a transaction
    NurseryReset { thread: u32, bytes: usize },
}

impl StmEvent {
    fn level(&self) -> LogLevel {
        match self {
            StmEvent::TransactionAbort { .. } => LogLevel::Warn,
            StmEvent::CommitEnd { .. } => LogLevel::Info,
            StmEvent::TransactionStart { .. } | StmEvent::NurseryReset { .. } => LogLevel::Debug,
        }
    }
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct StmLoggerConfig {
    /// Minimum log level
    pub level: LogLevel,

    /// Enable console output
    pub console: bool,

    /// Enable JSON format
    pub json: bool,

    /// Enable timestamps
    pub timestamps: bool,

    /// Events kept in memory; oldest are dropped first
    pub capacity: usize,
}

impl Default for StmLoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            console: true,
            json: false,
            timestamps: true,
            capacity: 4096,
        }
    }
}

/// Event logger for transaction boundaries
pub struct StmLogger {
    config: StmLoggerConfig,
    events: Mutex<VecDeque<(DateTime<Local>, StmEvent)>>,
    enabled: AtomicBool,
}

impl StmLogger {
    pub fn new(config: StmLoggerConfig) -> Self {
        Self {
            config,
            events: Mutex::new(VecDeque::new()),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Log a transaction event
    pub fn log(&self, event: StmEvent) {
        if !self.is_enabled() || event.level() > self.config.level {
            return;
        }

        let timestamp = Local::now();

        {
            let mut events = self.events.lock();
            if self.config.capacity > 0 && events.len() >= self.config.capacity {
                events.pop_front();
            }
            events.push_back((timestamp, event.clone()));
        }

        if self.config.console {
            self.output_console(&timestamp, &event);
        }
    }

    fn output_console(&self, timestamp: &DateTime<Local>, event: &StmEvent) {
        let prefix = if self.config.timestamps {
            format!("[{}] ", timestamp.format("%Y-%m-%d %H:%M:%S%.3f"))
        } else {
            String::new()
        };

        if self.config.json {
            if let Ok(json) = serde_json::to_string(event) {
                println!("{}{}", prefix, json);
            }
        } else {
            println!("{}{}", prefix, Self::human(event));
        }
    }

    fn human(event: &StmEvent) -> String {
        match event {
            StmEvent::TransactionStart { thread } => {
                format!("[STM] Thread {}: transaction started", thread)
            }
            StmEvent::TransactionAbort { thread, roots } => {
                format!(
                    "[STM] Thread {}: transaction aborted ({} roots discarded)",
                    thread, roots
                )
            }
            StmEvent::CommitEnd {
                thread,
                roots,
                promoted,
                bytes_promoted,
                weak_redirected,
                weak_cleared,
                duration_us,
            } => format!(
                "[STM] Thread {}: committed {} roots, promoted {} objects ({} bytes), \
                 weak {} redirected / {} cleared in {} us",
                thread, roots, promoted, bytes_promoted, weak_redirected, weak_cleared, duration_us
            ),
            StmEvent::NurseryReset { thread, bytes } => {
                format!("[STM] Thread {}: nursery reset ({} bytes)", thread, bytes)
            }
        }
    }

    /// Get all retained events
    pub fn events(&self) -> Vec<(DateTime<Local>, StmEvent)> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }
}

impl Default for StmLogger {
    fn default() -> Self {
        Self::new(StmLoggerConfig::default())
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_LOGGER: Mutex<StmLogger> = Mutex::new(StmLogger::default());
}

/// Log an event to the global logger
pub fn log_event(event: StmEvent) {
    GLOBAL_LOGGER.lock().log(event);
}

/// Replace the global logger
pub fn configure_logger(config: StmLoggerConfig) {
    *GLOBAL_LOGGER.lock() = StmLogger::new(config);
}

/// Get global logger event count
pub fn get_event_count() -> usize {
    GLOBAL_LOGGER.lock().event_count()
}
