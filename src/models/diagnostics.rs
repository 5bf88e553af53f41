use log::Level;
use std::cell::RefCell;

/// Receives messages produced while a network is assembled.
///
/// A sink is handed to a single construction call and not retained by the
/// network afterwards.
pub trait Diagnostics {
    fn emit(&self, level: Level, message: &str);

    fn debug(&self, message: &str) {
        self.emit(Level::Debug, message);
    }

    fn info(&self, message: &str) {
        self.emit(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.emit(Level::Warn, message);
    }
}

/// Forwards to the `log` facade under the `composenet::build` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn emit(&self, level: Level, message: &str) {
        log::log!(target: "composenet::build", level, "{message}");
    }
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct CollectingDiagnostics {
    entries: RefCell<Vec<(Level, String)>>,
}

impl CollectingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(Level, String)> {
        self.entries.borrow().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries.borrow().iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries.borrow().iter().any(|(_, m)| m.contains(needle))
    }
}

impl Diagnostics for CollectingDiagnostics {
    fn emit(&self, level: Level, message: &str) {
        self.entries.borrow_mut().push((level, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_keeps_order_and_level() {
        let sink = CollectingDiagnostics::new();
        sink.debug("first");
        sink.warn("second");
        assert_eq!(
            sink.entries(),
            vec![
                (Level::Debug, "first".to_string()),
                (Level::Warn, "second".to_string())
            ]
        );
        assert!(sink.contains("sec"));
    }

    #[test]
    fn test_log_sink_does_not_panic_without_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
        LogDiagnostics.info("building");
    }
}
