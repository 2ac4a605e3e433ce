use chrono::Local;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Command,
    Warning,
    Error,
}

impl LogLevel {
    pub fn to_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Command => "CMD",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }

    fn color(&self) -> &'static str {
        match self {
            LogLevel::Debug => "\x1b[90m",
            LogLevel::Info => "\x1b[37m",
            LogLevel::Command => "\x1b[36m",
            LogLevel::Warning => "\x1b[33m",
            LogLevel::Error => "\x1b[31m",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Logger {
    use_colors: bool,
    min_level: LogLevel,
}

impl Logger {
    pub fn new() -> Self {
        Self {
            use_colors: atty::is(atty::Stream::Stdout),
            min_level: LogLevel::Info,
        }
    }

    pub fn quiet() -> Self {
        Self::new().with_level(LogLevel::Error)
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        if !self.enabled(level) {
            return;
        }

        let timestamp = Local::now().format("%H:%M:%S");
        let line = if self.use_colors {
            format!(
                "\x1b[90m[{}]\x1b[0m {}{}\x1b[0m",
                timestamp,
                level.color(),
                message
            )
        } else {
            format!("[{}] {}: {}", timestamp, level.to_str(), message)
        };

        if level >= LogLevel::Warning {
            eprintln!("{}", line);
        } else {
            let mut stdout = std::io::stdout().lock();
            let _ = writeln!(stdout, "{}", line);
            let _ = stdout.flush();
        }
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn command(&self, line: &str) {
        self.log(LogLevel::Command, line);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filtering() {
        let logger = Logger::quiet();
        assert!(logger.enabled(LogLevel::Error));
        assert!(!logger.enabled(LogLevel::Command));

        let logger = Logger::new().with_level(LogLevel::Debug);
        assert!(logger.enabled(LogLevel::Debug));
    }

    #[test]
    fn test_level_names() {
        assert_eq!(LogLevel::Command.to_str(), "CMD");
        assert!(LogLevel::Warning > LogLevel::Info);
    }
}
