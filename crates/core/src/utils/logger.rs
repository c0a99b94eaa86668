use std::fmt::Display;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Local;

enum Level {
    Info,
    Error,
    Debug,
    Command,
}

impl Level {
    fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Error => "ERROR",
            Level::Debug => "DEBUG",
            Level::Command => "COMMAND",
        }
    }
}

/// Per-service log sink. Appends are serialized by the internal mutex so
/// lines from concurrent workers never interleave.
pub struct Logger {
    service: &'static str,
    sink: Option<Mutex<File>>,
}

impl Logger {
    /// Log to `<root>/<endpoint>/<service>.log`, truncating any previous run.
    pub fn to_file(root: &str, endpoint: &str, service: &'static str) -> io::Result<Logger> {
        let dir: PathBuf = [root, endpoint].iter().collect();
        fs::create_dir_all(&dir)?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(dir.join(format!("{service}.log")))?;
        Ok(Logger {
            service,
            sink: Some(Mutex::new(file)),
        })
    }

    /// Log to stdout; handy in tests and small tools.
    pub const fn stdout(service: &'static str) -> Logger {
        Logger {
            service,
            sink: None,
        }
    }

    fn write(&self, level: Level, msg: impl Display) {
        let line = format!(
            "[{}] {} {}: {}",
            self.service,
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            level.as_str(),
            msg
        );
        match &self.sink {
            Some(sink) => {
                let mut file = sink.lock().unwrap();
                // A failed log write is not worth killing a worker over.
                let _ = writeln!(file, "{line}");
            }
            None => println!("{line}"),
        }
    }

    pub fn info(&self, msg: impl Display) {
        self.write(Level::Info, msg);
    }

    pub fn debug(&self, msg: impl Display) {
        self.write(Level::Debug, msg);
    }

    pub fn error(&self, msg: impl Display) {
        self.write(Level::Error, msg);
    }

    /// Wire traffic, kept apart from plain info lines like the seeder and
    /// tracker logs do.
    pub fn command(&self, msg: impl Display) {
        self.write(Level::Command, msg);
    }
}
