//! Run logging: console output through `env_logger` plus per-level log files.
//!
//! Files live in `logs/<run>_<YYYYMMDD>/<level>.log` and are only appended
//! to. Each line reads `[YYYY-mm-dd HH:MM:SS] [LEVEL] message`. Records with
//! the `dummy` target go to `dummy.log`; `debug.log` is only written when
//! debug logging is on.

use chrono::Local;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};

/// Log target for dummy dispatches.
pub const DUMMY_TARGET: &str = "dummy";

/// Root directory of the log files.
pub const LOG_ROOT: &str = "logs";

/// Appends records to one file per level.
pub struct FileSink {
    dir: PathBuf,
    debug: bool,
    files: Mutex<HashMap<&'static str, RollingFileAppender>>,
}

impl FileSink {
    /// Sink writing into `<root>/<run>_<today>/`.
    pub fn new(root: &Path, run: &str, debug: bool) -> Self {
        let date = Local::now().format("%Y%m%d");
        Self {
            dir: root.join(format!("{run}_{date}")),
            debug,
            files: Mutex::new(HashMap::new()),
        }
    }

    /// Directory the files are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name stem for a record, `None` when it is not written.
    fn stem(&self, level: Level, target: &str) -> Option<&'static str> {
        if target == DUMMY_TARGET {
            return Some("dummy");
        }
        match level {
            Level::Error => Some("error"),
            Level::Warn => Some("warning"),
            Level::Info => Some("info"),
            Level::Debug if self.debug => Some("debug"),
            Level::Debug | Level::Trace => None,
        }
    }

    /// Append one line. Failures go to stderr; logging never stops a run.
    pub fn write(&self, level: Level, target: &str, message: &str) {
        let Some(stem) = self.stem(level, target) else {
            return;
        };
        let now = Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("[{now}] [{}] {message}\n", stem.to_uppercase());

        let mut files = match self.files.lock() {
            Ok(files) => files,
            Err(poisoned) => poisoned.into_inner(),
        };

        if !files.contains_key(stem) {
            match self.open(stem) {
                Ok(file) => {
                    files.insert(stem, file);
                }
                Err(e) => {
                    eprintln!("Cannot open log file {stem}.log in {}: {e}", self.dir.display());
                    return;
                }
            }
        }
        if let Some(file) = files.get_mut(stem)
            && let Err(e) = file.write_all(line.as_bytes())
        {
            eprintln!("Cannot write to {stem}.log: {e}");
        }
    }

    /// Appender for `<stem>.log`. Files are never rotated; a run that spans
    /// midnight keeps writing into the directory it started in.
    fn open(&self, stem: &str) -> Result<RollingFileAppender, InitError> {
        RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(stem)
            .filename_suffix("log")
            .build(&self.dir)
    }
}

/// Console and file logging combined.
struct RunLogger {
    console: env_logger::Logger,
    files: FileSink,
}

impl Log for RunLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= LevelFilter::Debug
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // Dummy records are file-only.
        if record.target() != DUMMY_TARGET && self.console.matches(record) {
            self.console.log(record);
        }
        self.files
            .write(record.level(), record.target(), &record.args().to_string());
    }

    fn flush(&self) {
        self.console.flush();
    }
}

/// Install the logger for a run. Console shows warnings, or debug output
/// with `debug`; files always receive info and above.
pub fn init(run: &str, debug: bool) -> PathBuf {
    let console = env_logger::Builder::new()
        .filter_level(if debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        })
        .format_timestamp(None)
        .build();

    let files = FileSink::new(Path::new(LOG_ROOT), run, debug);
    let dir = files.dir().to_path_buf();

    let logger = RunLogger { console, files };
    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }
    dir
}
