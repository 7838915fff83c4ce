//! Optional log sink for the engine.
//!
//! The engine never decides where logs go.  Until the host calls
//! [`init_at`], the `log_info!` / `log_warn!` / `log_err!` macros format
//! nothing and write nothing, so the crate can be embedded (and unit-tested)
//! without any setup.  After `init_at` every line carries a UTC time of day
//! and a level tag:
//!
//! ```text
//! [14:03:27] [INFO] preview 8x8 of 100x100 at (0, 0), subsample 6 in 0.2 ms
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn tag(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

struct Sink {
    path: PathBuf,
    file: Mutex<File>,
}

static SINK: OnceLock<Sink> = OnceLock::new();
static PANIC_HOOK: Once = Once::new();

/// Route engine logging to `path`, creating parent directories and
/// truncating any previous content.  The first successful call wins; later
/// calls leave the existing sink in place and return `Ok`.
pub fn init_at(path: &Path) -> io::Result<()> {
    if SINK.get().is_some() {
        return Ok(());
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;

    let sink = Sink {
        path: path.to_path_buf(),
        file: Mutex::new(file),
    };
    if SINK.set(sink).is_ok() {
        append(&format!("# tilecanvas log, opened {}", unix_seconds()));
    }
    Ok(())
}

/// Mirror panic messages into the sink before the previous hook runs.
/// Opt-in for hosts that want compositor assertions in the engine log;
/// installing it more than once has no further effect.
pub fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let prev = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            append(&format!("[{}] [PANIC] {}", time_of_day(), info));
            prev(info);
        }));
    });
}

/// File the sink writes to, once initialised.
pub fn log_path() -> Option<&'static Path> {
    SINK.get().map(|s| s.path.as_path())
}

pub fn is_enabled() -> bool {
    SINK.get().is_some()
}

/// Write one tagged line.  I/O errors are swallowed: logging must never fail
/// a pixel operation.
pub fn write(level: Level, msg: &str) {
    if is_enabled() {
        append(&format!("[{}] [{}] {}", time_of_day(), level.tag(), msg));
    }
}

fn append(line: &str) {
    if let Some(sink) = SINK.get()
        && let Ok(mut file) = sink.file.lock()
    {
        let _ = writeln!(file, "{}", line);
    }
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if $crate::logger::is_enabled() {
            $crate::logger::write($crate::logger::Level::Info, &format!($($arg)*));
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if $crate::logger::is_enabled() {
            $crate::logger::write($crate::logger::Level::Warn, &format!($($arg)*));
        }
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        if $crate::logger::is_enabled() {
            $crate::logger::write($crate::logger::Level::Error, &format!($($arg)*));
        }
    };
}

/// HH:MM:SS within the current UTC day.
fn time_of_day() -> String {
    let secs = unix_seconds();
    format!("{:02}:{:02}:{:02}", (secs % 86_400) / 3600, (secs % 3600) / 60, secs % 60)
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
