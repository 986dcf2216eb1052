//! Structured logging with timestamps, source locations, and ANSI colour support.
//!
//! Provides the [`logln!`] macro for consistent log output in the format:
//!
//! ```text
//! 2026-08-07 21:33:12.000 - src/connections.rs:42 - request: u-4fJq2dK -> u-9aKx1pQ (id=17)
//! ```
//!
//! When stderr is a terminal, timestamps and source locations are dimmed and
//! user ids get a consistent colour derived from their content, so one
//! user's activity is easy to follow through interleaved output.  Tests can
//! redirect everything with [`set_writer`], which also turns colour off.

use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Mutex};
use std::time::SystemTime;

static COLOUR_ENABLED: AtomicBool = AtomicBool::new(false);

static LOG_WRITER: LazyLock<Mutex<Box<dyn Write + Send>>> =
    LazyLock::new(|| Mutex::new(Box::new(io::stderr())));

/// Initialize the logging system. Call once at startup before any logging.
pub fn init() {
    COLOUR_ENABLED.store(io::stderr().is_terminal(), Ordering::Relaxed);
}

/// Replace the log writer.  All subsequent [`logln!`] output goes to `w`
/// with ANSI colour disabled.
pub fn set_writer(w: Box<dyn Write + Send>) {
    COLOUR_ENABLED.store(false, Ordering::Relaxed);
    *LOG_WRITER.lock().unwrap() = w;
}

fn colour_enabled() -> bool {
    COLOUR_ENABLED.load(Ordering::Relaxed)
}

const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";

/// Bright foreground colours used for ID hashing.
const ID_COLOURS: &[&str] = &[
    "\x1b[91m", "\x1b[92m", "\x1b[93m", "\x1b[94m", "\x1b[95m", "\x1b[96m",
];

fn hash_colour(id: &str) -> &'static str {
    let hash = id
        .bytes()
        .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    ID_COLOURS[hash % ID_COLOURS.len()]
}

const ID_DISPLAY_LEN: usize = 8;

fn short(id: &str) -> &str {
    match id.char_indices().nth(ID_DISPLAY_LEN) {
        Some((i, _)) => &id[..i],
        None => id,
    }
}

/// Format a user ID with consistent colour and truncation, e.g. `u-4fJq2dK`.
pub fn user_id(id: &str) -> String {
    if colour_enabled() {
        format!("{}u-{}{RESET}", hash_colour(id), short(id))
    } else {
        format!("u-{}", short(id))
    }
}

/// Format a message ID with consistent colour and truncation, e.g. `m-ab12cd3`.
pub fn msg_id(id: &str) -> String {
    if colour_enabled() {
        format!("{}m-{}{RESET}", hash_colour(id), short(id))
    } else {
        format!("m-{}", short(id))
    }
}

/// Format the current wall-clock time as `YYYY-MM-DD HH:MM:SS.mmm`.
pub fn format_timestamp() -> String {
    let duration = SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();

    let time_secs = secs % 86400;
    let (hours, minutes, seconds) = (time_secs / 3600, (time_secs % 3600) / 60, time_secs % 60);

    // Civil date from days since epoch (Howard Hinnant's algorithm).
    let days = (secs / 86400) as i64;
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };

    format!("{y:04}-{m:02}-{d:02} {hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}

/// Write a single log line to the current writer.
///
/// Called by the [`logln!`] macro; not intended for direct use.
pub fn write_line(file: &str, line: u32, msg: &str) {
    let ts = format_timestamp();
    let formatted = if colour_enabled() {
        format!("{DIM}{ts}{RESET} {DIM}{file}:{line}{RESET} {msg}")
    } else {
        format!("{ts} - {file}:{line} - {msg}")
    };
    let mut writer = LOG_WRITER.lock().unwrap();
    let _ = writeln!(*writer, "{formatted}");
}

/// Emit a log line to the current writer with timestamp and source location.
///
/// ```ignore
/// logln!("request: {} accepted (id={})", logging::user_id(&uid), id);
/// ```
#[macro_export]
macro_rules! logln {
    ($($arg:tt)*) => {{
        $crate::logging::write_line(file!(), line!(), &format!($($arg)*));
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_handles_both_lengths() {
        assert_eq!(short("abcdefghijk"), "abcdefgh");
        assert_eq!(short("abc"), "abc");
    }

    #[test]
    fn id_formatting_is_deterministic() {
        assert_eq!(user_id("alice"), user_id("alice"));
        assert_eq!(user_id("alice"), "u-alice");
    }
}
