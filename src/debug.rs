//! The process-wide `DEBUG_CODE` switch.
//!
//! When on, shader sources are logged with numbered lines before they are
//! compiled and `#include` expansion leaves marker comments in the expanded
//! text. The initial value comes from the `DEBUG_CODE` environment variable
//! (`1`, `true`, `yes` or `on`); [`set_debug_code`] overrides it.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU8, Ordering};

/// Name of the environment variable read on first use.
pub const DEBUG_CODE_ENV: &str = "DEBUG_CODE";

const UNSET: u8 = 0;
const OFF: u8 = 1;
const ON: u8 = 2;

static DEBUG_CODE: AtomicU8 = AtomicU8::new(UNSET);

/// Whether shader debug output is enabled.
pub fn debug_code() -> bool {
    match DEBUG_CODE.load(Ordering::Relaxed) {
        UNSET => {
            let on = std::env::var(DEBUG_CODE_ENV).is_ok_and(|v| parse_flag(&v));
            // Another thread may have called `set_debug_code` meanwhile; keep theirs.
            let _ = DEBUG_CODE.compare_exchange(
                UNSET,
                if on { ON } else { OFF },
                Ordering::Relaxed,
                Ordering::Relaxed,
            );
            DEBUG_CODE.load(Ordering::Relaxed) == ON
        }
        value => value == ON,
    }
}

/// Override the `DEBUG_CODE` switch for the rest of the process.
pub fn set_debug_code(on: bool) {
    DEBUG_CODE.store(if on { ON } else { OFF }, Ordering::Relaxed);
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Prefix every line of `source` with a 1-based, right-aligned line number.
pub fn numbered_source(source: &str) -> String {
    let mut out = String::with_capacity(source.len() + source.len() / 8);
    for (i, line) in source.lines().enumerate() {
        let _ = writeln!(out, "{:>4}: {line}", i + 1);
    }
    out
}
