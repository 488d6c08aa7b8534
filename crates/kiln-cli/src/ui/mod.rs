//! Human-facing terminal output.
//!
//! Status lines go to stderr so stdout stays clean for `kiln check`.
//!
//! ```no_run
//! use kiln_cli::ui;
//!
//! ui::init_colors(false);
//! ui::success("js:0 built in 42ms");
//! ui::error("css:0 failed");
//! ```

mod format;
mod messages;

use std::sync::atomic::{AtomicBool, Ordering};

pub use format::{format_duration, format_size, print_build_summary, SummaryRow};
pub use messages::{debug, error, info, success, warning};

/// Whether colored output should be used.
///
/// Respects `NO_COLOR` and `FORCE_COLOR`, falls back to terminal detection.
pub fn should_use_color() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var_os("FORCE_COLOR").is_some() {
        return true;
    }
    console::user_attended_stderr()
}

static COLORS: AtomicBool = AtomicBool::new(false);

/// Decide once whether status lines are colored. `no_color` comes from
/// `--no-color`.
pub fn init_colors(no_color: bool) {
    COLORS.store(!no_color && should_use_color(), Ordering::Relaxed);
}

pub(crate) fn colors_enabled() -> bool {
    COLORS.load(Ordering::Relaxed)
}
