use std::io::IsTerminal;
use std::sync::OnceLock;

use crate::cli::{GlobalFlags, OutputFormat};

/// Terminal-dependent presentation settings, detected once at startup.
#[derive(Clone, Copy, Debug)]
pub struct UiPrefs {
    pub table_color: bool,
    pub progress: bool,
    pub term_width: Option<usize>,
}

impl UiPrefs {
    const PLAIN: Self = Self {
        table_color: false,
        progress: false,
        term_width: None,
    };

    fn detect(flags: &GlobalFlags) -> Self {
        let no_color = std::env::var_os("NO_COLOR").is_some();
        Self {
            table_color: flags.format == OutputFormat::Table
                && std::io::stdout().is_terminal()
                && !no_color,
            // Spinners draw on stderr, so piping stdout keeps them.
            progress: !flags.quiet && std::io::stderr().is_terminal(),
            term_width: std::env::var("COLUMNS")
                .ok()
                .and_then(|value| value.parse::<usize>().ok())
                .filter(|width| *width >= 40),
        }
    }
}

static UI_PREFS: OnceLock<UiPrefs> = OnceLock::new();

pub fn init(flags: &GlobalFlags) {
    let _ = UI_PREFS.set(UiPrefs::detect(flags));
}

#[must_use]
pub fn prefs() -> UiPrefs {
    UI_PREFS.get().copied().unwrap_or(UiPrefs::PLAIN)
}
