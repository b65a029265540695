use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::ui;

/// Stderr spinner around one long-running call.
///
/// A no-op when progress output is disabled. Dropping an unfinished spinner
/// clears it.
pub struct Progress {
    bar: Option<ProgressBar>,
}

impl Progress {
    #[must_use]
    pub fn spinner(message: &str) -> Self {
        if !ui::prefs().progress {
            return Self { bar: None };
        }

        let bar = ProgressBar::new_spinner();
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());
        Self { bar: Some(bar) }
    }

    /// Settle the spinner on the outcome of the call it was tracking.
    pub fn finish<T, E>(mut self, result: &Result<T, E>, done: impl FnOnce(&T) -> String, failed: &str) {
        let Some(bar) = self.bar.take() else {
            return;
        };
        match result {
            Ok(value) => bar.finish_with_message(done(value)),
            Err(_) => bar.abandon_with_message(failed.to_string()),
        }
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}
