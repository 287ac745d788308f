#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal output for the `acre_map` binary.
//!
//! The external join reports progress through [`ProgressCallback`];
//! [`IndicatifProgress`] draws it as a cell counter. Log lines and bars
//! share one [`MultiProgress`], created by [`init_logger`].

use std::sync::Arc;
use std::time::Duration;

use acre_map_external::ProgressCallback;
use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::MultiProgress;

const SPINNER_TEMPLATE: &str = "{spinner:.green} {msg}";
const CELLS_TEMPLATE: &str = "  {msg} [{bar:40.green/dim}] {pos}/{len} cells ({eta} left)";

/// Cell-lookup progress drawn on a [`MultiProgress`].
pub struct IndicatifProgress {
    bar: ProgressBar,
    counter_style: ProgressStyle,
}

impl IndicatifProgress {
    /// Adds a lookup bar to `multi`.
    ///
    /// It spins until the join reports how many cells it will look up,
    /// then counts cells.
    #[must_use]
    pub fn lookups_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.set_style(
            ProgressStyle::with_template(SPINNER_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_message(message.to_string());

        let counter_style = ProgressStyle::with_template(CELLS_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");

        Arc::new(Self { bar, counter_style })
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_style(self.counter_style.clone());
        self.bar.set_length(total);
        self.bar.reset();
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Installs `pretty_env_logger` behind `indicatif-log-bridge`, so log
/// lines print above any live bar instead of tearing it.
///
/// The default level is `info` (`debug` with `verbose`). `RUST_LOG`
/// directives are applied on top. Bars must be added to the returned
/// [`MultiProgress`].
#[must_use]
pub fn init_logger(verbose: bool) -> MultiProgress {
    let multi = MultiProgress::new();

    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    let logger = builder.build();
    let level = logger.filter();

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok(); // second call keeps the first logger

    log::set_max_level(level);

    multi
}

#[cfg(test)]
mod tests {
    use indicatif::ProgressDrawTarget;

    use super::*;

    #[test]
    fn lookup_bar_counts_cells_once_total_is_known() {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        let progress = IndicatifProgress {
            bar: multi.add(ProgressBar::new_spinner()),
            counter_style: ProgressStyle::default_bar(),
        };
        progress.inc(3);
        progress.set_total(40);
        assert_eq!(progress.bar.length(), Some(40));
        assert_eq!(progress.bar.position(), 0);

        progress.inc(15);
        progress.inc(25);
        progress.finish("done".to_string());
        assert_eq!(progress.bar.position(), 40);
        assert!(progress.bar.is_finished());
    }

    #[test]
    fn lookups_bar_accepts_callbacks_before_a_total() {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        let progress = IndicatifProgress::lookups_bar(&multi, "Looking up");
        progress.set_message("Weather".to_string());
        progress.set_total(2);
        progress.inc(2);
        progress.finish("done".to_string());
    }
}
