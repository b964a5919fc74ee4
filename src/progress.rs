//! Progress indicators for stanzactl.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Bar for a batch of `len` requests.
pub fn bar(len: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template("{prefix:.bold} {spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    pb.set_style(style);
    pb.set_prefix(prefix.to_string());
    pb
}

/// Hidden bar for tests and non-interactive runs.
pub fn hidden(len: u64) -> ProgressBar {
    ProgressBar::with_draw_target(Some(len), ProgressDrawTarget::hidden())
}
