//! Logger set-up, console banners and progress bars for the `cfgrid` binary.

use crate::config::ToolkitConfig;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::LevelFilter;
use std::time::Duration;

/// Initialises `env_logger`. `RUST_LOG` wins over the verbosity flags.
pub fn init_logger(verbose: bool, quiet: bool) {
    let level = if quiet {
        LevelFilter::Error
    } else if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).format_timestamp(None);
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }
    // a second initialisation (tests) is harmless
    let _ = builder.try_init();
}

pub fn show_greeting(command: &str) {
    println!("=== cfgrid: {} ===", command);
}

pub fn config_echo(config: &ToolkitConfig, source: Option<&std::path::Path>) {
    println!("\nConfiguration:");
    match source {
        Some(path) => println!("  Loaded from: {}", path.display()),
        None => println!("  Loaded from: built-in defaults"),
    }
    match &config.variable_definitions {
        Some(path) => println!("  Variable definitions: {}", path.display()),
        None => println!("  Variable definitions: built-in"),
    }
    println!("  Timescale: {}", config.timescale);
    println!("  Slice cache: {}", config.field_cache_capacity);
    println!("  Profile cache: {}", config.profile_cache_capacity);
    println!("  Profile interval: {}", config.profile_interval);
}

pub fn show_farewell_with_timing(elapsed: Duration) {
    println!("\n=== Done in {:.2}s ===", elapsed.as_secs_f64());
}

/// Progress bar over `length` time slices, hidden in quiet mode.
pub fn progress_bar(header: &str, length: u64, quiet: bool) -> ProgressBar {
    let pb = ProgressBar::with_draw_target(
        Some(length),
        if quiet {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stderr()
        },
    );
    pb.set_prefix(header.to_string());
    if let Ok(style) = ProgressStyle::with_template("{prefix} [{wide_bar:.cyan/blue}] {pos}/{len}") {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_progress_is_hidden() {
        let pb = progress_bar("stats", 4, true);
        assert!(pb.is_hidden());
        pb.inc(2);
        assert_eq!(pb.position(), 2);
        assert_eq!(pb.length(), Some(4));
    }

    #[test]
    fn test_init_logger_twice() {
        init_logger(false, true);
        init_logger(true, false);
    }
}
