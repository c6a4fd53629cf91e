//! Log setup for the command line tool.

use log::error;
use std::backtrace::Backtrace;

/// Default log filter for the number of `-v` flags given.
pub fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Initializes env_logger. `RUST_LOG` takes precedence over `verbosity`.
pub fn init(verbosity: u8) {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter(verbosity)),
    )
    .init();
}

/// Logs panics with a backtrace. Panics inside jobs are caught by the worker
/// pool, so this is where their location ends up.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let thread = std::thread::current();
        error!(
            "thread '{}' {}\n{}",
            thread.name().unwrap_or("<unnamed>"),
            info,
            Backtrace::force_capture()
        );
    }));
}
