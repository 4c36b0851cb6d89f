use log::LevelFilter;
use std::io::Write;

/// Logs to stderr so stdout carries only the command result.
///
/// The level defaults to `info` and follows `RUST_LOG` when it is set, e.g.
/// `RUST_LOG=debug memory-sync sync` to see every upload and deletion.
pub fn init_logger(quiet: bool) {
    let default_level = if quiet {
        LevelFilter::Warn
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{:5}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .try_init()
        .ok();
}
