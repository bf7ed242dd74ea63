use std::io::Write;

use chrono::Local;
use env_logger::{Env, Target};

/// App initialization. `log_level` overrides `RUST_LOG`.
pub fn init(log_level: Option<&str>) {
    log_init(log_level);
}

fn log_init(log_level: Option<&str>) {
    let env = Env::default().default_filter_or("info");
    let mut builder = env_logger::Builder::from_env(env);
    if let Some(level) = log_level {
        builder.parse_filters(level);
    }
    builder
        .target(Target::Stderr)
        .format(|fmt, record| {
            writeln!(
                fmt,
                "[{} {}] {}",
                Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                &record.args()
            )
        })
        .init();
}
